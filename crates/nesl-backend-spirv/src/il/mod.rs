//! Lowering of instruction streams into function bodies.
//!
//! Every IR variable lives in a `Function`-storage `OpVariable` declared at
//! the top of the entry block; instructions load their operands from and
//! store their results to those variables. Handlers are grouped by
//! operation family, one module each.

mod arithmetic;
mod branch;
mod def;
mod load;
mod load_element;
mod load_field;

use std::fmt::Display;

use nesl_backend_core::BackendError;
use nesl_ir::{Instruction, Method, MethodRef, OpCode, Operand, VarId};
use spirv::{FunctionControl, Op, StorageClass};

use crate::compiler::SpirvCompiler;
use crate::generator::SpirvGenerator;
use crate::id::SpirvId;
use crate::types::SpirvType;

pub(crate) use arithmetic::BinaryOp;

#[derive(Clone, Debug)]
struct Variable {
    ty: SpirvType,
    pointer: SpirvId,
}

/// Lowers one method body.
pub(crate) struct IlCompiler<'a, 'p> {
    compiler: &'a SpirvCompiler<'p>,
    method: &'a Method,
    return_type: &'a SpirvType,
    generator: SpirvGenerator,
    variables: Vec<Variable>,
    /// Variables visible to the current instruction.
    defined: usize,
    terminated: bool,
    /// Position of the instruction being lowered.
    index: usize,
}

impl<'a, 'p> IlCompiler<'a, 'p> {
    pub(crate) fn new(
        compiler: &'a SpirvCompiler<'p>,
        method: &'a Method,
        return_type: &'a SpirvType,
    ) -> Self {
        Self {
            compiler,
            method,
            return_type,
            generator: SpirvGenerator::new(),
            variables: Vec::new(),
            defined: 0,
            terminated: false,
            index: 0,
        }
    }

    pub(crate) fn compile(
        mut self,
        function: SpirvId,
        function_type: SpirvId,
        parameters: &[SpirvType],
    ) -> Result<SpirvGenerator, BackendError> {
        self.generator.emit_ids(
            Op::Function,
            &[self.return_type.id, function],
            &[FunctionControl::NONE.bits(), function_type.raw()],
        );
        let mut parameter_ids = Vec::with_capacity(parameters.len());
        for ty in parameters {
            let id = self.next_id();
            self.generator.emit_ids(Op::FunctionParameter, &[ty.id, id], &[]);
            parameter_ids.push(id);
        }
        let label = self.next_id();
        self.generator.emit_ids(Op::Label, &[label], &[]);

        for ty in parameters {
            self.declare_variable(ty.clone());
        }
        let method = self.method;
        for instr in method.instructions() {
            if let (OpCode::DefVariable, [Operand::Type(ty)]) = (instr.opcode(), instr.operands()) {
                let ty = self.compiler.spirv_type(Some(ty))?;
                if ty.is_void() {
                    return Err(BackendError::Unsupported(format!(
                        "variable of type void in {}",
                        self.method.full_name()
                    )));
                }
                self.declare_variable(ty);
            }
        }
        for (i, id) in parameter_ids.into_iter().enumerate() {
            let pointer = self.variables[i].pointer;
            self.generator.emit_ids(Op::Store, &[pointer, id], &[]);
        }
        self.defined = parameters.len();

        for (index, instr) in method.instructions().iter().enumerate() {
            self.index = index;
            if self.terminated {
                return Err(self.internal("instruction after return"));
            }
            self.lower(instr)?;
        }

        if !self.terminated {
            if !self.return_type.is_void() {
                return Err(self.internal("missing return at end of non-void method"));
            }
            self.generator.emit(Op::Return, &[]);
        }
        self.generator.emit(Op::FunctionEnd, &[]);
        Ok(self.generator)
    }

    fn lower(&mut self, instr: &Instruction) -> Result<(), BackendError> {
        match instr.opcode() {
            OpCode::Negate => self.negate(instr),
            OpCode::Add => self.binary(instr, BinaryOp::Add),
            OpCode::Subtract => self.binary(instr, BinaryOp::Subtract),
            OpCode::Multiply => self.binary(instr, BinaryOp::Multiply),
            OpCode::Divide => self.binary(instr, BinaryOp::Divide),
            OpCode::Modulo => self.binary(instr, BinaryOp::Modulo),
            OpCode::Remainder => self.binary(instr, BinaryOp::Remainder),

            OpCode::Call => self.call(instr),
            OpCode::Return => self.ret(),
            OpCode::ReturnValue => self.return_value(instr),

            OpCode::DefVariable => self.def_variable(instr),

            OpCode::Load => self.load(instr),
            OpCode::LoadUInt32 => self.load_u32(instr),
            OpCode::LoadFloat32 => self.load_f32(instr),

            OpCode::LoadElement => self.load_element(instr),
            OpCode::SetElement => self.set_element(instr),

            OpCode::LoadField => self.load_field(instr),
            OpCode::SetField => self.set_field(instr),
        }
    }

    fn next_id(&self) -> SpirvId {
        self.compiler.ids().next_id()
    }

    fn declare_variable(&mut self, ty: SpirvType) {
        let pointer_type = self
            .compiler
            .types()
            .function_pointer(self.compiler.ids(), &ty);
        let pointer = self.next_id();
        self.generator.emit_ids(
            Op::Variable,
            &[pointer_type, pointer],
            &[StorageClass::Function as u32],
        );
        self.variables.push(Variable { ty, pointer });
    }

    fn operand<'i>(&self, instr: &'i Instruction, slot: usize) -> Result<&'i Operand, BackendError> {
        instr
            .operands()
            .get(slot)
            .ok_or_else(|| self.internal(format!("{} is missing operand {slot}", instr.opcode())))
    }

    /// The variable named by operand `slot`; it must already be defined.
    fn variable(&self, instr: &Instruction, slot: usize) -> Result<Variable, BackendError> {
        match self.operand(instr, slot)? {
            Operand::Variable(v) => self.variable_by_id(*v).cloned(),
            other => Err(self.internal(format!(
                "{} expects a variable in operand {slot}, found {other}",
                instr.opcode()
            ))),
        }
    }

    fn variable_by_id(&self, v: VarId) -> Result<&Variable, BackendError> {
        usize::try_from(v)
            .ok()
            .filter(|&i| i < self.defined)
            .and_then(|i| self.variables.get(i))
            .ok_or_else(|| self.internal(format!("%{v} used before its definition")))
    }

    fn method_operand<'i>(&self, instr: &'i Instruction, slot: usize) -> Result<&'i MethodRef, BackendError> {
        match self.operand(instr, slot)? {
            Operand::Method(m) => Ok(m),
            other => Err(self.internal(format!(
                "{} expects a method in operand {slot}, found {other}",
                instr.opcode()
            ))),
        }
    }

    /// Loads a variable's current value into a fresh id.
    fn load_value(&mut self, ty: &SpirvType, pointer: SpirvId) -> SpirvId {
        let value = self.next_id();
        self.generator
            .emit_ids(Op::Load, &[ty.id, value, pointer], &[]);
        value
    }

    fn store(&mut self, pointer: SpirvId, value: SpirvId) {
        self.generator.emit_ids(Op::Store, &[pointer, value], &[]);
    }

    /// Fails unless `found` is the same lowered type as `expected`.
    fn expect_type(&self, expected: &SpirvType, found: &SpirvType) -> Result<(), BackendError> {
        if expected == found {
            Ok(())
        } else {
            Err(self.mismatch(expected, found))
        }
    }

    fn mismatch(&self, expected: impl Display, found: impl Display) -> BackendError {
        BackendError::TypeMismatch {
            method: self.method.full_name(),
            index: self.index,
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    fn internal(&self, message: impl Display) -> BackendError {
        BackendError::Internal(format!(
            "{} at instruction {}: {message}",
            self.method.full_name(),
            self.index
        ))
    }
}
