//! Calls and returns.

use nesl_backend_core::BackendError;
use nesl_ir::{Instruction, MethodInstance, Operand};
use spirv::Op;

use super::IlCompiler;

impl IlCompiler<'_, '_> {
    /// `call method, result|_, args...`
    ///
    /// Compiles the callee on first use.
    pub(super) fn call(&mut self, instr: &Instruction) -> Result<(), BackendError> {
        let reference = self.method_operand(instr, 0)?;
        let callee = match self.compiler.program().resolve_method(reference)? {
            MethodInstance::Concrete(method) if !method.is_generic() && !method.owner().is_generic() => {
                self.compiler.function(&method)?
            }
            other => return Err(BackendError::StillGeneric(other.full_name())),
        };

        let result = match self.operand(instr, 1)? {
            Operand::Void => None,
            Operand::Variable(_) => Some(self.variable(instr, 1)?),
            other => {
                return Err(self.internal(format!("call expects a result slot, found {other}")));
            }
        };

        let arguments = instr.operands().len() - 2;
        if arguments != callee.parameters().len() {
            return Err(self.mismatch(
                format!("{} argument(s) to {}", callee.parameters().len(), callee.method().full_name()),
                arguments,
            ));
        }
        let mut values = Vec::with_capacity(arguments);
        for (slot, parameter) in (2..).zip(callee.parameters()) {
            let argument = self.variable(instr, slot)?;
            self.expect_type(parameter, &argument.ty)?;
            values.push(argument);
        }
        let values: Vec<u32> = values
            .into_iter()
            .map(|argument| self.load_value(&argument.ty, argument.pointer).raw())
            .collect();

        if let Some(result) = &result {
            self.expect_type(callee.return_type(), &result.ty)?;
        }
        let value = self.next_id();
        self.generator.emit_ids(
            Op::FunctionCall,
            &[callee.return_type().id, value, callee.id()],
            &values,
        );
        if let Some(result) = result {
            self.store(result.pointer, value);
        }
        Ok(())
    }

    /// `ret`
    pub(super) fn ret(&mut self) -> Result<(), BackendError> {
        if !self.return_type.is_void() {
            return Err(self.mismatch(self.return_type, "void"));
        }
        self.generator.emit(Op::Return, &[]);
        self.terminated = true;
        Ok(())
    }

    /// `ret.val value`
    pub(super) fn return_value(&mut self, instr: &Instruction) -> Result<(), BackendError> {
        let value = self.variable(instr, 0)?;
        let return_type = self.return_type;
        if return_type.is_void() {
            return Err(self.mismatch("void", &value.ty));
        }
        self.expect_type(return_type, &value.ty)?;

        let loaded = self.load_value(&value.ty, value.pointer);
        self.generator.emit_ids(Op::ReturnValue, &[loaded], &[]);
        self.terminated = true;
        Ok(())
    }
}
