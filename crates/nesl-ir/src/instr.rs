//! Instructions: opcode tags with operand lists.

use std::sync::Arc;

use crate::error::IrError;
use crate::types::{Substitution, Ty};

/// Index of a method-local variable.
///
/// Parameters occupy the first indices (the receiver first for instance
/// methods); every `DefVariable` reserves the next one.
pub type VarId = u32;

/// The operation performed by an [`Instruction`].
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum OpCode {
    Negate,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Remainder,
    Call,
    Return,
    ReturnValue,
    DefVariable,
    Load,
    LoadUInt32,
    LoadFloat32,
    LoadElement,
    SetElement,
    LoadField,
    SetField,
}

/// Operand count accepted by an opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    /// Calls carry the callee, the result slot and one operand per argument.
    AtLeast(usize),
}

impl Arity {
    fn admits(self, count: usize) -> bool {
        match self {
            Self::Exactly(n) => count == n,
            Self::AtLeast(n) => count >= n,
        }
    }
}

impl OpCode {
    pub const ALL: [OpCode; 18] = [
        Self::Negate,
        Self::Add,
        Self::Subtract,
        Self::Multiply,
        Self::Divide,
        Self::Modulo,
        Self::Remainder,
        Self::Call,
        Self::Return,
        Self::ReturnValue,
        Self::DefVariable,
        Self::Load,
        Self::LoadUInt32,
        Self::LoadFloat32,
        Self::LoadElement,
        Self::SetElement,
        Self::LoadField,
        Self::SetField,
    ];

    pub fn arity(self) -> Arity {
        match self {
            Self::Return => Arity::Exactly(0),
            Self::ReturnValue | Self::DefVariable => Arity::Exactly(1),
            Self::Negate | Self::Load | Self::LoadUInt32 | Self::LoadFloat32 => Arity::Exactly(2),
            Self::Add
            | Self::Subtract
            | Self::Multiply
            | Self::Divide
            | Self::Modulo
            | Self::Remainder
            | Self::LoadElement
            | Self::SetElement
            | Self::LoadField
            | Self::SetField => Arity::Exactly(3),
            Self::Call => Arity::AtLeast(2),
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Negate => "neg",
            Self::Add => "add",
            Self::Subtract => "sub",
            Self::Multiply => "mul",
            Self::Divide => "div",
            Self::Modulo => "mod",
            Self::Remainder => "rem",
            Self::Call => "call",
            Self::Return => "ret",
            Self::ReturnValue => "ret.val",
            Self::DefVariable => "def",
            Self::Load => "load",
            Self::LoadUInt32 => "load.u32",
            Self::LoadFloat32 => "load.f32",
            Self::LoadElement => "load.elem",
            Self::SetElement => "set.elem",
            Self::LoadField => "load.field",
            Self::SetField => "set.field",
        }
    }
}

/// A symbolic reference to a method: owner type, declaration index and
/// method type arguments.
///
/// References are resolved through [`Program::resolve_method`](crate::Program::resolve_method),
/// which constructs the owner and instantiates the method on demand.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct MethodRef {
    pub owner: Ty,
    pub index: usize,
    pub name: Arc<str>,
    pub type_arguments: Vec<Ty>,
}

impl MethodRef {
    pub fn new(owner: Ty, index: usize, name: impl Into<Arc<str>>) -> Self {
        Self {
            owner,
            index,
            name: name.into(),
            type_arguments: Vec::new(),
        }
    }

    pub fn with_type_arguments(mut self, type_arguments: Vec<Ty>) -> Self {
        self.type_arguments = type_arguments;
        self
    }

    pub fn substitute(&self, substitution: &Substitution) -> MethodRef {
        MethodRef {
            owner: self.owner.substitute(substitution),
            index: self.index,
            name: Arc::clone(&self.name),
            type_arguments: self
                .type_arguments
                .iter()
                .map(|ty| ty.substitute(substitution))
                .collect(),
        }
    }
}

/// A single instruction operand.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Variable(VarId),
    Type(Ty),
    Method(MethodRef),
    UInt32(u32),
    Float32(f32),
    /// Field index within a structured type.
    Field(u32),
    /// Placeholder for an unused result slot.
    Void,
}

impl Operand {
    fn substitute(&self, substitution: &Substitution) -> Operand {
        match self {
            Self::Type(ty) => Self::Type(ty.substitute(substitution)),
            Self::Method(method) => Self::Method(method.substitute(substitution)),
            other => other.clone(),
        }
    }
}

/// An opcode with its operands.
///
/// Instructions are immutable once built; instantiation produces new
/// instructions through [`substitute`](Self::substitute).
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    opcode: OpCode,
    operands: Vec<Operand>,
}

impl Instruction {
    /// Builds an instruction, checking the operand count against the opcode.
    pub fn new(opcode: OpCode, operands: Vec<Operand>) -> Result<Self, IrError> {
        let arity = opcode.arity();
        if !arity.admits(operands.len()) {
            return Err(IrError::OperandCount {
                opcode: opcode.mnemonic().to_string(),
                expected: match arity {
                    Arity::Exactly(n) => n.to_string(),
                    Arity::AtLeast(n) => format!("at least {n}"),
                },
                found: operands.len(),
            });
        }
        Ok(Self { opcode, operands })
    }

    fn build(opcode: OpCode, operands: Vec<Operand>) -> Self {
        debug_assert!(opcode.arity().admits(operands.len()));
        Self { opcode, operands }
    }

    fn ternary(opcode: OpCode, dst: VarId, lhs: VarId, rhs: VarId) -> Self {
        Self::build(
            opcode,
            vec![
                Operand::Variable(dst),
                Operand::Variable(lhs),
                Operand::Variable(rhs),
            ],
        )
    }

    pub fn negate(dst: VarId, src: VarId) -> Self {
        Self::build(
            OpCode::Negate,
            vec![Operand::Variable(dst), Operand::Variable(src)],
        )
    }

    pub fn add(dst: VarId, lhs: VarId, rhs: VarId) -> Self {
        Self::ternary(OpCode::Add, dst, lhs, rhs)
    }

    pub fn subtract(dst: VarId, lhs: VarId, rhs: VarId) -> Self {
        Self::ternary(OpCode::Subtract, dst, lhs, rhs)
    }

    pub fn multiply(dst: VarId, lhs: VarId, rhs: VarId) -> Self {
        Self::ternary(OpCode::Multiply, dst, lhs, rhs)
    }

    pub fn divide(dst: VarId, lhs: VarId, rhs: VarId) -> Self {
        Self::ternary(OpCode::Divide, dst, lhs, rhs)
    }

    pub fn modulo(dst: VarId, lhs: VarId, rhs: VarId) -> Self {
        Self::ternary(OpCode::Modulo, dst, lhs, rhs)
    }

    pub fn remainder(dst: VarId, lhs: VarId, rhs: VarId) -> Self {
        Self::ternary(OpCode::Remainder, dst, lhs, rhs)
    }

    /// Calls `method`, storing its result into `result` if given.
    pub fn call(method: MethodRef, result: Option<VarId>, arguments: &[VarId]) -> Self {
        let mut operands = Vec::with_capacity(arguments.len() + 2);
        operands.push(Operand::Method(method));
        operands.push(result.map_or(Operand::Void, Operand::Variable));
        operands.extend(arguments.iter().copied().map(Operand::Variable));
        Self::build(OpCode::Call, operands)
    }

    pub fn ret() -> Self {
        Self::build(OpCode::Return, Vec::new())
    }

    pub fn return_value(value: VarId) -> Self {
        Self::build(OpCode::ReturnValue, vec![Operand::Variable(value)])
    }

    pub fn def_variable(ty: Ty) -> Self {
        Self::build(OpCode::DefVariable, vec![Operand::Type(ty)])
    }

    /// Copies `src` into `dst`.
    pub fn load(dst: VarId, src: VarId) -> Self {
        Self::build(
            OpCode::Load,
            vec![Operand::Variable(dst), Operand::Variable(src)],
        )
    }

    pub fn load_u32(dst: VarId, value: u32) -> Self {
        Self::build(
            OpCode::LoadUInt32,
            vec![Operand::Variable(dst), Operand::UInt32(value)],
        )
    }

    pub fn load_f32(dst: VarId, value: f32) -> Self {
        Self::build(
            OpCode::LoadFloat32,
            vec![Operand::Variable(dst), Operand::Float32(value)],
        )
    }

    /// `dst = src[index]`
    pub fn load_element(dst: VarId, src: VarId, index: VarId) -> Self {
        Self::ternary(OpCode::LoadElement, dst, src, index)
    }

    /// `dst[index] = value`
    pub fn set_element(dst: VarId, index: VarId, value: VarId) -> Self {
        Self::ternary(OpCode::SetElement, dst, index, value)
    }

    /// `dst = src.field`
    pub fn load_field(dst: VarId, src: VarId, field: u32) -> Self {
        Self::build(
            OpCode::LoadField,
            vec![
                Operand::Variable(dst),
                Operand::Variable(src),
                Operand::Field(field),
            ],
        )
    }

    /// `dst.field = value`
    pub fn set_field(dst: VarId, field: u32, value: VarId) -> Self {
        Self::build(
            OpCode::SetField,
            vec![
                Operand::Variable(dst),
                Operand::Field(field),
                Operand::Variable(value),
            ],
        )
    }

    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    /// Returns a copy with every type-valued operand substituted.
    ///
    /// The opcode and operand count are preserved.
    pub fn substitute(&self, substitution: &Substitution) -> Instruction {
        Instruction {
            opcode: self.opcode,
            operands: self
                .operands
                .iter()
                .map(|op| op.substitute(substitution))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GenericParam;

    #[test]
    fn constructors_match_arity() {
        let samples = [
            Instruction::negate(1, 0),
            Instruction::add(2, 0, 1),
            Instruction::subtract(2, 0, 1),
            Instruction::multiply(2, 0, 1),
            Instruction::divide(2, 0, 1),
            Instruction::modulo(2, 0, 1),
            Instruction::remainder(2, 0, 1),
            Instruction::call(MethodRef::new(Ty::named("A"), 0, "f"), None, &[0, 1]),
            Instruction::ret(),
            Instruction::return_value(0),
            Instruction::def_variable(Ty::named("System.Float32")),
            Instruction::load(1, 0),
            Instruction::load_u32(0, 7),
            Instruction::load_f32(0, 1.5),
            Instruction::load_element(2, 0, 1),
            Instruction::set_element(0, 1, 2),
            Instruction::load_field(1, 0, 0),
            Instruction::set_field(0, 0, 1),
        ];
        for instr in &samples {
            assert!(instr.opcode().arity().admits(instr.operands().len()));
        }
        for op in OpCode::ALL {
            assert!(
                samples.iter().any(|instr| instr.opcode() == op),
                "no constructor builds {op}"
            );
        }
    }

    #[test]
    fn mnemonics_are_distinct() {
        let mut mnemonics: Vec<&str> = OpCode::ALL.iter().map(|op| op.mnemonic()).collect();
        mnemonics.sort_unstable();
        mnemonics.dedup();
        assert_eq!(mnemonics.len(), OpCode::ALL.len());
    }

    #[test]
    fn new_rejects_wrong_operand_count() {
        let err = Instruction::new(OpCode::Add, vec![Operand::Variable(0)]).unwrap_err();
        assert!(matches!(err, IrError::OperandCount { found: 1, .. }));
        assert!(Instruction::new(OpCode::Return, vec![]).is_ok());
        assert!(Instruction::new(OpCode::Call, vec![Operand::Void]).is_err());
    }

    #[test]
    fn substitute_rewrites_type_operands_only() {
        let t = Ty::param(GenericParam::new("T"));
        let mut subst = Substitution::new();
        subst.bind("T", Ty::named("System.UInt32"));

        let def = Instruction::def_variable(t.clone()).substitute(&subst);
        assert_eq!(def, Instruction::def_variable(Ty::named("System.UInt32")));

        let call = Instruction::call(
            MethodRef::new(Ty::generic("Demo.Box", vec![t.clone()]), 1, "Get")
                .with_type_arguments(vec![t]),
            Some(3),
            &[2],
        )
        .substitute(&subst);
        let Operand::Method(method) = &call.operands()[0] else {
            panic!("expected method operand");
        };
        assert_eq!(
            method.owner,
            Ty::generic("Demo.Box", vec![Ty::named("System.UInt32")])
        );
        assert_eq!(method.type_arguments, vec![Ty::named("System.UInt32")]);
        assert_eq!(call.operands()[1], Operand::Variable(3));
        assert_eq!(call.operands().len(), 3);
    }
}
