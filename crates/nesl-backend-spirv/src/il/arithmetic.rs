//! Negation and binary arithmetic.

use nesl_backend_core::BackendError;
use nesl_ir::Instruction;
use spirv::Op;

use super::IlCompiler;
use crate::types::{Shape, SpirvType};

/// Binary arithmetic operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Remainder,
}

impl BinaryOp {
    /// The opcode for operands of the given scalar shape.
    fn opcode(self, scalar: &Shape) -> Option<Op> {
        let op = match (self, scalar) {
            (Self::Add, Shape::Float { .. }) => Op::FAdd,
            (Self::Add, Shape::Int { .. }) => Op::IAdd,
            (Self::Subtract, Shape::Float { .. }) => Op::FSub,
            (Self::Subtract, Shape::Int { .. }) => Op::ISub,
            (Self::Multiply, Shape::Float { .. }) => Op::FMul,
            (Self::Multiply, Shape::Int { .. }) => Op::IMul,
            (Self::Divide, Shape::Float { .. }) => Op::FDiv,
            (Self::Divide, Shape::Int { signed: true, .. }) => Op::SDiv,
            (Self::Divide, Shape::Int { signed: false, .. }) => Op::UDiv,
            (Self::Modulo, Shape::Float { .. }) => Op::FMod,
            (Self::Modulo, Shape::Int { signed: true, .. }) => Op::SMod,
            (Self::Modulo, Shape::Int { signed: false, .. }) => Op::UMod,
            (Self::Remainder, Shape::Float { .. }) => Op::FRem,
            (Self::Remainder, Shape::Int { signed: true, .. }) => Op::SRem,
            // Unsigned remainder and modulo agree.
            (Self::Remainder, Shape::Int { signed: false, .. }) => Op::UMod,
            _ => return None,
        };
        Some(op)
    }
}

fn negate_opcode(scalar: &Shape) -> Option<Op> {
    match scalar {
        Shape::Float { .. } => Some(Op::FNegate),
        Shape::Int { .. } => Some(Op::SNegate),
        _ => None,
    }
}

impl IlCompiler<'_, '_> {
    /// `neg dst, src`
    pub(super) fn negate(&mut self, instr: &Instruction) -> Result<(), BackendError> {
        let dst = self.variable(instr, 0)?;
        let src = self.variable(instr, 1)?;
        self.expect_type(&dst.ty, &src.ty)?;
        let op = self.numeric(&src.ty, negate_opcode)?;

        let value = self.load_value(&src.ty, src.pointer);
        let result = self.next_id();
        self.generator
            .emit_ids(op, &[dst.ty.id, result, value], &[]);
        self.store(dst.pointer, result);
        Ok(())
    }

    /// `op dst, lhs, rhs`; all three share one numeric type.
    pub(super) fn binary(&mut self, instr: &Instruction, operator: BinaryOp) -> Result<(), BackendError> {
        let dst = self.variable(instr, 0)?;
        let lhs = self.variable(instr, 1)?;
        let rhs = self.variable(instr, 2)?;
        self.expect_type(&lhs.ty, &rhs.ty)?;
        self.expect_type(&dst.ty, &lhs.ty)?;
        let op = self.numeric(&lhs.ty, |scalar| operator.opcode(scalar))?;

        let left = self.load_value(&lhs.ty, lhs.pointer);
        let right = self.load_value(&rhs.ty, rhs.pointer);
        let result = self.next_id();
        self.generator
            .emit_ids(op, &[dst.ty.id, result, left, right], &[]);
        self.store(dst.pointer, result);
        Ok(())
    }

    fn numeric(
        &self,
        ty: &SpirvType,
        opcode: impl FnOnce(&Shape) -> Option<Op>,
    ) -> Result<Op, BackendError> {
        opcode(ty.scalar()).ok_or_else(|| self.mismatch("a numeric type", ty))
    }
}
