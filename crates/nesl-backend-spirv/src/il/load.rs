//! Copies and immediate loads.

use nesl_backend_core::BackendError;
use nesl_ir::{Instruction, Operand};
use spirv::Op;

use super::IlCompiler;
use crate::id::SpirvId;
use crate::types::{Shape, SpirvType};

impl IlCompiler<'_, '_> {
    /// `load dst, src`
    pub(super) fn load(&mut self, instr: &Instruction) -> Result<(), BackendError> {
        let dst = self.variable(instr, 0)?;
        let src = self.variable(instr, 1)?;
        self.expect_type(&dst.ty, &src.ty)?;

        let value = self.load_value(&src.ty, src.pointer);
        self.store(dst.pointer, value);
        Ok(())
    }

    /// `load.u32 dst, value`
    pub(super) fn load_u32(&mut self, instr: &Instruction) -> Result<(), BackendError> {
        let dst = self.variable(instr, 0)?;
        let Operand::UInt32(value) = *self.operand(instr, 1)? else {
            return Err(self.internal("load.u32 expects a 32-bit unsigned immediate"));
        };
        if !matches!(dst.ty.shape, Shape::Int { width: 32, signed: false }) {
            return Err(self.mismatch("a 32-bit unsigned integer", &dst.ty));
        }
        self.store_constant(dst.pointer, &dst.ty, value);
        Ok(())
    }

    /// `load.f32 dst, value`
    pub(super) fn load_f32(&mut self, instr: &Instruction) -> Result<(), BackendError> {
        let dst = self.variable(instr, 0)?;
        let Operand::Float32(value) = *self.operand(instr, 1)? else {
            return Err(self.internal("load.f32 expects a 32-bit float immediate"));
        };
        if !matches!(dst.ty.shape, Shape::Float { width: 32 }) {
            return Err(self.mismatch("a 32-bit float", &dst.ty));
        }
        self.store_constant(dst.pointer, &dst.ty, value.to_bits());
        Ok(())
    }

    fn store_constant(&mut self, pointer: SpirvId, ty: &SpirvType, bits: u32) {
        let constant = self
            .compiler
            .types()
            .constant(self.compiler.ids(), ty, bits);
        self.generator.emit_ids(Op::Store, &[pointer, constant], &[]);
    }
}
