//! Field access into structs.

use nesl_backend_core::BackendError;
use nesl_ir::{Instruction, Operand};
use spirv::Op;

use super::IlCompiler;
use crate::id::SpirvId;
use crate::types::{Shape, SpirvType};

impl IlCompiler<'_, '_> {
    /// `load.field dst, src, .field`
    pub(super) fn load_field(&mut self, instr: &Instruction) -> Result<(), BackendError> {
        let dst = self.variable(instr, 0)?;
        let src = self.variable(instr, 1)?;
        let field = self.field_operand(instr, 2)?;
        let field_type = self.field_type(&src.ty, field)?;
        self.expect_type(&field_type, &dst.ty)?;

        let member = self.member_pointer(src.pointer, &field_type, field);
        let value = self.load_value(&field_type, member);
        self.store(dst.pointer, value);
        Ok(())
    }

    /// `set.field dst, .field, value`
    pub(super) fn set_field(&mut self, instr: &Instruction) -> Result<(), BackendError> {
        let dst = self.variable(instr, 0)?;
        let field = self.field_operand(instr, 1)?;
        let value = self.variable(instr, 2)?;
        let field_type = self.field_type(&dst.ty, field)?;
        self.expect_type(&field_type, &value.ty)?;

        let member = self.member_pointer(dst.pointer, &field_type, field);
        let loaded = self.load_value(&value.ty, value.pointer);
        self.store(member, loaded);
        Ok(())
    }

    fn field_operand(&self, instr: &Instruction, slot: usize) -> Result<u32, BackendError> {
        match self.operand(instr, slot)? {
            Operand::Field(field) => Ok(*field),
            other => Err(self.internal(format!(
                "{} expects a field in operand {slot}, found {other}",
                instr.opcode()
            ))),
        }
    }

    fn field_type(&self, ty: &SpirvType, field: u32) -> Result<SpirvType, BackendError> {
        let Shape::Struct { fields } = &ty.shape else {
            return Err(self.mismatch("a struct", ty));
        };
        usize::try_from(field)
            .ok()
            .and_then(|i| fields.get(i))
            .cloned()
            .ok_or_else(|| self.internal(format!("{ty} has no field .{field}")))
    }

    fn member_pointer(&mut self, base: SpirvId, field_type: &SpirvType, field: u32) -> SpirvId {
        let types = self.compiler.types();
        let ids = self.compiler.ids();
        let pointer_type = types.function_pointer(ids, field_type);
        let uint = types.int(ids, 32, false);
        let index = types.constant(ids, &uint, field);
        let member = self.next_id();
        self.generator
            .emit_ids(Op::AccessChain, &[pointer_type, member, base, index], &[]);
        member
    }
}
