//! Indexed access into vectors.

use nesl_backend_core::BackendError;
use nesl_ir::Instruction;
use spirv::Op;

use super::{IlCompiler, Variable};
use crate::id::SpirvId;
use crate::types::{Shape, SpirvType};

impl IlCompiler<'_, '_> {
    /// `load.elem dst, src, index`
    pub(super) fn load_element(&mut self, instr: &Instruction) -> Result<(), BackendError> {
        let dst = self.variable(instr, 0)?;
        let src = self.variable(instr, 1)?;
        let index = self.variable(instr, 2)?;
        let component = self.component(&src.ty)?;
        self.expect_type(&component, &dst.ty)?;

        let element = self.element_pointer(&src, &component, &index)?;
        let value = self.load_value(&component, element);
        self.store(dst.pointer, value);
        Ok(())
    }

    /// `set.elem dst, index, value`
    pub(super) fn set_element(&mut self, instr: &Instruction) -> Result<(), BackendError> {
        let dst = self.variable(instr, 0)?;
        let index = self.variable(instr, 1)?;
        let value = self.variable(instr, 2)?;
        let component = self.component(&dst.ty)?;
        self.expect_type(&component, &value.ty)?;

        let element = self.element_pointer(&dst, &component, &index)?;
        let loaded = self.load_value(&value.ty, value.pointer);
        self.store(element, loaded);
        Ok(())
    }

    fn component(&self, aggregate: &SpirvType) -> Result<SpirvType, BackendError> {
        match &aggregate.shape {
            Shape::Vector { component, .. } => Ok(SpirvType::clone(component)),
            _ => Err(self.mismatch("a vector", aggregate)),
        }
    }

    fn element_pointer(
        &mut self,
        aggregate: &Variable,
        component: &SpirvType,
        index: &Variable,
    ) -> Result<SpirvId, BackendError> {
        if !matches!(index.ty.shape, Shape::Int { .. }) {
            return Err(self.mismatch("an integer index", &index.ty));
        }
        let pointer_type = self
            .compiler
            .types()
            .function_pointer(self.compiler.ids(), component);
        let index = self.load_value(&index.ty, index.pointer);
        let element = self.next_id();
        self.generator.emit_ids(
            Op::AccessChain,
            &[pointer_type, element, aggregate.pointer, index],
            &[],
        );
        Ok(element)
    }
}
