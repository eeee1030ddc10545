//! Compiled functions.

use std::sync::Arc;

use nesl_backend_core::BackendError;
use nesl_ir::Method;

use crate::compiler::SpirvCompiler;
use crate::generator::SpirvGenerator;
use crate::id::SpirvId;
use crate::il::IlCompiler;
use crate::types::SpirvType;

/// The lowered form of one concrete method.
#[derive(Debug)]
pub struct SpirvFunction {
    id: SpirvId,
    method: Arc<Method>,
    return_type: SpirvType,
    parameters: Vec<SpirvType>,
    body: SpirvGenerator,
}

impl SpirvFunction {
    pub(crate) fn build(
        compiler: &SpirvCompiler<'_>,
        method: &Arc<Method>,
    ) -> Result<Self, BackendError> {
        let return_type = compiler.spirv_type(method.return_type())?;
        let mut parameters = Vec::with_capacity(method.parameter_types().len() + 1);
        if !method.is_static() {
            parameters.push(compiler.spirv_type(Some(method.owner()))?);
        }
        for ty in method.parameter_types() {
            let ty = compiler.spirv_type(Some(ty))?;
            if ty.is_void() {
                return Err(BackendError::Unsupported(format!(
                    "void parameter in {}",
                    method.full_name()
                )));
            }
            parameters.push(ty);
        }

        if method.kernel_local_size().is_some() && (!return_type.is_void() || !parameters.is_empty()) {
            return Err(BackendError::Unsupported(format!(
                "kernel {} must be static, take no parameters and return void",
                method.full_name()
            )));
        }

        let function_type = compiler
            .types()
            .function_type(compiler.ids(), &return_type, &parameters);
        let id = compiler.ids().next_id();
        let body = IlCompiler::new(compiler, method, &return_type).compile(
            id,
            function_type,
            &parameters,
        )?;

        if let Some(local_size) = method.kernel_local_size() {
            compiler.declare_entry_point(&method.full_name(), id, local_size);
        }

        log::debug!(
            "compiled {} as {id} ({} words)",
            method.full_name(),
            body.words().len()
        );
        Ok(Self {
            id,
            method: Arc::clone(method),
            return_type,
            parameters,
            body,
        })
    }

    pub fn id(&self) -> SpirvId {
        self.id
    }

    pub fn method(&self) -> &Arc<Method> {
        &self.method
    }

    pub fn return_type(&self) -> &SpirvType {
        &self.return_type
    }

    /// Parameter types, the receiver first for instance methods.
    pub fn parameters(&self) -> &[SpirvType] {
        &self.parameters
    }

    pub fn body(&self) -> &SpirvGenerator {
        &self.body
    }
}
