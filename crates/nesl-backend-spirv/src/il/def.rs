//! Variable definitions.

use nesl_backend_core::BackendError;
use nesl_ir::Instruction;

use super::IlCompiler;

impl IlCompiler<'_, '_> {
    /// `def type`
    ///
    /// The variable itself was declared with the entry block; this only
    /// makes it visible to the instructions that follow.
    pub(super) fn def_variable(&mut self, instr: &Instruction) -> Result<(), BackendError> {
        if self.defined >= self.variables.len() {
            return Err(self.internal(format!("{instr} has no declared variable")));
        }
        self.defined += 1;
        Ok(())
    }
}
