//! SPIR-V backend for Nesl.
//!
//! Lowers every concrete method of a program into one SPIR-V module. Methods
//! compile in parallel; they share an id allocator and a structurally
//! interned type section, and the module bound is patched in once all
//! workers have joined.

mod builtin;
mod compiler;
mod function;
mod generator;
mod id;
mod il;
pub mod reader;
mod types;

pub use builtin::TypeSection;
pub use compiler::{CompiledModule, SpirvCompiler, SpirvOptions};
pub use function::SpirvFunction;
pub use generator::{SpirvGenerator, string_words};
pub use id::{IdAllocator, SpirvId};
pub use reader::{ParsedModule, ReadError, disassemble};
pub use types::{Shape, SpirvType};

use nesl_backend_core::{
    Backend, BackendError, BackendOptions, BackendOutput, Diagnostic, DiagnosticLevel,
    OutputContent, OutputFile,
};
use nesl_ir::Program;

/// Backend producing a `.spv` module.
#[derive(Debug, Default)]
pub struct SpirvBackend {
    pub options: SpirvOptions,
}

impl SpirvBackend {
    pub fn new(options: SpirvOptions) -> Self {
        Self { options }
    }
}

impl Backend for SpirvBackend {
    fn name(&self) -> &str {
        "SPIR-V"
    }

    fn targets(&self) -> &[&str] {
        &["spirv", "spv"]
    }

    fn compile(
        &self,
        program: &Program,
        opts: &BackendOptions,
    ) -> Result<BackendOutput, BackendError> {
        let module = SpirvCompiler::new(program, self.options).compile(opts.worker_count())?;

        let mut diagnostics: Vec<Diagnostic> = module
            .skipped
            .iter()
            .map(|name| Diagnostic {
                level: DiagnosticLevel::Warning,
                message: format!("skipped {name}: method is still generic"),
            })
            .collect();
        diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Info,
            message: format!(
                "{} function(s), bound {}, {} bytes",
                module.functions,
                module.bound,
                module.bytes.len()
            ),
        });

        Ok(BackendOutput {
            files: vec![OutputFile {
                name: format!("{}.spv", program.name()),
                content: OutputContent::Binary(module.bytes),
            }],
            diagnostics,
        })
    }
}
