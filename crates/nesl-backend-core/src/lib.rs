#![warn(missing_docs)]
//! Backend trait and plugin architecture for Nesl.
//!
//! Defines the [`Backend`] trait that all code emitters implement,
//! along with supporting types ([`BackendOptions`], [`BackendOutput`],
//! [`BackendError`]) and a [`BackendRegistry`] for CLI dispatch.

use std::fmt::{self, Debug};
use std::num::NonZeroUsize;
use std::thread;

use nesl_ir::{IrError, Program, Reentrant};

/// A backend that compiles a Nesl program to target-specific output.
pub trait Backend: Debug + Send + Sync {
    /// Human-readable name (e.g. "SPIR-V").
    fn name(&self) -> &str;

    /// Target identifiers this backend handles (for `--target` dispatch).
    fn targets(&self) -> &[&str];

    /// Compile a program to backend-specific output.
    ///
    /// A failure aborts the whole compile; no partial output is returned.
    fn compile(
        &self,
        program: &Program,
        opts: &BackendOptions,
    ) -> Result<BackendOutput, BackendError>;
}

/// Options passed to a backend during compilation.
#[derive(Clone, Debug, Default)]
pub struct BackendOptions {
    /// Number of worker threads for per-method compilation
    /// (0 = available parallelism).
    pub jobs: usize,
}

impl BackendOptions {
    /// The worker count to actually use, never zero.
    pub fn worker_count(&self) -> usize {
        match self.jobs {
            0 => thread::available_parallelism().map_or(1, NonZeroUsize::get),
            n => n,
        }
    }
}

impl fmt::Display for BackendOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BackendOptions {{ jobs: {} }}", self.jobs)
    }
}

/// The output produced by a backend.
#[derive(Clone, Debug)]
pub struct BackendOutput {
    /// One or more output files.
    pub files: Vec<OutputFile>,
    /// Non-fatal diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

impl fmt::Display for BackendOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} file(s), {} diagnostic(s)",
            self.files.len(),
            self.diagnostics.len()
        )
    }
}

/// A single output file.
#[derive(Clone, Debug)]
pub struct OutputFile {
    /// Suggested filename (e.g. "module.spv", "program.ir").
    pub name: String,
    /// The file content.
    pub content: OutputContent,
}

impl fmt::Display for OutputFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Content of an output file.
#[derive(Clone, Debug)]
pub enum OutputContent {
    /// UTF-8 text.
    Text(String),
    /// Raw binary data.
    Binary(Vec<u8>),
}

impl fmt::Display for OutputContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "Text({} chars)", s.len()),
            Self::Binary(b) => write!(f, "Binary({} bytes)", b.len()),
        }
    }
}

/// A non-fatal diagnostic message from a backend.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    /// Severity level.
    pub level: DiagnosticLevel,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// Severity level for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagnosticLevel {
    /// A warning that does not prevent compilation.
    Warning,
    /// An informational note.
    Info,
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Warning => "Warning",
            Self::Info => "Info",
        })
    }
}

/// Errors that can occur during backend compilation.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The program uses a built-in type or operation this backend cannot map.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// An instruction's operands disagree on their types.
    #[error("type mismatch in {method} at instruction {index}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Full name of the method being compiled.
        method: String,
        /// Position of the offending instruction in the method body.
        index: usize,
        /// The type the instruction required.
        expected: String,
        /// The type it was given.
        found: String,
    },
    /// A partially constructed generic method reached code generation.
    #[error("cannot generate code for {0}: method is still generic")]
    StillGeneric(String),
    /// The IR violates a contract the backend relies on.
    #[error("internal error: {0}")]
    Internal(String),
    /// Instantiation or resolution failed in the IR layer.
    #[error(transparent)]
    Ir(#[from] IrError),
    /// A general backend error.
    #[error("{0}")]
    Other(String),
}

impl From<Reentrant> for BackendError {
    fn from(_: Reentrant) -> Self {
        Self::Internal("cyclic construction of a compiled artifact".into())
    }
}

/// Registry of available backends, used for CLI `--target` dispatch.
pub struct BackendRegistry {
    backends: Vec<Box<dyn Backend>>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
        }
    }

    /// Creates a registry pre-populated with built-in backends.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register(Box::new(IrDumpBackend));
        reg
    }

    /// Registers a backend.
    pub fn register(&mut self, backend: Box<dyn Backend>) {
        self.backends.push(backend);
    }

    /// Finds a backend that handles the given target identifier.
    pub fn find(&self, target: &str) -> Option<&dyn Backend> {
        self.backends
            .iter()
            .find(|b| b.targets().contains(&target))
            .map(|b| &**b)
    }

    /// Lists all supported target identifiers.
    pub fn list_targets(&self) -> Vec<&str> {
        self.backends
            .iter()
            .flat_map(|b| b.targets().iter().copied())
            .collect()
    }
}

/// Built-in backend that dumps the IR as text using [`nesl_ir::dump_program`].
#[derive(Debug)]
pub struct IrDumpBackend;

impl Backend for IrDumpBackend {
    fn name(&self) -> &str {
        "IR Dump"
    }

    fn targets(&self) -> &[&str] {
        &["ir-dump", "ir"]
    }

    fn compile(
        &self,
        program: &Program,
        _opts: &BackendOptions,
    ) -> Result<BackendOutput, BackendError> {
        let text = nesl_ir::dump_program(program);
        Ok(BackendOutput {
            files: vec![OutputFile {
                name: "program.ir".into(),
                content: OutputContent::Text(text),
            }],
            diagnostics: vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ir_dump_backend_targets() {
        let backend = IrDumpBackend;
        assert_eq!(backend.name(), "IR Dump");
        assert!(backend.targets().contains(&"ir-dump"));
        assert!(backend.targets().contains(&"ir"));
    }

    #[test]
    fn ir_dump_backend_compile() {
        let program = Program::new("Empty");
        let opts = BackendOptions::default();
        let output = IrDumpBackend.compile(&program, &opts).unwrap();
        assert_eq!(output.files.len(), 1);
        assert_eq!(output.files[0].name, "program.ir");
        match &output.files[0].content {
            OutputContent::Text(text) => assert!(text.contains("Program Empty:")),
            _ => panic!("expected text output"),
        }
    }

    #[test]
    fn registry_find_builtin() {
        let reg = BackendRegistry::with_builtins();
        assert!(reg.find("ir-dump").is_some());
        assert!(reg.find("ir").is_some());
        assert!(reg.find("nonexistent").is_none());
    }

    #[test]
    fn registry_custom_backend() {
        #[derive(Debug)]
        struct TestBackend;
        impl Backend for TestBackend {
            fn name(&self) -> &str {
                "test"
            }
            fn targets(&self) -> &[&str] {
                &["test-target"]
            }
            fn compile(
                &self,
                _program: &Program,
                _opts: &BackendOptions,
            ) -> Result<BackendOutput, BackendError> {
                Ok(BackendOutput {
                    files: vec![],
                    diagnostics: vec![],
                })
            }
        }

        let mut reg = BackendRegistry::new();
        reg.register(Box::new(TestBackend));
        assert!(reg.find("test-target").is_some());
        assert_eq!(reg.list_targets(), vec!["test-target"]);
    }

    #[test]
    fn registry_default_is_empty() {
        let reg = BackendRegistry::default();
        assert!(reg.list_targets().is_empty());
    }

    #[test]
    fn worker_count_is_never_zero() {
        assert!(BackendOptions { jobs: 0 }.worker_count() >= 1);
        assert_eq!(BackendOptions { jobs: 3 }.worker_count(), 3);
        assert_eq!(format!("{}", BackendOptions { jobs: 3 }), "BackendOptions { jobs: 3 }");
    }

    #[test]
    fn display_backend_output() {
        let output = BackendOutput {
            files: vec![OutputFile {
                name: "module.spv".into(),
                content: OutputContent::Binary(vec![1, 2, 3]),
            }],
            diagnostics: vec![Diagnostic {
                level: DiagnosticLevel::Warning,
                message: "skipped Demo.Util::Identity".into(),
            }],
        };
        assert_eq!(format!("{output}"), "1 file(s), 1 diagnostic(s)");
        assert_eq!(format!("{}", output.files[0]), "module.spv");
        assert_eq!(
            format!("{}", output.diagnostics[0]),
            "[Warning] skipped Demo.Util::Identity"
        );
    }

    #[test]
    fn display_output_content_all_variants() {
        assert_eq!(
            format!("{}", OutputContent::Text("abc".into())),
            "Text(3 chars)"
        );
        assert_eq!(
            format!("{}", OutputContent::Binary(vec![0; 100])),
            "Binary(100 bytes)"
        );
    }

    #[test]
    fn backend_error_display() {
        let e = BackendError::Unsupported("OpTypeImage".into());
        assert_eq!(format!("{e}"), "unsupported: OpTypeImage");

        let e = BackendError::TypeMismatch {
            method: "Demo.Shader::Main".into(),
            index: 3,
            expected: "System.Float32".into(),
            found: "System.Int32".into(),
        };
        assert_eq!(
            format!("{e}"),
            "type mismatch in Demo.Shader::Main at instruction 3: expected System.Float32, found System.Int32"
        );

        let e = BackendError::from(IrError::UnknownType("Demo.Missing".into()));
        assert_eq!(format!("{e}"), "unknown type Demo.Missing");
    }
}
