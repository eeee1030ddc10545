use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miette::{Context, IntoDiagnostic};

use nesl_backend_core::{BackendOptions, BackendRegistry, OutputContent};
use nesl_backend_spirv::SpirvBackend;

mod manifest;

/// neslc: compile Nesl program manifests to SPIR-V
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Input manifest (JSON)
    input: PathBuf,

    /// Target backend
    #[arg(short, long, default_value = "spirv")]
    target: String,

    /// Output path (default: stdout for text output)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Worker threads for the compilation pass (0: one per core)
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Dump IR to stderr before backend compilation
    #[arg(long)]
    emit_ir: bool,

    /// Print a disassembly of binary output to stdout
    #[arg(long)]
    disassemble: bool,

    /// Load and validate without producing output
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();

    // 1. Read the manifest.
    let source = std::fs::read_to_string(&cli.input)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", cli.input.display()))?;

    // 2. Build the declaration graph.
    let program = manifest::load(&source)
        .into_diagnostic()
        .wrap_err_with(|| format!("invalid manifest {}", cli.input.display()))?;

    // 3. Optionally dump IR to stderr.
    if cli.emit_ir {
        eprintln!("{}", nesl_ir::dump_program(&program));
    }

    // 4. Dry-run: validate and stop.
    if cli.dry_run {
        nesl_ir::validate_program(&program)
            .into_diagnostic()
            .wrap_err("validation failed")?;
        return Ok(());
    }

    // 5. Backend dispatch.
    let mut registry = BackendRegistry::with_builtins();
    registry.register(Box::new(SpirvBackend::default()));
    let backend = registry.find(&cli.target).ok_or_else(|| {
        let available = registry.list_targets().join(", ");
        miette::miette!("unknown target '{}' (available: {})", cli.target, available)
    })?;

    let opts = BackendOptions { jobs: cli.jobs };
    log::debug!("compiling {} for {} with {opts}", program.name(), backend.name());

    let output = backend
        .compile(&program, &opts)
        .into_diagnostic()
        .wrap_err("backend compilation failed")?;

    // 6. Print diagnostics.
    for diag in &output.diagnostics {
        eprintln!("{diag}");
    }

    // 7. Write output.
    for file in &output.files {
        if let (true, OutputContent::Binary(data)) = (cli.disassemble, &file.content) {
            let text = nesl_backend_spirv::disassemble(data)
                .into_diagnostic()
                .wrap_err_with(|| format!("failed to disassemble {}", file.name))?;
            print!("{text}");
        }
        match (&cli.output, &file.content) {
            (Some(path), OutputContent::Text(text)) => {
                std::fs::write(path, text)
                    .into_diagnostic()
                    .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            }
            (Some(path), OutputContent::Binary(data)) => {
                std::fs::write(path, data)
                    .into_diagnostic()
                    .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            }
            (None, OutputContent::Text(text)) => {
                print!("{text}");
            }
            (None, OutputContent::Binary(_)) if cli.disassemble => {}
            (None, OutputContent::Binary(_)) => {
                return Err(miette::miette!(
                    "backend produced binary output but no --output path was specified"
                ));
            }
        }
    }

    Ok(())
}
