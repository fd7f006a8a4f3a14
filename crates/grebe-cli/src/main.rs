use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miette::{Context, IntoDiagnostic};

use grebe_opt::{OptLevel, PassManager};

/// grebe — buffer-aware lowering of scheduled module text
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Input module text file
    input: PathBuf,

    /// Target platform (default: generic)
    #[arg(short, long, default_value = "generic")]
    platform: String,

    /// Output path (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Optimization level: 0, 1, or 2
    #[arg(short = 'O', long, default_value = "1", value_parser = parse_opt_level)]
    opt_level: OptLevel,

    /// Dump the optimized module text instead of lowering it
    #[arg(long)]
    emit_hlo: bool,

    /// Parse, optimize, and lower without producing output
    #[arg(long)]
    dry_run: bool,
}

fn parse_opt_level(s: &str) -> Result<OptLevel, String> {
    match s {
        "0" => Ok(OptLevel::O0),
        "1" => Ok(OptLevel::O1),
        "2" => Ok(OptLevel::O2),
        _ => Err(format!(
            "invalid optimization level '{s}', expected 0, 1, or 2"
        )),
    }
}

fn main() -> ExitCode {
    env_logger::init();
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

    // 1. Read source file.
    let source = std::fs::read_to_string(&cli.input)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", cli.input.display()))?;

    // 2. Parse the module text.
    let mut module = grebe_parser::parse(&source)
        .map_err(|e| miette::miette!("{e}"))
        .wrap_err("module parse failed")?;

    // 3. Optimize.
    PassManager::for_level(cli.opt_level).run(&mut module);

    // 4. --emit-hlo: print the optimized module and stop.
    if cli.emit_hlo {
        print!("{}", grebe_hlo::dump_module(&module));
        return Ok(());
    }

    // 5. Assign buffers and lower on the selected platform. The pipeline
    //    already ran above, so the platform's own pass list is skipped.
    let lowered = grebe_lower::optimize_and_lower(&mut module, &cli.platform, false)
        .map_err(|e| miette::miette!("{e}"))
        .wrap_err("lowering failed")?;

    // 6. Dry-run: stop here.
    if cli.dry_run {
        return Ok(());
    }

    // 7. Write output.
    let text = grebe_lir::dump_module(&lowered);
    match &cli.output {
        Some(path) => {
            std::fs::write(path, text)
                .into_diagnostic()
                .wrap_err_with(|| format!("failed to write {}", path.display()))?;
        }
        None => print!("{text}"),
    }

    Ok(())
}
