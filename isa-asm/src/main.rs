use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

/// Assembles register-ISA source into a headered binary image.
#[derive(Parser, Debug)]
#[command(name = "assemble", version, about)]
struct Args {
    /// Assembly source file.
    input: PathBuf,

    /// Destination path for the assembled image.
    output: PathBuf,

    /// Emit `<output>.hex`, `<output>.dbg` and `<output>.symbols` sidecars.
    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            eprintln!("assemble: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), String> {
    let source = fs::read_to_string(&args.input).map_err(|e| format!("reading {}: {e}", args.input.display()))?;

    let assembled = isa_asm::assemble(&source).map_err(|e| e.to_string())?;
    info!(
        "assembled {} ({} data bytes, {} code bytes)",
        args.input.display(),
        assembled.symbols.data_length,
        assembled.image.len() as u64 - 16 - assembled.symbols.data_length
    );

    fs::write(&args.output, &assembled.image).map_err(|e| format!("writing {}: {e}", args.output.display()))?;

    if args.debug {
        let hex_path = with_extra_extension(&args.output, "hex");
        let dbg_path = with_extra_extension(&args.output, "dbg");
        let symbols_path = with_extra_extension(&args.output, "symbols");

        fs::write(&hex_path, assembled.hex_listing()).map_err(|e| format!("writing {}: {e}", hex_path.display()))?;
        fs::write(&dbg_path, assembled.debug_listing()).map_err(|e| format!("writing {}: {e}", dbg_path.display()))?;
        fs::write(&symbols_path, assembled.symbols_listing())
            .map_err(|e| format!("writing {}: {e}", symbols_path.display()))?;
    }

    Ok(())
}

fn with_extra_extension(path: &PathBuf, extra: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(extra);
    path.with_file_name(name)
}
