use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use isa_vm::cpu::Cpu;
use isa_vm::debug::DebugHarness;

/// Loads and executes a register-ISA binary image.
#[derive(Parser, Debug)]
#[command(name = "run", version, about)]
struct Args {
    /// Assembled image to execute.
    image: PathBuf,

    /// Arguments marshaled onto the program's stack as argc/argv.
    argv: Vec<String>,

    /// Trace every taken control transfer against the `<image>.symbols` sidecar.
    #[arg(long)]
    debug: bool,

    /// Single-step interactively; implies --debug.
    #[arg(long)]
    step: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            eprintln!("run: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), String> {
    let bytes = fs::read(&args.image).map_err(|e| format!("reading {}: {e}", args.image.display()))?;

    let mut cpu = Cpu::load_image(&bytes).map_err(|e| e.to_string())?;
    cpu.marshal_argv(&args.argv).map_err(|e| e.to_string())?;

    if args.debug || args.step {
        let mut harness = DebugHarness::new(&args.image, args.step).map_err(|e| e.to_string())?;
        harness.run(&mut cpu).map_err(|e| e.to_string())?;
    } else {
        cpu.run().map_err(|e| e.to_string())?;
    }

    info!("{} halted cleanly", args.image.display());
    Ok(())
}
