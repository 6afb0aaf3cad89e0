use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

/// Disassembles a register-ISA binary image back into a mnemonic listing.
#[derive(Parser, Debug)]
#[command(name = "disasm", version, about)]
struct Args {
    /// Assembled image to disassemble.
    image: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            eprintln!("disasm: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), String> {
    let bytes = fs::read(&args.image).map_err(|e| format!("reading {}: {e}", args.image.display()))?;
    let (_header, instructions) = isa_dis::disassemble_image(&bytes).map_err(|e| e.to_string())?;

    for instruction in instructions {
        println!("{:>6X}: {}", instruction.addr, instruction);
    }
    Ok(())
}
