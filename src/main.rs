//! The `circuitry` command-line driver.
//!
//! Loads a circuit (from serialized IR, or via an external lifter when
//! one is wired in), runs the raw population-count passes, and writes
//! the requested output sinks. `-` means stdout for any output path.
//!
//! Exit codes: `0` on success, `1` when no input was given, `2` when
//! lifting or deserialization fails.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use log::info;

use circuitry::transforms::{convert_pop_count_to_parity, strength_reduce_pop_count};
use circuitry::{Circuit, Decoder, LiftError};

#[derive(Parser)]
#[command(name = "circuitry", version, about = "Circuit IR rewriter and decoder synthesizer")]
struct Args {
    /// Path to a file containing only machine code instructions.
    #[arg(long, requires = "arch", requires = "os", conflicts_with = "ir_in")]
    binary_in: Option<PathBuf>,

    /// Path to a file containing serialized IR.
    #[arg(long)]
    ir_in: Option<PathBuf>,

    /// Architecture tag for lifting.
    #[arg(long)]
    arch: Option<String>,

    /// OS tag for lifting.
    #[arg(long)]
    os: Option<String>,

    /// Path to the output IR file.
    #[arg(long)]
    ir_out: Option<PathBuf>,

    /// Path to the output GraphViz DOT file.
    #[arg(long)]
    dot_out: Option<PathBuf>,

    /// Path to the output decoder source file.
    #[arg(long)]
    decoder_out: Option<PathBuf>,
}

fn main() {
    env_logger::init();
    std::process::exit(run(Args::parse()));
}

fn run(args: Args) -> i32 {
    let mut circuit = if args.binary_in.is_some() {
        // lifting is delegated to an external provider; none is wired
        // into this binary
        eprintln!("lift failed: {}", LiftError::Unavailable);
        return 2;
    } else if let Some(path) = &args.ir_in {
        match read_circuit(path) {
            Ok(circuit) => circuit,
            Err(e) => {
                eprintln!("failed to load circuit: {}", e);
                return 2;
            }
        }
    } else {
        eprintln!("expected one of --binary-in or --ir-in");
        return 1;
    };

    if let Err(e) = convert_pop_count_to_parity(&mut circuit)
        .and_then(|_| strength_reduce_pop_count(&mut circuit))
    {
        eprintln!("rewrite pass failed: {}", e);
        return 2;
    }

    if let Some(path) = &args.ir_out {
        if let Err(e) = write_sink(path, |w| {
            circuit
                .serialize(w)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
        }) {
            eprintln!("failed to write {}: {}", path.display(), e);
            return 2;
        }
    }

    if let Some(path) = &args.dot_out {
        if let Err(e) = write_sink(path, |w| write!(w, "{}", circuit.dot())) {
            eprintln!("failed to write {}: {}", path.display(), e);
            return 2;
        }
    }

    if let Some(path) = &args.decoder_out {
        let decoder = match Decoder::synthesize_best_effort(&circuit) {
            Ok(decoder) => decoder,
            Err(e) => {
                eprintln!("decoder synthesis failed: {}", e);
                return 2;
            }
        };
        info!(
            "synthesized decoder: {} contexts, depth {}",
            decoder.contexts(),
            decoder.max_depth
        );
        if let Err(e) = write_sink(path, |w| write!(w, "{}", decoder)) {
            eprintln!("failed to write {}: {}", path.display(), e);
            return 2;
        }
    }

    0
}

fn read_circuit(path: &Path) -> Result<Circuit, circuitry::SerializeError> {
    if path == Path::new("-") {
        let mut bytes = Vec::new();
        io::stdin().read_to_end(&mut bytes)?;
        Circuit::deserialize(&bytes[..])
    } else {
        Circuit::deserialize(io::BufReader::new(File::open(path)?))
    }
}

fn write_sink(path: &Path, emit: impl FnOnce(&mut dyn Write) -> io::Result<()>) -> io::Result<()> {
    if path == Path::new("-") {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        emit(&mut lock)?;
        lock.flush()
    } else {
        let mut file = File::create(path)?;
        emit(&mut file)?;
        file.flush()
    }
}
