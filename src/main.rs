use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{bail, IntoDiagnostic, Result};

use casl::{Assembly, Image, Output, RunState};

/// casl is an assembler and interpreter for the CASL-II assembly language.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.cas` file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run text `.cas` or binary `.com` file directly and output to terminal
    Run {
        /// `.cas` or `.com` file to run
        name: PathBuf,
        #[command(flatten)]
        opts: RunOptions,
    },
    /// Create binary `.com` file to run later
    Compile {
        /// `.cas` file to compile
        name: PathBuf,
        /// Destination to output .com file
        dest: Option<PathBuf>,
    },
    /// Check a `.cas` file without running or outputting binary
    Check {
        /// File to check
        name: PathBuf,
    },
    /// Print the assembled words of every statement and the symbol table
    Dump {
        /// `.cas` file to dump
        name: PathBuf,
    },
}

#[derive(clap::Args, Default)]
struct RunOptions {
    /// Maximum number of instructions to execute
    #[arg(short, long)]
    steps: Option<u64>,
    /// Print every executed instruction
    #[arg(short, long)]
    trace: bool,
    /// Produce minimal output, suited for blackbox tests
    #[arg(short, long)]
    minimal: bool,
    /// Start at this address instead of the program entry, decimal or `#hex`
    #[arg(short, long, value_parser = parse_address)]
    entry: Option<u16>,
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();
    casl::env::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(casl::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    match args.command {
        Some(Command::Run { name, opts }) => run(&name, &opts),
        Some(Command::Compile { name, dest }) => {
            file_message(Green, "Assembling", &name);
            let asm = assemble(&name)?;
            let out_file_name = dest.unwrap_or_else(|| name.with_extension("com"));
            fs::write(&out_file_name, asm.image.to_bytes()).into_diagnostic()?;
            message(Green, "Finished", "emit binary");
            file_message(Green, "Saved", &out_file_name);
            Ok(())
        }
        Some(Command::Check { name }) => {
            file_message(Green, "Checking", &name);
            let _ = assemble(&name)?;
            message(Green, "Success", "no errors found!");
            Ok(())
        }
        Some(Command::Dump { name }) => {
            let asm = assemble(&name)?;
            print!("{}", asm.listing());
            println!();
            for (label, addr) in asm.symbols.iter() {
                println!("{label:<8} {addr:04X}");
            }
            Ok(())
        }
        None => {
            if let Some(path) = args.path {
                run(&path, &RunOptions::default())
            } else {
                println!("\n~ casl v{VERSION} ~");
                println!("{SHORT_INFO}");
                std::process::exit(0);
            }
        }
    }
}

enum MsgColor {
    Green,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message<S>(color: MsgColor, left: S, right: S)
where
    S: Colorize + std::fmt::Display,
{
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

fn run(name: &Path, opts: &RunOptions) -> Result<()> {
    Output::set_minimal(opts.minimal);
    let image = match name.extension().and_then(OsStr::to_str) {
        Some("com") => {
            file_message(MsgColor::Green, "Loading", name);
            let bytes = fs::read(name).into_diagnostic()?;
            Image::from_bytes(&bytes).into_diagnostic()?
        }
        Some("cas") => {
            file_message(MsgColor::Green, "Assembling", name);
            assemble(name)?.image
        }
        Some(_) => bail!("File has unknown extension. Exiting..."),
        None => bail!("File has no extension. Exiting..."),
    };

    let step_limit = opts
        .steps
        .or_else(casl::env::step_limit)
        .unwrap_or(casl::DEFAULT_STEP_LIMIT);
    let mut machine = RunState::new(&image);
    if let Some(entry) = opts.entry {
        machine = machine.with_entry(entry);
    }
    if opts.trace || casl::env::is_trace_enabled() {
        machine = machine.with_trace();
    }

    message(MsgColor::Green, "Running", "emitted binary");
    let result = machine.run(step_limit);
    let state = match &result {
        Ok(state) => state,
        Err(fault) => &fault.state,
    };
    for entry in &state.trace {
        Output::Trace.print_trace(entry);
    }
    Output::Normal.print_registers(state);

    match result {
        Ok(state) => {
            let steps = format!("after {} instructions", state.steps);
            message(MsgColor::Green, "Halted", &steps);
            file_message(MsgColor::Green, "Completed", name);
            Ok(())
        }
        Err(fault) => {
            message(MsgColor::Red, "Faulted", "execution stopped");
            bail!("{fault}")
        }
    }
}

/// Return assembled program with its listing and symbols
fn assemble(name: &Path) -> Result<Assembly> {
    let src = fs::read_to_string(name).into_diagnostic()?;
    Assembly::new(&src).map_err(|err| err.report(&src))
}

fn parse_address(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix('#') {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| format!("`{s}` is not a decimal or `#hex` address"))
}

const SHORT_INFO: &str = r"
Welcome to casl, an all-in-one toolchain for the CASL-II assembly language
and the COMET-II machine it runs on.
Please use `-h` or `--help` to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
