use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{bail, IntoDiagnostic, NamedSource, Result};

use nova::isa;
use nova::output::Output;
use nova::{Exit, RunState};

/// Nova is an assembler and virtual machine for the Nova instruction set.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.asm` file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run text `.asm` or binary `.bin` file directly and output to terminal
    Run {
        /// `.asm` or `.bin` file to run
        name: PathBuf,
        /// Stop after this many instructions
        #[arg(long)]
        max_steps: Option<u64>,
        /// Print the register file once the program stops
        #[arg(short, long)]
        registers: bool,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
        /// Save the display window as a `.ppm` image after the run
        #[arg(long)]
        screenshot: Option<PathBuf>,
    },
    /// Create binary `.bin` file to run later
    Compile {
        /// `.asm` file to compile
        name: PathBuf,
        /// Destination to output .bin file
        dest: Option<PathBuf>,
    },
    /// Check a `.asm` file without running or outputting binary
    Check {
        /// File to check
        name: PathBuf,
    },
    /// Disassemble a binary `.bin` file
    Dump {
        /// `.bin` file to disassemble
        name: PathBuf,
    },
}

#[derive(Default)]
struct RunOptions {
    max_steps: Option<u64>,
    registers: bool,
    screenshot: Option<PathBuf>,
}

fn main() -> Result<()> {
    use MsgColor::*;
    let args = Args::parse();
    nova::env::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(nova::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    let Some(command) = args.command else {
        if let Some(path) = args.path {
            return run(&path, RunOptions::default());
        }
        println!("\n~ nova v{VERSION} - Copyright (c) 2024 Artemis Rosman ~");
        println!("{SHORT_INFO}");
        return Ok(());
    };

    match command {
        Command::Run {
            name,
            max_steps,
            registers,
            minimal,
            screenshot,
        } => {
            Output::set_minimal(minimal);
            run(
                &name,
                RunOptions {
                    max_steps,
                    registers,
                    screenshot,
                },
            )
        }
        Command::Compile { name, dest } => {
            file_message(Green, "Assembling", &name);
            let image = assemble(&name)?;
            message(Green, "Finished", "emit binary");

            let out_file_name = dest.unwrap_or_else(|| name.with_extension("bin"));
            fs::write(&out_file_name, image).into_diagnostic()?;
            file_message(Green, "Saved", &out_file_name);
            Ok(())
        }
        Command::Check { name } => {
            file_message(Green, "Checking", &name);
            assemble(&name)?;
            message(Green, "Success", "no errors found!");
            Ok(())
        }
        Command::Dump { name } => {
            let image = fs::read(&name).into_diagnostic()?;
            let mut stdout = std::io::stdout().lock();
            for (i, record) in isa::records(&image)?.enumerate() {
                writeln!(stdout, "{:#08x}  {record}", i * isa::RECORD_SIZE).into_diagnostic()?;
            }
            Ok(())
        }
    }
}

enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message(color: MsgColor, left: &str, right: &str) {
    if Output::is_minimal() {
        return;
    }
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

fn run(name: &Path, opts: RunOptions) -> Result<()> {
    let image = match name.extension().and_then(|ext| ext.to_str()) {
        Some("bin") => fs::read(name).into_diagnostic()?,
        Some("asm") => {
            file_message(MsgColor::Green, "Assembling", name);
            assemble(name)?
        }
        Some(_) => bail!("File has unknown extension. Exiting..."),
        None => bail!("File has no extension. Exiting..."),
    };

    let mut state = RunState::from_image(&image)?;
    state.set_trace(nova::env::is_trace_enabled());

    message(MsgColor::Green, "Running", "emitted binary");
    let result = state.run_until_halt(opts.max_steps);

    if opts.registers {
        Output::Normal.print_registers(&state);
    }
    if let Some(path) = &opts.screenshot {
        save_screenshot(&state, path)?;
        file_message(MsgColor::Green, "Saved", path);
    }

    match result? {
        Exit::Halted { steps } => {
            message(MsgColor::Cyan, "Halted", &format!("after {steps} steps"));
            file_message(MsgColor::Green, "Completed", name);
            Ok(())
        }
        Exit::StepLimit { steps } => {
            message(MsgColor::Red, "Stopped", &format!("step limit of {steps} reached"));
            bail!("Program did not halt within {steps} steps")
        }
    }
}

/// Assemble a source file, attaching the source to any diagnostic.
fn assemble(name: &Path) -> Result<Vec<u8>> {
    let contents = fs::read_to_string(name).into_diagnostic()?;
    nova::assemble(&contents).map_err(|err| {
        miette::Report::new(err)
            .with_source_code(NamedSource::new(name.display().to_string(), contents.clone()))
    })
}

/// Write the display window as a binary PPM.
fn save_screenshot(state: &RunState, path: &Path) -> Result<()> {
    let screen = state.screen();
    let mut out = format!("P6\n{} {}\n255\n", screen.width(), screen.height()).into_bytes();
    for y in 0..screen.height() {
        for x in 0..screen.width() {
            if let Some(px) = screen.pixel(x, y) {
                out.extend_from_slice(&[px.r, px.g, px.b]);
            }
        }
    }
    fs::write(path, out).into_diagnostic()
}

const SHORT_INFO: &str = r"
Welcome to nova, an assembler and virtual machine for the Nova instruction set.
Please use `-h` or `--help` to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
