use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use yay::{CpuSpec, Program};

mod demos;

/// Assembles one of the built-in demo programs for an MCS-51 CPU variant.
///
/// `PROGRAM` selects a compiled-in demo rather than a user `.yay` file: the
/// original dynamic DSL-loading surface is out of scope here (`spec.md`
/// §1 Non-goals).
#[derive(Parser)]
#[command(name = "yay", version, about)]
struct Args {
    /// Name of the built-in demo program to assemble.
    program: String,

    /// CPU variant catalog to assemble against.
    #[arg(long, default_value = "AT89S8253")]
    cpu: String,

    /// Write the assembled bytes to this file instead of standard output.
    #[arg(short = 'o', long = "out", value_name = "OUT", conflicts_with = "raw")]
    out: Option<PathBuf>,

    /// Write raw bytes to standard output instead of a textual listing.
    #[arg(short = 'r', long = "raw")]
    raw: bool,

    /// Output format.
    #[arg(short = 'f', long = "format", value_enum, default_value_t = Format::Ihex)]
    format: Format,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Ihex,
    Binary,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let builder = demos::lookup(&args.program).with_context(|| {
        format!(
            "no built-in demo program named `{}` (available: {})",
            args.program,
            demos::NAMES.join(", ")
        )
    })?;

    let cpu = CpuSpec::load_named(&args.cpu)
        .with_context(|| format!("loading CPU catalog `{}`", args.cpu))?;
    let mut program = Program::new(cpu);
    builder(&mut program).context("building program")?;
    program.assemble().context("assembling program")?;

    if args.raw {
        yay::format::write_raw(&program, io::stdout().lock()).context("writing raw bytes")?;
        return Ok(());
    }

    if let Some(path) = &args.out {
        let mut file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        write_formatted(&program, &args.format, &mut file)?;
        return Ok(());
    }

    match args.format {
        Format::Binary => {
            let bytes = program.to_bytes().context("reading assembled bytes")?;
            print_listing(bytes);
        }
        Format::Ihex => {
            let mut buf = Vec::new();
            write_formatted(&program, &args.format, &mut buf)?;
            print!("{}", String::from_utf8_lossy(&buf));
        }
    }
    Ok(())
}

fn write_formatted<W: Write>(program: &Program, format: &Format, target: &mut W) -> Result<()> {
    match format {
        Format::Binary => {
            yay::format::write_raw(program, target)?;
        }
        Format::Ihex => {
            yay::format::write_ihex(program, target)?;
        }
    }
    Ok(())
}

fn print_listing(bytes: &[u8]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Offset", "Bytes"]);

    for (i, chunk) in bytes.chunks(16).enumerate() {
        let hex = chunk
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" ");
        table.add_row(vec![format!("0x{:04X}", i * 16), hex]);
    }
    println!("{table}");
}

