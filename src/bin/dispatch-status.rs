extern crate dispatchgen;
extern crate env_logger;
extern crate log;
extern crate termcolor;
#[macro_use] extern crate structopt;

use dispatchgen::compiler::compile::Outcome;
use dispatchgen::compiler::compile_str;

use structopt::StructOpt;
use termcolor::{ColorChoice, Color, ColorSpec, StandardStream, WriteColor};
use std::{fs, process};
use std::error::Error;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, StructOpt)]
#[structopt(name = "dispatch-status", about = "Shows which opcodes a table defines.")]
struct Opt {
    /// Path to the opcode table.
    #[structopt(long = "table", parse(from_os_str))]
    table: PathBuf,
}

fn run() -> Result<(), Box<Error>> {
    let opt = Opt::from_args();
    let compiled = compile_str(&fs::read_to_string(&opt.table)?)?;

    let mut out = StandardStream::stdout(ColorChoice::Auto);
    let (mut handlers, mut groups, mut prefixes, mut invalid) = (0, 0, 0, 0);

    for byte in 0x00..=0xffu8 {
        if byte % 16 == 0 {
            write!(out, "{:X}x:", byte >> 4)?;
        }

        let color = match compiled.tree.node(byte).map(|node| &node.outcome) {
            Some(Outcome::Handler(_)) => {
                handlers += 1;
                Color::Green
            }
            Some(Outcome::Group { .. }) => {
                groups += 1;
                Color::Cyan
            }
            Some(Outcome::SegmentOverride { .. }) | Some(Outcome::RepeatPrefix { .. }) => {
                prefixes += 1;
                Color::Yellow
            }
            None => {
                invalid += 1;
                Color::Red
            }
        };
        out.set_color(ColorSpec::new().set_fg(Some(color)))?;
        write!(out, " {:02X}", byte)?;
        out.set_color(ColorSpec::new().set_fg(None))?;

        if byte % 16 == 15 {
            writeln!(out)?;
        }
    }

    writeln!(out)?;
    writeln!(out, "{} instructions, {} groups, {} prefixes, {} invalid", handlers, groups, prefixes, invalid)?;
    writeln!(out, "{} handlers ({} mandatory)",
        compiled.handlers.len(),
        compiled.handlers.iter().filter(|(_, h)| h.is_mandatory()).count())?;

    Ok(())
}

fn main() {
    env_logger::Builder::from_default_env()
        .filter(None, log::LevelFilter::Info)
        .init();

    match run() {
        Ok(()) => {},
        Err(e) => {
            eprintln!("exiting due to error: {}", e);
            process::exit(1);
        },
    }
}
