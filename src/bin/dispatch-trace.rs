extern crate dispatchgen;
extern crate env_logger;
extern crate log;
extern crate memmap;
#[macro_use] extern crate structopt;

use dispatchgen::compiler::compile_str;
use dispatchgen::runtime::Decoder;

use memmap::Mmap;
use structopt::StructOpt;
use std::{fs, process, u32};
use std::error::Error;
use std::fs::File;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::str::FromStr;

/// Parse a number that might be hexadecimal.
fn parse_hex(src: &str) -> Result<u32, ParseIntError> {
    if src.starts_with("0x") {
        u32::from_str_radix(&src[2..], 16)
    } else {
        u32::from_str(src)
    }
}

#[derive(Debug, StructOpt)]
#[structopt(name = "dispatch-trace", about = "Decodes a raw binary image using an opcode table.")]
struct Opt {
    /// Path to the opcode table.
    #[structopt(long = "table", parse(from_os_str))]
    table: PathBuf,

    /// Offset into the image to start decoding at (can also be a hexadecimal
    /// value starting with `0x`). This is also used as the address of the
    /// first instruction.
    #[structopt(long = "start", default_value = "0", parse(try_from_str = "parse_hex"))]
    start: u32,

    /// Maximum number of instructions to decode. Defaults to the whole image.
    #[structopt(long = "count")]
    count: Option<usize>,

    /// Path to the raw image.
    #[structopt(parse(from_os_str))]
    image: PathBuf,
}

fn run() -> Result<(), Box<Error>> {
    let opt = Opt::from_args();
    let compiled = compile_str(&fs::read_to_string(&opt.table)?)?;

    let file = File::open(&opt.image)?;
    let image = unsafe { Mmap::map(&file)? };
    let start = opt.start as usize;
    if start > image.len() {
        return Err(format!("start offset {:#X} is past the end of the image ({:#X} bytes)", start, image.len()).into());
    }

    let mut decoder = Decoder::new(&compiled.tree, &image[start..], opt.start);
    let mut count = 0;
    while !decoder.is_at_end() && opt.count.map_or(true, |max| count < max) {
        let addr = decoder.current_address();
        match decoder.decode_next() {
            Ok(instr) => {
                let handler = compiled.handlers.get(instr.handler);
                println!("{:08X}  {:<32} ; {}", addr, instr.to_string(), handler.canonical_name());
            }
            Err(e) => {
                // decoder position is unreliable after an error
                println!("{:08X}  ({})", addr, e);
                break;
            }
        }
        count += 1;
    }

    eprintln!("decoded {} instructions", count);
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
