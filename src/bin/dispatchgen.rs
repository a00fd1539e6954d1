extern crate dispatchgen;
extern crate env_logger;
extern crate log;
#[macro_use] extern crate structopt;

use dispatchgen::compiler::{self, render, Table};
use dispatchgen::template;

use structopt::StructOpt;
use std::{fs, process};
use std::error::Error;
use std::path::{Path, PathBuf};

#[derive(Debug, StructOpt)]
#[structopt(name = "dispatchgen", about = "Generates instruction dispatch code from opcode tables.")]
enum Opt {
    /// Compile a table and splice the dispatcher and handler declarations
    /// into their templates.
    #[structopt(name = "generate")]
    Generate {
        /// Path to the opcode table.
        #[structopt(long = "table", parse(from_os_str))]
        table: PathBuf,
        /// Template receiving the dispatch `match`.
        #[structopt(long = "dispatch-template", parse(from_os_str))]
        dispatch_template: PathBuf,
        /// Template receiving the handler declarations.
        #[structopt(long = "handlers-template", parse(from_os_str))]
        handlers_template: PathBuf,
        #[structopt(long = "dispatch-out", parse(from_os_str))]
        dispatch_out: PathBuf,
        #[structopt(long = "handlers-out", parse(from_os_str))]
        handlers_out: PathBuf,
        /// Name of the template region receiving the dispatcher.
        #[structopt(long = "dispatch-region", default_value = "dispatch")]
        dispatch_region: String,
        /// Name of the template region receiving the handler declarations.
        #[structopt(long = "handlers-region", default_value = "handlers")]
        handlers_region: String,
    },
    /// Turn a generated file back into its template.
    #[structopt(name = "extract")]
    Extract {
        /// The generated file.
        #[structopt(parse(from_os_str))]
        generated: PathBuf,
        /// Where to write the template. Defaults to the generated file's
        /// path with a `.template` extension appended.
        #[structopt(short = "o", long = "output", parse(from_os_str))]
        output: Option<PathBuf>,
    },
    /// Print the handlers of a table.
    #[structopt(name = "handlers")]
    Handlers {
        /// Path to the opcode table.
        #[structopt(long = "table", parse(from_os_str))]
        table: PathBuf,
    },
}

fn load_table(path: &Path) -> Result<Table, Box<Error>> {
    let text = fs::read_to_string(path)?;
    let table = Table::parse(&text)?;
    Ok(table)
}

fn run() -> Result<(), Box<Error>> {
    match Opt::from_args() {
        Opt::Generate {
            table,
            dispatch_template,
            handlers_template,
            dispatch_out,
            handlers_out,
            dispatch_region,
            handlers_region,
        } => {
            let compiled = compiler::compile(&load_table(&table)?)?;

            let dispatch = render::render_dispatch(&compiled);
            let template = fs::read_to_string(&dispatch_template)?;
            fs::write(&dispatch_out, template::insert_code(&template, &dispatch_region, &dispatch)?)?;
            eprintln!("wrote {}", dispatch_out.display());

            let handlers = render::render_handlers(&compiled.handlers);
            let template = fs::read_to_string(&handlers_template)?;
            fs::write(&handlers_out, template::insert_code(&template, &handlers_region, &handlers)?)?;
            eprintln!("wrote {}", handlers_out.display());
        }
        Opt::Extract { generated, output } => {
            let output = output.unwrap_or_else(|| {
                let mut path = generated.clone().into_os_string();
                path.push(".template");
                PathBuf::from(path)
            });

            let text = fs::read_to_string(&generated)?;
            fs::write(&output, template::extract_template(&text)?)?;
            eprintln!("wrote {}", output.display());
        }
        Opt::Handlers { table } => {
            let compiled = compiler::compile(&load_table(&table)?)?;
            for (_, handler) in compiled.handlers.iter() {
                let kind = if handler.is_mandatory() { "mandatory" } else { "optional" };
                println!("{:<10} {}", handler.canonical_name(), kind);
            }
        }
    }

    Ok(())
}

fn main() {
    // By default, log all `info!` messages and higher
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
