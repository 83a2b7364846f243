use std::io::{self, Write};

use anyhow::*;
use log::*;
use structopt::*;

use arcfs::*;

#[derive(Debug, StructOpt)]
#[structopt(name = "arcls", about = "Lists (or prints) the contents of a ZIP archive")]
struct Opt {
    /// Pass multiple times for additional verbosity (info, debug, trace)
    #[structopt(short, long, parse(from_occurrences))]
    verbosity: usize,

    /// List everything below the directory, not just what's directly in it.
    #[structopt(short, long)]
    recursive: bool,

    /// Fail on read errors instead of logging them and carrying on.
    #[structopt(long)]
    strict: bool,

    /// Writes the given entry to stdout instead of listing anything.
    #[structopt(long)]
    cat: Option<String>,

    #[structopt(name("archive"))]
    archive: String,

    /// The directory inside the archive to list
    #[structopt(name("directory"), default_value = "")]
    directory: String,
}

fn main() -> Result<()> {
    let args = Opt::from_args();

    let mut errlog = stderrlog::new();
    errlog.verbosity(args.verbosity + 1);
    errlog.init()?;

    let mode = if args.strict {
        ErrorMode::Throw
    } else {
        ErrorMode::LogAndContinue
    };
    let session = Session::builder()
        .error_mode(mode)
        .open(&args.archive)
        .with_context(|| format!("Couldn't open {}", args.archive))?;
    if !session.is_open() {
        bail!("Couldn't load {}", args.archive);
    }

    match &args.cat {
        Some(path) => cat(&session, path),
        None => list(&session, &args.directory, args.recursive),
    }
}

fn list(session: &Session, directory: &str, recursive: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for record in session.list_contents(directory, recursive) {
        match &record.file {
            Some(file) => writeln!(
                out,
                "{:>10} {:>10} {:08x} {:<24} {}",
                file.size, file.comp_size, file.crc, file.mimetype, record.path
            )?,
            None => writeln!(out, "{:>10} {:>10} {:8} {:<24} {}", "-", "-", "", "", record.path)?,
        }
    }
    Ok(())
}

fn cat(session: &Session, path: &str) -> Result<()> {
    let mut read = session
        .read_stream(path)?
        .with_context(|| format!("{path} isn't a file in {}", session.root()))?;
    info!("Reading {}", read.locator);
    io::copy(&mut read.stream, &mut io::stdout().lock())?;

    for advisory in session.advisories() {
        eprintln!("{advisory}");
    }
    Ok(())
}
