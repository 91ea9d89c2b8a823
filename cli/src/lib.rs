pub mod commands;
pub mod pipeline;
#[macro_use]
extern crate log;

use definitions::ContigGraph;
use graphtig::read_source::{ChainedSource, FragmentSource, Layout, ReadSource};
use graphtig::AssemblyError;
use std::io::{BufReader, BufWriter};
use std::path::Path;

pub fn to_io_error(why: AssemblyError) -> std::io::Error {
    match why {
        AssemblyError::Io(why) => why,
        why => std::io::Error::new(std::io::ErrorKind::Other, why),
    }
}

pub fn init_logger(verbose: usize) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

pub fn set_threads(threads: usize) {
    debug!("Set Threads\t{}", threads);
    if let Err(why) = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
    {
        debug!("{:?} If you run `pipeline` module, this is Harmless.", why);
    }
}

pub fn parse_json(filename: &Path) -> std::io::Result<ContigGraph> {
    debug!("RESUME\t{filename:?}");
    let rdr = std::fs::File::open(filename).map(BufReader::new)?;
    serde_json::de::from_reader(rdr)
        .map_err(|why| std::io::Error::new(std::io::ErrorKind::InvalidData, why))
}

pub fn log(graph: &ContigGraph, path: &Path) -> std::io::Result<()> {
    let mut wtr = std::fs::File::create(path).map(BufWriter::new)?;
    serde_json::ser::to_writer(&mut wtr, graph)
        .map_err(|why| std::io::Error::new(std::io::ErrorKind::Other, why))
}

/// Every end of every file as single reads, for counting k-mers.
pub fn open_all<P: AsRef<Path>>(files: &[P]) -> std::io::Result<ChainedSource> {
    let sources = files
        .iter()
        .map(|file| {
            FragmentSource::open(&[file], Layout::Single)
                .map(|source| Box::new(source) as Box<dyn ReadSource>)
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(to_io_error)?;
    ChainedSource::new(sources).map_err(to_io_error)
}

pub fn open_source<P: AsRef<Path>>(files: &[P], layout: Layout) -> std::io::Result<Box<dyn ReadSource>> {
    debug!("Opening {}\t{:?}", files.len(), layout);
    FragmentSource::open(files, layout)
        .map(|source| Box::new(source) as Box<dyn ReadSource>)
        .map_err(to_io_error)
}
