//! Errors of the engine.
//! Genomic ambiguity (unmapped, ambiguous, or too many candidate paths) is never an error:
//! it is counted as an outcome of a read. Errors are malformed inputs, invalid parameters,
//! I/O failures, and failures of the reader threads.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("invalid base {base:?} at position {position}")]
    InvalidBase { base: char, position: usize },
    #[error("k-mer size {0} is not supported")]
    InvalidKmerSize(usize),
    #[error("word size {0} is not in 1..=32")]
    InvalidWordSize(usize),
    #[error("step size must be positive")]
    InvalidStepSize,
    #[error("can not index a graph without any live contig")]
    EmptyGraph,
    #[error("read source expects {expected} readers, but {actual} were given")]
    ReaderCount { expected: usize, actual: usize },
    #[error("the ends of a read source are out of sync after {0} fragments")]
    MismatchedEnds(usize),
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
    #[error("reading was aborted: {0}")]
    Aborted(String),
    #[error("a reader thread panicked")]
    ProducerPanicked,
    #[error("a mapping thread panicked")]
    ConsumerPanicked,
    #[error(transparent)]
    Graph(#[from] definitions::GraphError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AssemblyError {
    /// True if this error only reports that a sibling failed first.
    pub fn is_aborted(&self) -> bool {
        matches!(self, AssemblyError::Aborted(_))
    }
}

pub type Result<T> = std::result::Result<T, AssemblyError>;
