//! Assembly graph engine: de Bruijn construction, contig graph alignment, and simplification.
pub mod async_source;
pub mod de_bruijn;
pub mod error;
pub mod extend;
pub mod flow_align;
pub mod graph_align;
pub mod hit_chain;
pub mod kmer;
pub mod mapping;
pub mod read_source;
pub mod seq;
pub mod simplify;
pub mod stats;
pub mod traversion;
pub mod word_index;
#[macro_use]
extern crate log;

pub use error::{AssemblyError, Result};
