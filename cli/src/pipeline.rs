//! Pipelines -- the whole pipeline of graphtig.
//!
//! This module defines the pipeline from raw reads to a simplified contig graph:
//! k-mer counting, contig extension, read mapping, and simplification.
use crate::{init_logger, log, open_all, open_source, parse_json, set_threads, to_io_error};
use definitions::ContigGraph;
use graphtig::async_source::AsyncReadPool;
use graphtig::de_bruijn::{build_de_bruijn, KmerConfig};
use graphtig::extend::extend_contigs;
use graphtig::mapping::{map_long_pool, map_pool, LongReadConfig, MapConfig};
use graphtig::read_source::Layout;
use graphtig::simplify::{simplify, SimplifyConfig};
use graphtig::stats::Stats;
use serde::{Deserialize, Serialize};
use std::io::BufWriter;
use std::path::PathBuf;

/// The configuration of the pipeline.
/// Parameters of each stage are grouped in their own table, and any of them can be omitted.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PipelineConfig {
    /// Single-end short reads. Also used to build contigs.
    #[serde(default)]
    short_reads: Vec<PathBuf>,
    /// Pairs of files of paired short reads. Also used to build contigs.
    #[serde(default)]
    paired_reads: Vec<(PathBuf, PathBuf)>,
    /// The protocol of `paired_reads`.
    #[serde(default = "default_layout")]
    layout: Layout,
    #[serde(default)]
    long_reads: Vec<PathBuf>,
    /// The path to the output directory.
    out_dir: PathBuf,
    prefix: String,
    #[serde(default)]
    verbose: usize,
    #[serde(default = "default_threads")]
    threads: usize,
    #[serde(default)]
    resume: bool,
    #[serde(default = "default_batch_size")]
    batch_size: usize,
    #[serde(default)]
    kmer: KmerConfig,
    #[serde(default)]
    map: MapConfig,
    #[serde(default)]
    long: LongReadConfig,
    #[serde(default)]
    simplify: SimplifyConfig,
}

fn default_layout() -> Layout {
    Layout::Paired
}

fn default_threads() -> usize {
    1
}

fn default_batch_size() -> usize {
    1000
}

const CHANNEL_CAPACITY: usize = 4;

fn build(config: &PipelineConfig) -> std::io::Result<ContigGraph> {
    let mut files = config.short_reads.clone();
    for (left, right) in config.paired_reads.iter() {
        files.push(left.clone());
        files.push(right.clone());
    }
    if files.is_empty() {
        error!("No short reads to build contigs from.");
        return Err(std::io::Error::from(std::io::ErrorKind::InvalidInput));
    }
    let mut source = open_all(&files)?;
    let mut de_bruijn = build_de_bruijn(&mut source, &config.kmer).map_err(to_io_error)?;
    extend_contigs(de_bruijn.as_mut()).map_err(to_io_error)
}

fn map(config: &PipelineConfig, graph: &mut ContigGraph) -> std::io::Result<()> {
    let mut sources = vec![];
    for file in config.short_reads.iter() {
        sources.push(open_source(&[file], Layout::Single)?);
    }
    for (left, right) in config.paired_reads.iter() {
        sources.push(open_source(&[left, right], config.layout)?);
    }
    if !sources.is_empty() {
        let pool = AsyncReadPool::new(sources, config.batch_size, CHANNEL_CAPACITY);
        map_pool(graph, pool, &config.map).map_err(to_io_error)?;
    }
    let sources = config
        .long_reads
        .iter()
        .map(|file| open_source(&[file], Layout::Single))
        .collect::<std::io::Result<Vec<_>>>()?;
    if !sources.is_empty() {
        let pool = AsyncReadPool::new(sources, config.batch_size, CHANNEL_CAPACITY);
        map_long_pool(graph, pool, &config.long).map_err(to_io_error)?;
    }
    Ok(())
}

pub fn run_pipeline(config: &PipelineConfig) -> std::io::Result<()> {
    init_logger(config.verbose);
    set_threads(config.threads);
    std::fs::create_dir_all(&config.out_dir)?;
    let file_stem = config.out_dir.join(&config.prefix);
    let contigs = file_stem.with_extension("contigs.json");
    let mapped = file_stem.with_extension("mapped.json");
    let simplified = file_stem.with_extension("json");
    let resume = |path: &PathBuf| config.resume && matches!(path.try_exists(), Ok(true));
    let mut graph = if resume(&contigs) {
        parse_json(&contigs)?
    } else {
        let graph = build(config)?;
        log(&graph, &contigs)?;
        graph
    };
    info!("PIPELINE\tContigs\t{}", graph.num_contigs());
    if resume(&mapped) {
        graph = parse_json(&mapped)?;
    } else {
        map(config, &mut graph)?;
        log(&graph, &mapped)?;
    }
    let report = simplify(&mut graph, &config.simplify).map_err(to_io_error)?;
    info!("PIPELINE\tSimplify\t{}", report);
    let graph = graph.compact();
    log(&graph, &simplified)?;
    let wtr = std::fs::File::create(file_stem.with_extension("stats.txt")).map(BufWriter::new)?;
    graph.stats(wtr)
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn parse_profile() {
        let profile = r#"
            short_reads = ["a.fq"]
            paired_reads = [["b_1.fq", "b_2.fq"]]
            layout = "MatePair"
            out_dir = "out"
            prefix = "sample"
            threads = 4
            [map]
            word_size = 20
            step_size = 10
            max_mismatches = "5%"
            max_paths = 100
            max_pairings = 10
            [simplify]
            min_tip_length = 30
            min_tip_support = 1
            ambiguity_threshold = 3
            bidirectional = true
            consensus_threshold = 5
        "#;
        let config: PipelineConfig = toml::from_str(profile).unwrap();
        assert_eq!(config.layout, Layout::MatePair);
        assert_eq!(config.paired_reads.len(), 1);
        assert_eq!(config.threads, 4);
        assert_eq!(config.map.word_size, 20);
        assert_eq!(
            config.map.max_mismatches,
            definitions::IntegerOrPercentage::Percentage(5f64)
        );
        assert_eq!(config.kmer, KmerConfig::default());
        assert!(config.simplify.bidirectional);
        assert!(config.long_reads.is_empty());
        assert!(!config.resume);
    }
}
