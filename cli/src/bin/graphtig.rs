use definitions::{ContigGraph, IntegerOrPercentage};
use graphtig::async_source::AsyncReadPool;
use graphtig::de_bruijn::{build_de_bruijn, DeBruijnStrategy, KmerConfig};
use graphtig::hit_chain::ChainConfig;
use graphtig::mapping::{map_long_pool, map_pool, LongReadConfig, MapConfig};
use graphtig::read_source::Layout;
use graphtig::simplify::SimplifyConfig;
use graphtig_cli::{init_logger, open_all, open_source, set_threads, to_io_error};
use std::io::BufReader;
#[macro_use]
extern crate log;

const CHANNEL_CAPACITY: usize = 4;

fn main() -> std::io::Result<()> {
    let matches = graphtig_cli::commands::graphtig_parser().get_matches();
    if let Some(("pipeline", sub_m)) = matches.subcommand() {
        let path = get::<String>(sub_m, "profile")?;
        let file = std::fs::read_to_string(path)?;
        let config: graphtig_cli::pipeline::PipelineConfig = toml::from_str(&file)
            .map_err(|why| std::io::Error::new(std::io::ErrorKind::InvalidData, why))?;
        return graphtig_cli::pipeline::run_pipeline(&config);
    }
    if let Some((_, sub_m)) = matches.subcommand() {
        init_logger(sub_m.get_count("verbose") as usize);
        if let Some(&threads) = sub_m.try_get_one::<usize>("threads").ok().flatten() {
            set_threads(threads);
        }
    }
    if let Some(("build", sub_m)) = matches.subcommand() {
        return build(sub_m).and_then(|graph| flush_file(&graph));
    }
    let mut graph = get_input_file()?;
    match matches.subcommand() {
        Some(("map", sub_m)) => map(sub_m, &mut graph)?,
        Some(("simplify", sub_m)) => graph = simplify(sub_m, graph)?,
        Some(("stats", sub_m)) => return stats(sub_m, &graph),
        _ => unreachable!(),
    };
    flush_file(&graph)
}

fn invalid(why: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidInput, why.to_string())
}

fn get<T: Clone + Send + Sync + 'static>(matches: &clap::ArgMatches, name: &str) -> std::io::Result<T> {
    matches
        .get_one::<T>(name)
        .cloned()
        .ok_or_else(|| invalid(format!("--{} is missing", name)))
}

fn get_budget(matches: &clap::ArgMatches, name: &str) -> std::io::Result<IntegerOrPercentage> {
    get::<String>(matches, name)?.parse().map_err(invalid)
}

fn build(matches: &clap::ArgMatches) -> std::io::Result<ContigGraph> {
    debug!("START\tBuild");
    let files: Vec<&String> = matches.get_many::<String>("reads").into_iter().flatten().collect();
    let strategy = match get::<String>(matches, "strategy")?.as_str() {
        "packed" => DeBruijnStrategy::Packed {
            expected_kmers: get(matches, "expected_kmers")?,
        },
        _ => DeBruijnStrategy::Hashed,
    };
    let config = KmerConfig::new(get(matches, "kmer")?, get(matches, "min_count")?, strategy);
    let mut source = open_all(&files)?;
    let mut de_bruijn = build_de_bruijn(&mut source, &config).map_err(to_io_error)?;
    graphtig::extend::extend_contigs(de_bruijn.as_mut()).map_err(to_io_error)
}

// Files given as pairs, two values per occurrence.
fn pairs<'a>(matches: &'a clap::ArgMatches, name: &str) -> Vec<[&'a String; 2]> {
    let files: Vec<&String> = matches.get_many::<String>(name).into_iter().flatten().collect();
    files.chunks_exact(2).map(|pair| [pair[0], pair[1]]).collect()
}

fn map(matches: &clap::ArgMatches, graph: &mut ContigGraph) -> std::io::Result<()> {
    debug!("START\tMap");
    let batch_size: usize = get(matches, "batch_size")?;
    let mut sources = vec![];
    for file in matches.get_many::<String>("single").into_iter().flatten() {
        sources.push(open_source(&[file], Layout::Single)?);
    }
    for (name, layout) in [
        ("paired", Layout::Paired),
        ("roche454", Layout::Roche454),
        ("mate_pair", Layout::MatePair),
    ] {
        for pair in pairs(matches, name) {
            sources.push(open_source(&pair, layout)?);
        }
    }
    if !sources.is_empty() {
        let config = MapConfig::new(
            get(matches, "word")?,
            get(matches, "step")?,
            get_budget(matches, "mismatches")?,
            get(matches, "max_paths")?,
            get(matches, "max_pairings")?,
        );
        let pool = AsyncReadPool::new(sources, batch_size, CHANNEL_CAPACITY);
        map_pool(graph, pool, &config).map_err(to_io_error)?;
    }
    let mut sources = vec![];
    for file in matches.get_many::<String>("long").into_iter().flatten() {
        sources.push(open_source(&[file], Layout::Single)?);
    }
    if !sources.is_empty() {
        let config = LongReadConfig::new(
            get(matches, "long_word")?,
            get(matches, "long_step")?,
            get_budget(matches, "max_score")?,
            get(matches, "max_paths")?,
            ChainConfig::default(),
        );
        let pool = AsyncReadPool::new(sources, batch_size, CHANNEL_CAPACITY);
        map_long_pool(graph, pool, &config).map_err(to_io_error)?;
    }
    Ok(())
}

fn simplify(matches: &clap::ArgMatches, mut graph: ContigGraph) -> std::io::Result<ContigGraph> {
    debug!("START\tSimplify");
    let config = SimplifyConfig {
        min_tip_length: get(matches, "min_tip_length")?,
        min_tip_support: get(matches, "min_tip_support")?,
        ambiguity_threshold: get(matches, "ambiguity_threshold")?,
        bidirectional: matches.get_flag("bidirectional"),
        consensus_threshold: get(matches, "consensus_threshold")?,
    };
    let report = graphtig::simplify::simplify(&mut graph, &config).map_err(to_io_error)?;
    info!("SIMPLIFY\t{}", report);
    match matches.get_flag("compact") {
        true => Ok(graph.compact()),
        false => Ok(graph),
    }
}

fn stats(matches: &clap::ArgMatches, graph: &ContigGraph) -> std::io::Result<()> {
    use graphtig::stats::Stats;
    debug!("START\tStats step");
    let wtr = get::<String>(matches, "file")?;
    let wtr = std::io::BufWriter::new(std::fs::File::create(wtr)?);
    graph.stats(wtr)
}

fn get_input_file() -> std::io::Result<ContigGraph> {
    let stdin = std::io::stdin();
    let reader = BufReader::new(stdin.lock());
    match serde_json::de::from_reader(reader) {
        Err(why) => {
            eprintln!("{:?}", why);
            eprintln!("Invalid Input from STDIN.");
            Err(std::io::Error::from(std::io::ErrorKind::Other))
        }
        Ok(res) => Ok(res),
    }
}

fn flush_file(graph: &ContigGraph) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut wtr = std::io::BufWriter::new(stdout.lock());
    match serde_json::ser::to_writer(&mut wtr, graph) {
        Err(why) => {
            eprintln!("{:?}", why);
            eprintln!("Invalid output to the STDOUT.");
            std::process::exit(1);
        }
        _ => Ok(()),
    }
}
