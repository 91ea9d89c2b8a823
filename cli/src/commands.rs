use clap::{value_parser, Arg, ArgAction, Command};

fn verbose() -> Arg {
    Arg::new("verbose")
        .short('v')
        .action(ArgAction::Count)
        .help("Debug mode")
}

fn threads() -> Arg {
    Arg::new("threads")
        .short('t')
        .long("threads")
        .value_parser(value_parser!(usize))
        .default_value("1")
        .help("number of threads")
}

fn subcommand_build() -> Command {
    Command::new("build")
        .version("0.2")
        .about("Build contigs from the k-mers of short reads. Writes a graph in JSON to the STDOUT.")
        .arg(verbose())
        .arg(threads())
        .arg(
            Arg::new("reads")
                .long("reads")
                .short('r')
                .value_name("READS")
                .action(ArgAction::Append)
                .required(true)
                .help("Input FASTA/Q files. Can be given many times."),
        )
        .arg(
            Arg::new("kmer")
                .short('k')
                .long("kmer")
                .value_parser(value_parser!(usize))
                .default_value("31")
                .help("Length of k-mers."),
        )
        .arg(
            Arg::new("min_count")
                .long("min_count")
                .value_parser(value_parser!(u32))
                .default_value("1")
                .help("K-mers occurring at most this many times are discarded."),
        )
        .arg(
            Arg::new("strategy")
                .long("strategy")
                .value_parser(["hashed", "packed"])
                .default_value("hashed")
                .help("Storage of k-mers."),
        )
        .arg(
            Arg::new("expected_kmers")
                .long("expected_kmers")
                .value_parser(value_parser!(usize))
                .default_value("0")
                .help("Capacity of the packed table. 0 to count the reads first."),
        )
}

fn read_pair(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .num_args(2)
        .value_names(["LEFT", "RIGHT"])
        .action(ArgAction::Append)
        .help(help)
}

fn subcommand_map() -> Command {
    Command::new("map")
        .version("0.2")
        .about("Map reads to the graph from the STDIN and record their support.")
        .arg(verbose())
        .arg(threads())
        .arg(
            Arg::new("single")
                .long("single")
                .value_name("READS")
                .action(ArgAction::Append)
                .help("Single-end short reads."),
        )
        .arg(read_pair("paired", "Paired-end short reads facing each other."))
        .arg(read_pair("roche454", "454 paired-end reads."))
        .arg(read_pair("mate_pair", "Mate-pair reads."))
        .arg(
            Arg::new("long")
                .long("long")
                .value_name("READS")
                .action(ArgAction::Append)
                .help("Long reads."),
        )
        .arg(
            Arg::new("word")
                .long("word")
                .value_parser(value_parser!(usize))
                .default_value("16")
                .help("Word length of the index for short reads."),
        )
        .arg(
            Arg::new("step")
                .long("step")
                .value_parser(value_parser!(usize))
                .default_value("8")
                .help("Step between indexed words for short reads."),
        )
        .arg(
            Arg::new("mismatches")
                .long("mismatches")
                .default_value("10%")
                .help("Mismatches allowed in a short read. Integer or percentage."),
        )
        .arg(
            Arg::new("max_paths")
                .long("max_paths")
                .value_parser(value_parser!(usize))
                .default_value("1000")
                .help("Reads branching into more alignments are skipped."),
        )
        .arg(
            Arg::new("max_pairings")
                .long("max_pairings")
                .value_parser(value_parser!(usize))
                .default_value("100")
                .help("Fragments with more pairings are not paired."),
        )
        .arg(
            Arg::new("long_word")
                .long("long_word")
                .value_parser(value_parser!(usize))
                .default_value("12")
                .help("Word length of the index for long reads."),
        )
        .arg(
            Arg::new("long_step")
                .long("long_step")
                .value_parser(value_parser!(usize))
                .default_value("4")
                .help("Step between indexed words for long reads."),
        )
        .arg(
            Arg::new("max_score")
                .long("max_score")
                .default_value("25%")
                .help("Edit distance allowed in a long read. Integer or percentage."),
        )
        .arg(
            Arg::new("batch_size")
                .long("batch_size")
                .value_parser(value_parser!(usize))
                .default_value("1000")
                .help("Fragments handed to the aligners at once."),
        )
}

fn subcommand_simplify() -> Command {
    Command::new("simplify")
        .version("0.2")
        .about("Trim tips, resolve paths, and merge contigs of the graph from the STDIN.")
        .arg(verbose())
        .arg(threads())
        .arg(
            Arg::new("min_tip_length")
                .long("min_tip_length")
                .value_parser(value_parser!(usize))
                .default_value("50")
                .help("Dead ends shorter than this are removed."),
        )
        .arg(
            Arg::new("min_tip_support")
                .long("min_tip_support")
                .value_parser(value_parser!(u64))
                .default_value("0")
                .help("Dead ends supported by fewer reads are removed."),
        )
        .arg(
            Arg::new("ambiguity_threshold")
                .long("ambiguity_threshold")
                .value_parser(value_parser!(u64))
                .default_value("2")
                .help("Margin of support a path needs over its siblings."),
        )
        .arg(
            Arg::new("bidirectional")
                .long("bidirectional")
                .action(ArgAction::SetTrue)
                .help("Require both ends of a path to pick it."),
        )
        .arg(
            Arg::new("consensus_threshold")
                .long("consensus_threshold")
                .value_parser(value_parser!(u64))
                .default_value("0")
                .help("Paths supported by more reads become contigs."),
        )
        .arg(
            Arg::new("compact")
                .long("compact")
                .action(ArgAction::SetTrue)
                .help("Drop deleted elements and renumber the rest."),
        )
}

fn subcommand_stats() -> Command {
    Command::new("stats")
        .version("0.2")
        .about("Write stats of the graph from the STDIN to the specified file.")
        .arg(verbose())
        .arg(
            Arg::new("file")
                .long("file")
                .value_name("FILE")
                .short('f')
                .required(true),
        )
}

fn subcommand_pipeline() -> Command {
    Command::new("pipeline")
        .version("0.2")
        .about("Run the whole pipeline, from reads to a simplified graph.")
        .arg(
            Arg::new("profile")
                .required(true)
                .value_name("TOML")
                .help("TOML configuration file."),
        )
}

pub fn graphtig_parser() -> Command {
    Command::new("graphtig")
        .version("0.2")
        .about("Assembly graph construction and simplification")
        .arg_required_else_help(true)
        .subcommand(subcommand_build())
        .subcommand(subcommand_map())
        .subcommand(subcommand_simplify())
        .subcommand(subcommand_stats())
        .subcommand(subcommand_pipeline())
}
