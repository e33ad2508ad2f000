use crate::rescore::align::RescoreMode;
use crate::rescore::coverage::CovMode;
use crate::rescore::orchestrator::run;
use crate::rescore::seqid::SeqIdMode;
use crate::rescore::writer::ThreadedResultWriter;
use clap::{Args, ValueEnum};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

mod arg_parsing;

pub use arg_parsing::parse_rescore_args;

/// The command line arguments for `rescore`
#[derive(Args, Debug)]
pub struct RescoreArgs {
    /// Path to the FASTA file containing the query sequence(s)
    query_file: PathBuf,

    /// Path to the FASTA file containing the target/reference sequence(s)
    target_file: PathBuf,

    /// Path to the prefilter TSV file. One block per query in query order,
    /// each block a newline-delimited list of `targetKey\tpreFilterScore\tdiagonal`
    /// rows, blocks separated by a line containing only `//`
    prefilter_file: PathBuf,

    #[arg(long, alias = "out")]
    /// Output filepath for rescored hits. Printed to STDOUT if not provided
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = RescoreMode::Substitution)]
    /// The ungapped rescoring mode
    rescore_mode: RescoreMode,

    #[arg(long, value_enum, default_value_t = CovMode::Bidirectional)]
    /// Which lengths a coverage fraction is computed against
    cov_mode: CovMode,

    #[arg(long, default_value_t = 0.0)]
    /// Minimum coverage fraction in [0, 1] required to accept a hit
    cov_thr: f64,

    #[arg(long, value_enum, default_value_t = SeqIdMode::ShorterLength)]
    /// Which length normalizes sequence identity
    seq_id_mode: SeqIdMode,

    #[arg(long, default_value_t = 0.0)]
    /// Minimum sequence identity fraction in [0, 1] required to accept a hit
    seq_id_thr: f64,

    #[arg(long, default_value_t = 0.001)]
    /// Maximum E-value required to accept a hit (ignored in HAMMING mode)
    eval_thr: f64,

    #[arg(long, default_value_t = 0)]
    /// Minimum alignment length required to accept a hit
    aln_len_thr: u32,

    #[arg(long)]
    /// Additionally accept any hit whose score-per-column meets a
    /// precision-calibrated threshold, regardless of the other predicates
    filter_hits: bool,

    #[arg(long)]
    /// Treat the query and target files as the same database: same-key hits
    /// are always accepted regardless of threshold
    include_identity: bool,

    #[arg(long)]
    /// Disable sorting records within each query's output
    no_sort: bool,

    #[arg(long)]
    /// Treat the prefilter input as reverse-prefilter: candidates with
    /// `preFilterScore == 1` are rescored against the reverse complement of
    /// the query
    reverse_prefilter: bool,

    #[arg(long)]
    /// Additionally compute and surface a global-alignment p-value
    /// (requires `--rescore-mode substitution` or `alignment`)
    global_alignment: bool,

    #[arg(long)]
    /// Use an amino-acid scoring matrix (BLOSUM62) instead of the default
    /// nucleotide matrix
    amino_acid: bool,

    #[arg(long)]
    /// Number of worker threads. Defaults to the number of available CPUs
    threads: Option<usize>,

    #[arg(long)]
    /// Maximum number of queries processed per flush bucket
    bucket_size: Option<u64>,
}

impl ValueEnum for RescoreMode {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Hamming, Self::Substitution, Self::Alignment]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Hamming => clap::builder::PossibleValue::new("hamming"),
            Self::Substitution => clap::builder::PossibleValue::new("substitution"),
            Self::Alignment => clap::builder::PossibleValue::new("alignment"),
        })
    }
}

impl ValueEnum for CovMode {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Bidirectional, Self::Query, Self::Target, Self::LengthRatio]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Bidirectional => clap::builder::PossibleValue::new("bidirectional"),
            Self::Query => clap::builder::PossibleValue::new("query"),
            Self::Target => clap::builder::PossibleValue::new("target"),
            Self::LengthRatio => clap::builder::PossibleValue::new("length-ratio"),
        })
    }
}

impl ValueEnum for SeqIdMode {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::ShorterLength, Self::LongerLength, Self::AlignmentLength, Self::AverageLength]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::ShorterLength => clap::builder::PossibleValue::new("shorter-length"),
            Self::LongerLength => clap::builder::PossibleValue::new("longer-length"),
            Self::AlignmentLength => clap::builder::PossibleValue::new("alignment-length"),
            Self::AverageLength => clap::builder::PossibleValue::new("average-length"),
        })
    }
}

/// Opens `path` as a buffered file sink, or stdout if no path is given.
///
/// Gzip output is not supported: the `compressed` knob for rescoring refers
/// to an mmseqs2-style compressed *input* store, not to the emitted TSV.
fn open_output(path: Option<&PathBuf>) -> std::io::Result<Box<dyn Write + Send>> {
    match path {
        Some(p) => Ok(Box::new(BufWriter::new(File::create(p)?))),
        None => Ok(Box::new(std::io::stdout())),
    }
}

/// Sub-program for rescoring k-mer prefilter hits along a diagonal
pub fn rescore_process(args: RescoreArgs) -> std::io::Result<()> {
    let parsed = parse_rescore_args(args)?;

    let sink = open_output(parsed.output.as_ref())?;
    let mut writer = ThreadedResultWriter::from_writer(sink);

    // When the query and target files are the same path, `target_store` is
    // `None` and `query_store` is reused as the target too, so the two
    // references compare pointer-equal inside `orchestrator::run`.
    let target_store: &dyn crate::rescore::store::SequenceStore = match &parsed.target_store {
        Some(store) => store,
        None => &parsed.query_store,
    };

    run(
        0,
        parsed.db_size,
        &parsed.query_store,
        target_store,
        &parsed.prefilter,
        &parsed.config,
        &mut writer,
    );

    writer.flush()
}
