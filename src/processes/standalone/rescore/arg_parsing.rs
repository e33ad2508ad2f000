use crate::args::abort_clap;
use crate::processes::standalone::rescore::RescoreArgs;
use crate::rescore::align::RescoreMode;
use crate::rescore::coverage::CovMode;
use crate::rescore::orchestrator::{DbAlphabet, RescoreConfig, DEFAULT_BUCKET_SIZE};
use crate::rescore::prefilter::InMemoryPrefilterReader;
use crate::rescore::store::InMemoryStore;
use clap::error::ErrorKind;
use zoe::data::err::ResultWithErrorContext;
use zoe::prelude::FastaReader;

/// The parsed and validated state needed to run `rescore` against the
/// file-based demo stores.
pub struct ParsedRescoreArgs {
    pub query_store:  InMemoryStore,
    /// `None` when the query and target files are the same file on disk —
    /// callers should then pass `&query_store` as the target store too, so
    /// [`crate::rescore::orchestrator::detect_same_qt_db`]'s pointer
    /// comparison actually fires.
    pub target_store: Option<InMemoryStore>,
    pub prefilter:     InMemoryPrefilterReader,
    pub db_size:       u32,
    pub config:        RescoreConfig,
    pub output:        Option<std::path::PathBuf>,
}

/// Parses and validates `rescore`'s arguments, reading the query/target FASTA
/// files and the prefilter TSV file fully into memory.
///
/// [`abort_clap`] is called if `rescore-mode=hamming` is combined with
/// `filter-hits` without an explicit acknowledgement, if `cov-thr`/`seq-id-thr`
/// fall outside `[0, 1]`, or if `global-alignment` is requested outside
/// ALIGNMENT mode.
///
/// # Errors
///
/// Any IO errors opening the query, target, or prefilter files are propagated
/// with file-path context.
pub fn parse_rescore_args(args: RescoreArgs) -> std::io::Result<ParsedRescoreArgs> {
    if !(0.0..=1.0).contains(&args.cov_thr) {
        abort_clap(
            ErrorKind::InvalidValue,
            format!("`--cov-thr` must be in [0, 1], got {}", args.cov_thr),
            Some("rescore"),
        );
    }
    if !(0.0..=1.0).contains(&args.seq_id_thr) {
        abort_clap(
            ErrorKind::InvalidValue,
            format!("`--seq-id-thr` must be in [0, 1], got {}", args.seq_id_thr),
            Some("rescore"),
        );
    }
    if args.global_alignment && args.rescore_mode == RescoreMode::Hamming {
        abort_clap(
            ErrorKind::ArgumentConflict,
            "`--global-alignment` requires `--rescore-mode substitution` or `alignment`",
            Some("rescore"),
        );
    }

    let query_records = FastaReader::<std::fs::File>::from_filename(&args.query_file)
        .with_file_context("Failed to open query FASTA file", &args.query_file)?
        .collect::<Result<Vec<_>, _>>()
        .with_file_context("Failed to parse query FASTA file", &args.query_file)?;

    // `rescorediagonal.cpp`'s `sameQTDB` shortcut is driven by the query and
    // target DB names comparing equal; here that's the query/target files
    // resolving to the same path. When they do, the target is never read or
    // stored separately, so `query_store` and `target_store` really are the
    // same object and `detect_same_qt_db`'s pointer comparison can fire.
    let same_qt_db = same_file(&args.query_file, &args.target_file);

    let target_records = if same_qt_db {
        None
    } else {
        Some(
            FastaReader::<std::fs::File>::from_filename(&args.target_file)
                .with_file_context("Failed to open target FASTA file", &args.target_file)?
                .collect::<Result<Vec<_>, _>>()
                .with_file_context("Failed to parse target FASTA file", &args.target_file)?,
        )
    };
    let target_records_ref = target_records.as_ref().unwrap_or(&query_records);

    if target_records_ref.is_empty() {
        return Err(std::io::Error::other(format!(
            "Empty target file: {}",
            args.target_file.display()
        )));
    }

    let query_store = InMemoryStore::from_sequences(query_records.iter().map(|r| r.sequence.as_slice().to_vec()).collect());
    let target_store =
        target_records.as_ref().map(|records| InMemoryStore::from_sequences(records.iter().map(|r| r.sequence.as_slice().to_vec()).collect()));
    let db_size = query_records.len() as u32;

    let prefilter_text = std::fs::read_to_string(&args.prefilter_file)
        .with_file_context("Failed to read prefilter file", &args.prefilter_file)?;
    let prefilter = InMemoryPrefilterReader::from_blobs(split_prefilter_blocks(&prefilter_text, db_size));

    let db_alphabet = if args.amino_acid { DbAlphabet::AminoAcid } else { DbAlphabet::Nucleotide };

    let config = RescoreConfig {
        db_alphabet,
        amino_acid_db_size: target_records_ref.iter().map(|r| r.sequence.len() as u64).sum(),
        mode: args.rescore_mode,
        cov_mode: args.cov_mode,
        cov_thr: args.cov_thr,
        seq_id_mode: args.seq_id_mode,
        seq_id_thr: args.seq_id_thr,
        eval_thr: args.eval_thr,
        aln_len_thr: args.aln_len_thr,
        filter_hits: args.filter_hits,
        include_identity: args.include_identity,
        sort_results: !args.no_sort,
        reverse_prefilter: args.reverse_prefilter,
        global_alignment: args.global_alignment,
        bucket_size: args.bucket_size.unwrap_or(DEFAULT_BUCKET_SIZE),
        threads: args.threads.unwrap_or_else(num_cpus::get),
    };

    Ok(ParsedRescoreArgs {
        query_store,
        target_store,
        prefilter,
        db_size,
        config,
        output: args.output,
    })
}

/// Whether `a` and `b` resolve to the same file on disk. Falls back to `false`
/// if either fails to canonicalize (e.g. `b` doesn't exist yet), deferring to
/// the normal file-open error path instead of guessing.
fn same_file(a: &std::path::Path, b: &std::path::Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Splits a prefilter file into per-query blocks.
///
/// The demo file format is one block per query, separated by a line
/// containing only `//`, in query order; a trailing empty block is
/// synthesized for any query past the last separator so that every query in
/// `[0, db_size)` has an entry (possibly empty).
fn split_prefilter_blocks(text: &str, db_size: u32) -> Vec<String> {
    let mut blocks: Vec<String> = text.split("\n//\n").map(str::to_string).collect();
    blocks.resize(db_size as usize, String::new());
    blocks
}
