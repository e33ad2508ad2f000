//! Top-level orchestrator: assembles the matrix/evaluer/parameters once,
//! detects `sameQTDB`, resolves the precision threshold, and drives the
//! bucketed parallel fan-out over all queries in a process's query range.

use crate::rescore::align::RescoreMode;
use crate::rescore::coverage::CovMode;
use crate::rescore::driver::{process_query, RescoreParams};
use crate::rescore::evaluer::Evaluer;
use crate::rescore::matrix::{AminoAcidMatrix, NucleotideMatrix, ScoringMatrix};
use crate::rescore::precision::{parse_precision_lib, PrecisionTable};
use crate::rescore::prefilter::PrefilterReader;
use crate::rescore::seqid::SeqIdMode;
use crate::rescore::store::SequenceStore;
use crate::rescore::writer::ResultWriter;

#[cfg(not(feature = "dev_no_rayon"))]
use rayon::prelude::*;

/// Which substitution matrix variant the target database calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbAlphabet {
    Nucleotide,
    AminoAcid,
}

/// Up to this many queries are processed per flush bucket before the reader
/// is allowed to remap its backing storage (`spec.md §4.6`). The in-memory
/// stores this crate ships never actually need remapping, but the bucket
/// boundary is preserved so a future mmap-backed store can hook into it.
pub const DEFAULT_BUCKET_SIZE: u64 = 100_000_000;

/// The full set of tunables needed to run a rescoring pass, mirroring
/// `spec.md §6`'s "Parameters" list.
#[derive(Debug, Clone)]
pub struct RescoreConfig {
    pub db_alphabet:       DbAlphabet,
    pub amino_acid_db_size: u64,
    pub mode:               RescoreMode,
    pub cov_mode:            CovMode,
    pub cov_thr:             f64,
    pub seq_id_mode:         SeqIdMode,
    pub seq_id_thr:          f64,
    pub eval_thr:            f64,
    pub aln_len_thr:         u32,
    pub filter_hits:         bool,
    pub include_identity:    bool,
    pub sort_results:        bool,
    pub reverse_prefilter:   bool,
    pub global_alignment:    bool,
    pub bucket_size:         u64,
    pub threads:             usize,
}

impl RescoreConfig {
    /// Builds the [`ScoringMatrix`] named by `db_alphabet` (amino-acid uses
    /// embedded BLOSUM62; a caller wanting a custom matrix should construct
    /// one directly and call [`run`] with its own params instead).
    #[must_use]
    pub fn build_matrix(&self) -> Box<dyn ScoringMatrix> {
        match self.db_alphabet {
            DbAlphabet::Nucleotide => Box::new(NucleotideMatrix::new(2, -5, false)),
            DbAlphabet::AminoAcid => Box::new(AminoAcidMatrix::blosum62()),
        }
    }

    /// Resolves the score-per-column filter threshold when `filter_hits` is
    /// set, promoting HAMMING to SUBSTITUTION with a warning first, since the
    /// precision tables are only calibrated for per-column substitution
    /// scores (`spec.md §4.7`).
    ///
    /// Returns `(effective_mode, score_per_col_thr)`.
    #[must_use]
    pub fn resolve_filter_threshold(&self) -> (RescoreMode, f64) {
        if !self.filter_hits {
            return (self.mode, 0.0);
        }

        let effective_mode = if self.mode == RescoreMode::Hamming {
            eprintln!("warning: filter-hits requires a per-column substitution score; promoting rescore-mode from hamming to substitution");
            RescoreMode::Substitution
        } else {
            self.mode
        };

        let table = match self.cov_mode {
            CovMode::Target => PrecisionTable::TargetCoverage,
            _ => PrecisionTable::Bidirectional,
        };

        const PRECISION_TARGET: f64 = 0.99;
        let threshold = parse_precision_lib(table, self.seq_id_thr, self.cov_thr, PRECISION_TARGET).unwrap_or_else(|| {
            eprintln!(
                "warning: no precision table entry for seqid={:.2} cov={:.2}; disabling score-per-column filtering",
                self.seq_id_thr, self.cov_thr
            );
            0.0
        });

        (effective_mode, threshold)
    }
}

/// Detects the "same query and target database" optimisation by comparing
/// the two store handles' identity, resolved once at construction rather
/// than re-derived per query (`spec.md §9`).
#[must_use]
pub fn detect_same_qt_db(query_store: &dyn SequenceStore, target_store: &dyn SequenceStore) -> bool {
    std::ptr::eq(
        std::ptr::from_ref(query_store).cast::<()>(),
        std::ptr::from_ref(target_store).cast::<()>(),
    )
}

/// Drives the bucketed parallel fan-out of `process_query` over
/// `[db_from, db_from + db_size)`, writing each non-empty result through
/// `writer`.
///
/// Queries are split into flush buckets of `config.bucket_size` (spec.md
/// §4.6); within a bucket, rayon's default work-stealing scheduler pulls
/// query ids dynamically since per-query cost varies by orders of
/// magnitude. With the `dev_no_rayon` feature the same loop runs on a single
/// thread, useful for debugging.
pub fn run<W: ResultWriter>(
    db_from: u32, db_size: u32, query_store: &dyn SequenceStore, target_store: &dyn SequenceStore, prefilter: &dyn PrefilterReader,
    config: &RescoreConfig, writer: &mut W,
) {
    let matrix = config.build_matrix();
    let evaluer = Evaluer::new(config.amino_acid_db_size, matrix.as_ref());
    let (effective_mode, score_per_col_thr) = config.resolve_filter_threshold();
    let same_qt_db = detect_same_qt_db(query_store, target_store);

    let params = RescoreParams {
        mode: effective_mode,
        cov_mode: config.cov_mode,
        cov_thr: config.cov_thr,
        seq_id_mode: config.seq_id_mode,
        seq_id_thr: config.seq_id_thr,
        eval_thr: config.eval_thr,
        aln_len_thr: config.aln_len_thr,
        filter_hits: config.filter_hits,
        score_per_col_thr,
        include_identity: config.include_identity,
        sort_results: config.sort_results,
        same_qt_db,
        reverse_prefilter: config.reverse_prefilter,
        global_alignment: config.global_alignment,
    };

    let bucket_size = config.bucket_size.max(1);

    let drive_buckets = |writer: &mut W| {
        let mut bucket_start = u64::from(db_from);
        let end = u64::from(db_from) + u64::from(db_size);
        while bucket_start < end {
            let bucket_end = (bucket_start + bucket_size).min(end);
            process_bucket(bucket_start as u32, bucket_end as u32, query_store, target_store, prefilter, matrix.as_ref(), &evaluer, &params, writer);
            // A real mmap-backed reader would remap its backing storage here
            // between buckets to reclaim page-cache pressure (spec.md §4.6).
            bucket_start = bucket_end;
        }
    };

    #[cfg(not(feature = "dev_no_rayon"))]
    {
        if config.threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(config.threads).build().unwrap();
            pool.install(|| drive_buckets(writer));
        } else {
            drive_buckets(writer);
        }
    }
    #[cfg(feature = "dev_no_rayon")]
    {
        drive_buckets(writer);
    }
}

#[cfg(not(feature = "dev_no_rayon"))]
#[allow(clippy::too_many_arguments)]
fn process_bucket<W: ResultWriter>(
    from: u32, to: u32, query_store: &dyn SequenceStore, target_store: &dyn SequenceStore, prefilter: &dyn PrefilterReader,
    matrix: &dyn ScoringMatrix, evaluer: &Evaluer, params: &RescoreParams, writer: &mut W,
) {
    let results: Vec<(u32, String)> = (from..to)
        .into_par_iter()
        .with_min_len(1)
        .filter_map(|query_key| {
            process_query(query_key, query_store, target_store, prefilter, matrix, evaluer, params)
                .map(|hits| (query_key, hits.serialize()))
        })
        .collect();

    for (query_key, buffer) in results {
        let _ = writer.write_query(query_key, buffer);
    }
}

#[cfg(feature = "dev_no_rayon")]
#[allow(clippy::too_many_arguments)]
fn process_bucket<W: ResultWriter>(
    from: u32, to: u32, query_store: &dyn SequenceStore, target_store: &dyn SequenceStore, prefilter: &dyn PrefilterReader,
    matrix: &dyn ScoringMatrix, evaluer: &Evaluer, params: &RescoreParams, writer: &mut W,
) {
    for query_key in from..to {
        if let Some(hits) = process_query(query_key, query_store, target_store, prefilter, matrix, evaluer, params) {
            let _ = writer.write_query(query_key, hits.serialize());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rescore::prefilter::InMemoryPrefilterReader;
    use crate::rescore::store::InMemoryStore;
    use crate::rescore::writer::InMemoryWriter;

    fn base_config() -> RescoreConfig {
        RescoreConfig {
            db_alphabet: DbAlphabet::Nucleotide,
            amino_acid_db_size: 10_000,
            mode: RescoreMode::Hamming,
            cov_mode: CovMode::Bidirectional,
            cov_thr: 0.0,
            seq_id_mode: SeqIdMode::ShorterLength,
            seq_id_thr: 0.0,
            eval_thr: 1000.0,
            aln_len_thr: 0,
            filter_hits: false,
            include_identity: false,
            sort_results: true,
            reverse_prefilter: false,
            global_alignment: false,
            bucket_size: DEFAULT_BUCKET_SIZE,
            threads: 1,
        }
    }

    #[test]
    fn end_to_end_two_queries_produce_two_writes() {
        let mut queries = InMemoryStore::new();
        let q0 = queries.push(b"ACGTACGT".to_vec());
        let q1 = queries.push(b"TTTTTTTT".to_vec());
        let mut targets = InMemoryStore::new();
        let t0 = targets.push(b"ACGTACGT".to_vec());

        let mut prefilter = InMemoryPrefilterReader::new();
        prefilter.push(format!("{t0}\t8\t0\n"));
        prefilter.push(String::new());

        let config = base_config();
        let mut writer = InMemoryWriter::new();
        run(q0, 2, &queries, &targets, &prefilter, &config, &mut writer);

        assert_eq!(writer.records.len(), 1);
        assert_eq!(writer.records[0].0, q0);
        let _ = q1;
    }

    #[test]
    fn filter_hits_promotes_hamming_with_a_warning() {
        let mut config = base_config();
        config.filter_hits = true;
        config.seq_id_thr = 0.90;
        config.cov_thr = 1.00;
        let (mode, _thr) = config.resolve_filter_threshold();
        assert_eq!(mode, RescoreMode::Substitution);
    }

    #[test]
    fn same_qt_db_detected_for_identical_store_reference() {
        let store = InMemoryStore::new();
        assert!(detect_same_qt_db(&store, &store));
    }

    #[test]
    fn different_stores_are_not_same_qt_db() {
        let a = InMemoryStore::new();
        let b = InMemoryStore::new();
        assert!(!detect_same_qt_db(&a, &b));
    }
}
