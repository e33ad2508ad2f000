//! Per-query driver: parses one query's prefilter candidates, rescores each
//! against the matching target, applies acceptance predicates, and
//! serializes the surviving hits.

use crate::rescore::align::{ungapped_align, RescoreMode};
use crate::rescore::coverage::{can_be_covered, has_coverage, CovMode};
use crate::rescore::evaluer::Evaluer;
use crate::rescore::matrix::{reverse_complement, ScoringMatrix};
use crate::rescore::prefilter::{parse_prefilter_hits, PrefilterReader};
use crate::rescore::record::{cmp_by_evalue, cmp_short_hit, AlignmentRecord, ShortHit};
use crate::rescore::seqid::{compute_seq_id, SeqIdMode};
use crate::rescore::store::SequenceStore;

/// Tunables that drive acceptance and record shape, assembled once by the
/// orchestrator and shared read-only across worker threads.
#[derive(Debug, Clone)]
pub struct RescoreParams {
    pub mode:              RescoreMode,
    pub cov_mode:          CovMode,
    pub cov_thr:           f64,
    pub seq_id_mode:       SeqIdMode,
    pub seq_id_thr:        f64,
    pub eval_thr:          f64,
    pub aln_len_thr:       u32,
    pub filter_hits:       bool,
    pub score_per_col_thr: f64,
    pub include_identity:  bool,
    pub sort_results:      bool,
    pub same_qt_db:        bool,
    /// Whether the prefilter input marks candidates for reverse-strand
    /// querying (`preFilterScore == 1`), relevant to nucleotide searches only.
    pub reverse_prefilter: bool,
    pub global_alignment:  bool,
}

/// Absolute tolerance used for threshold comparisons (`spec.md §4.4`).
const EPSILON: f64 = 1e-6;

/// The serialized output of one query, either long or short form depending
/// on [`RescoreParams::mode`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryHits {
    Long(Vec<AlignmentRecord>),
    Short(Vec<ShortHit>),
}

impl QueryHits {
    /// Concatenates every record's serialized line into one buffer, in
    /// whatever order the records are currently stored in (sorting, if
    /// requested, happens before this is called).
    #[must_use]
    pub fn serialize(&self) -> String {
        match self {
            QueryHits::Long(records) => records.iter().map(AlignmentRecord::to_line).collect(),
            QueryHits::Short(hits) => hits.iter().map(ShortHit::to_line).collect(),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            QueryHits::Long(records) => records.is_empty(),
            QueryHits::Short(hits) => hits.is_empty(),
        }
    }
}

/// Processes one query against all of its prefilter candidates.
///
/// Returns `None` if the query key has no sequence in `query_store` (treated
/// as an empty blob per `spec.md §7`) or the prefilter blob is empty/absent.
/// Parse failures in the prefilter blob are reported as `Ok(None)` after
/// surfacing a warning, per `spec.md §7` ("fail the query record... log"),
/// never as a hard error — a single malformed query must never abort the
/// bucket.
#[must_use]
pub fn process_query(
    query_key: u32, query_store: &dyn SequenceStore, target_store: &dyn SequenceStore, prefilter: &dyn PrefilterReader,
    matrix: &dyn ScoringMatrix, evaluer: &Evaluer, params: &RescoreParams,
) -> Option<QueryHits> {
    let Some(forward_query) = query_store.get(query_key) else {
        return None;
    };
    let q_len = forward_query.len() as u32;

    let Some(blob) = prefilter.blob(query_key) else {
        return None;
    };
    if blob.trim().is_empty() {
        return None;
    }

    let hits = match parse_prefilter_hits(blob) {
        Ok(hits) => hits,
        Err(err) => {
            eprintln!("warning: query {query_key}: prefilter parse failure, emitting empty record: {err}");
            return None;
        }
    };
    if hits.is_empty() {
        return None;
    }

    let reverse_query = if params.reverse_prefilter {
        Some(reverse_complement(forward_query))
    } else {
        None
    };

    let mut long_records = Vec::new();
    let mut short_hits = Vec::new();

    for hit in &hits {
        let Some(target) = target_store.get(hit.target_key) else {
            continue;
        };
        let t_len = target.len() as u32;

        let is_identity = (params.same_qt_db || params.include_identity) && hit.target_key == query_key;
        let is_reverse = params.reverse_prefilter && hit.pre_filter_score == 1;
        let query = if is_reverse {
            reverse_query.as_deref().unwrap_or(forward_query)
        } else {
            forward_query
        };

        let diag_len = diagonal_len(q_len, t_len, hit.diagonal);
        if diag_len == 0 {
            continue;
        }
        if !is_identity && !can_be_covered(q_len, t_len, diag_len, params.cov_thr, params.cov_mode) {
            continue;
        }

        let (q_slice, t_slice) = diagonal_slices(query, target, hit.diagonal, diag_len);
        let alignment = ungapped_align(q_slice, t_slice, diag_len, params.mode, matrix);

        let (q_start, q_end, t_start, t_end, aln_len, matches) = project_window(
            hit.diagonal,
            q_len,
            &alignment,
            params.mode,
            is_reverse,
        );

        match params.mode {
            RescoreMode::Hamming => {
                let seq_id = compute_seq_id(matches, q_len, t_len, diag_len, params.seq_id_mode);
                let accepted = is_identity
                    || accept(q_len, t_len, seq_id, None, aln_len, aln_len, alignment.score, diag_len, params);
                if accepted {
                    short_hits.push(ShortHit {
                        target_key: hit.target_key,
                        score:      (100.0 * seq_id).floor() as i32,
                        diagonal:   hit.diagonal,
                    });
                }
            }
            RescoreMode::Substitution => {
                let e_value = evaluer.compute_evalue(alignment.score, q_len);

                // `rescorediagonal.cpp` only assigns `seqId`/`alnLen` inside
                // its RESCORE_MODE_ALIGNMENT branch; outside it they stay at
                // their zero initialization, so plain substitution scoring
                // never gates on sequence identity or alignment length.
                // Coverage still sees the whole diagonal: `aln_len` here
                // equals `diag_len`, matching the original's pre-mode-switch
                // `queryCov`/`targetCov`.
                let accepted =
                    is_identity || accept(q_len, t_len, 0.0, Some(e_value), aln_len, 0, alignment.score, diag_len, params);
                if !accepted {
                    continue;
                }

                let bit_score = evaluer.compute_bit_score(alignment.score);
                short_hits.push(ShortHit {
                    target_key: hit.target_key,
                    score:      bit_score.round() as i32,
                    diagonal:   hit.diagonal,
                });
            }
            RescoreMode::Alignment => {
                let e_value = evaluer.compute_evalue(alignment.score, q_len);
                let seq_id = if e_value <= params.eval_thr || is_identity {
                    compute_seq_id(matches, q_len, t_len, aln_len, params.seq_id_mode)
                } else {
                    0.0
                };

                let accepted = is_identity
                    || accept(q_len, t_len, seq_id, Some(e_value), aln_len, aln_len, alignment.score, diag_len, params);
                if !accepted {
                    continue;
                }

                let bit_score = evaluer.compute_bit_score(alignment.score);

                long_records.push(AlignmentRecord {
                    target_key: hit.target_key,
                    bit_score,
                    seq_id,
                    e_value,
                    q_start,
                    q_end,
                    q_len,
                    t_start,
                    t_end,
                    t_len,
                    aln_len,
                    backtrace: format!("{aln_len}M"),
                    global_pvalue: if params.global_alignment {
                        Some(global_alignment_pvalue(alignment.score, evaluer))
                    } else {
                        None
                    },
                });
            }
        }
    }

    let mut output = match params.mode {
        RescoreMode::Alignment => QueryHits::Long(long_records),
        RescoreMode::Hamming | RescoreMode::Substitution => QueryHits::Short(short_hits),
    };

    if output.is_empty() {
        return None;
    }

    if params.sort_results {
        match &mut output {
            QueryHits::Long(records) => records.sort_by(cmp_by_evalue),
            QueryHits::Short(hits) => hits.sort_by(cmp_short_hit),
        }
    }

    Some(output)
}

/// `spec.md §4.1`: `diagonalLen = min(qLen, tLen) - |d|`, clamped to `>= 0`.
fn diagonal_len(q_len: u32, t_len: u32, diagonal: i32) -> u32 {
    let shorter = q_len.min(t_len) as i64;
    let dist = i64::from(diagonal.unsigned_abs());
    (shorter - dist).max(0) as u32
}

/// Slices `query`/`target` down to the overlapping diagonal region, so that
/// `query[i]` is meant to align with `target[i]` for every `i`.
fn diagonal_slices<'a>(query: &'a [u8], target: &'a [u8], diagonal: i32, diag_len: u32) -> (&'a [u8], &'a [u8]) {
    let n = diag_len as usize;
    if diagonal >= 0 {
        let offset = diagonal as usize;
        (&query[offset..offset + n], &target[..n])
    } else {
        let offset = diagonal.unsigned_abs() as usize;
        (&query[..n], &target[offset..offset + n])
    }
}

/// Projects the aligner's diagonal-local `[startPos, endPos)` window back
/// into absolute query/target coordinates, mirroring query coordinates if
/// `is_reverse` (`spec.md §3` invariant: `qStart' = qLen - qStart - 1`).
fn project_window(
    diagonal: i32, q_len: u32, alignment: &crate::rescore::align::LocalAlignment, mode: RescoreMode, is_reverse: bool,
) -> (u32, u32, u32, u32, u32, u32) {
    let (base_q, base_t) = if diagonal >= 0 {
        (diagonal as u32, 0)
    } else {
        (0, diagonal.unsigned_abs())
    };

    let (start, end) = match mode {
        RescoreMode::Hamming | RescoreMode::Substitution => (0, alignment.end_pos.saturating_sub(1)),
        RescoreMode::Alignment => (alignment.start_pos, alignment.end_pos.saturating_sub(1)),
    };

    let mut q_start = base_q + start;
    let mut q_end = base_q + end;
    let t_start = base_t + start;
    let t_end = base_t + end;

    if is_reverse {
        // Mirrored in place, not swapped: a reverse hit emits `qStart >
        // qEnd`, which is itself the signal that the hit is on the reverse
        // strand (`rescorediagonal.cpp:257-260`).
        q_start = q_len.saturating_sub(q_start).saturating_sub(1);
        q_end = q_len.saturating_sub(q_end).saturating_sub(1);
    }

    let aln_len = end.saturating_sub(start) + 1;
    (q_start, q_end, t_start, t_end, aln_len, alignment.matches)
}

/// `spec.md §4.4` acceptance rule, excluding the identity shortcut (handled
/// by the caller): `(filterHits ∧ filterOk) ∨ (alnLenOk ∧ covOk ∧ seqIdOk ∧
/// eValueOk)`.
///
/// `cov_len` and `aln_len_for_thr` are split apart because the original
/// doesn't derive both from the same length outside ALIGNMENT mode: coverage
/// is always computed from the whole rescored span, while the `alnLenThr`
/// check sees the real trimmed alignment length only in ALIGNMENT mode (and
/// `0` for plain substitution scoring).
#[allow(clippy::too_many_arguments)]
fn accept(
    q_len: u32, t_len: u32, seq_id: f64, e_value: Option<f64>, cov_len: u32, aln_len_for_thr: u32, score: i32, diag_len: u32,
    params: &RescoreParams,
) -> bool {
    if params.filter_hits {
        let score_per_col = f64::from(score) / f64::from(diag_len.max(1));
        if score_per_col >= params.score_per_col_thr {
            return true;
        }
    }

    let cov_ok = has_coverage(q_len, t_len, cov_len, params.cov_thr, params.cov_mode);
    let seq_id_ok = seq_id >= params.seq_id_thr - EPSILON;
    let eval_ok = e_value.is_none_or(|e| e <= params.eval_thr);
    let aln_len_ok = aln_len_for_thr >= params.aln_len_thr;

    aln_len_ok && cov_ok && seq_id_ok && eval_ok
}

/// Placeholder global-alignment p-value, derived from the bit score the same
/// way a p-value is derived from an E-value under the Poisson approximation
/// (`p = 1 - exp(-E)`), since this crate does not implement the gapped
/// global-alignment DP the original p-value came from (`spec.md` non-goal:
/// "no gapped Smith-Waterman").
fn global_alignment_pvalue(score: i32, evaluer: &Evaluer) -> f64 {
    let e_value = evaluer.compute_evalue(score, 1);
    1.0 - (-e_value).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rescore::evaluer::Evaluer;
    use crate::rescore::matrix::NucleotideMatrix;
    use crate::rescore::prefilter::InMemoryPrefilterReader;
    use crate::rescore::store::InMemoryStore;

    fn base_params(mode: RescoreMode) -> RescoreParams {
        RescoreParams {
            mode,
            cov_mode: CovMode::Bidirectional,
            cov_thr: 0.0,
            seq_id_mode: SeqIdMode::ShorterLength,
            seq_id_thr: 0.0,
            eval_thr: 1000.0,
            aln_len_thr: 0,
            filter_hits: false,
            score_per_col_thr: 0.0,
            include_identity: false,
            sort_results: true,
            same_qt_db: false,
            reverse_prefilter: false,
            global_alignment: false,
        }
    }

    #[test]
    fn trivial_hamming_perfect_match() {
        let matrix = NucleotideMatrix::new(2, -5, false);
        let evaluer = Evaluer::new(1000, &matrix);
        let mut queries = InMemoryStore::new();
        let q_key = queries.push(b"ACGTACGT".to_vec());
        let mut targets = InMemoryStore::new();
        let t_key = targets.push(b"ACGTACGT".to_vec());
        let mut prefilter = InMemoryPrefilterReader::new();
        prefilter.push(format!("{t_key}\t8\t0\n"));

        let params = base_params(RescoreMode::Hamming);
        let result = process_query(q_key, &queries, &targets, &prefilter, &matrix, &evaluer, &params);

        match result {
            Some(QueryHits::Short(hits)) => {
                assert_eq!(hits.len(), 1);
                assert_eq!(hits[0].score, 100);
            }
            other => panic!("expected one short hit, got {other:?}"),
        }
    }

    #[test]
    fn empty_prefilter_blob_yields_no_output() {
        let matrix = NucleotideMatrix::new(2, -5, false);
        let evaluer = Evaluer::new(1000, &matrix);
        let mut queries = InMemoryStore::new();
        let q_key = queries.push(b"ACGT".to_vec());
        let targets = InMemoryStore::new();
        let mut prefilter = InMemoryPrefilterReader::new();
        prefilter.push(String::new());

        let params = base_params(RescoreMode::Hamming);
        let result = process_query(q_key, &queries, &targets, &prefilter, &matrix, &evaluer, &params);
        assert_eq!(result, None);
    }

    #[test]
    fn missing_query_key_yields_no_output() {
        let matrix = NucleotideMatrix::new(2, -5, false);
        let evaluer = Evaluer::new(1000, &matrix);
        let queries = InMemoryStore::new();
        let targets = InMemoryStore::new();
        let prefilter = InMemoryPrefilterReader::new();

        let params = base_params(RescoreMode::Hamming);
        let result = process_query(0, &queries, &targets, &prefilter, &matrix, &evaluer, &params);
        assert_eq!(result, None);
    }

    #[test]
    fn identity_pair_is_emitted_regardless_of_thresholds() {
        let matrix = NucleotideMatrix::new(2, -5, false);
        let evaluer = Evaluer::new(1000, &matrix);
        let mut store = InMemoryStore::new();
        let key = store.push(b"ACGTACGT".to_vec());
        let mut prefilter = InMemoryPrefilterReader::new();
        prefilter.push(format!("{key}\t8\t0\n"));

        let mut params = base_params(RescoreMode::Hamming);
        params.same_qt_db = true;
        params.seq_id_thr = 2.0; // impossible to satisfy were it not an identity hit

        let result = process_query(key, &store, &store, &prefilter, &matrix, &evaluer, &params);
        assert!(matches!(result, Some(QueryHits::Short(hits)) if hits.len() == 1));
    }

    #[test]
    fn coverage_early_reject_skips_short_overlap() {
        let matrix = NucleotideMatrix::new(2, -5, false);
        let evaluer = Evaluer::new(1000, &matrix);
        let mut queries = InMemoryStore::new();
        let q_key = queries.push(vec![b'A'; 100]);
        let mut targets = InMemoryStore::new();
        let t_key = targets.push(vec![b'A'; 10]);
        let mut prefilter = InMemoryPrefilterReader::new();
        prefilter.push(format!("{t_key}\t10\t0\n"));

        let mut params = base_params(RescoreMode::Hamming);
        params.cov_thr = 0.8;

        let result = process_query(q_key, &queries, &targets, &prefilter, &matrix, &evaluer, &params);
        assert_eq!(result, None);
    }

    #[test]
    fn substitution_mode_ignores_seq_id_and_aln_len_thresholds() {
        let matrix = NucleotideMatrix::new(2, -5, false);
        let evaluer = Evaluer::new(1000, &matrix);
        let mut queries = InMemoryStore::new();
        let q_key = queries.push(b"ACGTACGT".to_vec());
        let mut targets = InMemoryStore::new();
        let t_key = targets.push(b"ACGTACGT".to_vec());
        let mut prefilter = InMemoryPrefilterReader::new();
        prefilter.push(format!("{t_key}\t8\t0\n"));

        // A perfect match would pass any seqIdThr if seqId were actually
        // computed for substitution scoring; the original leaves seqId at
        // its zero initialization outside ALIGNMENT mode, so this must be
        // rejected instead.
        let mut params = base_params(RescoreMode::Substitution);
        params.seq_id_thr = 0.5;

        let result = process_query(q_key, &queries, &targets, &prefilter, &matrix, &evaluer, &params);
        assert_eq!(result, None);

        // Likewise alnLenThr: the original's alnLen also stays 0, so any
        // positive threshold rejects every substitution hit.
        let mut params = base_params(RescoreMode::Substitution);
        params.aln_len_thr = 1;

        let result = process_query(q_key, &queries, &targets, &prefilter, &matrix, &evaluer, &params);
        assert_eq!(result, None);

        // With both thresholds at their defaults the hit is still accepted
        // on E-value alone.
        let params = base_params(RescoreMode::Substitution);
        let result = process_query(q_key, &queries, &targets, &prefilter, &matrix, &evaluer, &params);
        assert!(matches!(result, Some(QueryHits::Short(hits)) if hits.len() == 1));
    }

    #[test]
    fn reverse_prefilter_mirrors_query_coordinates() {
        let matrix = NucleotideMatrix::new(2, -5, false);
        let evaluer = Evaluer::new(1000, &matrix);
        let mut queries = InMemoryStore::new();
        // forward query; its reverse complement is ACGTACGTACGTACGTACGT (same length)
        let q_key = queries.push(b"ACGTACGTACGTACGTACGT".to_vec());
        let mut targets = InMemoryStore::new();
        let t_key = targets.push(b"ACGTACGTACGTACGTACGT".to_vec());
        let mut prefilter = InMemoryPrefilterReader::new();
        prefilter.push(format!("{t_key}\t1\t0\n"));

        let mut params = base_params(RescoreMode::Alignment);
        params.reverse_prefilter = true;

        let result = process_query(q_key, &queries, &targets, &prefilter, &matrix, &evaluer, &params);
        match result {
            Some(QueryHits::Long(records)) => {
                assert_eq!(records.len(), 1);
                // "ACGT" repeats are self-reverse-complementary, so the whole
                // 20bp query aligns end to end; mirrored in place (not
                // swapped), that makes qStart > qEnd, signaling reverse
                // orientation.
                assert_eq!(records[0].q_start, 19);
                assert_eq!(records[0].q_end, 0);
                assert!(records[0].q_start > records[0].q_end);
            }
            other => panic!("expected one long record, got {other:?}"),
        }
    }
}
