//! Ungapped diagonal rescoring: given a query/target pair and a diagonal
//! offset, recomputes the alignment score along that single diagonal using
//! one of three increasingly detailed modes.

use crate::rescore::matrix::ScoringMatrix;

/// How thoroughly a diagonal is rescored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescoreMode {
    /// Counts matching positions only; ignores the scoring matrix entirely.
    Hamming,
    /// Sums the scoring-matrix value at every aligned position along the
    /// whole diagonal.
    Substitution,
    /// Finds the maximum-scoring contiguous subrange of the diagonal
    /// (Kadane's algorithm), trimming the alignment to its best-scoring
    /// span.
    Alignment,
}

/// The result of rescoring one diagonal.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalAlignment {
    /// Raw alignment score in matrix units (or match count, for HAMMING).
    pub score:     i32,
    /// Start offset into the diagonal, inclusive.
    pub start_pos: u32,
    /// End offset into the diagonal, exclusive.
    pub end_pos:   u32,
    /// Count of matching (identical) residue pairs within `[start_pos, end_pos)`.
    pub matches:   u32,
}

/// Rescores the diagonal `d = target_start - query_start` shared by `query`
/// and `target`, using `mode`.
///
/// `diag_len` is the number of residue pairs that lie on this diagonal
/// within both sequences' bounds; `query` and `target` must each be sliced
/// to the overlapping region before calling, so that
/// `query[i]` aligns with `target[i]` for `i in 0..diag_len`.
///
/// # Panics
///
/// Panics if `query.len() != target.len()` or either is shorter than
/// `diag_len`.
#[must_use]
pub fn ungapped_align(query: &[u8], target: &[u8], diag_len: u32, mode: RescoreMode, matrix: &dyn ScoringMatrix) -> LocalAlignment {
    assert_eq!(query.len(), target.len());
    assert!(query.len() >= diag_len as usize);

    let ascii = matrix.ascii_matrix();
    let n = diag_len as usize;

    match mode {
        RescoreMode::Hamming => {
            let matches = (0..n).filter(|&i| query[i] == target[i]).count() as u32;
            LocalAlignment {
                score: matches as i32,
                start_pos: 0,
                end_pos: diag_len,
                matches,
            }
        }
        RescoreMode::Substitution => {
            let mut score = 0_i32;
            let mut matches = 0_u32;
            for i in 0..n {
                score += ascii.score(query[i], target[i]);
                if query[i] == target[i] {
                    matches += 1;
                }
            }
            LocalAlignment {
                score,
                start_pos: 0,
                end_pos: diag_len,
                matches,
            }
        }
        RescoreMode::Alignment => kadane_subrange(query, target, n, ascii),
    }
}

/// Finds the maximum-scoring contiguous subrange `[start, end)` of the
/// diagonal via Kadane's algorithm, then recounts matches within that span.
///
/// Ties in the running best are broken in favor of the first (leftmost)
/// maximal span encountered, matching the convention that an empty or
/// all-negative diagonal yields the single best (least negative / longest
/// leading) position rather than an arbitrary one.
fn kadane_subrange(query: &[u8], target: &[u8], n: usize, ascii: &crate::rescore::matrix::AsciiMatrix) -> LocalAlignment {
    if n == 0 {
        return LocalAlignment {
            score:     0,
            start_pos: 0,
            end_pos:   0,
            matches:   0,
        };
    }

    let mut best_score = i32::MIN;
    let mut best_start = 0_u32;
    let mut best_end = 0_u32;

    let mut running = 0_i32;
    let mut running_start = 0_u32;

    for i in 0..n {
        let s = ascii.score(query[i], target[i]);
        if running <= 0 {
            running = s;
            running_start = i as u32;
        } else {
            running += s;
        }
        if running > best_score {
            best_score = running;
            best_start = running_start;
            best_end = i as u32 + 1;
        }
    }

    let matches = (best_start as usize..best_end as usize)
        .filter(|&i| query[i] == target[i])
        .count() as u32;

    LocalAlignment {
        score: best_score,
        start_pos: best_start,
        end_pos: best_end,
        matches,
    }
}
