//! Precision-table lookup: translates a `(targetSeqid, targetCov,
//! targetPrecision)` query into a per-column score threshold, by scanning a
//! whitespace-separated grid of `(cov, seqid, scorePerCol, precision)` rows.

/// Selects which embedded precision table is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecisionTable {
    /// Calibrated against bidirectional (query and target) coverage.
    Bidirectional,
    /// Calibrated against target-only coverage.
    TargetCoverage,
}

/// Tolerance used when comparing snapped grid coordinates against a table
/// row, matching the `1e-4` absolute tolerance the grid was calibrated at.
const EPSILON: f64 = 1e-4;

/// The two precision tables, embedded as plain text so the parser can be
/// exercised against the exact bytes shipped with the binary.
const BIDIRECTIONAL_TABLE: &str = include_str!("precision_data/cov_seqid_qsc_bidirectional.tsv");
const TARGET_COVERAGE_TABLE: &str = include_str!("precision_data/cov_seqid_qsc_target_cov.tsv");

/// Floors `value` down to the nearest multiple of `grid`, with a small
/// epsilon nudge so values that are already (almost) exactly on a grid line
/// don't fall to the line below due to floating point noise.
fn snap_down(value: f64, grid: f64) -> f64 {
    ((value + EPSILON) / grid).floor() * grid
}

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

/// Looks up the score-per-column threshold for `(target_seqid, target_cov)`
/// at or above `target_precision`, in `table`.
///
/// `target_seqid` is snapped down to the nearest `0.05`, `target_cov` to the
/// nearest `0.10`, per `spec.md §4.3`. Returns `None` on a miss; callers
/// should warn and treat that as a threshold of `0.0` (filtering disabled).
#[must_use]
pub fn parse_precision_lib(table: PrecisionTable, target_seqid: f64, target_cov: f64, target_precision: f64) -> Option<f64> {
    let snapped_seqid = snap_down(target_seqid, 0.05);
    let snapped_cov = snap_down(target_cov, 0.10);

    let text = match table {
        PrecisionTable::Bidirectional => BIDIRECTIONAL_TABLE,
        PrecisionTable::TargetCoverage => TARGET_COVERAGE_TABLE,
    };

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(cov), Some(seqid), Some(score_per_col), Some(precision)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let (Ok(cov), Ok(seqid), Ok(score_per_col), Ok(precision)) =
            (cov.parse::<f64>(), seqid.parse::<f64>(), score_per_col.parse::<f64>(), precision.parse::<f64>())
        else {
            continue;
        };

        if approx_eq(cov, snapped_cov) && approx_eq(seqid, snapped_seqid) && precision >= target_precision {
            return Some(score_per_col);
        }
    }

    None
}
