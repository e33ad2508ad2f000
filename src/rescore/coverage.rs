//! Coverage predicates: whether a candidate diagonal even has a chance of
//! meeting the coverage threshold, and whether the final alignment does.

/// Which lengths a coverage fraction is computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CovMode {
    /// Both the query and the target must individually meet the threshold.
    Bidirectional,
    /// Only the query's own coverage is checked.
    Query,
    /// Only the target's own coverage is checked.
    Target,
    /// The shorter-to-longer length ratio itself must meet the threshold,
    /// independent of how much of either is actually aligned.
    LengthRatio,
}

/// Cheap early-reject check, run before rescoring a diagonal: can this
/// `(q_len, t_len, diag_len)` combination possibly reach `cov_thr` under
/// `mode`, assuming the best case where the entire diagonal aligns?
#[must_use]
pub fn can_be_covered(q_len: u32, t_len: u32, diag_len: u32, cov_thr: f64, mode: CovMode) -> bool {
    if cov_thr <= 0.0 {
        return true;
    }
    match mode {
        CovMode::Bidirectional => fraction(diag_len, q_len) >= cov_thr && fraction(diag_len, t_len) >= cov_thr,
        CovMode::Query => fraction(diag_len, q_len) >= cov_thr,
        CovMode::Target => fraction(diag_len, t_len) >= cov_thr,
        CovMode::LengthRatio => fraction(q_len.min(t_len), q_len.max(t_len)) >= cov_thr,
    }
}

/// Final coverage check after rescoring, using the realized aligned span
/// `aln_len` rather than the candidate diagonal's full length.
#[must_use]
pub fn has_coverage(q_len: u32, t_len: u32, aln_len: u32, cov_thr: f64, mode: CovMode) -> bool {
    if cov_thr <= 0.0 {
        return true;
    }
    match mode {
        CovMode::Bidirectional => fraction(aln_len, q_len) >= cov_thr && fraction(aln_len, t_len) >= cov_thr,
        CovMode::Query => fraction(aln_len, q_len) >= cov_thr,
        CovMode::Target => fraction(aln_len, t_len) >= cov_thr,
        CovMode::LengthRatio => fraction(q_len.min(t_len), q_len.max(t_len)) >= cov_thr,
    }
}

fn fraction(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        f64::from(numerator) / f64::from(denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bidirectional_requires_both_sides() {
        assert!(can_be_covered(100, 100, 90, 0.8, CovMode::Bidirectional));
        assert!(!can_be_covered(100, 200, 90, 0.8, CovMode::Bidirectional));
    }

    #[test]
    fn query_only_ignores_target_length() {
        assert!(can_be_covered(100, 10_000, 90, 0.8, CovMode::Query));
    }

    #[test]
    fn length_ratio_ignores_diagonal_length() {
        assert!(!can_be_covered(50, 100, 100, 0.8, CovMode::LengthRatio));
        assert!(can_be_covered(90, 100, 1, 0.8, CovMode::LengthRatio));
    }

    #[test]
    fn zero_threshold_always_passes() {
        assert!(can_be_covered(10, 10_000, 1, 0.0, CovMode::Bidirectional));
        assert!(has_coverage(10, 10_000, 1, 0.0, CovMode::Bidirectional));
    }
}
