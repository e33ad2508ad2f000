//! Output record shapes: the long-form alignment record (ALIGNMENT mode) and
//! the short-form hit record (HAMMING/SUBSTITUTION modes), plus their
//! serialization and sort order.

use std::cmp::Ordering;
use std::fmt::Write as _;

/// A long-form alignment record, emitted in ALIGNMENT mode.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentRecord {
    pub target_key:  u32,
    pub bit_score:   f64,
    pub seq_id:      f64,
    pub e_value:     f64,
    pub q_start:     u32,
    pub q_end:       u32,
    pub q_len:       u32,
    pub t_start:     u32,
    pub t_end:       u32,
    pub t_len:       u32,
    pub aln_len:     u32,
    /// Always `"<alnLen>M"` for ungapped output.
    pub backtrace:   String,
    /// Global-alignment p-value, present only when `globalAlignment` was
    /// requested together with a gappable mode. The original MMseqs2
    /// rescoring path computed this value and then discarded it (a known
    /// FIXME); this crate surfaces it instead of silently dropping it.
    pub global_pvalue: Option<f64>,
}

impl AlignmentRecord {
    /// Tab-separated serialization, trailing newline included.
    #[must_use]
    pub fn to_line(&self) -> String {
        let mut out = String::with_capacity(96);
        let _ = write!(
            out,
            "{}\t{:.0}\t{:.3}\t{:.3e}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.target_key,
            self.bit_score.round(),
            self.seq_id,
            self.e_value,
            self.q_start,
            self.q_end,
            self.q_len,
            self.t_start,
            self.t_end,
            self.t_len,
            self.backtrace,
        );
        if let Some(pvalue) = self.global_pvalue {
            let _ = write!(out, "\t{pvalue:.3e}");
        }
        out.push('\n');
        out
    }
}

/// Sort order for long-form records: ascending E-value, ties broken by
/// target key ascending (`spec.md §9` "Sort stability").
pub fn cmp_by_evalue(a: &AlignmentRecord, b: &AlignmentRecord) -> Ordering {
    a.e_value
        .partial_cmp(&b.e_value)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.target_key.cmp(&b.target_key))
}

/// A short-form hit record, emitted in HAMMING or SUBSTITUTION mode.
///
/// `score` carries the bit score (SUBSTITUTION) or `floor(100 * seqId)`
/// (HAMMING), per `spec.md §3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortHit {
    pub target_key: u32,
    pub score:      i32,
    pub diagonal:   i32,
}

impl ShortHit {
    /// `"%u\t%d\t%d\n"`.
    #[must_use]
    pub fn to_line(&self) -> String {
        format!("{}\t{}\t{}\n", self.target_key, self.score, self.diagonal)
    }
}

/// Sort order for short-form records: descending score, ties broken by
/// target key ascending.
pub fn cmp_short_hit(a: &ShortHit, b: &ShortHit) -> Ordering {
    b.score.cmp(&a.score).then_with(|| a.target_key.cmp(&b.target_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(target_key: u32, e_value: f64) -> AlignmentRecord {
        AlignmentRecord {
            target_key,
            bit_score: 42.0,
            seq_id: 0.9,
            e_value,
            q_start: 0,
            q_end: 9,
            q_len: 10,
            t_start: 0,
            t_end: 9,
            t_len: 10,
            aln_len: 10,
            backtrace: "10M".to_string(),
            global_pvalue: None,
        }
    }

    #[test]
    fn long_form_line_ends_with_backtrace_and_newline() {
        let line = record(7, 1e-10).to_line();
        assert!(line.ends_with("10M\n"));
        assert!(line.starts_with('7'));
    }

    #[test]
    fn long_form_line_appends_global_pvalue_when_present() {
        let mut rec = record(7, 1e-10);
        rec.global_pvalue = Some(0.004);
        let line = rec.to_line();
        assert!(line.contains("4.000e-3") || line.to_lowercase().contains("e-3"));
    }

    #[test]
    fn evalue_sort_breaks_ties_by_key() {
        let mut records = vec![record(5, 1e-5), record(2, 1e-5), record(9, 1e-8)];
        records.sort_by(cmp_by_evalue);
        let keys: Vec<u32> = records.iter().map(|r| r.target_key).collect();
        assert_eq!(keys, vec![9, 2, 5]);
    }

    #[test]
    fn short_hit_sort_is_descending_score_then_ascending_key() {
        let mut hits = vec![
            ShortHit {
                target_key: 3,
                score: 50,
                diagonal: 0,
            },
            ShortHit {
                target_key: 1,
                score: 80,
                diagonal: 0,
            },
            ShortHit {
                target_key: 2,
                score: 80,
                diagonal: 0,
            },
        ];
        hits.sort_by(cmp_short_hit);
        let keys: Vec<u32> = hits.iter().map(|h| h.target_key).collect();
        assert_eq!(keys, vec![1, 2, 3]);
    }

    #[test]
    fn short_hit_line_has_no_decimal_fields() {
        let hit = ShortHit {
            target_key: 4,
            score: -3,
            diagonal: -12,
        };
        assert_eq!(hit.to_line(), "4\t-3\t-12\n");
    }
}
