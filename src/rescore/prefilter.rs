//! Parses a per-query prefilter blob into the candidate hit list that drives
//! rescoring.

/// One candidate target emitted by the upstream k-mer prefilter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefilterHit {
    pub target_key:       u32,
    pub pre_filter_score: i16,
    pub diagonal:         i32,
}

/// Failure parsing a single line of a prefilter blob.
#[derive(Debug, thiserror::Error)]
pub enum PrefilterParseError {
    #[error("prefilter line has fewer than 3 tab-separated fields: {0:?}")]
    TooFewFields(String),
    #[error("prefilter target key is not a valid integer: {0:?}")]
    BadTargetKey(String),
    #[error("prefilter score is not a valid integer: {0:?}")]
    BadScore(String),
    #[error("prefilter diagonal is not a valid integer: {0:?}")]
    BadDiagonal(String),
}

/// Per-query lookup of the raw prefilter blob (`spec.md §1`'s "prefilter
/// result reader" external collaborator).
pub trait PrefilterReader: Sync {
    /// Returns the blob for `query_key`, or `None` if the key has no entry
    /// (treated identically to an empty blob).
    fn blob(&self, query_key: u32) -> Option<&str>;
}

/// An in-memory [`PrefilterReader`] keyed by insertion-order index, used by
/// tests and the file-based demo CLI path.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPrefilterReader {
    blobs: Vec<String>,
}

impl InMemoryPrefilterReader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_blobs(blobs: Vec<String>) -> Self {
        Self { blobs }
    }

    pub fn push(&mut self, blob: String) -> u32 {
        let key = self.blobs.len() as u32;
        self.blobs.push(blob);
        key
    }
}

impl PrefilterReader for InMemoryPrefilterReader {
    fn blob(&self, query_key: u32) -> Option<&str> {
        self.blobs.get(query_key as usize).map(String::as_str)
    }
}

/// Parses a newline-delimited, tab-separated `targetKey\tpreFilterScore\tdiagonal`
/// blob into a list of hits.
///
/// An empty or whitespace-only blob yields an empty list (`spec.md §6`: "empty
/// blob → no hits"), not an error. Blank lines within a non-empty blob are
/// skipped.
///
/// # Errors
///
/// Returns the first line-level parse failure encountered. Per `spec.md §7`
/// ("parse failure in prefilter blob: fail the query record"), callers
/// should treat this as "emit an empty record for this query", not abort the
/// bucket.
pub fn parse_prefilter_hits(blob: &str) -> Result<Vec<PrefilterHit>, PrefilterParseError> {
    let mut hits = Vec::new();
    for line in blob.lines() {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let target_key = fields
            .next()
            .ok_or_else(|| PrefilterParseError::TooFewFields(line.to_string()))?;
        let score = fields
            .next()
            .ok_or_else(|| PrefilterParseError::TooFewFields(line.to_string()))?;
        let diagonal = fields
            .next()
            .ok_or_else(|| PrefilterParseError::TooFewFields(line.to_string()))?;

        hits.push(PrefilterHit {
            target_key: target_key
                .parse()
                .map_err(|_| PrefilterParseError::BadTargetKey(target_key.to_string()))?,
            pre_filter_score: score.parse().map_err(|_| PrefilterParseError::BadScore(score.to_string()))?,
            diagonal: diagonal
                .parse()
                .map_err(|_| PrefilterParseError::BadDiagonal(diagonal.to_string()))?,
        });
    }
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_blob_yields_no_hits() {
        assert_eq!(parse_prefilter_hits("").unwrap(), vec![]);
        assert_eq!(parse_prefilter_hits("   \n\n").unwrap(), vec![]);
    }

    #[test]
    fn parses_well_formed_lines() {
        let blob = "12\t45\t-3\n99\t1\t0\n";
        let hits = parse_prefilter_hits(blob).unwrap();
        assert_eq!(
            hits,
            vec![
                PrefilterHit {
                    target_key:       12,
                    pre_filter_score: 45,
                    diagonal:         -3,
                },
                PrefilterHit {
                    target_key:       99,
                    pre_filter_score: 1,
                    diagonal:         0,
                },
            ]
        );
    }

    #[test]
    fn rejects_malformed_line() {
        let blob = "not_a_number\t1\t0\n";
        assert!(matches!(parse_prefilter_hits(blob), Err(PrefilterParseError::BadTargetKey(_))));
    }

    #[test]
    fn rejects_short_line() {
        let blob = "12\t45\n";
        assert!(matches!(parse_prefilter_hits(blob), Err(PrefilterParseError::TooFewFields(_))));
    }

    #[test]
    fn in_memory_reader_returns_none_for_missing_key() {
        let reader = InMemoryPrefilterReader::new();
        assert_eq!(reader.blob(0), None);
    }

    #[test]
    fn in_memory_reader_round_trips() {
        let mut reader = InMemoryPrefilterReader::new();
        let key = reader.push("12\t45\t-3\n".to_string());
        assert_eq!(reader.blob(key), Some("12\t45\t-3\n"));
    }
}
