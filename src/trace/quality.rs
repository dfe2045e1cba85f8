// ABOUTME: Phred-based quality trimming for trace-derived sequences
// ABOUTME: Implements end trimming by quality windows and bad-stretch masking

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{Result, TraceError};
use super::record::SeqRecord;

/// A "good end" requirement: a window of `of` consecutive bases must
/// contain at least `good` bases at or above the phred floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EndRatio {
    pub good: usize,
    pub of: usize,
}

impl Default for EndRatio {
    fn default() -> Self {
        Self { good: 3, of: 4 }
    }
}

impl FromStr for EndRatio {
    type Err = TraceError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || TraceError::InvalidEndRatio {
            input: s.to_string(),
        };
        let (good, of) = s.trim().split_once('/').ok_or_else(invalid)?;
        let good: usize = good.trim().parse().map_err(|_| invalid())?;
        let of: usize = of.trim().parse().map_err(|_| invalid())?;
        if good == 0 || of == 0 || good > of {
            return Err(invalid());
        }
        Ok(Self { good, of })
    }
}

impl TryFrom<String> for EndRatio {
    type Error = TraceError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EndRatio> for String {
    fn from(ratio: EndRatio) -> Self {
        ratio.to_string()
    }
}

impl fmt::Display for EndRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.good, self.of)
    }
}

/// Trim low-quality ends off a record. The kept range starts at the
/// first window satisfying `ratio` and ends at the last one, so both
/// ends of the result open with confidently called bases. Records
/// without any satisfying window are rejected.
pub fn trim_ends(record: &SeqRecord, min_phred: u8, ratio: EndRatio) -> Result<SeqRecord> {
    let quals = record.quals.as_ref().ok_or(TraceError::NoQualities)?;
    let n = quals.len();

    let window_ok = |start: usize| -> bool {
        let end = (start + ratio.of).min(n);
        quals[start..end].iter().filter(|&&q| q >= min_phred).count() >= ratio.good
    };

    let mut start = None;
    for i in 0..n.saturating_sub(ratio.of - 1) {
        if window_ok(i) {
            start = Some(i);
            break;
        }
    }
    let mut start = start.ok_or(TraceError::NoGoodWindow {
        good: ratio.good,
        of: ratio.of,
        min_phred,
    })?;
    // the window may still open on a bad call; advance to the first good one
    while start < n && quals[start] < min_phred {
        start += 1;
    }

    // walk the last window back until its first base clears the floor,
    // so the trimmed sequence also ends on a good call
    let mut end = n;
    for i in (start..=n.saturating_sub(ratio.of)).rev() {
        if window_ok(i) {
            end = (i + ratio.of).min(n);
            while end > start && quals[end - 1] < min_phred {
                end -= 1;
            }
            break;
        }
    }

    Ok(SeqRecord::with_quals(
        record.id.clone(),
        record.seq[start..end].to_vec(),
        quals[start..end].to_vec(),
    ))
}

/// Replace every run of at least `bad_stretch` consecutive bases below
/// the phred floor with Ns of equal length.
pub fn mark_bad_stretches(record: &SeqRecord, min_phred: u8, bad_stretch: usize) -> SeqRecord {
    let quals = match record.quals.as_ref() {
        Some(quals) => quals,
        None => return record.clone(),
    };

    let mut seq = record.seq.clone();
    let mut run_start = None;
    for i in 0..=quals.len() {
        let is_bad = i < quals.len() && quals[i] < min_phred;
        match (run_start, is_bad) {
            (None, true) => run_start = Some(i),
            (Some(start), false) => {
                if i - start >= bad_stretch {
                    for base in seq[start..i].iter_mut() {
                        *base = b'N';
                    }
                }
                run_start = None;
            }
            _ => {}
        }
    }

    SeqRecord::with_quals(record.id.clone(), seq, quals.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(seq: &[u8], quals: &[u8]) -> SeqRecord {
        SeqRecord::with_quals("test", seq.to_vec(), quals.to_vec())
    }

    #[test]
    fn test_end_ratio_parsing() {
        let ratio: EndRatio = "3/4".parse().unwrap();
        assert_eq!(ratio, EndRatio { good: 3, of: 4 });

        assert!("4/3".parse::<EndRatio>().is_err());
        assert!("0/4".parse::<EndRatio>().is_err());
        assert!("abc".parse::<EndRatio>().is_err());
        assert!("3".parse::<EndRatio>().is_err());
    }

    #[test]
    fn test_trim_ends_cuts_low_quality_flanks() {
        // 3 bad, 6 good, 3 bad
        let quals = [5, 5, 5, 40, 40, 40, 40, 40, 40, 5, 5, 5];
        let rec = record(b"ACGTACGTACGT", &quals);

        let trimmed = trim_ends(&rec, 30, EndRatio { good: 3, of: 4 }).unwrap();
        assert_eq!(trimmed.seq, b"TACGTA".to_vec());
        assert!(trimmed.quals.unwrap().iter().all(|&q| q >= 30));
    }

    #[test]
    fn test_trim_ends_rejects_hopeless_record() {
        let rec = record(b"ACGTACGT", &[10, 10, 10, 10, 10, 10, 10, 10]);
        match trim_ends(&rec, 30, EndRatio::default()) {
            Err(TraceError::NoGoodWindow { .. }) => {}
            other => panic!("expected NoGoodWindow, got {:?}", other),
        }
    }

    #[test]
    fn test_trim_ends_requires_quals() {
        let rec = SeqRecord::new("ref", b"ACGT".to_vec());
        assert!(matches!(
            trim_ends(&rec, 30, EndRatio::default()),
            Err(TraceError::NoQualities)
        ));
    }

    #[test]
    fn test_trim_ends_keeps_clean_record_whole() {
        let rec = record(b"ACGTACGT", &[40; 8]);
        let trimmed = trim_ends(&rec, 30, EndRatio::default()).unwrap();
        assert_eq!(trimmed.seq, b"ACGTACGT".to_vec());
    }

    #[test]
    fn test_mark_bad_stretches_masks_long_runs() {
        // 5-long bad run masked, 2-long left alone
        let quals = [40, 5, 5, 5, 5, 5, 40, 5, 5, 40];
        let rec = record(b"AAAAAAAAAA", &quals);

        let marked = mark_bad_stretches(&rec, 30, 5);
        assert_eq!(marked.seq, b"ANNNNNAAAA".to_vec());
    }

    #[test]
    fn test_mark_bad_stretches_masks_trailing_run() {
        let quals = [40, 40, 5, 5, 5];
        let rec = record(b"AAAAA", &quals);

        let marked = mark_bad_stretches(&rec, 30, 3);
        assert_eq!(marked.seq, b"AANNN".to_vec());
    }
}
