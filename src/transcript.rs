use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use crate::Segment;
use crate::timestamp::seconds_to_time_string;

static TIMESTAMP_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\[\d{1,2}:\d{2}(?::\d{2})?\]").unwrap());

const SAMPLE_SIZE: usize = 10;

/// True when at least half of the first few items (and at least one) open
/// with a `[MM:SS]` or `[H:MM:SS]` prefix
pub fn has_timestamp_format(segments: &[Segment]) -> bool {
    if segments.is_empty() {
        return false;
    }
    let sample = SAMPLE_SIZE.min(segments.len());
    let hits = segments[..sample]
        .iter()
        .filter(|s| TIMESTAMP_PREFIX.is_match(s.text.trim()))
        .count();
    hits >= sample.div_ceil(2).max(1)
}

/// Model input: every segment in index order. Timestamped lines stay one per
/// line, plain text is joined with spaces. Nothing is truncated.
pub fn join_for_model(segments: &[Segment]) -> String {
    let separator = if has_timestamp_format(segments) { "\n" } else { " " };
    debug!("Joining {} segments with {:?}", segments.len(), separator);

    let mut ordered: Vec<&Segment> = segments.iter().collect();
    ordered.sort_by_key(|s| s.index);
    ordered
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Prefix each segment's text with its start time, for timestamp mode.
/// Segments that already carry a prefix or have no start are left alone.
pub fn with_timestamps(segments: &[Segment]) -> Vec<Segment> {
    segments
        .iter()
        .map(|s| {
            let mut out = s.clone();
            match s.start {
                Some(start) if !TIMESTAMP_PREFIX.is_match(s.text.trim()) => {
                    out.text = format!("[{}] {}", seconds_to_time_string(start), s.text.trim());
                }
                _ => {}
            }
            out
        })
        .collect()
}

/// Collapse newlines for prompts that quote the transcript inline
pub fn single_line(text: &str) -> String {
    text.split('\n')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(index: usize, text: &str) -> Segment {
        Segment::new(index, text, None)
    }

    #[test]
    fn test_has_timestamp_format() {
        let stamped = vec![seg(1, "[00:01] a"), seg(2, "[1:02:03] b"), seg(3, "c")];
        assert!(has_timestamp_format(&stamped));

        let plain = vec![seg(1, "a"), seg(2, "b"), seg(3, "[00:03] c")];
        assert!(!has_timestamp_format(&plain));

        assert!(has_timestamp_format(&[seg(1, "  [0:10] padded")]));
        assert!(!has_timestamp_format(&[]));
    }

    #[test]
    fn test_half_of_sample_is_enough() {
        // 4 of the first 10 is below ceil(10/2)
        let mut segments: Vec<Segment> = (1..=12).map(|i| seg(i, "plain")).collect();
        for s in segments.iter_mut().take(4) {
            s.text = "[00:00] x".to_string();
        }
        assert!(!has_timestamp_format(&segments));
        segments[4].text = "[00:05] y".to_string();
        assert!(has_timestamp_format(&segments));
    }

    #[test]
    fn test_join_orders_by_index() {
        let segments = vec![seg(3, "three"), seg(1, "one"), seg(2, "two")];
        assert_eq!(join_for_model(&segments), "one two three");
    }

    #[test]
    fn test_join_with_newlines() {
        let segments = vec![seg(2, "[00:05] later"), seg(1, "[00:00] first")];
        assert_eq!(join_for_model(&segments), "[00:00] first\n[00:05] later");
    }

    #[test]
    fn test_with_timestamps() {
        let segments = vec![
            Segment::new(1, " hello ", Some(65.0)),
            Segment::new(2, "[00:10] done", Some(10.0)),
            Segment::new(3, "untimed", None),
        ];
        let stamped = with_timestamps(&segments);
        assert_eq!(stamped[0].text, "[01:05] hello");
        assert_eq!(stamped[1].text, "[00:10] done");
        assert_eq!(stamped[2].text, "untimed");
    }

    #[test]
    fn test_single_line() {
        assert_eq!(single_line("a\n\n b \nc"), "a b c");
    }
}
