use std::sync::LazyLock;

use log::warn;
use regex::Regex;

static SENTENCE_WITH_TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\s*(\d{1,2}:\d{2}(?::\d{2})?)\s*-\s*(.*)").unwrap());
static FOUR_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}$").unwrap());

/// `MM:SS` below an hour, `H:MM:SS` above; zero and negatives give `00:00`
pub fn seconds_to_time_string(seconds: f64) -> String {
    if seconds.is_nan() || seconds <= 0.0 {
        return "00:00".to_string();
    }
    let total = seconds.floor() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

/// Parses `MM:SS`, `HH:MM:SS` and the compact `MMSS` form
pub fn time_string_to_seconds(time: &str) -> Option<u64> {
    let time = time.trim();
    if FOUR_DIGITS.is_match(time) {
        let minutes: u64 = time[..2].parse().ok()?;
        let seconds: u64 = time[2..].parse().ok()?;
        return Some(minutes * 60 + seconds);
    }

    let parts: Vec<u64> = time
        .split(':')
        .map(|p| p.trim().parse())
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [m, s] => Some(m * 60 + s),
        [h, m, s] => Some(h * 3600 + m * 60 + s),
        _ => None,
    }
}

/// Keeps a timestamp inside the video. Past the end it is either pulled back
/// to the last second (`auto_fix`) or dropped. Without a known duration every
/// timestamp passes.
pub fn validate_and_fix_timestamp(timestamp: &str, max_duration: Option<f64>, auto_fix: bool) -> Option<String> {
    if timestamp.is_empty() {
        return None;
    }
    let Some(max) = max_duration.filter(|d| *d > 0.0) else {
        return Some(timestamp.to_string());
    };
    let Some(seconds) = time_string_to_seconds(timestamp) else {
        return Some(timestamp.to_string());
    };

    if seconds as f64 > max {
        if auto_fix {
            warn!("Timestamp {timestamp} ({seconds}s) is past the video end ({max}s), clamping");
            return Some(seconds_to_time_string(max));
        }
        warn!("Timestamp {timestamp} ({seconds}s) is past the video end ({max}s), dropping");
        return None;
    }
    Some(timestamp.to_string())
}

/// Splits a highlight line like `- 0:10 - text` into its timestamp and text
pub fn extract_sentence_with_timestamp(sentence: &str) -> Option<(String, String)> {
    let caps = SENTENCE_WITH_TIMESTAMP.captures(sentence)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

/// Rewrites every highlight timestamp in a summary so none points past the
/// end of the video
pub fn clamp_summary_timestamps(summary: &str, duration: Option<f64>) -> String {
    if duration.is_none() {
        return summary.to_string();
    }
    summary
        .lines()
        .map(|line| {
            let Some((ts, _)) = extract_sentence_with_timestamp(line) else {
                return line.to_string();
            };
            match validate_and_fix_timestamp(&ts, duration, true) {
                Some(fixed) if fixed != ts => line.replacen(&ts, &fixed, 1),
                _ => line.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_to_time_string() {
        assert_eq!(seconds_to_time_string(0.0), "00:00");
        assert_eq!(seconds_to_time_string(-5.0), "00:00");
        assert_eq!(seconds_to_time_string(1208.7), "20:08");
        assert_eq!(seconds_to_time_string(4808.0), "1:20:08");
        assert_eq!(seconds_to_time_string(f64::NAN), "00:00");
    }

    #[test]
    fn test_time_string_to_seconds() {
        assert_eq!(time_string_to_seconds("20:08"), Some(1208));
        assert_eq!(time_string_to_seconds("1:20:08"), Some(4808));
        assert_eq!(time_string_to_seconds("0830"), Some(510));
        assert_eq!(time_string_to_seconds("abc"), None);
        assert_eq!(time_string_to_seconds("1:2:3:4"), None);
    }

    #[test]
    fn test_validate_and_fix_timestamp() {
        assert_eq!(validate_and_fix_timestamp("23:50", Some(1200.0), true).as_deref(), Some("20:00"));
        assert_eq!(validate_and_fix_timestamp("23:50", Some(1200.0), false), None);
        assert_eq!(validate_and_fix_timestamp("10:00", Some(1200.0), false).as_deref(), Some("10:00"));
        assert_eq!(validate_and_fix_timestamp("99:00", None, false).as_deref(), Some("99:00"));
        assert_eq!(validate_and_fix_timestamp("", Some(10.0), true), None);
    }

    #[test]
    fn test_extract_sentence_with_timestamp() {
        let (ts, text) = extract_sentence_with_timestamp("- 0:10 - 开场介绍").unwrap();
        assert_eq!(ts, "0:10");
        assert_eq!(text, "开场介绍");

        let (ts, _) = extract_sentence_with_timestamp("1:02:03 - deep dive").unwrap();
        assert_eq!(ts, "1:02:03");

        assert!(extract_sentence_with_timestamp("- no timestamp here").is_none());
    }

    #[test]
    fn test_clamp_summary_timestamps() {
        let summary = "## 摘要\n内容\n- 01:00 - 开始\n- 25:00 - 超出";
        let clamped = clamp_summary_timestamps(summary, Some(1200.0));
        assert_eq!(clamped, "## 摘要\n内容\n- 01:00 - 开始\n- 20:00 - 超出");
        assert_eq!(clamp_summary_timestamps(summary, None), summary);
    }
}
