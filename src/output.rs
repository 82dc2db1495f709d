use eyre::Result;

use crate::Transcript;
use crate::timestamp::seconds_to_time_string;

/// Render transcript as plain text (one segment per line, no timestamps)
pub fn render_text(transcript: &Transcript) -> String {
    transcript
        .segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Same as text, but each line is prefixed with `[MM:SS]` when known
pub fn render_timestamped(transcript: &Transcript) -> String {
    transcript
        .segments
        .iter()
        .map(|s| match s.start {
            Some(start) => format!("[{}] {}", seconds_to_time_string(start), s.text),
            None => s.text.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_json(transcript: &Transcript) -> Result<String> {
    Ok(serde_json::to_string_pretty(transcript)?)
}

/// SRT cues; segments without a start time are skipped, a missing duration
/// runs until the next cue
pub fn render_srt(transcript: &Transcript) -> String {
    let timed: Vec<_> = transcript.segments.iter().filter(|s| s.start.is_some()).collect();
    let mut out = String::new();
    for (i, seg) in timed.iter().enumerate() {
        let start = seg.start.unwrap_or(0.0);
        let end = match seg.duration {
            Some(d) => start + d,
            None => timed.get(i + 1).and_then(|n| n.start).unwrap_or(start + 2.0),
        };
        out.push_str(&format!("{}\n{} --> {}\n{}\n\n", i + 1, srt_clock(start), srt_clock(end), seg.text));
    }
    out.trim_end().to_string()
}

fn srt_clock(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let s = total_ms / 1000;
    format!("{:02}:{:02}:{:02},{ms:03}", s / 3600, (s % 3600) / 60, s % 60)
}
