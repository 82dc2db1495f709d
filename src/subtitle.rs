use std::sync::LazyLock;

use eyre::{Result, bail};
use log::{debug, warn};
use regex::Regex;
use serde_json::Value;

use crate::Segment;

static CUE_TIMING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:(\d{1,2}):)?(\d{2}):(\d{2})[,.](\d{3})\s*-->\s*(?:\d{1,2}:)?\d{2}:\d{2}[,.]\d{3}").unwrap()
});
static SRT_BLOCK_GAP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());
static INLINE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static CLOCK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+):(\d+):(\d+)[.,](\d+)").unwrap());

/// Parse a subtitle file. `format` is the file extension when known;
/// otherwise the format is sniffed from the content.
pub fn parse_subtitle(content: &str, format: Option<&str>) -> Vec<Segment> {
    match format.map(|f| f.to_lowercase()).as_deref() {
        Some("srt") => return parse_srt(content),
        Some("vtt") | Some("webvtt") => return parse_vtt(content),
        Some("json") | Some("json3") => return parse_json(content),
        _ => {}
    }

    let trimmed = content.trim_start_matches('\u{feff}').trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return parse_json(content);
    }
    if trimmed.starts_with("WEBVTT") {
        return parse_vtt(content);
    }
    debug!("Subtitle format not given, parsing as SRT");
    parse_srt(content)
}

fn cue_start(line: &str) -> Option<f64> {
    let caps = CUE_TIMING.captures(line)?;
    let hours: f64 = caps.get(1).map_or(Some(0.0), |h| h.as_str().parse().ok())?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    let millis: f64 = caps[4].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds + millis / 1000.0)
}

fn clean_line(line: &str) -> String {
    let stripped = INLINE_TAG.replace_all(line, "");
    html_escape::decode_html_entities(stripped.trim()).to_string()
}

fn push_cue(segments: &mut Vec<Segment>, start: f64, lines: &[String]) {
    let text = lines.join(" ");
    if text.is_empty() {
        return;
    }
    // auto-generated tracks repeat the previous cue while it scrolls
    if segments.last().is_some_and(|prev| prev.text == text) {
        return;
    }
    segments.push(Segment::new(segments.len() + 1, text, Some(start)));
}

fn parse_srt(content: &str) -> Vec<Segment> {
    let normalized = content.replace("\r\n", "\n");
    let mut segments = Vec::new();

    for block in SRT_BLOCK_GAP.split(normalized.trim()) {
        let lines: Vec<&str> = block.trim().lines().collect();
        let Some(pos) = lines.iter().position(|l| l.contains("-->")) else {
            continue;
        };
        let Some(start) = cue_start(lines[pos]) else {
            continue;
        };
        let text: Vec<String> = lines[pos + 1..]
            .iter()
            .map(|l| clean_line(l))
            .filter(|l| !l.is_empty())
            .collect();
        push_cue(&mut segments, start, &text);
    }

    segments
}

fn parse_vtt(content: &str) -> Vec<Segment> {
    let normalized = content.replace("\r\n", "\n");
    let lines: Vec<&str> = normalized.lines().map(str::trim).collect();
    let mut segments = Vec::new();
    let mut current: Option<(f64, Vec<String>)> = None;
    let mut in_block_header = false;

    for (i, line) in lines.iter().enumerate() {
        if line.is_empty() {
            in_block_header = false;
            continue;
        }
        // header blocks open only after a blank line, never right after cue timing or text
        let block_start = i == 0 || lines[i - 1].is_empty();
        if block_start
            && ["WEBVTT", "STYLE", "NOTE", "REGION"].iter().any(|kw| line.starts_with(kw))
        {
            in_block_header = true;
            continue;
        }
        if in_block_header {
            continue;
        }

        if line.contains("-->") {
            if let Some((start, text)) = current.take() {
                push_cue(&mut segments, start, &text);
            }
            current = cue_start(line).map(|start| (start, Vec::new()));
            continue;
        }

        // cue identifier line
        if lines.get(i + 1).is_some_and(|next| next.contains("-->")) {
            continue;
        }

        if let Some((_, ref mut text)) = current {
            let cleaned = clean_line(line);
            if !cleaned.is_empty() {
                text.push(cleaned);
            }
        }
    }

    if let Some((start, text)) = current {
        push_cue(&mut segments, start, &text);
    }

    segments
}

fn parse_json(content: &str) -> Vec<Segment> {
    let data: Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse JSON subtitle: {e}");
            return Vec::new();
        }
    };

    let mut segments = Vec::new();
    let mut push = |start: f64, text: &str| {
        let text = text.trim();
        if !text.is_empty() {
            segments.push(Segment::new(segments.len() + 1, text, Some(start)));
        }
    };

    if let Some(items) = data.as_array() {
        for item in items {
            let Some(text) = item.get("text").and_then(Value::as_str) else {
                continue;
            };
            if let Some(start) = item.get("start").and_then(Value::as_f64) {
                push(start, text);
            } else if let Some(start) = item.get("startTime").and_then(Value::as_str).and_then(parse_clock) {
                push(start, text);
            }
        }
    } else if let Some(events) = data.get("events").and_then(Value::as_array) {
        // YouTube json3: { events: [{ tStartMs, segs: [{ utf8 }] }] }
        for event in events {
            let (Some(start_ms), Some(segs)) = (
                event.get("tStartMs").and_then(Value::as_f64),
                event.get("segs").and_then(Value::as_array),
            ) else {
                continue;
            };
            let text: String = segs
                .iter()
                .filter_map(|s| s.get("utf8").and_then(Value::as_str))
                .collect();
            push(start_ms / 1000.0, &text);
        }
    } else if let Some(body) = data.get("body").and_then(Value::as_array) {
        // Bilibili: { body: [{ from, to, content }] }
        for item in body {
            let (Some(from), Some(text)) = (
                item.get("from").and_then(Value::as_f64),
                item.get("content").and_then(Value::as_str),
            ) else {
                continue;
            };
            push(from, text);
        }
    }

    segments
}

fn parse_clock(s: &str) -> Option<f64> {
    let caps = CLOCK.captures(s)?;
    let h: f64 = caps[1].parse().ok()?;
    let m: f64 = caps[2].parse().ok()?;
    let sec: f64 = caps[3].parse().ok()?;
    let frac: f64 = format!("0.{}", &caps[4]).parse().ok()?;
    Some(h * 3600.0 + m * 60.0 + sec + frac)
}

/// Parse YouTube's timedtext XML (`<text start=".." dur="..">`)
pub fn parse_timedtext_xml(xml: &str) -> Result<Vec<Segment>> {
    use quick_xml::Reader;
    use quick_xml::events::Event;

    let mut reader = Reader::from_str(xml);
    let mut segments = Vec::new();
    let mut current_start: Option<f64> = None;
    let mut current_dur: Option<f64> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"text" => {
                let mut start = None;
                let mut dur = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"start" => {
                            start = String::from_utf8_lossy(&attr.value).parse::<f64>().ok();
                        }
                        b"dur" => {
                            dur = String::from_utf8_lossy(&attr.value).parse::<f64>().ok();
                        }
                        _ => {}
                    }
                }
                current_start = start;
                current_dur = dur;
            }
            Ok(Event::Text(ref e)) => {
                if let Some(start) = current_start.take() {
                    let raw_text = e.unescape().unwrap_or_default().to_string();
                    let text = html_escape::decode_html_entities(&raw_text).trim().to_string();
                    if !text.is_empty() {
                        let mut segment = Segment::new(segments.len() + 1, text, Some(start));
                        segment.duration = current_dur.take();
                        segments.push(segment);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => bail!("error parsing caption XML: {e}"),
            _ => {}
        }
    }

    Ok(segments)
}
