//! Prompt construction for summaries, custom instructions and summary edits.

use crate::timestamp::seconds_to_time_string;
use crate::transcript::{join_for_model, single_line, with_timestamps};
use crate::{SummarySettings, Transcript, VideoConfig};

pub const DEFAULT_LANGUAGE: &str = "中文";
pub const DEFAULT_SENTENCE_NUMBER: u32 = 5;
pub const DEFAULT_OUTLINE_LEVEL: u32 = 1;

/// Edit applied to an existing summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditAction {
    #[default]
    Polish,
    Rewrite,
}

fn language(settings: &SummarySettings) -> &str {
    settings
        .output_language
        .as_deref()
        .filter(|l| !l.trim().is_empty())
        .unwrap_or(DEFAULT_LANGUAGE)
}

fn duration_line(duration: Option<f64>) -> String {
    match duration.filter(|d| *d > 0.0) {
        Some(d) => format!(
            "视频时长为 {}，所有时间点都不能超过这个时长。\n",
            seconds_to_time_string(d)
        ),
        None => String::new(),
    }
}

fn emoji_rule(settings: &SummarySettings) -> &'static str {
    if settings.show_emoji.unwrap_or(true) {
        "每个要点以一个合适的 emoji 开头"
    } else {
        "不要使用 emoji"
    }
}

fn header(title: &str, transcript: &str) -> String {
    let title = single_line(title);
    format!("标题: \"{title}\"\n视频字幕:\n\"\"\"\n{transcript}\n\"\"\"\n\n")
}

/// Structured summary with an untimed highlight list
pub fn structured_summary(title: &str, transcript: &str, settings: &SummarySettings, duration: Option<f64>) -> String {
    let language = language(settings);
    let sentences = settings.sentence_number.unwrap_or(DEFAULT_SENTENCE_NUMBER);
    let outline = settings.outline_level.unwrap_or(DEFAULT_OUTLINE_LEVEL);

    format!(
        "{header}你是一名专业的视频内容分析师。请根据上面的视频字幕，用{language}输出一份结构化总结。\n\
         {duration}\n\
         请严格按照以下 Markdown 格式输出：\n\n\
         ## 摘要\n\
         用一段话概括视频的核心内容。\n\n\
         ## 亮点\n\
         - 列出最多 {sentences} 个要点，{emoji}，大纲层级不超过 {outline} 级\n\n\
         ## 思考\n\
         1. 提出 3 个值得进一步思考的问题，并给出简短回答\n\n\
         ## 术语解释\n\
         - 解释视频中出现的专业术语（如果没有可省略本节）\n",
        header = header(title, transcript),
        duration = duration_line(duration),
        emoji = emoji_rule(settings),
    )
}

/// Structured summary whose highlights are tied to `- MM:SS - text` timestamps
pub fn structured_summary_with_timestamps(
    title: &str,
    transcript: &str,
    settings: &SummarySettings,
    duration: Option<f64>,
) -> String {
    let language = language(settings);
    let sentences = settings.sentence_number.unwrap_or(DEFAULT_SENTENCE_NUMBER);

    format!(
        "{header}你是一名专业的视频内容分析师。上面的字幕每行以 [MM:SS] 形式的时间戳开头。\
         请用{language}输出一份带时间点的结构化总结。\n\
         {duration}\n\
         请严格按照以下 Markdown 格式输出：\n\n\
         ## 摘要\n\
         用一段话概括视频的核心内容。\n\n\
         ## 亮点\n\
         - MM:SS - 要点内容\n\
         （最多 {sentences} 个要点，每行必须以字幕中真实出现过的时间点开头，按时间顺序排列，{emoji}）\n\n\
         ## 思考\n\
         1. 提出 3 个值得进一步思考的问题，并给出简短回答\n\n\
         ## 术语解释\n\
         - 解释视频中出现的专业术语（如果没有可省略本节）\n",
        header = header(title, transcript),
        duration = duration_line(duration),
        emoji = emoji_rule(settings),
    )
}

/// The caller's own instructions applied to the transcript
pub fn custom(title: &str, transcript: &str, instructions: &str) -> String {
    format!(
        "Title: \"{}\"\nTranscript: \"{}\"\n\nInstructions: {}",
        single_line(title),
        single_line(transcript),
        instructions.trim()
    )
}

/// Pick the prompt for a summary request
pub fn summary_prompt(
    title: &str,
    transcript: &str,
    settings: &SummarySettings,
    custom_prompt: Option<&str>,
    show_timestamp: bool,
    duration: Option<f64>,
) -> String {
    match custom_prompt.filter(|p| !p.trim().is_empty()) {
        Some(instructions) => custom(title, transcript, instructions),
        None if show_timestamp => structured_summary_with_timestamps(title, transcript, settings, duration),
        None => structured_summary(title, transcript, settings, duration),
    }
}

/// Summary prompt for a fetched transcript. Timestamp mode prefixes each
/// segment with its start time before joining.
pub fn for_transcript(transcript: &Transcript, video: &VideoConfig, show_timestamp: bool) -> String {
    let text = if show_timestamp {
        join_for_model(&with_timestamps(&transcript.segments))
    } else {
        join_for_model(&transcript.segments)
    };
    summary_prompt(
        &transcript.title,
        &text,
        &video.settings,
        video.custom_prompt.as_deref(),
        show_timestamp,
        transcript.duration,
    )
}

pub fn edit_prompt(action: EditAction, summary: &str, language: Option<&str>) -> String {
    let language = language.filter(|l| !l.trim().is_empty()).unwrap_or(DEFAULT_LANGUAGE);
    let (role, task, third, verb) = match action {
        EditAction::Polish => (
            "专业的文本编辑",
            "进行润色，使其更加流畅、专业、易读。保持原有的结构和格式，只优化文字表达",
            "优化语言表达，使其更加流畅自然",
            "润色",
        ),
        EditAction::Rewrite => (
            "专业的内容创作者",
            "进行改写，用不同的表达方式重新组织内容，使其更加生动有趣",
            "用不同的表达方式重新组织内容",
            "改写",
        ),
    };
    format!(
        "你是一名{role}。请对以下视频总结内容{task}。\n\n\
         要求：\n\
         1. 保持原有的markdown格式和结构（包括标题、列表等）\n\
         2. 保持所有时间戳不变\n\
         3. {third}\n\
         4. 保持内容的准确性和完整性\n\
         5. 使用{language}语言\n\n\
         以下是需要{verb}的内容：\n\n\
         {summary}"
    )
}

/// Token budget: the caller's detail level when set, otherwise a larger
/// budget for callers paying with their own key
pub fn max_tokens(settings: &SummarySettings, has_user_key: bool) -> u32 {
    match settings.detail_level.filter(|d| *d > 0) {
        Some(level) => level,
        None if has_user_key => 2000,
        None => 1500,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_tokens() {
        let mut settings = SummarySettings::default();
        assert_eq!(max_tokens(&settings, true), 2000);
        assert_eq!(max_tokens(&settings, false), 1500);
        settings.detail_level = Some(800);
        assert_eq!(max_tokens(&settings, false), 800);
        settings.detail_level = Some(0);
        assert_eq!(max_tokens(&settings, false), 1500);
    }

    #[test]
    fn test_structured_summary_defaults() {
        let prompt = structured_summary("My\nTitle", "some words", &SummarySettings::default(), None);
        assert!(prompt.starts_with("标题: \"My Title\""));
        assert!(prompt.contains("用中文输出"));
        assert!(prompt.contains("最多 5 个要点"));
        assert!(prompt.contains("emoji 开头"));
        assert!(prompt.contains("## 术语解释"));
        assert!(!prompt.contains("视频时长"));
    }

    #[test]
    fn test_structured_summary_settings() {
        let settings = SummarySettings {
            sentence_number: Some(3),
            outline_level: Some(2),
            output_language: Some("English".to_string()),
            show_emoji: Some(false),
            ..Default::default()
        };
        let prompt = structured_summary("t", "x", &settings, Some(1208.0));
        assert!(prompt.contains("用English输出"));
        assert!(prompt.contains("最多 3 个要点"));
        assert!(prompt.contains("不超过 2 级"));
        assert!(prompt.contains("不要使用 emoji"));
        assert!(prompt.contains("视频时长为 20:08"));
    }

    #[test]
    fn test_timestamp_prompt_format() {
        let prompt = structured_summary_with_timestamps("t", "[00:01] x", &SummarySettings::default(), None);
        assert!(prompt.contains("- MM:SS - 要点内容"));
    }

    #[test]
    fn test_custom_prompt() {
        let prompt = custom("T", "line one\nline two", "  list the jokes ");
        assert_eq!(prompt, "Title: \"T\"\nTranscript: \"line one line two\"\n\nInstructions: list the jokes");
    }

    #[test]
    fn test_summary_prompt_selection() {
        let settings = SummarySettings::default();
        let p = summary_prompt("t", "x", &settings, Some("do it"), true, None);
        assert!(p.starts_with("Title:"));
        let p = summary_prompt("t", "x", &settings, Some("   "), true, None);
        assert!(p.contains("- MM:SS - 要点内容"));
        let p = summary_prompt("t", "x", &settings, None, false, None);
        assert!(!p.contains("MM:SS - 要点内容"));
    }

    #[test]
    fn test_for_transcript_timestamp_mode() {
        use crate::{Segment, TranscriptSource, VideoService};

        let transcript = Transcript {
            video_id: "BV1".to_string(),
            service: VideoService::Bilibili,
            title: "T".to_string(),
            source: TranscriptSource::Subtitle,
            segments: vec![Segment::new(1, "first", Some(0.0)), Segment::new(2, "second", Some(75.0))],
            description: None,
            duration: Some(80.0),
        };
        let video = VideoConfig::default();

        let stamped = for_transcript(&transcript, &video, true);
        assert!(stamped.contains("[00:00] first\n[01:15] second"));
        assert!(stamped.contains("视频时长为 01:20"));

        let plain = for_transcript(&transcript, &video, false);
        assert!(plain.contains("first second"));
    }

    #[test]
    fn test_edit_prompts() {
        let polish = edit_prompt(EditAction::Polish, "## 摘要", None);
        assert!(polish.contains("润色"));
        assert!(polish.contains("使用中文语言"));
        assert!(polish.ends_with("## 摘要"));

        let rewrite = edit_prompt(EditAction::Rewrite, "s", Some("English"));
        assert!(rewrite.contains("改写"));
        assert!(rewrite.contains("使用English语言"));
    }

    #[test]
    fn test_edit_action_serde() {
        let action: EditAction = serde_json::from_str("\"rewrite\"").unwrap();
        assert_eq!(action, EditAction::Rewrite);
    }
}
