use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use eyre::{Result, WrapErr};
use log::info;

/// Markdown note ready to drop into an Obsidian vault
pub fn document(note: &str, video_url: &str, generated: DateTime<Local>) -> String {
    format!(
        "# 视频总结\n\n{note}\n\n---\n\n**原视频链接：** [{video_url}]({video_url})\n\n\
         **生成时间：** {}\n\n**标签：** #BibiGPT #视频总结\n",
        generated.format("%Y-%m-%d %H:%M:%S")
    )
}

/// `BibiGPT-<date>-<last url segment>`, without extension
pub fn file_name(video_url: &str, generated: DateTime<Local>) -> String {
    let segment = url::Url::parse(video_url)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.rfind(|s| !s.is_empty()).map(String::from))
        })
        .unwrap_or_else(|| {
            video_url
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string()
        });
    let segment: String = segment
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .collect();
    let segment = if segment.is_empty() { "video".to_string() } else { segment };
    format!("BibiGPT-{}-{segment}", generated.format("%Y-%m-%d"))
}

/// Write the note into `dir` and return the file path
pub fn write(dir: &Path, note: &str, video_url: &str) -> Result<PathBuf> {
    let now = Local::now();
    std::fs::create_dir_all(dir).wrap_err("Failed to create note directory")?;
    let path = dir.join(format!("{}.md", file_name(video_url, now)));
    std::fs::write(&path, document(note, video_url, now))
        .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote Obsidian note {}", path.display());
    Ok(path)
}
