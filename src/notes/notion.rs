use eyre::Result;
use log::info;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{NoteError, check_response, source_line};

const PAGES_URL: &str = "https://api.notion.com/v1/pages";
const NOTION_VERSION: &str = "2022-06-28";

/// Notion caps a single rich-text item at this many characters
const MAX_TEXT_CHARS: usize = 2000;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotionNote {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub database_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub video_url: String,
}

/// Split on char boundaries into pieces of at most `max` chars
fn chunk_chars(text: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(max).map(|c| c.iter().collect()).collect()
}

fn paragraph(text: &str) -> Value {
    json!({
        "object": "block",
        "type": "paragraph",
        "paragraph": {
            "rich_text": [{"type": "text", "text": {"content": text}}]
        }
    })
}

pub fn page_body(note: &NotionNote) -> Value {
    let mut children: Vec<Value> = chunk_chars(&note.content, MAX_TEXT_CHARS)
        .iter()
        .map(|chunk| paragraph(chunk))
        .collect();
    children.push(paragraph(&source_line(&note.video_url)));

    json!({
        "parent": {"database_id": note.database_id},
        "properties": {
            "title": {"title": [{"text": {"content": note.title}}]}
        },
        "children": children,
    })
}

/// Create a page in the user's database; returns the new page id
pub async fn save(client: &reqwest::Client, note: &NotionNote) -> Result<String> {
    if note.token.is_empty() || note.database_id.is_empty() || note.title.is_empty() || note.content.is_empty() {
        return Err(NoteError::Invalid("Missing required fields".to_string()).into());
    }

    let resp = client
        .post(PAGES_URL)
        .bearer_auth(&note.token)
        .header("Notion-Version", NOTION_VERSION)
        .json(&page_body(note))
        .send()
        .await?;

    let json = check_response(resp, "Failed to create Notion page").await?;
    let page_id = json.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
    info!("Created Notion page {page_id}");
    Ok(page_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(content: &str) -> NotionNote {
        NotionNote {
            token: "secret".to_string(),
            database_id: "db".to_string(),
            title: "视频总结".to_string(),
            content: content.to_string(),
            video_url: "https://www.bilibili.com/video/BV1".to_string(),
        }
    }

    #[test]
    fn test_chunk_chars_respects_boundaries() {
        let text = "总".repeat(4500);
        let chunks = chunk_chars(&text, MAX_TEXT_CHARS);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 2000);
        assert_eq!(chunks[2].chars().count(), 500);
        assert!(chunk_chars("", MAX_TEXT_CHARS).is_empty());
    }

    #[test]
    fn test_page_body() {
        let body = page_body(&note("## 摘要\nhello"));
        assert_eq!(body["parent"]["database_id"], "db");
        assert_eq!(body["properties"]["title"]["title"][0]["text"]["content"], "视频总结");
        let children = body["children"].as_array().unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0]["paragraph"]["rich_text"][0]["text"]["content"], "## 摘要\nhello");
        assert_eq!(
            children[1]["paragraph"]["rich_text"][0]["text"]["content"],
            "原视频：https://www.bilibili.com/video/BV1"
        );
    }

    #[test]
    fn test_long_content_gets_several_blocks() {
        let body = page_body(&note(&"a".repeat(4001)));
        assert_eq!(body["children"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_missing_fields() {
        let client = reqwest::Client::new();
        let mut n = note("x");
        n.token.clear();
        let err = save(&client, &n).await.unwrap_err();
        assert_eq!(err.downcast_ref::<NoteError>().unwrap().status(), 400);
    }
}
