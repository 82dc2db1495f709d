//! Render a finished summary as a downloadable document.

use std::sync::LazyLock;

use regex::Regex;

static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static ORDERED_ITEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.\s+(.*)$").unwrap());

const WORD_STYLE: &str = "body { font-family: 'Arial', sans-serif; line-height: 1.5; color: #333; }
h1 { font-size: 24px; font-weight: bold; margin-bottom: 16px; }
h2 { font-size: 20px; font-weight: bold; margin-bottom: 12px; margin-top: 24px; }
h3 { font-size: 18px; font-weight: bold; margin-bottom: 8px; margin-top: 16px; }
p { margin-bottom: 12px; }
ul, ol { margin-bottom: 12px; padding-left: 24px; }
li { margin-bottom: 4px; }
a { color: #0066cc; text-decoration: none; }";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Markdown,
    Word,
    MindMap,
}

pub fn render(format: ExportFormat, title: &str, summary: &str) -> String {
    match format {
        ExportFormat::Markdown => markdown(title, summary),
        ExportFormat::Word => word_html(title, summary),
        ExportFormat::MindMap => mind_map_html(title, summary),
    }
}

pub fn markdown(title: &str, summary: &str) -> String {
    let title = title.trim();
    if title.is_empty() || summary.trim_start().starts_with("# ") {
        return summary.to_string();
    }
    format!("# {title}\n\n{summary}")
}

fn inline(text: &str) -> String {
    let escaped = html_escape::encode_text(text);
    BOLD.replace_all(&escaped, "<strong>$1</strong>").into_owned()
}

#[derive(PartialEq)]
enum List {
    None,
    Bullet,
    Ordered,
}

fn close_list(html: &mut String, list: &mut List) {
    match list {
        List::Bullet => html.push_str("</ul>\n"),
        List::Ordered => html.push_str("</ol>\n"),
        List::None => {}
    }
    *list = List::None;
}

fn open_list(html: &mut String, list: &mut List, want: List) {
    if *list != want {
        close_list(html, list);
        html.push_str(if want == List::Bullet { "<ul>\n" } else { "<ol>\n" });
        *list = want;
    }
}

/// Line-oriented conversion of the summary Markdown into HTML: headings,
/// bullet and numbered lists, bold spans and paragraphs
pub fn markdown_to_html(summary: &str) -> String {
    let mut html = String::new();
    let mut list = List::None;

    for line in summary.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            close_list(&mut html, &mut list);
            continue;
        }

        let heading = trimmed.chars().take_while(|c| *c == '#').count();
        if (1..=6).contains(&heading) && trimmed[heading..].starts_with(' ') {
            close_list(&mut html, &mut list);
            html.push_str(&format!("<h{heading}>{}</h{heading}>\n", inline(trimmed[heading..].trim())));
        } else if let Some(item) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
            open_list(&mut html, &mut list, List::Bullet);
            html.push_str(&format!("<li>{}</li>\n", inline(item)));
        } else if let Some(caps) = ORDERED_ITEM.captures(trimmed) {
            open_list(&mut html, &mut list, List::Ordered);
            html.push_str(&format!("<li>{}</li>\n", inline(&caps[1])));
        } else if trimmed == "---" {
            close_list(&mut html, &mut list);
            html.push_str("<hr>\n");
        } else {
            close_list(&mut html, &mut list);
            html.push_str(&format!("<p>{}</p>\n", inline(trimmed)));
        }
    }
    close_list(&mut html, &mut list);
    html
}

/// HTML document Word opens directly
pub fn word_html(title: &str, summary: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>\n{WORD_STYLE}\n</style>\n</head>\n<body>\n{}</body>\n</html>\n",
        html_escape::encode_text(title),
        markdown_to_html(summary)
    )
}

/// Escape for embedding inside a JavaScript template literal
fn template_literal(text: &str) -> String {
    text.replace('\\', "\\\\").replace('`', "\\`").replace('$', "\\$")
}

/// Standalone markmap page rendering the summary as a mind map
pub fn mind_map_html(title: &str, summary: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title} - Mind Map</title>
<style>
* {{ margin: 0; padding: 0; }}
#mindmap {{ display: block; width: 100vw; height: 100vh; }}
</style>
</head>
<body>
<svg id="mindmap"></svg>
<script src="https://cdn.jsdelivr.net/npm/d3@7"></script>
<script src="https://cdn.jsdelivr.net/npm/markmap-view"></script>
<script src="https://cdn.jsdelivr.net/npm/markmap-lib"></script>
<script>
    const {{ markmap }} = window;
    const {{ Markmap, loadCSS, loadJS }} = markmap;
    const transformer = new markmap.Transformer();
    const markdown = `{markdown}`;
    const {{ root, features }} = transformer.transform(markdown);
    const {{ styles, scripts }} = transformer.getAssets(features);
    if (styles) loadCSS(styles);
    if (scripts) loadJS(scripts, {{ getMarkmap: () => markmap }});
    Markmap.create('#mindmap', null, root);
</script>
</body>
</html>
"#,
        title = html_escape::encode_text(title),
        markdown = template_literal(&markdown(title, summary)).replace("</script", "<\\/script"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUMMARY: &str = "## 摘要\n这是**重点**内容 <tag>\n\n## 亮点\n- 01:00 - 第一\n- 02:00 - 第二\n\n## 思考\n1. 问题一\n2. 问题二\n";

    #[test]
    fn test_markdown_adds_title_once() {
        assert_eq!(markdown("标题", "## 摘要"), "# 标题\n\n## 摘要");
        assert_eq!(markdown("标题", "# 已有\n"), "# 已有\n");
        assert_eq!(markdown("  ", "x"), "x");
    }

    #[test]
    fn test_markdown_to_html() {
        let html = markdown_to_html(SUMMARY);
        assert!(html.contains("<h2>摘要</h2>"));
        assert!(html.contains("<p>这是<strong>重点</strong>内容 &lt;tag&gt;</p>"));
        assert!(html.contains("<ul>\n<li>01:00 - 第一</li>\n<li>02:00 - 第二</li>\n</ul>"));
        assert!(html.contains("<ol>\n<li>问题一</li>\n<li>问题二</li>\n</ol>"));
    }

    #[test]
    fn test_hashtag_is_not_a_heading() {
        assert_eq!(markdown_to_html("#BibiGPT"), "<p>#BibiGPT</p>\n");
    }

    #[test]
    fn test_word_html() {
        let doc = word_html("A & B", SUMMARY);
        assert!(doc.starts_with("<!DOCTYPE html>"));
        assert!(doc.contains("<title>A &amp; B</title>"));
        assert!(doc.contains("<h2>亮点</h2>"));
    }

    #[test]
    fn test_mind_map_escapes_template_literal() {
        let doc = mind_map_html("T", "- cost `$5`\n- path C:\\x");
        assert!(doc.contains(r"- cost \`\$5\`"));
        assert!(doc.contains(r"C:\\x"));
        assert!(doc.contains("<title>T - Mind Map</title>"));
        assert!(doc.contains("const markdown = `# T\n\n"));
    }

    #[test]
    fn test_render_dispatch() {
        assert_eq!(render(ExportFormat::Markdown, "", "x"), "x");
        assert!(render(ExportFormat::MindMap, "", "x").contains("markmap-view"));
    }
}
