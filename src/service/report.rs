use super::state::DuplicateGroup;
use std::fmt::Write;

fn html_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

const REPORT_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Duplicate Report</title>
<style>
body { font-family: sans-serif; margin: 2em; }
.group { border: 1px solid #ccc; border-radius: 6px; padding: 1em; margin-bottom: 1em; }
.reason { color: #666; font-style: italic; }
.keep { color: #2e7d32; font-weight: bold; }
table { border-collapse: collapse; width: 100%; }
td, th { text-align: left; padding: 4px 8px; border-bottom: 1px solid #eee; }
</style>
</head>
<body>
"#;

/// Standalone HTML page listing the confirmed duplicate groups.
pub fn render_report(results: &[DuplicateGroup]) -> String {
    let mut html = String::from(REPORT_HEAD);
    let _ = writeln!(
        html,
        "<h1>Duplicate Report</h1>\n<p>{} duplicate groups</p>",
        results.len()
    );

    for (index, group) in results.iter().enumerate() {
        let _ = writeln!(
            html,
            "<div class=\"group\">\n<h2>Group {}</h2>\n<p class=\"reason\">{}</p>",
            index + 1,
            html_escape(&group.reason)
        );
        html.push_str(
            "<table>\n<tr><th>File</th><th>Artist</th><th>Title</th><th>Duration</th><th>Bitrate</th><th>Size</th><th></th></tr>\n",
        );
        for file in &group.files {
            let keep = group.recommended_keep.as_deref() == Some(file.path.as_str());
            let _ = writeln!(
                html,
                "<tr><td title=\"{}\">{}</td><td>{}</td><td>{}</td><td>{}:{:02}</td><td>{} kbps</td><td>{:.2} MB</td><td>{}</td></tr>",
                html_escape(&file.path),
                html_escape(&file.filename),
                html_escape(&file.artist),
                html_escape(&file.title),
                file.duration / 60,
                file.duration % 60,
                file.bitrate,
                file.size_mb,
                if keep {
                    "<span class=\"keep\">KEEP (Recommended)</span>"
                } else {
                    ""
                }
            );
        }
        html.push_str("</table>\n</div>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}
