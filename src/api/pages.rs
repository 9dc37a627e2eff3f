//! Inline HTML pages for the browser-facing routes.

use crate::storage::DetectionRecord;

const STYLE: &str = "body{font-family:sans-serif;margin:2em}\
table{border-collapse:collapse}td,th{border:1px solid #999;padding:4px 8px}";

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title>\
<style>{STYLE}</style></head><body>\n{body}\n</body></html>\n",
        title = escape_html(title),
    )
}

pub(crate) fn index_page() -> String {
    layout(
        "BigBag Detection",
        r#"<h1>BigBag Detection</h1>
<form action="/predict" method="post" enctype="multipart/form-data">
<input type="file" name="file" accept="image/*">
<button type="submit">Detect</button>
</form>
<p><a href="/video_feed">Live camera</a> | <a href="/history">History</a></p>"#,
    )
}

pub(crate) fn result_page(image_name: &str, bigbag_count: usize, output_name: &str) -> String {
    let body = format!(
        "<h1>Result</h1>\n<p>Image: {name}</p>\n<p>bigbag_count: <strong>{count}</strong></p>\n\
<img src=\"/output/{output}\" alt=\"annotated {name}\">\n\
<p><a href=\"/\">Upload another</a> | <a href=\"/history\">History</a></p>",
        name = escape_html(image_name),
        count = bigbag_count,
        output = escape_html(output_name),
    );
    layout("BigBag Detection Result", &body)
}

pub(crate) fn history_page(records: &[DetectionRecord]) -> String {
    let mut rows = String::new();
    for record in records {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            record.id,
            escape_html(&record.image_name),
            record.count
        ));
    }
    let body = format!(
        "<h1>History</h1>\n<table>\n<tr><th>ID</th><th>Image</th><th>Count</th></tr>\n{rows}</table>\n\
<p><a href=\"/\">Back</a></p>"
    );
    layout("BigBag Detection History", &body)
}

pub(crate) fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
