//! Combine separate html/css/js fragments into a single document.

/// Returns true if `html` already looks like a complete document.
pub fn is_complete_document(html: &str) -> bool {
    let trimmed = html.trim_start();
    let lower: String = trimmed
        .chars()
        .take(16)
        .flat_map(char::to_lowercase)
        .collect();
    lower.starts_with("<!doctype") || lower.starts_with("<html")
}

/// Combine separate html/css/js into a single HTML document.
///
/// A complete document is returned unchanged; caller-supplied css/js are
/// presumed already embedded. A bare fragment is wrapped in a minimal
/// skeleton with the css in `<style>` and the js in `<script>` before
/// `</body>`.
pub fn assemble(html: &str, css: &str, js: &str) -> String {
    if is_complete_document(html) {
        return html.to_string();
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <style>
{css}
  </style>
</head>
<body>
{html}
  <script>
{js}
  </script>
</body>
</html>"#
    )
}
