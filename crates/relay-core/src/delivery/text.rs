//! Text-file detection and inline formatting.

use std::path::Path;

/// Extensions treated as plain text eligible for inline delivery.
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "log", "md", "json", "csv", "xml", "html", "htm", "css", "js", "py", "go", "c", "cpp",
    "h", "java", "php", "rb", "sh", "bat", "ps1", "yaml", "yml", "toml", "ini", "cfg", "conf",
];

pub fn is_text_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            TEXT_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Escape the characters the transport's HTML subset treats specially.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Inline message body: a bold title line and the content in a code block.
pub fn inline_message(name: &str, content: &str) -> String {
    format!(
        "<b>File: {}</b>\n\n<pre>{}</pre>",
        escape_html(name),
        escape_html(content)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_text_file() {
        assert!(is_text_file("notes.txt"));
        assert!(is_text_file("README.MD"));
        assert!(is_text_file("dir/config.toml"));
        assert!(!is_text_file("movie.mkv"));
        assert!(!is_text_file("Makefile"));
        assert!(!is_text_file("archive.tar.gz"));
    }

    #[test]
    fn test_inline_message_escapes() {
        assert_eq!(
            inline_message("a<b>.txt", "if a < b && c > d { \"x\" }"),
            "<b>File: a&lt;b&gt;.txt</b>\n\n<pre>if a &lt; b &amp;&amp; c &gt; d { &quot;x&quot; }</pre>"
        );
    }
}
