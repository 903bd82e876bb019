use crate::config::Config;
use unicode_normalization::UnicodeNormalization;

/// Cleans one page of extracted or recognized text.
pub fn normalize_page(cfg: &Config, text: &str) -> String {
    let mut s = if cfg.postprocess.normalize_newlines {
        text.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        text.to_string()
    };

    if cfg.postprocess.normalize_unicode {
        s = s.nfkc().collect::<String>();
    }

    s = sanitize_control_chars(&s);

    if cfg.postprocess.trim_trailing_whitespace {
        s = s
            .lines()
            .map(|l| l.trim_end())
            .collect::<Vec<_>>()
            .join("\n");
    }

    s.trim_matches('\n').to_string()
}

/// Drops C0 controls (form feeds from the text layer included) that are not
/// allowed in XML-based outputs. Newlines and tabs survive.
fn sanitize_control_chars(s: &str) -> String {
    s.chars()
        .filter(|&ch| ch == '\n' || ch == '\t' || !ch.is_control())
        .collect()
}

/// Joins pages with the marker on its own line between every pair.
pub fn join_pages(pages: &[String], marker: &str) -> String {
    pages.join(&format!("\n\n{marker}\n\n"))
}

/// Length of the text once surrounding whitespace is removed.
pub fn trimmed_char_count(text: &str) -> usize {
    text.trim().chars().count()
}

/// Non-empty, trimmed lines.
pub fn text_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
