//! HTML-to-text normalization tuned for label/value notification layouts.
//!
//! After normalization each label and its value land on consecutive lines,
//! which is what the field patterns anchor on.

use std::sync::OnceLock;

use regex::Regex;

fn office_settings_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<o:OfficeDocumentSettings[\s\S]*?</o:OfficeDocumentSettings>").unwrap()
    })
}

fn style_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<style[\s\S]*?</style>").unwrap())
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<.*?>").unwrap())
}

fn blank_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{2,}").unwrap())
}

/// Drop presentational noise and turn block boundaries into newlines.
pub fn clean_up_html(html: &str) -> String {
    let html = office_settings_re().replace_all(html, "");
    let html = style_block_re().replace_all(&html, "");

    html.replace("<br>", "\n")
        .replace("<br >", "\n")
        .replace("<br \\>", "\n")
        .replace("</tr>", "</tr>\n")
        .replace("</h1>", "</h1>\n")
        .replace("</h2>", "</h2>\n")
        .replace("</h3>", "</h3>\n")
        .replace("&nbsp;", " ")
}

/// Strip remaining tags and collapse runs of blank lines to a single one.
pub fn extract_plain_text(html: &str) -> String {
    let text = tag_re().replace_all(html, "");
    blank_run_re().replace_all(&text, "\n\n").into_owned()
}

/// `clean_up_html` followed by `extract_plain_text`.
pub fn normalize(html: &str) -> String {
    extract_plain_text(&clean_up_html(html))
}
