//! Message text to display markup.
//!
//! Passes run in a fixed order: emoji shortcodes, fenced code, inline code,
//! emphasis (bold, italic, underline, strikethrough), then line breaks. Only
//! code interiors are HTML-escaped; surrounding text is passed through as-is.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static EMOJI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":([a-zA-Z0-9_+\-]+):").expect("valid emoji regex"));
static CODE_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```([\s\S]*?)```").expect("valid code block regex"));
static INLINE_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`([^`\n]+?)`").expect("valid inline code regex"));
static BOLD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("valid bold regex"));
static ITALIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*(.+?)\*").expect("valid italic regex"));
static UNDERLINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_(.+?)_").expect("valid underline regex"));
static STRIKE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"~(.+?)~").expect("valid strike regex"));

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn format(raw: &str) -> String {
    let formatted = EMOJI_RE.replace_all(raw, |caps: &Captures| {
        match emojis::get_by_shortcode(&caps[1]) {
            Some(emoji) => emoji.as_str().to_string(),
            None => caps[0].to_string(),
        }
    });

    let formatted = CODE_BLOCK_RE.replace_all(&formatted, |caps: &Captures| {
        format!("<pre><code>{}</code></pre>", escape_html(&caps[1]))
    });

    let formatted = INLINE_CODE_RE.replace_all(&formatted, |caps: &Captures| {
        format!("<code>{}</code>", escape_html(&caps[1]))
    });

    let formatted = BOLD_RE.replace_all(&formatted, "<strong>$1</strong>");
    let formatted = ITALIC_RE.replace_all(&formatted, "<em>$1</em>");
    let formatted = UNDERLINE_RE.replace_all(&formatted, "<u>$1</u>");
    let formatted = STRIKE_RE.replace_all(&formatted, "<s>$1</s>");

    formatted.replace('\n', "<br/>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_then_inline_code() {
        assert_eq!(
            format("**hi** `code`"),
            "<strong>hi</strong> <code>code</code>"
        );
    }

    #[test]
    fn code_interior_is_escaped() {
        let out = format("`<script>alert(1)</script>`");
        assert_eq!(out, "<code>&lt;script&gt;alert(1)&lt;/script&gt;</code>");
        assert!(!out.contains("<script>"));
    }

    #[test]
    fn text_outside_code_is_not_escaped() {
        assert_eq!(format("a < b"), "a < b");
    }

    #[test]
    fn fenced_block_spans_lines() {
        assert_eq!(
            format("```\nfn a() {}\n```"),
            "<pre><code><br/>fn a() {}<br/></code></pre>"
        );
    }

    #[test]
    fn fenced_block_is_matched_before_inline_code() {
        assert_eq!(format("```a & b```"), "<pre><code>a &amp; b</code></pre>");
    }

    #[test]
    fn emphasis_precedence() {
        assert_eq!(format("***x***"), "<strong><em>x</strong></em>");
        assert_eq!(format("*it* _un_ ~st~"), "<em>it</em> <u>un</u> <s>st</s>");
    }

    #[test]
    fn emoji_shortcodes_expand() {
        assert_eq!(format("hi :wave:"), "hi 👋");
        assert_eq!(format(":notanemoji:"), ":notanemoji:");
    }

    #[test]
    fn unknown_shortcode_still_goes_through_emphasis() {
        assert_eq!(
            format(":not_a_real_emoji_code:"),
            ":not<u>a</u>real<u>emoji</u>code:"
        );
    }

    #[test]
    fn newlines_become_breaks() {
        assert_eq!(format("one\ntwo"), "one<br/>two");
    }
}
