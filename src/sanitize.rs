//! Allow-list HTML cleaning for user-written post and comment bodies.

use std::collections::{HashMap, HashSet};

use ammonia::Builder;
use once_cell::sync::Lazy;
use regex::Regex;

const POST_TAGS: &[&str] = &[
    "h1", "h2", "h3", "p", "pre", "div", "span", "big", "small", "tt", "code", "kbd", "samp",
    "var", "del", "ins", "cite", "q", "strong", "b", "em", "i", "u", "s", "ol", "ul", "li",
    "blockquote", "a", "img", "table", "caption", "thead", "tbody", "tfoot", "tr", "th", "td",
    "hr",
];

const COMMENT_TAGS: &[&str] = &["strong", "b", "em", "i", "ol", "ul", "li", "a"];

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:https?://|www\.)[^\s<>"']+"#).expect("url regex is valid")
});

static POST_CLEANER: Lazy<Builder<'static>> = Lazy::new(|| builder(POST_TAGS));
static COMMENT_CLEANER: Lazy<Builder<'static>> = Lazy::new(|| builder(COMMENT_TAGS));

fn builder(tags: &'static [&'static str]) -> Builder<'static> {
    let mut attributes = HashMap::new();
    attributes.insert("a", HashSet::from(["href", "title"]));
    attributes.insert("img", HashSet::from(["src", "alt", "title"]));

    let mut b = Builder::default();
    b.tags(tags.iter().copied().collect())
        .tag_attributes(attributes)
        .generic_attributes(HashSet::new())
        .link_rel(Some("nofollow"));
    b
}

/// Sanitized HTML for a post body.
pub fn clean_post_body(raw: &str) -> String {
    linkify(&POST_CLEANER.clean(raw).to_string())
}

/// Sanitized HTML for a comment body.
pub fn clean_comment_body(raw: &str) -> String {
    linkify(&COMMENT_CLEANER.clean(raw).to_string())
}

/// Turn bare URLs in text nodes into `rel="nofollow"` links. Text already
/// inside an `<a>` element is left alone. Expects serialized, well-formed
/// HTML such as ammonia produces.
fn linkify(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut anchor_depth = 0usize;
    let mut rest = html;

    while !rest.is_empty() {
        match rest.find('<') {
            Some(0) => {
                let end = tag_end(rest);
                let tag = &rest[..end];
                let name = tag_name(tag);
                if name.eq_ignore_ascii_case("a") {
                    if tag.starts_with("</") {
                        anchor_depth = anchor_depth.saturating_sub(1);
                    } else {
                        anchor_depth += 1;
                    }
                }
                out.push_str(tag);
                rest = &rest[end..];
            }
            Some(pos) => {
                push_text(&mut out, &rest[..pos], anchor_depth > 0);
                rest = &rest[pos..];
            }
            None => {
                push_text(&mut out, rest, anchor_depth > 0);
                rest = "";
            }
        }
    }
    out
}

/// Byte offset just past the `>` closing the tag at the start of `s`.
fn tag_end(s: &str) -> usize {
    let mut quote = None;
    for (i, c) in s.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '>') => return i + 1,
            _ => {}
        }
    }
    s.len()
}

fn tag_name(tag: &str) -> &str {
    let inner = tag.trim_start_matches('<').trim_start_matches('/');
    let end = inner
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(inner.len());
    &inner[..end]
}

fn push_text(out: &mut String, text: &str, in_anchor: bool) {
    if in_anchor {
        out.push_str(text);
        return;
    }

    let mut last = 0;
    for m in URL_RE.find_iter(text) {
        let url = m
            .as_str()
            .trim_end_matches(|c| matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | ')'));
        let start = m.start();
        let end = start + url.len();
        out.push_str(&text[last..start]);
        let href = if url.len() >= 4 && url[..4].eq_ignore_ascii_case("www.") {
            format!("http://{}", url)
        } else {
            url.to_string()
        };
        out.push_str(&format!(r#"<a href="{}" rel="nofollow">{}</a>"#, href, url));
        last = end;
    }
    out.push_str(&text[last..]);
}
