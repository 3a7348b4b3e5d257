//! Minimal HTML scanning for server-rendered Portal pages.
//!
//! Not a conforming parser: tags are tokenized with a regex, `<script>`/`<style>` bodies and
//! comments are skipped, and each element's extent is found by counting nested tags of the
//! same name. That is enough for the id/class lookups the scraper needs.

use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(/?)([A-Za-z][A-Za-z0-9:-]*)((?:[^>"']|"[^"]*"|'[^']*')*)>"#)
        .expect("tag pattern")
});

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#)
        .expect("attribute pattern")
});

static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("entity pattern"));

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment pattern"));

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

#[derive(Debug, Clone)]
struct Tag {
    name: String,
    attrs: Range<usize>,
    span: Range<usize>,
    closing: bool,
    self_closing: bool,
}

/// One resolved element of a [`Document`].
#[derive(Debug, Clone)]
pub struct Element<'a> {
    src: &'a str,
    name: String,
    attrs: Range<usize>,
    outer: Range<usize>,
    inner: Range<usize>,
}

impl<'a> Element<'a> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute value with entities decoded. Boolean attributes yield an empty string.
    pub fn attr(&self, name: &str) -> Option<String> {
        let raw = &self.src[self.attrs.clone()];
        ATTR_RE.captures_iter(raw).find_map(|caps| {
            if !caps[1].eq_ignore_ascii_case(name) {
                return None;
            }
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str())
                .unwrap_or("");
            Some(decode_entities(value))
        })
    }

    pub fn id(&self) -> Option<String> {
        self.attr("id")
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn inner_html(&self) -> &'a str {
        &self.src[self.inner.clone()]
    }

    /// Visible text: tags removed, entities decoded, whitespace collapsed.
    pub fn text(&self) -> String {
        text_content(self.inner_html())
    }

    fn contains(&self, other: &Element<'_>) -> bool {
        other.outer.start >= self.inner.start && other.outer.end <= self.inner.end
    }
}

/// A tokenized page.
pub struct Document<'a> {
    src: &'a str,
    tags: Vec<Tag>,
}

impl<'a> Document<'a> {
    pub fn parse(src: &'a str) -> Self {
        Self {
            src,
            tags: tokenize(src),
        }
    }

    /// Every opening tag resolved to an element, in document order.
    pub fn elements(&self) -> Vec<Element<'a>> {
        (0..self.tags.len())
            .filter(|&i| !self.tags[i].closing)
            .map(|i| self.resolve(i))
            .collect()
    }

    pub fn find_all(&self, pred: impl Fn(&Element<'a>) -> bool) -> Vec<Element<'a>> {
        self.elements().into_iter().filter(|e| pred(e)).collect()
    }

    pub fn find(&self, pred: impl Fn(&Element<'a>) -> bool) -> Option<Element<'a>> {
        self.elements().into_iter().find(|e| pred(e))
    }

    pub fn by_id(&self, id: &str) -> Option<Element<'a>> {
        self.find(|e| e.id().as_deref() == Some(id))
    }

    pub fn by_class(&self, class: &str) -> Vec<Element<'a>> {
        self.find_all(|e| e.has_class(class))
    }

    /// Elements nested inside `parent`, in document order.
    pub fn descendants(&self, parent: &Element<'_>) -> Vec<Element<'a>> {
        self.find_all(|e| parent.contains(e))
    }

    fn resolve(&self, index: usize) -> Element<'a> {
        let open = &self.tags[index];
        let outer_start = open.span.start;
        let inner_start = open.span.end;

        if open.self_closing || VOID_ELEMENTS.contains(&open.name.as_str()) {
            return self.element(open, outer_start..inner_start, inner_start..inner_start);
        }

        let mut depth = 0usize;
        for tag in &self.tags[index + 1..] {
            if tag.name != open.name {
                continue;
            }
            if tag.closing {
                if depth == 0 {
                    return self.element(open, outer_start..tag.span.end, inner_start..tag.span.start);
                }
                depth -= 1;
            } else if !tag.self_closing {
                depth += 1;
            }
        }

        // Unclosed (`<option>`, `<li>` ...): runs to the next tag.
        let inner_end = self.tags[index + 1..]
            .first()
            .map(|t| t.span.start)
            .unwrap_or(self.src.len());
        self.element(open, outer_start..inner_end, inner_start..inner_end)
    }

    fn element(&self, tag: &Tag, outer: Range<usize>, inner: Range<usize>) -> Element<'a> {
        Element {
            src: self.src,
            name: tag.name.clone(),
            attrs: tag.attrs.clone(),
            outer,
            inner,
        }
    }
}

fn tokenize(src: &str) -> Vec<Tag> {
    let mut tags = Vec::new();
    let mut pos = 0;

    while let Some(caps) = TAG_RE.captures_at(src, pos) {
        let (Some(whole), Some(name), Some(attrs)) = (caps.get(0), caps.get(2), caps.get(3)) else {
            break;
        };

        if let Some(offset) = src[pos..whole.start()].find("<!--") {
            let comment_start = pos + offset;
            pos = src[comment_start..]
                .find("-->")
                .map(|end| comment_start + end + 3)
                .unwrap_or(src.len());
            continue;
        }

        let name = name.as_str().to_ascii_lowercase();
        let closing = caps.get(1).map(|m| !m.as_str().is_empty()).unwrap_or(false);
        let self_closing = attrs.as_str().trim_end().ends_with('/');
        pos = whole.end();

        if !closing && RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
            let close = format!("</{}", name);
            if let Some(end) = src[pos..].to_ascii_lowercase().find(&close) {
                pos += end;
            }
        }

        tags.push(Tag {
            name,
            attrs: attrs.range(),
            span: whole.range(),
            closing,
            self_closing,
        });
    }

    tags
}

pub fn text_content(fragment: &str) -> String {
    let without_comments = COMMENT_RE.replace_all(fragment, "");
    let without_tags = TAG_RE.replace_all(&without_comments, " ");
    normalize_ws(&decode_entities(&without_tags))
}

pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn decode_entities(s: &str) -> String {
    ENTITY_RE
        .replace_all(s, |caps: &regex::Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ if entity.starts_with("#x") || entity.starts_with("#X") => {
                    u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32)
                }
                _ if entity.starts_with('#') => {
                    entity[1..].parse::<u32>().ok().and_then(char::from_u32)
                }
                _ => None,
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
