//! HTML content extraction.
//!
//! Shared by every strategy crate: given markup, produce the
//! [`PageContent`] the engine validates and returns, plus any API
//! endpoints the page gives away. The walk skips non-content subtrees
//! (`script`, `style`, `nav`, …) for text, but mines scripts separately
//! for embedded state and API calls.

use scraper::{ElementRef, Html, Node, Selector};
use serde_json::{Map, Value};
use url::Url;

use crate::result::{DiscoveredApi, PageContent};

/// Subtrees that never contribute visible text.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "head", "svg", "iframe",
];

/// Subtrees that are chrome rather than content, skipped for markdown.
const CHROME_TAGS: &[&str] = &["nav", "footer", "aside"];

/// What one extraction produced.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Extracted content.
    pub content: PageContent,
    /// API endpoints the page referenced.
    pub discovered_apis: Vec<DiscoveredApi>,
}

/// Extracts content and API references from markup.
#[must_use]
pub fn extract_page(html: &str, base: &Url) -> Extraction {
    let document = Html::parse_document(html);

    let mut content = PageContent {
        title: extract_title(&document),
        text: extract_text(&document),
        markdown: extract_markdown(&document),
        structured: structured_data(&document),
    };

    // A page whose only substance is embedded state still yields text.
    if content.text.trim().is_empty()
        && let Some(state) = embedded_state(&document)
    {
        content.text = json_text(&state);
    }

    Extraction {
        content,
        discovered_apis: discover_apis(&document, base),
    }
}

/// Pulls the page title: `og:title` wins, then `<title>`, then the first
/// `<h1>`.
#[must_use]
pub fn extract_title(document: &Html) -> Option<String> {
    let og = Selector::parse("meta[property=\"og:title\"]").ok()?;
    if let Some(meta) = document.select(&og).next()
        && let Some(value) = meta.value().attr("content")
        && !value.trim().is_empty()
    {
        return Some(value.trim().to_string());
    }

    let title = Selector::parse("title").ok()?;
    if let Some(element) = document.select(&title).next() {
        let text = element.text().collect::<String>();
        let text = text.trim();
        if !text.is_empty() {
            return Some(text.to_string());
        }
    }

    let h1 = Selector::parse("h1").ok()?;
    document.select(&h1).next().and_then(|element| {
        let text = element.text().collect::<String>();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    })
}

/// Collects visible text with collapsed whitespace.
#[must_use]
pub fn extract_text(document: &Html) -> String {
    let mut out = String::new();
    let root = document.root_element();
    collect_text(root, &mut out);
    collapse_whitespace(&out)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    let tag = element.value().name();
    if SKIP_TAGS.contains(&tag) {
        return;
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, out);
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Renders the main content as markdown.
#[must_use]
pub fn extract_markdown(document: &Html) -> String {
    let root = content_root(document);
    let mut out = String::new();
    render_markdown(root, &mut out);

    // Collapse runs of blank lines the walk leaves behind.
    let mut lines: Vec<&str> = Vec::new();
    let mut blank = true;
    for line in out.lines() {
        let is_blank = line.trim().is_empty();
        if is_blank && blank {
            continue;
        }
        lines.push(if is_blank { "" } else { line.trim_end() });
        blank = is_blank;
    }
    lines.join("\n").trim().to_string()
}

/// Prefers `<article>`/`<main>` as the markdown root; falls back to the
/// document root.
fn content_root(document: &Html) -> ElementRef<'_> {
    for selector in ["article", "main", "body"] {
        if let Ok(selector) = Selector::parse(selector)
            && let Some(element) = document.select(&selector).next()
        {
            return element;
        }
    }
    document.root_element()
}

fn render_markdown(element: ElementRef<'_>, out: &mut String) {
    let tag = element.value().name();
    if SKIP_TAGS.contains(&tag) || CHROME_TAGS.contains(&tag) {
        return;
    }

    match tag {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = tag[1..].parse::<usize>().unwrap_or(1);
            out.push_str("\n\n");
            out.push_str(&"#".repeat(level));
            out.push(' ');
            push_inline_text(element, out);
            out.push_str("\n\n");
        }
        "p" => {
            out.push_str("\n\n");
            render_children(element, out);
            out.push_str("\n\n");
        }
        "br" => out.push('\n'),
        "hr" => out.push_str("\n\n---\n\n"),
        "a" => {
            let text = inline_text(element);
            match element.value().attr("href") {
                Some(href) if !text.is_empty() => {
                    out.push_str(&format!("[{text}]({href})"));
                }
                _ => out.push_str(&text),
            }
        }
        "img" => {
            let alt = element.value().attr("alt").unwrap_or_default();
            if let Some(src) = element.value().attr("src") {
                out.push_str(&format!("![{alt}]({src})"));
            }
        }
        "strong" | "b" => {
            out.push_str("**");
            push_inline_text(element, out);
            out.push_str("**");
        }
        "em" | "i" => {
            out.push('*');
            push_inline_text(element, out);
            out.push('*');
        }
        "code" => {
            out.push('`');
            push_inline_text(element, out);
            out.push('`');
        }
        "pre" => {
            out.push_str("\n\n```\n");
            out.push_str(&element.text().collect::<String>());
            out.push_str("\n```\n\n");
        }
        "blockquote" => {
            let text = inline_text(element);
            out.push_str("\n\n");
            for line in text.lines() {
                out.push_str("> ");
                out.push_str(line);
                out.push('\n');
            }
            out.push('\n');
        }
        "li" => {
            out.push_str("\n- ");
            render_children(element, out);
        }
        "ul" | "ol" => {
            render_children(element, out);
            out.push('\n');
        }
        _ => render_children(element, out),
    }
}

fn render_children(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let collapsed = collapse_whitespace(text);
                if !collapsed.is_empty() {
                    if !out.ends_with([' ', '\n', '(', '[', '*', '`', '-']) && !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(&collapsed);
                }
            }
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    render_markdown(child, out);
                }
            }
            _ => {}
        }
    }
}

fn inline_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(element, &mut out);
    collapse_whitespace(&out)
}

fn push_inline_text(element: ElementRef<'_>, out: &mut String) {
    out.push_str(&inline_text(element));
}

/// Collects structured data: JSON-LD blocks and hydration state.
#[must_use]
pub fn structured_data(document: &Html) -> Option<Map<String, Value>> {
    let mut structured = Map::new();

    if let Ok(selector) = Selector::parse("script[type=\"application/ld+json\"]") {
        let blocks: Vec<Value> = document
            .select(&selector)
            .filter_map(|element| {
                serde_json::from_str::<Value>(&element.text().collect::<String>()).ok()
            })
            .collect();
        match blocks.len() {
            0 => {}
            1 => {
                let mut blocks = blocks;
                structured.insert("jsonLd".to_string(), blocks.remove(0));
            }
            _ => {
                structured.insert("jsonLd".to_string(), Value::Array(blocks));
            }
        }
    }

    if let Some(state) = embedded_state(document) {
        structured.insert("state".to_string(), state);
    }

    (!structured.is_empty()).then_some(structured)
}

/// Pulls hydration state out of the page: `__NEXT_DATA__` first, then
/// `window.__INITIAL_STATE__`-style assignments.
#[must_use]
pub fn embedded_state(document: &Html) -> Option<Value> {
    if let Ok(selector) = Selector::parse("script#__NEXT_DATA__")
        && let Some(element) = document.select(&selector).next()
        && let Ok(state) = serde_json::from_str(&element.text().collect::<String>())
    {
        return Some(state);
    }

    let selector = Selector::parse("script").ok()?;
    for element in document.select(&selector) {
        let source = element.text().collect::<String>();
        for marker in ["window.__INITIAL_STATE__", "window.__PRELOADED_STATE__"] {
            if let Some(position) = source.find(marker) {
                let rest = &source[position + marker.len()..];
                // A marker without an object after it (a comment, say) must
                // not end the scan; later scripts may still carry the state.
                let Some(brace) = rest.find('{') else { continue };
                if let Some(json) = balanced_json(&rest[brace..]) {
                    if let Ok(state) = serde_json::from_str(json) {
                        return Some(state);
                    }
                }
            }
        }
    }
    None
}

/// Returns the prefix of `source` that forms one balanced JSON object,
/// honouring strings and escapes.
fn balanced_json(source: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, ch) in source.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&source[..=index]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Scans markup and inline scripts for API endpoints the page talks to.
#[must_use]
pub fn discover_apis(document: &Html, base: &Url) -> Vec<DiscoveredApi> {
    let mut found: Vec<DiscoveredApi> = Vec::new();
    let mut push = |url: String, source: &str| {
        if !found.iter().any(|api| api.url == url) {
            let response_format = url.contains("graphql").then(|| "graphql".to_string());
            found.push(DiscoveredApi {
                url,
                method: "GET".to_string(),
                source: source.to_string(),
                response_format: response_format.or(Some("json".to_string())),
            });
        }
    };

    // <link> alternates that expose JSON feeds.
    if let Ok(selector) = Selector::parse("link[type=\"application/json\"]") {
        for element in document.select(&selector) {
            if let Some(href) = element.value().attr("href")
                && let Ok(resolved) = base.join(href)
            {
                push(resolved.to_string(), "link");
            }
        }
    }

    // Inline scripts mentioning fetchable endpoints.
    if let Ok(selector) = Selector::parse("script") {
        for element in document.select(&selector) {
            let source = element.text().collect::<String>();
            for candidate in find_quoted_urls(&source) {
                let looks_like_api = candidate.contains("/api/")
                    || candidate.contains("/graphql")
                    || candidate.ends_with(".json");
                if !looks_like_api {
                    continue;
                }
                if let Ok(resolved) = base.join(&candidate) {
                    // Only same-origin endpoints are worth learning.
                    if resolved.host_str() == base.host_str() {
                        push(resolved.to_string(), "inline-script");
                    }
                }
            }
        }
    }

    found
}

/// Yields string literals of a script that look like URLs or paths.
fn find_quoted_urls(source: &str) -> Vec<String> {
    let mut urls = Vec::new();
    for quote in ['"', '\''] {
        let mut rest = source;
        while let Some(start) = rest.find(quote) {
            let after = &rest[start + 1..];
            let Some(end) = after.find(quote) else { break };
            let literal = &after[..end];
            if (literal.starts_with('/') || literal.starts_with("http"))
                && !literal.contains(' ')
                && literal.len() > 1
            {
                urls.push(literal.to_string());
            }
            rest = &after[end + 1..];
        }
    }
    urls
}

fn json_text(value: &Value) -> String {
    let mut out = String::new();
    collect_json_text(value, &mut out);
    collapse_whitespace(&out)
}

fn collect_json_text(value: &Value, out: &mut String) {
    match value {
        Value::String(text) => {
            out.push_str(text);
            out.push(' ');
        }
        Value::Array(items) => {
            for item in items {
                collect_json_text(item, out);
            }
        }
        Value::Object(fields) => {
            for field in fields.values() {
                collect_json_text(field, out);
            }
        }
        _ => {}
    }
}
