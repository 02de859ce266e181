use std::sync::LazyLock;

use anyhow::{Result, bail};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::links;

/// Language a document declares about itself, either through `<html lang>`
/// or, absent that, through its filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocLanguage {
    Ja,
    En,
    Other(String),
}

impl DocLanguage {
    pub fn code(&self) -> &str {
        match self {
            Self::Ja => "ja",
            Self::En => "en",
            Self::Other(code) => code,
        }
    }
}

/// Mailing-list subscription endpoint advertised through a
/// `<link rel="alternate">` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternateLink {
    pub service: String,
    pub href: String,
}

/// One parsed legacy page: extracted head fields plus the body markup with
/// the heading removed, language-switch anchors rewritten, and email
/// addresses obscured.
#[derive(Debug, Clone)]
pub struct HtmlDocument {
    pub relative_path: String,
    pub language: DocLanguage,
    pub title: String,
    pub title_original: String,
    pub meta_description: String,
    pub meta_keywords: String,
    pub alternate_links: Vec<AlternateLink>,
    pub body: String,
}

#[derive(Debug, Default)]
struct Harvest {
    html_lang: Option<String>,
    title_text: Option<String>,
    h1_raw: Option<String>,
    h1_text: Option<String>,
    keyword_contents: Vec<String>,
    description: Option<String>,
    alternates: Vec<RawAlternate>,
    body_raw: Option<String>,
    anchors: Vec<RawAnchor>,
}

#[derive(Debug)]
struct RawAlternate {
    title: Option<String>,
    href: Option<String>,
}

#[derive(Debug)]
struct RawAnchor {
    raw: String,
    href: String,
}

impl HtmlDocument {
    pub fn parse(source: &str, relative_path: &str) -> Result<HtmlDocument> {
        let Ok(dom) = tl::parse(source, tl::ParserOptions::default()) else {
            bail!("failed to parse HTML in {relative_path}");
        };

        let parser = dom.parser();
        let mut harvest = Harvest::default();
        for handle in dom.children() {
            visit(*handle, parser, &mut harvest);
        }

        let language = detect_language(harvest.html_lang.as_deref(), relative_path);
        let (title, title_original) = select_titles(&harvest, relative_path);
        let meta_keywords = merge_keywords(&harvest.keyword_contents);
        let meta_description = harvest
            .description
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        let alternate_links = collect_alternates(&harvest.alternates);
        let body = assemble_body(source, &harvest, &language);

        Ok(HtmlDocument {
            relative_path: relative_path.to_string(),
            language,
            title,
            title_original,
            meta_description,
            meta_keywords,
            alternate_links,
            body,
        })
    }
}

fn visit(handle: tl::NodeHandle, parser: &tl::Parser, harvest: &mut Harvest) {
    let Some(node) = handle.get(parser) else {
        return;
    };
    if let tl::Node::Tag(tag) = node {
        let name = tag.name().as_utf8_str().to_lowercase();
        match name.as_str() {
            "html" => {
                if harvest.html_lang.is_none() {
                    harvest.html_lang = attribute(tag, "lang");
                }
            }
            "title" => {
                if harvest.title_text.is_none() {
                    harvest.title_text = Some(element_text(tag, parser));
                }
            }
            "h1" => {
                if harvest.h1_raw.is_none() {
                    harvest.h1_raw = Some(tag.raw().as_utf8_str().to_string());
                    harvest.h1_text = Some(element_text(tag, parser));
                }
            }
            "meta" => match attribute(tag, "name").as_deref() {
                Some("keywords") => {
                    harvest
                        .keyword_contents
                        .push(attribute(tag, "content").unwrap_or_default());
                }
                Some("description") => {
                    if harvest.description.is_none() {
                        harvest.description = Some(attribute(tag, "content").unwrap_or_default());
                    }
                }
                _ => {}
            },
            "link" => {
                if attribute(tag, "rel")
                    .is_some_and(|rel| rel.eq_ignore_ascii_case("alternate"))
                {
                    harvest.alternates.push(RawAlternate {
                        title: attribute(tag, "title"),
                        href: attribute(tag, "href"),
                    });
                }
            }
            "body" => {
                if harvest.body_raw.is_none() {
                    harvest.body_raw = Some(tag.raw().as_utf8_str().to_string());
                }
            }
            "a" => {
                if let Some(href) = attribute(tag, "href") {
                    harvest.anchors.push(RawAnchor {
                        raw: tag.raw().as_utf8_str().to_string(),
                        href,
                    });
                }
            }
            _ => {}
        }
        for child in tag.children().top().iter() {
            visit(*child, parser, harvest);
        }
    }
}

fn attribute(tag: &tl::HTMLTag, name: &str) -> Option<String> {
    for (key, value) in tag.attributes().iter() {
        if key.as_ref().eq_ignore_ascii_case(name) {
            return Some(value.map(|v| v.to_string()).unwrap_or_default());
        }
    }
    None
}

fn element_text(tag: &tl::HTMLTag, parser: &tl::Parser) -> String {
    let mut out = String::new();
    collect_text(tag, parser, &mut out);
    decode_html(&out)
}

fn collect_text(tag: &tl::HTMLTag, parser: &tl::Parser, out: &mut String) {
    for handle in tag.children().top().iter() {
        match handle.get(parser) {
            Some(tl::Node::Raw(bytes)) => out.push_str(&bytes.as_utf8_str()),
            Some(tl::Node::Tag(child)) => collect_text(child, parser, out),
            _ => {}
        }
    }
}

fn decode_html(text: &str) -> String {
    let mut value = text.to_string();
    value = value.replace("&amp;", "&");
    value = value.replace("&quot;", "\"");
    value = value.replace("&#39;", "'");
    value = value.replace("&lt;", "<");
    value = value.replace("&gt;", ">");
    value
}

fn detect_language(html_lang: Option<&str>, relative_path: &str) -> DocLanguage {
    // An empty `lang` attribute counts as unset, like a missing one.
    if let Some(lang) = html_lang.filter(|lang| !lang.is_empty()) {
        return match lang {
            "ja" => DocLanguage::Ja,
            "en" => DocLanguage::En,
            other => DocLanguage::Other(other.to_string()),
        };
    }
    let basename = relative_path.rsplit('/').next().unwrap_or(relative_path);
    if basename.contains(".jis") || basename.contains(".ja") {
        DocLanguage::Ja
    } else if basename.contains(".en") {
        DocLanguage::En
    } else {
        DocLanguage::Ja
    }
}

/// The first `<h1>` supplies the title when it has text; the `<title>` text
/// is then preserved separately. Without a usable heading both fields fall
/// back to the `<title>`, and a page carrying neither is titled after its
/// own path.
fn select_titles(harvest: &Harvest, relative_path: &str) -> (String, String) {
    let title_text = harvest
        .title_text
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();
    let h1_text = harvest.h1_text.as_deref().map(str::trim).unwrap_or_default();

    if !h1_text.is_empty() {
        return (h1_text.to_string(), title_text.to_string());
    }
    if !title_text.is_empty() {
        return (title_text.to_string(), title_text.to_string());
    }
    (relative_path.to_string(), String::new())
}

fn merge_keywords(contents: &[String]) -> String {
    let mut seen = Vec::new();
    for content in contents {
        for token in content
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|token| !token.is_empty())
        {
            if !seen.iter().any(|existing: &String| existing == token) {
                seen.push(token.to_string());
            }
        }
    }
    seen.join(", ")
}

const TITLE_MARKERS: &[(&str, &str)] = &[
    ("めろんぱん", "melonpan"),
    ("melma", "melma"),
    ("RanSta", "ransta"),
    ("まぐまぐ", "mag2"),
];

const HREF_MARKERS: &[(&str, &str)] = &[
    ("melonpan", "melonpan"),
    ("melma", "melma"),
    ("ransta", "ransta"),
    ("mag2", "mag2"),
];

fn classify_alternate(title: Option<&str>, href: &str) -> Option<&'static str> {
    if let Some(title) = title {
        for (marker, service) in TITLE_MARKERS {
            if title.contains(marker) {
                return Some(service);
            }
        }
    }
    for (marker, service) in HREF_MARKERS {
        if href.contains(marker) {
            return Some(service);
        }
    }
    None
}

/// Scan `<link rel="alternate">` entries in document order. The scan stops at
/// the first entry without an href or without a recognized service marker;
/// repeated services keep the first href seen.
fn collect_alternates(raw: &[RawAlternate]) -> Vec<AlternateLink> {
    let mut links = Vec::new();
    for entry in raw {
        let Some(href) = entry.href.as_deref().filter(|href| !href.is_empty()) else {
            break;
        };
        let Some(service) = classify_alternate(entry.title.as_deref(), href) else {
            break;
        };
        if links
            .iter()
            .any(|link: &AlternateLink| link.service == service)
        {
            continue;
        }
        links.push(AlternateLink {
            service: service.to_string(),
            href: href.to_string(),
        });
    }
    links
}

fn assemble_body(source: &str, harvest: &Harvest, language: &DocLanguage) -> String {
    let other = links::other_language(language.code());

    let mut body = match harvest.body_raw.as_deref() {
        Some(raw) => strip_body_shell(raw),
        None => source.to_string(),
    };

    if let Some(h1_raw) = harvest.h1_raw.as_deref() {
        body = body.replacen(h1_raw, "", 1);
    }

    for anchor in &harvest.anchors {
        if anchor.href.is_empty() || links::is_external_href(&anchor.href) {
            continue;
        }
        if let Some(rewritten) = links::rewrite_rooted_anchor(&anchor.raw, &anchor.href, other) {
            body = body.replacen(&anchor.raw, &rewritten, 1);
        }
    }

    let body = links::mark_relative_anchors(body.trim(), other);
    obscure_emails(&body)
}

/// Strip the `<body ...>` opening tag and the trailing `</body>` from the
/// element's raw source span, leaving the inner markup untouched.
fn strip_body_shell(raw: &str) -> String {
    let inner_start = raw.find('>').map_or(0, |index| index + 1);
    let inner = &raw[inner_start..];
    match inner.to_ascii_lowercase().rfind("</body>") {
        Some(end) => inner[..end].to_string(),
        None => inner.to_string(),
    }
}

/// Blunt an email address down to its first few characters so harvesters get
/// nothing useful while a human reader still recognizes the sender.
pub fn obscure_emails(text: &str) -> String {
    static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(\W\w{1,5})\w*(@\w)\w*(?:\.\w+)*\.(?:com|org|net|edu|uk|fr|de|es|jp)(\W)")
            .unwrap()
    });
    EMAIL
        .replace_all(text, |caps: &Captures| {
            format!("{}&hellip;{}&hellip;{}", &caps[1], &caps[2], &caps[3])
        })
        .into_owned()
}
