use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Marker id attached to every rewritten language-switch anchor. The serving
/// layer resolves marked anchors against its configured language-prefix
/// scheme at render time.
pub const LANGUAGE_SWITCH_ANCHOR_ID: &str = "language-switching-anchor";

/// The sibling language an anchor in a document of `code` switches to.
pub fn other_language(code: &str) -> &'static str {
    if code == "en" { "ja" } else { "en" }
}

pub fn is_external_href(href: &str) -> bool {
    static SCHEME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^/]+://").unwrap());
    SCHEME.is_match(href)
}

/// Filename infix that marks a variant of the given language. Japanese
/// variants carry `.jis.`, never a literal `.ja.`.
fn language_marker(code: &str) -> &'static str {
    if code == "en" { ".en." } else { ".jis." }
}

/// Rooted-href rewrite for an anchor pointing at the other language's variant:
/// swap the leading language-prefix segment for `other`. Returns `None` when
/// the href is not rooted or carries no marker for that language.
pub fn rewrite_rooted_href(href: &str, other: &str) -> Option<String> {
    if !href.starts_with('/') || !href.contains(language_marker(other)) {
        return None;
    }
    let rest = href
        .strip_prefix("/en/")
        .or_else(|| href.strip_prefix("/ja/"))
        .unwrap_or(&href[1..]);
    Some(format!("/{other}/{rest}"))
}

/// Rewrite one serialized anchor element in place: substitute the rooted href
/// and inject the switch marker into the opening tag. Best effort only; the
/// authoritative relative-href rewrite happens in [`mark_relative_anchors`].
pub fn rewrite_rooted_anchor(element_html: &str, href: &str, other: &str) -> Option<String> {
    if element_html.contains(LANGUAGE_SWITCH_ANCHOR_ID) {
        return None;
    }
    let new_href = rewrite_rooted_href(href, other)?;

    let quoted = format!("\"{href}\"");
    let rewritten = if element_html.contains(&quoted) {
        element_html.replacen(&quoted, &format!("\"{new_href}\""), 1)
    } else {
        element_html.replacen(href, &new_href, 1)
    };
    Some(inject_switch_marker(&rewritten, other))
}

fn inject_switch_marker(element_html: &str, other: &str) -> String {
    let marker = format!(" id=\"{LANGUAGE_SWITCH_ANCHOR_ID}\" data-lang-switch=\"{other}\"");
    match element_html.find('>') {
        Some(end) => {
            let (head, tail) = element_html.split_at(end);
            match head.strip_suffix('/') {
                Some(stripped) => format!("{stripped}{marker}/{tail}"),
                None => format!("{head}{marker}{tail}"),
            }
        }
        None => format!("{element_html}{marker}"),
    }
}

/// Mark every anchor whose relative href targets the other language's suffixed
/// filename. The href is kept as the placeholder target; the injected marker
/// id plus `data-lang-switch` attribute tell the serving layer to compute the
/// absolute path under its language-prefix scheme at render time. External
/// absolute-URI and rooted hrefs are left untouched.
pub fn mark_relative_anchors(body: &str, other: &str) -> String {
    static EN_DOUBLE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(?i)(<a\b[^>]*?\bhref=)"([^":/\s>][^":\s>]*\.en(?:\.us)?\.html)"([^>]*)>"#)
            .unwrap()
    });
    static EN_SINGLE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)(<a\b[^>]*?\bhref=)'([^':/\s>][^':\s>]*\.en(?:\.us)?\.html)'([^>]*)>")
            .unwrap()
    });
    static JA_DOUBLE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(?i)(<a\b[^>]*?\bhref=)"([^":/\s>][^":\s>]*\.(?:j[ap]\.)?jis\.html)"([^>]*)>"#)
            .unwrap()
    });
    static JA_SINGLE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)(<a\b[^>]*?\bhref=)'([^':/\s>][^':\s>]*\.(?:j[ap]\.)?jis\.html)'([^>]*)>")
            .unwrap()
    });

    let (double_quoted, single_quoted): (&Regex, &Regex) = if other == "en" {
        (&EN_DOUBLE, &EN_SINGLE)
    } else {
        (&JA_DOUBLE, &JA_SINGLE)
    };

    let marked = apply_anchor_marker(double_quoted, body, other, '"');
    apply_anchor_marker(single_quoted, &marked, other, '\'').into_owned()
}

fn apply_anchor_marker<'a>(
    pattern: &Regex,
    body: &'a str,
    other: &str,
    quote: char,
) -> std::borrow::Cow<'a, str> {
    pattern.replace_all(body, |caps: &Captures| {
        if caps[0].contains(LANGUAGE_SWITCH_ANCHOR_ID) {
            return caps[0].to_string();
        }
        format!(
            "{}{quote}{}{quote}{} id=\"{LANGUAGE_SWITCH_ANCHOR_ID}\" data-lang-switch=\"{other}\">",
            &caps[1], &caps[2], &caps[3]
        )
    })
}

#[cfg(test)]
mod tests {
    use super::{
        LANGUAGE_SWITCH_ANCHOR_ID, is_external_href, mark_relative_anchors, other_language,
        rewrite_rooted_anchor, rewrite_rooted_href,
    };

    #[test]
    fn other_language_flips_between_ja_and_en() {
        assert_eq!(other_language("ja"), "en");
        assert_eq!(other_language("en"), "ja");
        assert_eq!(other_language("fr"), "en");
    }

    #[test]
    fn external_href_detection() {
        assert!(is_external_href("http://example.com/a.en.html"));
        assert!(is_external_href("https://example.com/"));
        assert!(is_external_href("ftp://files.example.com/x"));
        assert!(!is_external_href("/info/about.en.html"));
        assert!(!is_external_href("about.en.html"));
    }

    #[test]
    fn rooted_href_rewrites_language_prefix() {
        assert_eq!(
            rewrite_rooted_href("/info/about.en.html", "en"),
            Some("/en/info/about.en.html".to_string())
        );
        assert_eq!(
            rewrite_rooted_href("/ja/info/about.jis.html", "ja"),
            Some("/ja/info/about.jis.html".to_string())
        );
        assert_eq!(
            rewrite_rooted_href("/en/info/about.jis.html", "ja"),
            Some("/ja/info/about.jis.html".to_string())
        );
        assert_eq!(rewrite_rooted_href("info/about.en.html", "en"), None);
        assert_eq!(rewrite_rooted_href("/info/about.html", "en"), None);
    }

    #[test]
    fn rooted_anchor_gets_marker_and_new_href() {
        let element = r#"<a href="/info/about.en.html">English</a>"#;
        let rewritten =
            rewrite_rooted_anchor(element, "/info/about.en.html", "en").expect("rewrites");
        assert_eq!(
            rewritten,
            format!(
                r#"<a href="/en/info/about.en.html" id="{LANGUAGE_SWITCH_ANCHOR_ID}" data-lang-switch="en">English</a>"#
            )
        );

        assert!(rewrite_rooted_anchor(&rewritten, "/en/info/about.en.html", "en").is_none());
    }

    #[test]
    fn relative_english_anchor_is_marked() {
        let body = r#"<p><a href="about.en.html">English version</a></p>"#;
        let marked = mark_relative_anchors(body, "en");
        assert_eq!(
            marked,
            format!(
                r#"<p><a href="about.en.html" id="{LANGUAGE_SWITCH_ANCHOR_ID}" data-lang-switch="en">English version</a></p>"#
            )
        );
    }

    #[test]
    fn relative_japanese_anchor_variants_are_marked() {
        let body = concat!(
            "<a href='sub/page.jis.html'>ja</a>",
            " <a href='sub/page.jp.jis.html'>ja2</a>",
            " <a href='sub/page.ja.jis.html'>ja3</a>",
        );
        let marked = mark_relative_anchors(body, "ja");
        assert_eq!(marked.matches(LANGUAGE_SWITCH_ANCHOR_ID).count(), 3);
        assert!(marked.contains("data-lang-switch=\"ja\""));
    }

    #[test]
    fn external_and_rooted_hrefs_are_left_alone() {
        let body = concat!(
            r#"<a href="http://example.com/x.en.html">ext</a>"#,
            r#"<a href="/rooted/x.en.html">rooted</a>"#,
            r#"<a href="plain.html">plain</a>"#,
        );
        assert_eq!(mark_relative_anchors(body, "en"), body);
    }

    #[test]
    fn marked_anchor_is_not_marked_twice() {
        let body = r#"<a href="about.en.html">English</a>"#;
        let once = mark_relative_anchors(body, "en");
        let twice = mark_relative_anchors(&once, "en");
        assert_eq!(once, twice);
    }

    #[test]
    fn attributes_around_href_survive() {
        let body = r#"<a class="nav" href="about.en.us.html" title="English">E</a>"#;
        let marked = mark_relative_anchors(body, "en");
        assert!(marked.starts_with(r#"<a class="nav" href="about.en.us.html" title="English""#));
        assert!(marked.contains(LANGUAGE_SWITCH_ANCHOR_ID));
    }
}
