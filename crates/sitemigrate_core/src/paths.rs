use anyhow::Result;
use serde::Serialize;

/// Editorial note prefix recording the translated sibling of a page.
pub const TRANSLATED_VERSION_NOTE: &str = "Translated-Version";

/// Language tag stamped on an emitted record's destination path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordLanguage {
    Neutral,
    Ja,
    En,
}

impl RecordLanguage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Ja => "ja",
            Self::En => "en",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassLanguage {
    Japanese,
    English,
}

impl PassLanguage {
    pub fn code(self) -> &'static str {
        match self {
            Self::Japanese => "ja",
            Self::English => "en",
        }
    }

    pub fn other_code(self) -> &'static str {
        match self {
            Self::Japanese => "en",
            Self::English => "ja",
        }
    }

    pub fn record_language(self) -> RecordLanguage {
        match self {
            Self::Japanese => RecordLanguage::Ja,
            Self::English => RecordLanguage::En,
        }
    }

    /// Variant suffix groups recognized for this pass, longest first so the
    /// `ends_with` scan strips `.jp.jis.html` before `.jis.html` matches.
    fn matched_suffixes(self) -> &'static [&'static str] {
        match self {
            Self::Japanese => &[".jp.jis.html", ".jis.html", ".html"],
            Self::English => &[".en.us.html", ".en.html"],
        }
    }

    /// Sibling suffix substitutions probed in order; each is spliced between
    /// the variant-free base and the `html` extension.
    fn sibling_suffixes(self) -> &'static [&'static str] {
        match self {
            Self::Japanese => &[".en.", ".en.us."],
            Self::English => &[".jis.", ".jp.jis.", "."],
        }
    }
}

/// The variant suffix group a path carries for the given pass, if any.
pub fn matched_suffix(relative_path: &str, pass: PassLanguage) -> Option<&'static str> {
    pass.matched_suffixes()
        .iter()
        .copied()
        .find(|suffix| relative_path.ends_with(suffix))
}

/// Sibling paths probed for `relative_path`, in probe order. Empty when the
/// path carries no recognized variant suffix for the pass.
pub fn sibling_candidates(relative_path: &str, pass: PassLanguage) -> Vec<String> {
    let Some(suffix) = matched_suffix(relative_path, pass) else {
        return Vec::new();
    };
    let base = &relative_path[..relative_path.len() - suffix.len()];
    pass.sibling_suffixes()
        .iter()
        .map(|candidate| format!("{base}{candidate}html"))
        .collect()
}

/// Destination path for a source file: the recognized variant suffix group is
/// stripped and `.html` re-appended, leaving every other dot segment intact
/// (`a.b.jis.html` becomes `a.b.html`, not `a.html`). Paths outside the
/// recognized groups fall back to replacing the final extension.
pub fn canonical_path(relative_path: &str, pass: PassLanguage) -> String {
    if let Some(suffix) = matched_suffix(relative_path, pass) {
        let base = &relative_path[..relative_path.len() - suffix.len()];
        return format!("{base}.html");
    }
    replace_final_extension(relative_path)
}

fn replace_final_extension(relative_path: &str) -> String {
    let basename_start = relative_path.rfind('/').map_or(0, |index| index + 1);
    match relative_path[basename_start..].rfind('.') {
        Some(dot) => format!("{}.html", &relative_path[..basename_start + dot]),
        None => format!("{relative_path}.html"),
    }
}

/// Path facts the redirect planner works from.
#[derive(Debug, Clone)]
pub struct PathInfo {
    pub relative_path: String,
    pub canonical_path: String,
    pub pass: PassLanguage,
}

pub fn path_info(relative_path: &str, pass: PassLanguage) -> PathInfo {
    PathInfo {
        relative_path: relative_path.to_string(),
        canonical_path: canonical_path(relative_path, pass),
        pass,
    }
}

impl PathInfo {
    /// Legacy paths that must keep resolving after migration: the original
    /// suffixed path when it differs from the canonical one, and the bare
    /// directory for Japanese `index.*` files.
    pub fn legacy_redirect_sources(&self) -> Vec<String> {
        let mut sources = Vec::new();
        if self.relative_path != self.canonical_path {
            sources.push(self.relative_path.clone());
        }
        if self.pass == PassLanguage::Japanese
            && let Some((dirname, basename)) = split_path(&self.relative_path)
            && basename.starts_with("index.")
            && !dirname.is_empty()
            && dirname != "."
        {
            sources.push(dirname.to_string());
        }
        sources
    }
}

fn split_path(relative_path: &str) -> Option<(&str, &str)> {
    match relative_path.rfind('/') {
        Some(index) => Some((&relative_path[..index], &relative_path[index + 1..])),
        None => Some(("", relative_path)),
    }
}

/// Outcome of resolving a file against its sibling-language variant.
#[derive(Debug, Clone)]
pub struct VariantResolution {
    pub canonical_path: String,
    pub language: RecordLanguage,
    pub sibling_path: Option<String>,
    pub translation_of: Option<i64>,
    pub notes: Vec<String>,
    pub warnings: Vec<String>,
}

impl VariantResolution {
    fn neutral(canonical_path: String) -> Self {
        Self {
            canonical_path,
            language: RecordLanguage::Neutral,
            sibling_path: None,
            translation_of: None,
            notes: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Stored editors-note text: warning lines first, then the translation
    /// notes. Guard and lookup warnings land in the record itself, not only
    /// in the run report.
    pub fn editorial_note(&self) -> String {
        let lines: Vec<&str> = self
            .warnings
            .iter()
            .chain(self.notes.iter())
            .map(String::as_str)
            .collect();
        lines.join("\n")
    }
}

/// Locate the sibling-language variant of `relative_path` and derive the
/// destination language. `detected_code` is the language the document itself
/// declares; a mismatch with the pass language forces a neutral emit. The
/// English pass additionally resolves the sibling's stored record through
/// `lookup_translation` to capture the translation back-reference.
pub fn resolve_variant(
    relative_path: &str,
    detected_code: &str,
    pass: PassLanguage,
    sibling_exists: &dyn Fn(&str) -> bool,
    lookup_translation: &dyn Fn(&str) -> Result<Option<i64>>,
) -> Result<VariantResolution> {
    let mut resolution = VariantResolution::neutral(canonical_path(relative_path, pass));

    if detected_code != pass.code() {
        resolution.warnings.push(format!(
            "Warning: Language-code=({detected_code}), which should be {}.",
            pass.code()
        ));
        return Ok(resolution);
    }

    if matched_suffix(relative_path, pass).is_none() {
        resolution.warnings.push(format!(
            "Warning: Filename-pattern mismatch for ({relative_path}), expected a {} variant suffix.",
            pass.code()
        ));
        return Ok(resolution);
    }

    for sibling in sibling_candidates(relative_path, pass) {
        if !sibling_exists(&sibling) {
            continue;
        }

        resolution.language = pass.record_language();
        match pass {
            PassLanguage::Japanese => {
                resolution
                    .notes
                    .push(format!("{TRANSLATED_VERSION_NOTE}: {sibling}"));
            }
            PassLanguage::English => match lookup_translation(&sibling)? {
                Some(id) => {
                    resolution.translation_of = Some(id);
                    resolution
                        .notes
                        .push(format!("{TRANSLATED_VERSION_NOTE}: {sibling} : record=({id})"));
                }
                None => {
                    resolution.warnings.push(format!(
                        "Warning: no stored record for translated version ({sibling})."
                    ));
                    resolution
                        .notes
                        .push(format!("{TRANSLATED_VERSION_NOTE}: {sibling} : record=(none)"));
                }
            },
        }
        resolution.sibling_path = Some(sibling);
        return Ok(resolution);
    }

    resolution
        .notes
        .push(format!("{TRANSLATED_VERSION_NOTE}: None."));
    Ok(resolution)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{
        PassLanguage, RecordLanguage, canonical_path, matched_suffix, path_info, resolve_variant,
        sibling_candidates,
    };

    fn no_lookup(_: &str) -> anyhow::Result<Option<i64>> {
        Ok(None)
    }

    #[test]
    fn canonical_path_strips_exact_suffix_group() {
        let ja = PassLanguage::Japanese;
        assert_eq!(canonical_path("index.html", ja), "index.html");
        assert_eq!(canonical_path("news/report.jis.html", ja), "news/report.html");
        assert_eq!(canonical_path("news/report.jp.jis.html", ja), "news/report.html");
        assert_eq!(canonical_path("a.b.jis.html", ja), "a.b.html");

        let en = PassLanguage::English;
        assert_eq!(canonical_path("about.en.html", en), "about.html");
        assert_eq!(canonical_path("about.en.us.html", en), "about.html");
    }

    #[test]
    fn canonical_path_falls_back_to_final_extension() {
        assert_eq!(
            canonical_path("foo.en.gb.html", PassLanguage::English),
            "foo.en.gb.html"
        );
        assert_eq!(canonical_path("old/page.htm", PassLanguage::Japanese), "old/page.html");
        assert_eq!(canonical_path("dir.v2/readme", PassLanguage::Japanese), "dir.v2/readme.html");
    }

    #[test]
    fn longest_suffix_group_wins() {
        assert_eq!(
            matched_suffix("x.jp.jis.html", PassLanguage::Japanese),
            Some(".jp.jis.html")
        );
        assert_eq!(canonical_path("x.jp.jis.html", PassLanguage::Japanese), "x.html");
        assert_eq!(
            matched_suffix("x.en.us.html", PassLanguage::English),
            Some(".en.us.html")
        );
        assert_eq!(matched_suffix("x.en.gb.html", PassLanguage::English), None);
    }

    #[test]
    fn sibling_candidates_follow_probe_order() {
        assert_eq!(
            sibling_candidates("about.jis.html", PassLanguage::Japanese),
            vec!["about.en.html", "about.en.us.html"]
        );
        assert_eq!(
            sibling_candidates("sub/about.en.html", PassLanguage::English),
            vec![
                "sub/about.jis.html",
                "sub/about.jp.jis.html",
                "sub/about.html"
            ]
        );
        assert!(sibling_candidates("foo.en.gb.html", PassLanguage::English).is_empty());
    }

    #[test]
    fn legacy_redirect_sources_cover_suffix_and_directory_index() {
        let info = path_info("news/report.jis.html", PassLanguage::Japanese);
        assert_eq!(info.legacy_redirect_sources(), vec!["news/report.jis.html"]);

        let info = path_info("news/index.html", PassLanguage::Japanese);
        assert_eq!(info.legacy_redirect_sources(), vec!["news"]);

        let info = path_info("news/index.jis.html", PassLanguage::Japanese);
        assert_eq!(
            info.legacy_redirect_sources(),
            vec!["news/index.jis.html", "news"]
        );

        let info = path_info("index.html", PassLanguage::Japanese);
        assert!(info.legacy_redirect_sources().is_empty());

        let info = path_info("sub/index.en.html", PassLanguage::English);
        assert_eq!(info.legacy_redirect_sources(), vec!["sub/index.en.html"]);
    }

    #[test]
    fn japanese_pass_finds_english_sibling() {
        let existing: HashSet<&str> = HashSet::from(["about.en.html"]);
        let resolution = resolve_variant(
            "about.jis.html",
            "ja",
            PassLanguage::Japanese,
            &|path| existing.contains(path),
            &no_lookup,
        )
        .expect("resolve");

        assert_eq!(resolution.canonical_path, "about.html");
        assert_eq!(resolution.language, RecordLanguage::Ja);
        assert_eq!(resolution.sibling_path.as_deref(), Some("about.en.html"));
        assert_eq!(resolution.editorial_note(), "Translated-Version: about.en.html");
        assert!(resolution.warnings.is_empty());
    }

    #[test]
    fn japanese_pass_without_sibling_is_neutral() {
        let resolution = resolve_variant(
            "news/report.jis.html",
            "ja",
            PassLanguage::Japanese,
            &|_| false,
            &no_lookup,
        )
        .expect("resolve");

        assert_eq!(resolution.language, RecordLanguage::Neutral);
        assert!(resolution.sibling_path.is_none());
        assert_eq!(resolution.editorial_note(), "Translated-Version: None.");
    }

    #[test]
    fn language_mismatch_forces_neutral_without_probing() {
        let resolution = resolve_variant(
            "about.jis.html",
            "en",
            PassLanguage::Japanese,
            &|_| panic!("must not probe siblings"),
            &no_lookup,
        )
        .expect("resolve");

        assert_eq!(resolution.language, RecordLanguage::Neutral);
        assert_eq!(
            resolution.warnings,
            vec!["Warning: Language-code=(en), which should be ja."]
        );
        assert!(resolution.notes.is_empty());
        assert_eq!(
            resolution.editorial_note(),
            "Warning: Language-code=(en), which should be ja."
        );
    }

    #[test]
    fn unmatched_filename_forces_neutral() {
        let resolution = resolve_variant(
            "foo.en.gb.html",
            "en",
            PassLanguage::English,
            &|_| panic!("must not probe siblings"),
            &no_lookup,
        )
        .expect("resolve");

        assert_eq!(resolution.language, RecordLanguage::Neutral);
        assert_eq!(resolution.warnings.len(), 1);
        assert!(resolution.warnings[0].contains("Filename-pattern mismatch"));
    }

    #[test]
    fn english_pass_links_translation_record() {
        let existing: HashSet<&str> = HashSet::from(["about.jis.html", "about.html"]);
        let resolution = resolve_variant(
            "about.en.html",
            "en",
            PassLanguage::English,
            &|path| existing.contains(path),
            &|sibling| {
                assert_eq!(sibling, "about.jis.html");
                Ok(Some(7))
            },
        )
        .expect("resolve");

        assert_eq!(resolution.language, RecordLanguage::En);
        assert_eq!(resolution.sibling_path.as_deref(), Some("about.jis.html"));
        assert_eq!(resolution.translation_of, Some(7));
        assert_eq!(
            resolution.editorial_note(),
            "Translated-Version: about.jis.html : record=(7)"
        );
    }

    #[test]
    fn english_pass_warns_when_sibling_record_is_missing() {
        let resolution = resolve_variant(
            "about.en.us.html",
            "en",
            PassLanguage::English,
            &|path| path == "about.html",
            &no_lookup,
        )
        .expect("resolve");

        assert_eq!(resolution.language, RecordLanguage::En);
        assert_eq!(resolution.translation_of, None);
        assert_eq!(
            resolution.editorial_note(),
            "Warning: no stored record for translated version (about.html).\n\
             Translated-Version: about.html : record=(none)"
        );
        assert_eq!(resolution.warnings.len(), 1);
        assert!(resolution.warnings[0].contains("no stored record"));
    }
}
