use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::SiteConfig;
use crate::html::HtmlDocument;
use crate::paths::{PassLanguage, RecordLanguage, VariantResolution, path_info, resolve_variant};
use crate::redirects::{RedirectAction, RedirectOutcome, apply_redirects};
use crate::source::{FileTimestamps, SourceTree};
use crate::store::{ContentRecord, ContentStore, RedirectStore, StoreAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    EnumeratingJapanese,
    ProcessingJapanese,
    EnumeratingEnglish,
    ProcessingEnglish,
    PlanningRedirects,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileDisposition {
    Emitted,
    SkippedParse,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub relative_path: String,
    pub disposition: FileDisposition,
    pub record_id: Option<i64>,
    pub store_action: Option<StoreAction>,
    pub language: Option<RecordLanguage>,
    pub warnings: Vec<String>,
    pub redirects: Vec<RedirectOutcome>,
    pub skip_reason: Option<String>,
}

impl FileOutcome {
    fn parse_skipped(relative_path: &str, reason: String) -> Self {
        Self {
            relative_path: relative_path.to_string(),
            disposition: FileDisposition::SkippedParse,
            record_id: None,
            store_action: None,
            language: None,
            warnings: Vec::new(),
            redirects: Vec::new(),
            skip_reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub pass: PassLanguage,
    pub files: Vec<FileOutcome>,
    pub emitted: usize,
    pub skipped: usize,
    pub warnings: usize,
}

impl PassReport {
    fn new(pass: PassLanguage) -> Self {
        Self {
            pass,
            files: Vec::new(),
            emitted: 0,
            skipped: 0,
            warnings: 0,
        }
    }

    fn record(&mut self, outcome: FileOutcome) {
        match outcome.disposition {
            FileDisposition::Emitted => self.emitted += 1,
            FileDisposition::SkippedParse => self.skipped += 1,
        }
        self.warnings += outcome.warnings.len();
        self.files.push(outcome);
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RedirectTotals {
    pub created: usize,
    pub kept: usize,
    pub overwritten: usize,
    pub skipped_ambiguous: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub japanese: PassReport,
    pub english: PassReport,
    pub redirects: RedirectTotals,
}

/// Sequential two-pass migration over a legacy source tree. Every Japanese
/// file is emitted before the English pass starts, because the English
/// pass resolves its translation back-references against the records the
/// Japanese pass stored.
pub struct MigrationPipeline<'a> {
    source: SourceTree,
    config: SiteConfig,
    content: &'a mut dyn ContentStore,
    redirects: &'a mut dyn RedirectStore,
    state: PipelineState,
}

impl<'a> MigrationPipeline<'a> {
    pub fn new(
        source: SourceTree,
        config: SiteConfig,
        content: &'a mut dyn ContentStore,
        redirects: &'a mut dyn RedirectStore,
    ) -> Self {
        Self {
            source,
            config,
            content,
            redirects,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn run(&mut self) -> Result<MigrationReport> {
        match self.execute() {
            Ok(report) => {
                self.state = PipelineState::Done;
                Ok(report)
            }
            Err(err) => {
                self.state = PipelineState::Failed;
                Err(err)
            }
        }
    }

    fn execute(&mut self) -> Result<MigrationReport> {
        self.state = PipelineState::EnumeratingJapanese;
        let japanese_files = self
            .source
            .scan()
            .context("failed to enumerate Japanese pass files")?
            .japanese;
        self.state = PipelineState::ProcessingJapanese;
        let japanese = self.run_pass(PassLanguage::Japanese, &japanese_files)?;

        self.state = PipelineState::EnumeratingEnglish;
        let english_files = self
            .source
            .scan()
            .context("failed to enumerate English pass files")?
            .english;
        self.state = PipelineState::ProcessingEnglish;
        let english = self.run_pass(PassLanguage::English, &english_files)?;

        self.state = PipelineState::PlanningRedirects;
        let redirects = redirect_totals(japanese.files.iter().chain(english.files.iter()));

        Ok(MigrationReport {
            japanese,
            english,
            redirects,
        })
    }

    fn run_pass(&mut self, pass: PassLanguage, files: &[String]) -> Result<PassReport> {
        let mut report = PassReport::new(pass);
        for relative_path in files {
            let outcome = self.process_file(pass, relative_path).with_context(|| {
                format!(
                    "{} pass aborted at {relative_path} ({} emitted, {} skipped so far)",
                    pass.code(),
                    report.emitted,
                    report.skipped
                )
            })?;
            report.record(outcome);
        }
        Ok(report)
    }

    /// A file that fails to parse is recorded and skipped; filesystem and
    /// store failures abort the run.
    fn process_file(&mut self, pass: PassLanguage, relative_path: &str) -> Result<FileOutcome> {
        let bytes = self.source.read_bytes(relative_path)?;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => {
                return Ok(FileOutcome::parse_skipped(
                    relative_path,
                    "file is not valid UTF-8".to_string(),
                ));
            }
        };
        let doc = match HtmlDocument::parse(&text, relative_path) {
            Ok(doc) => doc,
            Err(err) => return Ok(FileOutcome::parse_skipped(relative_path, err.to_string())),
        };
        let timestamps = self.source.timestamps(relative_path)?;

        let resolution = {
            let sibling_exists = |sibling: &str| self.source.exists(sibling);
            let lookup = |sibling: &str| self.content.find_id_by_source_path(sibling);
            resolve_variant(
                relative_path,
                doc.language.code(),
                pass,
                &sibling_exists,
                &lookup,
            )?
        };

        let record = build_record(&doc, &resolution, timestamps, &self.config);
        let stored = self.content.upsert(&record)?;

        let info = path_info(relative_path, pass);
        let redirect_outcomes = apply_redirects(&info, self.redirects)?;

        Ok(FileOutcome {
            relative_path: relative_path.to_string(),
            disposition: FileDisposition::Emitted,
            record_id: Some(stored.id),
            store_action: Some(stored.action),
            language: Some(record.language),
            warnings: resolution.warnings,
            redirects: redirect_outcomes,
            skip_reason: None,
        })
    }
}

/// Pure mapping from parsed fields onto the stored record shape.
fn build_record(
    doc: &HtmlDocument,
    resolution: &VariantResolution,
    timestamps: FileTimestamps,
    config: &SiteConfig,
) -> ContentRecord {
    ContentRecord {
        source_path: doc.relative_path.clone(),
        canonical_path: resolution.canonical_path.clone(),
        title: doc.title.clone(),
        title_original: doc.title_original.clone(),
        body: doc.body.clone(),
        language: resolution.language,
        body_language: doc.language.code().to_string(),
        meta_description: doc.meta_description.clone(),
        meta_keywords: doc.meta_keywords.clone(),
        alternate_links: doc.alternate_links.clone(),
        taxonomy: taxonomy_for(&doc.relative_path),
        translation_of: resolution.translation_of,
        original_uri: config.legacy_uri(&doc.relative_path),
        author: config.author(),
        editorial_note: resolution.editorial_note(),
        created_unix: timestamps.created_unix,
        changed_unix: timestamps.changed_unix,
    }
}

/// First path segment; a file at the tree root is its own taxonomy.
fn taxonomy_for(relative_path: &str) -> String {
    relative_path
        .split('/')
        .next()
        .unwrap_or(relative_path)
        .to_string()
}

fn redirect_totals<'a>(outcomes: impl Iterator<Item = &'a FileOutcome>) -> RedirectTotals {
    let mut totals = RedirectTotals::default();
    for outcome in outcomes {
        for redirect in &outcome.redirects {
            match redirect.action {
                RedirectAction::Created => totals.created += 1,
                RedirectAction::Kept => totals.kept += 1,
                RedirectAction::Overwritten => totals.overwritten += 1,
                RedirectAction::SkippedAmbiguous => totals.skipped_ambiguous += 1,
            }
        }
    }
    totals
}
