use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, params};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::html::AlternateLink;
use crate::migrate;
use crate::paths::RecordLanguage;

/// The emitted unit of the migration: one legacy file mapped onto its
/// canonical destination. Records are keyed by `source_path`.
#[derive(Debug, Clone, Serialize)]
pub struct ContentRecord {
    pub source_path: String,
    pub canonical_path: String,
    pub title: String,
    pub title_original: String,
    pub body: String,
    pub language: RecordLanguage,
    pub body_language: String,
    pub meta_description: String,
    pub meta_keywords: String,
    pub alternate_links: Vec<AlternateLink>,
    pub taxonomy: String,
    pub translation_of: Option<i64>,
    pub original_uri: String,
    pub author: String,
    pub editorial_note: String,
    pub created_unix: i64,
    pub changed_unix: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreAction {
    Created,
    Updated,
    Unchanged,
}

impl StoreAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StoredContent {
    pub id: i64,
    pub action: StoreAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectRule {
    pub id: i64,
    pub source: String,
    pub target: String,
    pub language: String,
}

pub trait ContentStore {
    /// Insert or refresh the record for its `source_path`, returning the
    /// stable identifier. An unchanged record is not rewritten.
    fn upsert(&mut self, record: &ContentRecord) -> Result<StoredContent>;
    fn find_id_by_source_path(&self, source_path: &str) -> Result<Option<i64>>;
    fn load(&self, id: i64) -> Result<Option<ContentRecord>>;
}

pub trait RedirectStore {
    fn find_by_source(&self, source: &str) -> Result<Vec<RedirectRule>>;
    fn create(&mut self, source: &str, target: &str, language: RecordLanguage) -> Result<i64>;
    fn update_target(&mut self, id: i64, target: &str) -> Result<()>;
}

pub fn compute_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut output = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn record_hash(record: &ContentRecord) -> Result<String> {
    let serialized =
        serde_json::to_string(record).context("failed to serialize content record")?;
    Ok(compute_hash(&serialized))
}

fn unix_timestamp() -> Result<i64> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .context("system clock error")?;
    i64::try_from(now.as_secs()).context("timestamp does not fit into i64")
}

fn parse_language(value: &str) -> RecordLanguage {
    match value {
        "ja" => RecordLanguage::Ja,
        "en" => RecordLanguage::En,
        _ => RecordLanguage::Neutral,
    }
}

pub struct SqliteContentStore {
    connection: Connection,
}

impl SqliteContentStore {
    /// Open the content side of the database, applying pending schema
    /// migrations first.
    pub fn open(db_path: &Path) -> Result<Self> {
        migrate::ensure_db_parent(db_path)?;
        let connection = migrate::open_connection(db_path)?;
        migrate::apply_pending(&connection)?;
        Ok(Self { connection })
    }

    fn existing_row(&self, source_path: &str) -> Result<Option<(i64, String)>> {
        let mut statement = self
            .connection
            .prepare("SELECT id, content_hash FROM content_records WHERE source_path = ?1")
            .context("failed to prepare content lookup")?;
        let mut rows = statement
            .query(params![source_path])
            .context("failed to run content lookup")?;
        match rows.next().context("failed to read content row")? {
            Some(row) => Ok(Some((row.get(0)?, row.get(1)?))),
            None => Ok(None),
        }
    }
}

impl ContentStore for SqliteContentStore {
    fn upsert(&mut self, record: &ContentRecord) -> Result<StoredContent> {
        let hash = record_hash(record)?;
        let alternate_links = serde_json::to_string(&record.alternate_links)
            .context("failed to serialize alternate links")?;
        let imported_unix = unix_timestamp()?;

        match self.existing_row(&record.source_path)? {
            None => {
                self.connection
                    .execute(
                        "INSERT INTO content_records (
                            source_path, canonical_path, title, title_original, body,
                            language, body_language, meta_description, meta_keywords,
                            alternate_links, taxonomy, translation_of, original_uri,
                            author, editorial_note, content_hash, created_unix, changed_unix,
                            imported_unix
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
                        params![
                            record.source_path,
                            record.canonical_path,
                            record.title,
                            record.title_original,
                            record.body,
                            record.language.as_str(),
                            record.body_language,
                            record.meta_description,
                            record.meta_keywords,
                            alternate_links,
                            record.taxonomy,
                            record.translation_of,
                            record.original_uri,
                            record.author,
                            record.editorial_note,
                            hash,
                            record.created_unix,
                            record.changed_unix,
                            imported_unix,
                        ],
                    )
                    .with_context(|| format!("failed to insert {}", record.source_path))?;
                Ok(StoredContent {
                    id: self.connection.last_insert_rowid(),
                    action: StoreAction::Created,
                })
            }
            Some((id, existing_hash)) if existing_hash == hash => Ok(StoredContent {
                id,
                action: StoreAction::Unchanged,
            }),
            Some((id, _)) => {
                self.connection
                    .execute(
                        "UPDATE content_records SET
                            canonical_path = ?2, title = ?3, title_original = ?4, body = ?5,
                            language = ?6, body_language = ?7, meta_description = ?8,
                            meta_keywords = ?9, alternate_links = ?10, taxonomy = ?11,
                            translation_of = ?12, original_uri = ?13, author = ?14,
                            editorial_note = ?15, content_hash = ?16, created_unix = ?17,
                            changed_unix = ?18, imported_unix = ?19
                         WHERE id = ?1",
                        params![
                            id,
                            record.canonical_path,
                            record.title,
                            record.title_original,
                            record.body,
                            record.language.as_str(),
                            record.body_language,
                            record.meta_description,
                            record.meta_keywords,
                            alternate_links,
                            record.taxonomy,
                            record.translation_of,
                            record.original_uri,
                            record.author,
                            record.editorial_note,
                            hash,
                            record.created_unix,
                            record.changed_unix,
                            imported_unix,
                        ],
                    )
                    .with_context(|| format!("failed to update {}", record.source_path))?;
                Ok(StoredContent {
                    id,
                    action: StoreAction::Updated,
                })
            }
        }
    }

    fn find_id_by_source_path(&self, source_path: &str) -> Result<Option<i64>> {
        Ok(self.existing_row(source_path)?.map(|(id, _)| id))
    }

    fn load(&self, id: i64) -> Result<Option<ContentRecord>> {
        let mut statement = self
            .connection
            .prepare(
                "SELECT
                    source_path, canonical_path, title, title_original, body,
                    language, body_language, meta_description, meta_keywords,
                    alternate_links, taxonomy, translation_of, original_uri,
                    author, editorial_note, created_unix, changed_unix
                 FROM content_records
                 WHERE id = ?1",
            )
            .context("failed to prepare content load")?;
        let mut rows = statement
            .query(params![id])
            .context("failed to run content load")?;
        let Some(row) = rows.next().context("failed to read content row")? else {
            return Ok(None);
        };

        let language: String = row.get(5)?;
        let alternate_links: String = row.get(9)?;
        Ok(Some(ContentRecord {
            source_path: row.get(0)?,
            canonical_path: row.get(1)?,
            title: row.get(2)?,
            title_original: row.get(3)?,
            body: row.get(4)?,
            language: parse_language(&language),
            body_language: row.get(6)?,
            meta_description: row.get(7)?,
            meta_keywords: row.get(8)?,
            alternate_links: serde_json::from_str(&alternate_links)
                .context("failed to decode alternate links")?,
            taxonomy: row.get(10)?,
            translation_of: row.get(11)?,
            original_uri: row.get(12)?,
            author: row.get(13)?,
            editorial_note: row.get(14)?,
            created_unix: row.get(15)?,
            changed_unix: row.get(16)?,
        }))
    }
}

pub struct SqliteRedirectStore {
    connection: Connection,
}

impl SqliteRedirectStore {
    /// Open the redirect side of the database. Content and redirect stores
    /// hold separate connections onto the same WAL database.
    pub fn open(db_path: &Path) -> Result<Self> {
        migrate::ensure_db_parent(db_path)?;
        let connection = migrate::open_connection(db_path)?;
        migrate::apply_pending(&connection)?;
        Ok(Self { connection })
    }
}

impl RedirectStore for SqliteRedirectStore {
    fn find_by_source(&self, source: &str) -> Result<Vec<RedirectRule>> {
        let mut statement = self
            .connection
            .prepare(
                "SELECT id, source, target, language
                 FROM redirect_rules
                 WHERE source = ?1
                 ORDER BY id ASC",
            )
            .context("failed to prepare redirect lookup")?;
        let rows = statement
            .query_map(params![source], |row| {
                Ok(RedirectRule {
                    id: row.get(0)?,
                    source: row.get(1)?,
                    target: row.get(2)?,
                    language: row.get(3)?,
                })
            })
            .context("failed to run redirect lookup")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("failed to decode redirect rule")?);
        }
        Ok(out)
    }

    fn create(&mut self, source: &str, target: &str, language: RecordLanguage) -> Result<i64> {
        self.connection
            .execute(
                "INSERT INTO redirect_rules (source, target, language, updated_unix)
                 VALUES (?1, ?2, ?3, ?4)",
                params![source, target, language.as_str(), unix_timestamp()?],
            )
            .with_context(|| format!("failed to create redirect for {source}"))?;
        Ok(self.connection.last_insert_rowid())
    }

    fn update_target(&mut self, id: i64, target: &str) -> Result<()> {
        let affected = self
            .connection
            .execute(
                "UPDATE redirect_rules SET target = ?2, updated_unix = ?3 WHERE id = ?1",
                params![id, target, unix_timestamp()?],
            )
            .with_context(|| format!("failed to update redirect rule {id}"))?;
        if affected == 0 {
            bail!("no redirect rule with id {id}");
        }
        Ok(())
    }
}

/// In-memory stores backing dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    rows: Vec<MemoryContentRow>,
    next_id: i64,
}

#[derive(Debug)]
struct MemoryContentRow {
    id: i64,
    hash: String,
    record: ContentRecord,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn record_by_source(&self, source_path: &str) -> Option<&ContentRecord> {
        self.rows
            .iter()
            .find(|row| row.record.source_path == source_path)
            .map(|row| &row.record)
    }
}

impl ContentStore for MemoryContentStore {
    fn upsert(&mut self, record: &ContentRecord) -> Result<StoredContent> {
        let hash = record_hash(record)?;
        if let Some(row) = self
            .rows
            .iter_mut()
            .find(|row| row.record.source_path == record.source_path)
        {
            if row.hash == hash {
                return Ok(StoredContent {
                    id: row.id,
                    action: StoreAction::Unchanged,
                });
            }
            row.hash = hash;
            row.record = record.clone();
            return Ok(StoredContent {
                id: row.id,
                action: StoreAction::Updated,
            });
        }

        self.next_id += 1;
        let id = self.next_id;
        self.rows.push(MemoryContentRow {
            id,
            hash,
            record: record.clone(),
        });
        Ok(StoredContent {
            id,
            action: StoreAction::Created,
        })
    }

    fn find_id_by_source_path(&self, source_path: &str) -> Result<Option<i64>> {
        Ok(self
            .rows
            .iter()
            .find(|row| row.record.source_path == source_path)
            .map(|row| row.id))
    }

    fn load(&self, id: i64) -> Result<Option<ContentRecord>> {
        Ok(self
            .rows
            .iter()
            .find(|row| row.id == id)
            .map(|row| row.record.clone()))
    }
}

#[derive(Debug, Default)]
pub struct MemoryRedirectStore {
    rules: Vec<RedirectRule>,
    next_id: i64,
}

impl MemoryRedirectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rules(&self) -> &[RedirectRule] {
        &self.rules
    }
}

impl RedirectStore for MemoryRedirectStore {
    fn find_by_source(&self, source: &str) -> Result<Vec<RedirectRule>> {
        Ok(self
            .rules
            .iter()
            .filter(|rule| rule.source == source)
            .cloned()
            .collect())
    }

    fn create(&mut self, source: &str, target: &str, language: RecordLanguage) -> Result<i64> {
        self.next_id += 1;
        self.rules.push(RedirectRule {
            id: self.next_id,
            source: source.to_string(),
            target: target.to_string(),
            language: language.as_str().to_string(),
        });
        Ok(self.next_id)
    }

    fn update_target(&mut self, id: i64, target: &str) -> Result<()> {
        match self.rules.iter_mut().find(|rule| rule.id == id) {
            Some(rule) => {
                rule.target = target.to_string();
                Ok(())
            }
            None => bail!("no redirect rule with id {id}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub content_records: usize,
    pub by_language: BTreeMap<String, usize>,
    pub translated_pairs: usize,
    pub redirect_rules: usize,
    pub schema_version: u32,
}

pub fn load_store_stats(db_path: &Path) -> Result<StoreStats> {
    let connection = migrate::open_connection(db_path)?;

    let schema_version = if table_exists(&connection, "schema_migrations")? {
        migrate::current_version(&connection)?
    } else {
        0
    };

    let mut stats = StoreStats {
        content_records: 0,
        by_language: BTreeMap::new(),
        translated_pairs: 0,
        redirect_rules: 0,
        schema_version,
    };

    if table_exists(&connection, "content_records")? {
        stats.content_records = count_rows(&connection, "SELECT COUNT(*) FROM content_records")?;
        stats.translated_pairs = count_rows(
            &connection,
            "SELECT COUNT(*) FROM content_records WHERE translation_of IS NOT NULL",
        )?;

        let mut statement = connection
            .prepare("SELECT language, COUNT(*) FROM content_records GROUP BY language")
            .context("failed to prepare language stats query")?;
        let rows = statement
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .context("failed to run language stats query")?;
        for row in rows {
            let (language, count) = row.context("failed to decode language stats row")?;
            stats
                .by_language
                .insert(language, usize::try_from(count).unwrap_or(0));
        }
    }

    if table_exists(&connection, "redirect_rules")? {
        stats.redirect_rules = count_rows(&connection, "SELECT COUNT(*) FROM redirect_rules")?;
    }

    Ok(stats)
}

fn count_rows(connection: &Connection, sql: &str) -> Result<usize> {
    let count: i64 = connection
        .query_row(sql, [], |row| row.get(0))
        .with_context(|| format!("failed to run {sql}"))?;
    usize::try_from(count).context("row count does not fit into usize")
}

fn table_exists(connection: &Connection, name: &str) -> Result<bool> {
    let count: i64 = connection
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )
        .with_context(|| format!("failed to check for table {name}"))?;
    Ok(count > 0)
}
