use std::str::FromStr;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::error::{ServiceError, ServiceResult};
use crate::query::{PageRequest, PageResult, SearchFilters};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Locale {
    pub id: i64,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// A translation denormalized with its locale code and tag name.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TranslationRecord {
    pub id: i64,
    pub key: String,
    pub content: String,
    pub locale_id: i64,
    pub locale_code: String,
    pub tag_id: Option<i64>,
    pub tag_name: Option<String>,
    pub updated_at: String,
}

/// Row shape of the full export projection. Locale and tag stay optional so
/// rows with dangling references still appear in the dump.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ExportRow {
    pub id: i64,
    pub locale_code: Option<String>,
    pub key: String,
    pub content: String,
    pub tag_name: Option<String>,
    pub updated_at: String,
}

/// One key/content pair from the locale export projection.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct KeyContent {
    pub key: String,
    pub content: String,
}

/// Write payload for creating or updating a translation.
#[derive(Debug, Clone)]
pub struct TranslationInput {
    pub key: String,
    pub locale_id: i64,
    pub tag_id: Option<i64>,
    pub content: String,
}

/// Translation keys are stored trimmed and lower-cased; uniqueness and the
/// key filter both rely on it.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

// Fixed-width UTC timestamps so lexicographic order matches chronological.
fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

const DUPLICATE_TRANSLATION: &str = "Duplicate translation key for the selected locale and tag";

const TRANSLATION_SELECT: &str = "SELECT t.id, t.key, t.content, t.locale_id, \
     l.code AS locale_code, t.tag_id, g.name AS tag_name, t.updated_at \
     FROM translations t \
     JOIN locales l ON l.id = t.locale_id \
     LEFT JOIN tags g ON g.id = t.tag_id";

const SCHEMA_SQL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS locales (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        code TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS translations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        key TEXT NOT NULL,
        locale_id INTEGER NOT NULL REFERENCES locales(id),
        tag_id INTEGER REFERENCES tags(id),
        content TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    // Keys are stored normalized, so this index enforces the case-insensitive
    // uniqueness of (key, locale, tag) even when two creates race.
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_translations_key_locale_tag
        ON translations (key, locale_id, tag_id)",
    "CREATE INDEX IF NOT EXISTS idx_translations_updated
        ON translations (updated_at)",
    "CREATE INDEX IF NOT EXISTS idx_translations_locale_updated
        ON translations (locale_id, updated_at)",
    "CREATE INDEX IF NOT EXISTS idx_translations_content
        ON translations (content)",
];

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

/// Relational persistence for locales, tags, and translations.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database and run the schema migration.
    pub async fn connect(database_url: &str) -> ServiceResult<Self> {
        let opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // SQLite permits limited write concurrency; a single pooled connection
        // avoids "database is locked" failures and keeps in-memory databases
        // alive for the lifetime of the pool.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> ServiceResult<()> {
        for statement in SCHEMA_SQL {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn health_check(&self) -> ServiceResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ==================== Locales ====================

    pub async fn create_locale(&self, code: &str) -> ServiceResult<Locale> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ServiceError::Validation(
                "Locale code cannot be empty".into(),
            ));
        }

        match sqlx::query("INSERT INTO locales (code) VALUES (?)")
            .bind(code)
            .execute(&self.pool)
            .await
        {
            Ok(done) => Ok(Locale {
                id: done.last_insert_rowid(),
                code: code.to_string(),
            }),
            Err(e) if is_unique_violation(&e) => Err(ServiceError::Conflict(
                "Locale with this code already exists".into(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_locale(&self, id: i64) -> ServiceResult<Locale> {
        sqlx::query_as::<_, Locale>("SELECT id, code FROM locales WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Locale not found".into()))
    }

    pub async fn update_locale(&self, id: i64, code: &str) -> ServiceResult<Locale> {
        let existing = self.get_locale(id).await?;

        let code = code.trim();
        if code.is_empty() {
            return Err(ServiceError::Validation(
                "Locale code cannot be empty".into(),
            ));
        }

        if code != existing.code {
            match sqlx::query("UPDATE locales SET code = ? WHERE id = ?")
                .bind(code)
                .bind(id)
                .execute(&self.pool)
                .await
            {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    return Err(ServiceError::Conflict(
                        "Locale with this code already exists".into(),
                    ))
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Locale {
            id,
            code: code.to_string(),
        })
    }

    /// Deletion is blocked while translations still reference the locale.
    pub async fn delete_locale(&self, id: i64) -> ServiceResult<()> {
        self.get_locale(id).await?;

        match sqlx::query("DELETE FROM locales WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_foreign_key_violation(&e) => Err(ServiceError::Conflict(
                "Locale is referenced by existing translations".into(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_locales(&self) -> ServiceResult<Vec<Locale>> {
        Ok(
            sqlx::query_as::<_, Locale>("SELECT id, code FROM locales ORDER BY id DESC")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    // ==================== Tags ====================

    pub async fn create_tag(&self, name: &str) -> ServiceResult<Tag> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::Validation("Tag name cannot be empty".into()));
        }

        match sqlx::query("INSERT INTO tags (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await
        {
            Ok(done) => Ok(Tag {
                id: done.last_insert_rowid(),
                name: name.to_string(),
            }),
            Err(e) if is_unique_violation(&e) => Err(ServiceError::Conflict(
                "Tag with this name already exists".into(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_tag(&self, id: i64) -> ServiceResult<Tag> {
        sqlx::query_as::<_, Tag>("SELECT id, name FROM tags WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Tag not found".into()))
    }

    pub async fn find_tag_by_name(&self, name: &str) -> ServiceResult<Option<Tag>> {
        Ok(
            sqlx::query_as::<_, Tag>("SELECT id, name FROM tags WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn update_tag(&self, id: i64, name: &str) -> ServiceResult<Tag> {
        let existing = self.get_tag(id).await?;

        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::Validation("Tag name cannot be empty".into()));
        }

        if name != existing.name {
            match sqlx::query("UPDATE tags SET name = ? WHERE id = ?")
                .bind(name)
                .bind(id)
                .execute(&self.pool)
                .await
            {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    return Err(ServiceError::Conflict(
                        "Tag with this name already exists".into(),
                    ))
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Tag {
            id,
            name: name.to_string(),
        })
    }

    /// Deletion is blocked while translations still reference the tag.
    pub async fn delete_tag(&self, id: i64) -> ServiceResult<()> {
        self.get_tag(id).await?;

        match sqlx::query("DELETE FROM tags WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_foreign_key_violation(&e) => Err(ServiceError::Conflict(
                "Tag is referenced by existing translations".into(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_tags(&self) -> ServiceResult<Vec<Tag>> {
        Ok(
            sqlx::query_as::<_, Tag>("SELECT id, name FROM tags ORDER BY id DESC")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    // ==================== Translations ====================

    pub async fn create_translation(
        &self,
        input: &TranslationInput,
    ) -> ServiceResult<TranslationRecord> {
        let key = normalize_key(&input.key);
        if key.is_empty() {
            return Err(ServiceError::Validation(
                "Translation key cannot be empty".into(),
            ));
        }
        if input.content.trim().is_empty() {
            return Err(ServiceError::Validation(
                "Translation content cannot be empty".into(),
            ));
        }

        let locale = self.get_locale(input.locale_id).await?;
        let tag = match input.tag_id {
            Some(tag_id) => Some(self.get_tag(tag_id).await?),
            None => None,
        };
        let tag_id = tag.as_ref().map(|t| t.id);

        if self.duplicate_exists(&key, locale.id, tag_id, None).await? {
            return Err(ServiceError::Conflict(DUPLICATE_TRANSLATION.into()));
        }

        let inserted = sqlx::query(
            "INSERT INTO translations (key, locale_id, tag_id, content, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&key)
        .bind(locale.id)
        .bind(tag_id)
        .bind(&input.content)
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await;

        let id = match inserted {
            Ok(done) => done.last_insert_rowid(),
            // The unique index is the arbiter when a concurrent create slips
            // past the existence check; the loser sees the same conflict.
            Err(e) if is_unique_violation(&e) => {
                return Err(ServiceError::Conflict(DUPLICATE_TRANSLATION.into()))
            }
            Err(e) => return Err(e.into()),
        };

        self.get_translation(id).await
    }

    pub async fn get_translation(&self, id: i64) -> ServiceResult<TranslationRecord> {
        let sql = format!("{TRANSLATION_SELECT} WHERE t.id = ?");
        sqlx::query_as::<_, TranslationRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Translation not found with ID: {id}")))
    }

    pub async fn update_translation(
        &self,
        id: i64,
        input: &TranslationInput,
    ) -> ServiceResult<TranslationRecord> {
        self.get_translation(id).await?;

        let key = normalize_key(&input.key);
        if key.is_empty() {
            return Err(ServiceError::Validation(
                "Translation key cannot be empty".into(),
            ));
        }
        if input.content.trim().is_empty() {
            return Err(ServiceError::Validation(
                "Translation content cannot be empty".into(),
            ));
        }

        let locale = self.get_locale(input.locale_id).await?;
        let tag = match input.tag_id {
            Some(tag_id) => Some(self.get_tag(tag_id).await?),
            None => None,
        };
        let tag_id = tag.as_ref().map(|t| t.id);

        if self
            .duplicate_exists(&key, locale.id, tag_id, Some(id))
            .await?
        {
            return Err(ServiceError::Conflict(DUPLICATE_TRANSLATION.into()));
        }

        let updated = sqlx::query(
            "UPDATE translations SET key = ?, locale_id = ?, tag_id = ?, content = ?, \
             updated_at = ? WHERE id = ?",
        )
        .bind(&key)
        .bind(locale.id)
        .bind(tag_id)
        .bind(&input.content)
        .bind(now_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await;

        match updated {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(ServiceError::Conflict(DUPLICATE_TRANSLATION.into()))
            }
            Err(e) => return Err(e.into()),
        }

        self.get_translation(id).await
    }

    pub async fn delete_translation(&self, id: i64) -> ServiceResult<()> {
        let affected = sqlx::query("DELETE FROM translations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Translation not found with ID: {id}"
            )));
        }
        Ok(())
    }

    /// Case-insensitive existence check for the (key, locale, tag) triple,
    /// optionally excluding one row (for updates).
    pub async fn duplicate_exists(
        &self,
        key: &str,
        locale_id: i64,
        tag_id: Option<i64>,
        excluding: Option<i64>,
    ) -> ServiceResult<bool> {
        let exists: bool = match excluding {
            Some(id) => {
                sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM translations \
                     WHERE lower(key) = lower(?) AND locale_id = ? AND tag_id IS ? AND id != ?)",
                )
                .bind(key)
                .bind(locale_id)
                .bind(tag_id)
                .bind(id)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM translations \
                     WHERE lower(key) = lower(?) AND locale_id = ? AND tag_id IS ?)",
                )
                .bind(key)
                .bind(locale_id)
                .bind(tag_id)
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(exists)
    }

    // ==================== Queries & Projections ====================

    /// Filtered, paginated search ordered by update time, newest first.
    pub async fn search_translations(
        &self,
        filters: &SearchFilters,
        page: PageRequest,
    ) -> ServiceResult<PageResult<TranslationRecord>> {
        let (where_sql, binds) = filters.predicates();

        let count_sql = format!(
            "SELECT COUNT(*) FROM translations t \
             JOIN locales l ON l.id = t.locale_id \
             LEFT JOIN tags g ON g.id = t.tag_id {where_sql}"
        );
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for bind in &binds {
            count_query = count_query.bind(bind);
        }
        let total_items = count_query.fetch_one(&self.pool).await?;

        let select_sql =
            format!("{TRANSLATION_SELECT} {where_sql} ORDER BY t.updated_at DESC LIMIT ? OFFSET ?");
        let mut select_query = sqlx::query_as::<_, TranslationRecord>(&select_sql);
        for bind in &binds {
            select_query = select_query.bind(bind);
        }
        let items = select_query
            .bind(page.size)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(PageResult {
            items,
            page: page.page,
            size: page.size,
            total_items,
        })
    }

    /// Read-only denormalized projection behind the full export. LEFT JOINs
    /// keep rows with missing references in the dump.
    pub async fn export_translations(
        &self,
        page: PageRequest,
    ) -> ServiceResult<PageResult<ExportRow>> {
        let total_items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM translations")
            .fetch_one(&self.pool)
            .await?;

        let items = sqlx::query_as::<_, ExportRow>(
            "SELECT t.id, l.code AS locale_code, t.key, t.content, \
             g.name AS tag_name, t.updated_at \
             FROM translations t \
             LEFT JOIN locales l ON l.id = t.locale_id \
             LEFT JOIN tags g ON g.id = t.tag_id \
             ORDER BY t.updated_at DESC LIMIT ? OFFSET ?",
        )
        .bind(page.size)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(PageResult {
            items,
            page: page.page,
            size: page.size,
            total_items,
        })
    }

    /// Key/content pairs for one locale, optionally narrowed to a tag,
    /// ordered by update time. `page: None` fetches every matching row.
    pub async fn locale_pairs(
        &self,
        locale_code: &str,
        tag_id: Option<i64>,
        page: Option<PageRequest>,
    ) -> ServiceResult<PageResult<KeyContent>> {
        let mut where_sql = String::from("WHERE l.code = ?");
        if tag_id.is_some() {
            where_sql.push_str(" AND t.tag_id = ?");
        }

        let count_sql = format!(
            "SELECT COUNT(*) FROM translations t \
             JOIN locales l ON l.id = t.locale_id {where_sql}"
        );
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql).bind(locale_code);
        if let Some(tag_id) = tag_id {
            count_query = count_query.bind(tag_id);
        }
        let total_items = count_query.fetch_one(&self.pool).await?;

        let mut select_sql = format!(
            "SELECT t.key, t.content FROM translations t \
             JOIN locales l ON l.id = t.locale_id {where_sql} \
             ORDER BY t.updated_at DESC"
        );
        if page.is_some() {
            select_sql.push_str(" LIMIT ? OFFSET ?");
        }
        let mut select_query = sqlx::query_as::<_, KeyContent>(&select_sql).bind(locale_code);
        if let Some(tag_id) = tag_id {
            select_query = select_query.bind(tag_id);
        }
        if let Some(page) = page {
            select_query = select_query.bind(page.size).bind(page.offset());
        }
        let items = select_query.fetch_all(&self.pool).await?;

        let (page_number, size) = match page {
            Some(p) => (p.page, p.size),
            None => (0, total_items),
        };

        Ok(PageResult {
            items,
            page: page_number,
            size,
            total_items,
        })
    }
}
