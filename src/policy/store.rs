use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OptionalExtension, Row, params_from_iter};
use tracing::{debug, info};

use crate::policy::error::StoreError;
use crate::policy::repository::PolicyRepository;
use crate::policy::strategy::{ExactKey, MinorKey, PatchKey};
use crate::policy::types::{
    Checksum, DocPage, NewPolicyVersion, PolicyDoc, PolicyFilters, PolicyVersion, ResolvedItem,
};
use crate::policy::version::{Version, find_max_version, parse_version};

/// Schema migrations
/// Each version contains a list of SQL statements to execute
const MIGRATIONS: &[&[&str]] = &[
    // v1: enforce a single latest row per policy name
    &[
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_policy_versions_one_latest ON policy_versions(policy_name) WHERE is_latest = 1",
    ],
    // v2: faster newest-first listing per policy
    &[
        "CREATE INDEX IF NOT EXISTS idx_policy_versions_order ON policy_versions(policy_name, major DESC, minor DESC, patch DESC)",
    ],
];

const VERSION_COLUMNS: &str = r#"
    pv.id, pv.policy_name, pv.version, pv.is_latest,
    pv.display_name, pv.provider, pv.description,
    pv.categories, pv.tags, pv.supported_platforms,
    pv.logo_path, pv.banner_path, pv.release_date, pv.definition,
    pv.icon_path, pv.source_type, pv.download_url,
    pv.checksum_algorithm, pv.checksum_value,
    pv.created_at, pv.updated_at
"#;

const RESOLVED_COLUMNS: &str =
    "policy_name, version, download_url, checksum_algorithm, checksum_value";

/// Same columns qualified for queries that join `policy_versions pv`
const PV_RESOLVED_COLUMNS: &str =
    "pv.policy_name, pv.version, pv.download_url, pv.checksum_algorithm, pv.checksum_value";

const DOC_COLUMNS: &str = "id, policy_version_id, page, content_md, created_at, updated_at";

/// SQLite-backed implementation of [`PolicyRepository`]
///
/// Queries run on the blocking thread pool. A lookup whose caller has gone
/// away before the connection became free is skipped.
pub struct PolicyStore {
    conn: Arc<Mutex<Connection>>,
}

/// Marks a blocking job as abandoned when the awaiting future is dropped
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

impl PolicyStore {
    pub fn new(db_path: &Path) -> Result<Self, StoreError> {
        info!("Initializing policy database at {:?}", db_path);

        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        debug!("Database connection established");

        Self::create_schema(&conn)?;
        info!("Policy database initialized successfully");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock_conn(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, StoreError> {
        conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Current timestamp in milliseconds since UNIX epoch
    fn current_timestamp_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    /// Run `job` against the connection on the blocking pool
    async fn run<T, F>(&self, job: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let shared = Arc::clone(&self.conn);
        let cancelled = Arc::new(AtomicBool::new(false));
        let _guard = CancelOnDrop(Arc::clone(&cancelled));

        tokio::task::spawn_blocking(move || Self::run_blocking(&shared, &cancelled, job)).await?
    }

    /// Wait for the connection, then run `job` unless the caller gave up meanwhile
    fn run_blocking<T, F>(
        conn: &Mutex<Connection>,
        cancelled: &AtomicBool,
        job: F,
    ) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError>,
    {
        let mut conn = Self::lock_conn(conn)?;
        if cancelled.load(Ordering::Acquire) {
            debug!("Skipping query: caller no longer waiting");
            return Err(StoreError::Cancelled);
        }
        job(&mut *conn)
    }

    fn create_schema(conn: &Connection) -> Result<(), StoreError> {
        debug!("Creating database schema");

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS policy_versions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                policy_name TEXT NOT NULL,
                version TEXT NOT NULL,
                major INTEGER NOT NULL,
                minor INTEGER NOT NULL,
                patch INTEGER NOT NULL,
                is_latest INTEGER NOT NULL DEFAULT 0,
                display_name TEXT NOT NULL,
                provider TEXT NOT NULL,
                description TEXT,
                categories TEXT NOT NULL DEFAULT '[]',
                tags TEXT NOT NULL DEFAULT '[]',
                supported_platforms TEXT NOT NULL DEFAULT '[]',
                logo_path TEXT,
                banner_path TEXT,
                release_date INTEGER,
                definition TEXT NOT NULL,
                icon_path TEXT,
                source_type TEXT,
                download_url TEXT,
                checksum_algorithm TEXT,
                checksum_value TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(policy_name, version)
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_policy_versions_latest ON policy_versions(is_latest, policy_name)",
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS policy_docs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                policy_version_id INTEGER NOT NULL,
                page TEXT NOT NULL,
                content_md TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY (policy_version_id) REFERENCES policy_versions(id) ON DELETE CASCADE,
                UNIQUE(policy_version_id, page)
            )
            "#,
            [],
        )?;

        Self::apply_migrations(conn)?;

        debug!("Database schema created successfully");
        Ok(())
    }

    /// Apply pending migrations based on user_version pragma
    fn apply_migrations(conn: &Connection) -> Result<(), StoreError> {
        let current_version: i32 =
            conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        for (i, statements) in MIGRATIONS.iter().enumerate() {
            let version = (i + 1) as i32;
            if version > current_version {
                for sql in *statements {
                    conn.execute(sql, [])?;
                }
                debug!("Applied migration v{}", version);
            }
        }

        let target_version = MIGRATIONS.len() as i32;
        if target_version > current_version {
            conn.pragma_update(None, "user_version", target_version)?;
            debug!("Updated schema version to v{}", target_version);
        }

        Ok(())
    }
}

// =============================================================================
// Row mapping
// =============================================================================

fn millis_to_datetime(idx: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

fn json_list(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn checksum_from(algorithm: Option<String>, value: Option<String>) -> Option<Checksum> {
    match (algorithm, value) {
        (Some(algorithm), Some(value)) => Some(Checksum { algorithm, value }),
        _ => None,
    }
}

fn row_to_policy_version(row: &Row<'_>) -> rusqlite::Result<PolicyVersion> {
    let release_date = row
        .get::<_, Option<i64>>(12)?
        .map(|ms| millis_to_datetime(12, ms))
        .transpose()?;

    Ok(PolicyVersion {
        id: row.get(0)?,
        policy_name: row.get(1)?,
        version: row.get(2)?,
        is_latest: row.get(3)?,
        display_name: row.get(4)?,
        provider: row.get(5)?,
        description: row.get(6)?,
        categories: json_list(row, 7)?,
        tags: json_list(row, 8)?,
        supported_platforms: json_list(row, 9)?,
        logo_path: row.get(10)?,
        banner_path: row.get(11)?,
        release_date,
        definition: row.get(13)?,
        icon_path: row.get(14)?,
        source_type: row.get(15)?,
        download_url: row.get(16)?,
        checksum: checksum_from(row.get(17)?, row.get(18)?),
        created_at: millis_to_datetime(19, row.get(19)?)?,
        updated_at: millis_to_datetime(20, row.get(20)?)?,
    })
}

fn row_to_resolved_item(row: &Row<'_>) -> rusqlite::Result<ResolvedItem> {
    Ok(ResolvedItem {
        name: row.get(0)?,
        version: row.get(1)?,
        download_url: row.get(2)?,
        checksum: checksum_from(row.get(3)?, row.get(4)?),
    })
}

fn row_to_doc(row: &Row<'_>) -> rusqlite::Result<PolicyDoc> {
    Ok(PolicyDoc {
        id: row.get(0)?,
        policy_version_id: row.get(1)?,
        page: row.get(2)?,
        content_md: row.get(3)?,
        created_at: millis_to_datetime(4, row.get(4)?)?,
        updated_at: millis_to_datetime(5, row.get(5)?)?,
    })
}

// =============================================================================
// Query building
// =============================================================================

/// Escape LIKE wildcards so search text is matched literally
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Append `?n, ?n+1, ...` placeholders for `values`, returning the joined list
fn push_placeholders(params: &mut Vec<Value>, values: &[String]) -> String {
    values
        .iter()
        .map(|v| {
            params.push(Value::Text(v.clone()));
            format!("?{}", params.len())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// WHERE clause shared by the list and count queries.
///
/// Both queries must filter identically or pagination metadata drifts from
/// the returned page.
fn filter_clause(filters: &PolicyFilters, params: &mut Vec<Value>) -> String {
    let mut clauses = vec!["pv.is_latest = 1".to_string()];

    if let Some(search) = filters
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        params.push(Value::Text(format!("%{}%", escape_like(search))));
        let idx = params.len();
        clauses.push(format!(
            "(pv.policy_name LIKE ?{idx} ESCAPE '\\' \
              OR pv.display_name LIKE ?{idx} ESCAPE '\\' \
              OR COALESCE(pv.description, '') LIKE ?{idx} ESCAPE '\\')"
        ));
    }

    if !filters.categories.is_empty() {
        let placeholders = push_placeholders(params, &filters.categories);
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM json_each(pv.categories) c WHERE c.value IN ({placeholders}))"
        ));
    }

    if !filters.providers.is_empty() {
        let placeholders = push_placeholders(params, &filters.providers);
        clauses.push(format!("pv.provider IN ({placeholders})"));
    }

    if !filters.platforms.is_empty() {
        let placeholders = push_placeholders(params, &filters.platforms);
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM json_each(pv.supported_platforms) p WHERE p.value IN ({placeholders}))"
        ));
    }

    format!("WHERE {}", clauses.join(" AND "))
}

/// Build a `VALUES (?1, ?2), (?3, ?4)` list; each row is pushed by `row`
fn values_list<K>(
    keys: &[K],
    params: &mut Vec<Value>,
    mut row: impl FnMut(&K, &mut Vec<Value>) -> Option<()>,
) -> String {
    keys.iter()
        .filter_map(|key| {
            let start = params.len();
            match row(key, params) {
                Some(()) => Some(format!(
                    "({})",
                    (start + 1..=params.len())
                        .map(|i| format!("?{i}"))
                        .collect::<Vec<_>>()
                        .join(", ")
                )),
                None => {
                    params.truncate(start);
                    None
                }
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Version components are stored as INTEGER; keys beyond i64 can never match
fn component(value: u64) -> Option<Value> {
    i64::try_from(value).ok().map(Value::Integer)
}

fn offset(page: u32, page_size: u32) -> i64 {
    i64::from(page.saturating_sub(1)) * i64::from(page_size)
}

fn query_resolved(
    conn: &Connection,
    sql: &str,
    params: Vec<Value>,
) -> Result<Vec<ResolvedItem>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let items = stmt
        .query_map(params_from_iter(params), row_to_resolved_item)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

fn query_strings(conn: &Connection, sql: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let values = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(values)
}

fn get_version_by_id(conn: &Connection, id: i64) -> Result<PolicyVersion, StoreError> {
    let sql = format!("SELECT {VERSION_COLUMNS} FROM policy_versions pv WHERE pv.id = ?1");
    Ok(conn.query_row(&sql, [id], row_to_policy_version)?)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Insert or replace one doc page, returning the stored row
fn write_doc(
    conn: &Connection,
    version_id: i64,
    page: &str,
    content_md: &str,
    now: i64,
) -> Result<PolicyDoc, StoreError> {
    conn.execute(
        r#"
        INSERT INTO policy_docs (policy_version_id, page, content_md, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?4)
        ON CONFLICT(policy_version_id, page)
        DO UPDATE SET content_md = excluded.content_md, updated_at = excluded.updated_at
        "#,
        (version_id, page, content_md, now),
    )?;

    let sql =
        format!("SELECT {DOC_COLUMNS} FROM policy_docs WHERE policy_version_id = ?1 AND page = ?2");
    Ok(conn.query_row(&sql, (version_id, page), row_to_doc)?)
}

fn insert_policy_version(
    conn: &mut Connection,
    new: &NewPolicyVersion,
    parsed: &Version,
    docs: &IndexMap<DocPage, String>,
) -> Result<PolicyVersion, StoreError> {
    let out_of_range = || StoreError::InvalidData(format!("version {} out of range", new.version));
    let major = i64::try_from(parsed.major()).map_err(|_| out_of_range())?;
    let minor = i64::try_from(parsed.minor()).map_err(|_| out_of_range())?;
    let patch = i64::try_from(parsed.patch()).map_err(|_| out_of_range())?;

    let now = PolicyStore::current_timestamp_ms();
    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

    let existing: Vec<String> = {
        let mut stmt = tx.prepare("SELECT version FROM policy_versions WHERE policy_name = ?1")?;
        let versions = stmt
            .query_map([&new.policy_name], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        versions
    };
    let becomes_latest =
        find_max_version(existing.iter().map(String::as_str)).is_none_or(|max| *parsed > max);

    let inserted = tx.execute(
        r#"
        INSERT INTO policy_versions (
            policy_name, version, major, minor, patch, is_latest,
            display_name, provider, description,
            categories, tags, supported_platforms,
            logo_path, banner_path, release_date, definition,
            icon_path, source_type, download_url,
            checksum_algorithm, checksum_value,
            created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, 0,
            ?6, ?7, ?8,
            ?9, ?10, ?11,
            ?12, ?13, ?14, ?15,
            ?16, ?17, ?18,
            ?19, ?20,
            ?21, ?21
        )
        "#,
        rusqlite::params![
            new.policy_name,
            new.version,
            major,
            minor,
            patch,
            new.display_name,
            new.provider,
            new.description,
            serde_json::to_string(&new.categories)?,
            serde_json::to_string(&new.tags)?,
            serde_json::to_string(&new.supported_platforms)?,
            new.logo_path,
            new.banner_path,
            new.release_date.map(|d| d.timestamp_millis()),
            new.definition,
            new.icon_path,
            new.source_type,
            new.download_url,
            new.checksum.as_ref().map(|c| c.algorithm.as_str()),
            new.checksum.as_ref().map(|c| c.value.as_str()),
            now,
        ],
    );

    match inserted {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(StoreError::Duplicate {
                name: new.policy_name.clone(),
                version: new.version.clone(),
            });
        }
        Err(e) => return Err(e.into()),
    }

    let id = tx.last_insert_rowid();

    if becomes_latest {
        // Clear the previous latest first so the one-latest index never sees two rows
        tx.execute(
            "UPDATE policy_versions SET is_latest = 0, updated_at = ?2 WHERE policy_name = ?1 AND is_latest = 1",
            (&new.policy_name, now),
        )?;
        tx.execute(
            "UPDATE policy_versions SET is_latest = 1 WHERE id = ?1",
            [id],
        )?;
    }

    for (page, content_md) in docs {
        write_doc(&tx, id, page.as_str(), content_md, now)?;
    }

    let created = get_version_by_id(&tx, id)?;
    tx.commit()?;

    Ok(created)
}

#[async_trait::async_trait]
impl PolicyRepository for PolicyStore {
    async fn list_policies(&self, filters: &PolicyFilters) -> Result<Vec<PolicyVersion>, StoreError> {
        let filters = filters.clone();
        self.run(move |conn| {
            let mut params = Vec::new();
            let where_clause = filter_clause(&filters, &mut params);
            let page = u32::try_from(filters.page).unwrap_or(1);
            let page_size = u32::try_from(filters.page_size).unwrap_or(0);

            params.push(Value::Integer(i64::from(page_size)));
            let limit_idx = params.len();
            params.push(Value::Integer(offset(page, page_size)));
            let offset_idx = params.len();

            let sql = format!(
                "SELECT {VERSION_COLUMNS} FROM policy_versions pv {where_clause} \
                 ORDER BY pv.policy_name LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let policies = stmt
                .query_map(params_from_iter(params), row_to_policy_version)?
                .collect::<Result<Vec<_>, _>>()?;

            debug!("Listed {} policies", policies.len());
            Ok(policies)
        })
        .await
    }

    async fn count_policies(&self, filters: &PolicyFilters) -> Result<u64, StoreError> {
        let filters = filters.clone();
        self.run(move |conn| {
            let mut params = Vec::new();
            let where_clause = filter_clause(&filters, &mut params);
            let sql = format!("SELECT COUNT(*) FROM policy_versions pv {where_clause}");
            let count: i64 = conn.query_row(&sql, params_from_iter(params), |row| row.get(0))?;
            Ok(u64::try_from(count).unwrap_or_default())
        })
        .await
    }

    async fn distinct_categories(&self) -> Result<Vec<String>, StoreError> {
        self.run(|conn| {
            query_strings(
                conn,
                "SELECT DISTINCT c.value FROM policy_versions pv, json_each(pv.categories) c \
                 WHERE pv.is_latest = 1 ORDER BY c.value",
            )
        })
        .await
    }

    async fn distinct_providers(&self) -> Result<Vec<String>, StoreError> {
        self.run(|conn| {
            query_strings(
                conn,
                "SELECT DISTINCT provider FROM policy_versions WHERE is_latest = 1 ORDER BY provider",
            )
        })
        .await
    }

    async fn distinct_platforms(&self) -> Result<Vec<String>, StoreError> {
        self.run(|conn| {
            query_strings(
                conn,
                "SELECT DISTINCT p.value FROM policy_versions pv, json_each(pv.supported_platforms) p \
                 WHERE pv.is_latest = 1 ORDER BY p.value",
            )
        })
        .await
    }

    async fn get_policy_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<PolicyVersion>, StoreError> {
        let (name, version) = (name.to_string(), version.to_string());
        self.run(move |conn| {
            let sql = format!(
                "SELECT {VERSION_COLUMNS} FROM policy_versions pv \
                 WHERE pv.policy_name = ?1 AND pv.version = ?2"
            );
            Ok(conn
                .query_row(&sql, (&name, &version), row_to_policy_version)
                .optional()?)
        })
        .await
    }

    async fn get_latest_policy_version(&self, name: &str) -> Result<Option<PolicyVersion>, StoreError> {
        let name = name.to_string();
        self.run(move |conn| {
            let sql = format!(
                "SELECT {VERSION_COLUMNS} FROM policy_versions pv \
                 WHERE pv.policy_name = ?1 AND pv.is_latest = 1"
            );
            Ok(conn.query_row(&sql, [&name], row_to_policy_version).optional()?)
        })
        .await
    }

    async fn list_policy_versions(
        &self,
        name: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<PolicyVersion>, StoreError> {
        let name = name.to_string();
        self.run(move |conn| {
            let sql = format!(
                "SELECT {VERSION_COLUMNS} FROM policy_versions pv WHERE pv.policy_name = ?1 \
                 ORDER BY pv.major DESC, pv.minor DESC, pv.patch DESC LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let versions = stmt
                .query_map(
                    (&name, i64::from(page_size), offset(page, page_size)),
                    row_to_policy_version,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(versions)
        })
        .await
    }

    async fn count_policy_versions(&self, name: &str) -> Result<u64, StoreError> {
        let name = name.to_string();
        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM policy_versions WHERE policy_name = ?1",
                [&name],
                |row| row.get(0),
            )?;
            Ok(u64::try_from(count).unwrap_or_default())
        })
        .await
    }

    async fn create_policy_version(
        &self,
        version: &NewPolicyVersion,
        docs: &IndexMap<DocPage, String>,
    ) -> Result<PolicyVersion, StoreError> {
        let parsed = parse_version(&version.version)
            .map_err(|e| StoreError::InvalidData(e.to_string()))?;
        let new = version.clone();
        let docs = docs.clone();

        debug!("Saving {}@{} with {} docs", new.policy_name, new.version, docs.len());
        let created = self
            .run(move |conn| insert_policy_version(conn, &new, &parsed, &docs))
            .await?;
        debug!(
            "Saved {}@{} (latest: {})",
            created.policy_name, created.version, created.is_latest
        );

        Ok(created)
    }

    async fn lookup_exact(&self, keys: &[ExactKey]) -> Result<Vec<ResolvedItem>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let keys = keys.to_vec();
        self.run(move |conn| {
            let mut params = Vec::with_capacity(keys.len() * 2);
            let values = values_list(&keys, &mut params, |key, params| {
                params.push(Value::Text(key.name.clone()));
                params.push(Value::Text(key.version.clone()));
                Some(())
            });
            let sql = format!(
                r#"
                WITH req(name, version) AS (VALUES {values})
                SELECT {PV_RESOLVED_COLUMNS} FROM policy_versions pv
                JOIN (SELECT DISTINCT name, version FROM req) r
                  ON pv.policy_name = r.name AND pv.version = r.version
                "#
            );
            query_resolved(conn, &sql, params)
        })
        .await
    }

    async fn lookup_latest_patch(&self, keys: &[PatchKey]) -> Result<Vec<ResolvedItem>, StoreError> {
        let keys = keys.to_vec();
        self.run(move |conn| {
            let mut params = Vec::with_capacity(keys.len() * 3);
            let values = values_list(&keys, &mut params, |key, params| {
                params.push(Value::Text(key.name.clone()));
                params.push(component(key.major)?);
                params.push(component(key.minor)?);
                Some(())
            });
            if values.is_empty() {
                return Ok(Vec::new());
            }
            let sql = format!(
                r#"
                WITH req(name, major, minor) AS (VALUES {values})
                SELECT {RESOLVED_COLUMNS} FROM (
                    SELECT pv.*, ROW_NUMBER() OVER (
                        PARTITION BY pv.policy_name, pv.major, pv.minor
                        ORDER BY pv.patch DESC
                    ) AS rn
                    FROM policy_versions pv
                    JOIN (SELECT DISTINCT name, major, minor FROM req) r
                      ON pv.policy_name = r.name AND pv.major = r.major AND pv.minor = r.minor
                )
                WHERE rn = 1
                "#
            );
            query_resolved(conn, &sql, params)
        })
        .await
    }

    async fn lookup_latest_minor(&self, keys: &[MinorKey]) -> Result<Vec<ResolvedItem>, StoreError> {
        let keys = keys.to_vec();
        self.run(move |conn| {
            let mut params = Vec::with_capacity(keys.len() * 2);
            let values = values_list(&keys, &mut params, |key, params| {
                params.push(Value::Text(key.name.clone()));
                params.push(component(key.major)?);
                Some(())
            });
            if values.is_empty() {
                return Ok(Vec::new());
            }
            let sql = format!(
                r#"
                WITH req(name, major) AS (VALUES {values})
                SELECT {RESOLVED_COLUMNS} FROM (
                    SELECT pv.*, ROW_NUMBER() OVER (
                        PARTITION BY pv.policy_name, pv.major
                        ORDER BY pv.minor DESC, pv.patch DESC
                    ) AS rn
                    FROM policy_versions pv
                    JOIN (SELECT DISTINCT name, major FROM req) r
                      ON pv.policy_name = r.name AND pv.major = r.major
                )
                WHERE rn = 1
                "#
            );
            query_resolved(conn, &sql, params)
        })
        .await
    }

    async fn lookup_latest_major(&self, names: &[String]) -> Result<Vec<ResolvedItem>, StoreError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let names = names.to_vec();
        self.run(move |conn| {
            let mut params = Vec::with_capacity(names.len());
            let placeholders = push_placeholders(&mut params, &names);
            let sql = format!(
                "SELECT {RESOLVED_COLUMNS} FROM policy_versions \
                 WHERE is_latest = 1 AND policy_name IN ({placeholders})"
            );
            query_resolved(conn, &sql, params)
        })
        .await
    }

    async fn get_doc(&self, version_id: i64, page: &str) -> Result<Option<PolicyDoc>, StoreError> {
        let page = page.to_string();
        self.run(move |conn| {
            let sql = format!(
                "SELECT {DOC_COLUMNS} FROM policy_docs WHERE policy_version_id = ?1 AND page = ?2"
            );
            Ok(conn.query_row(&sql, (version_id, &page), row_to_doc).optional()?)
        })
        .await
    }

    async fn list_docs(&self, version_id: i64) -> Result<Vec<PolicyDoc>, StoreError> {
        self.run(move |conn| {
            let sql = format!(
                "SELECT {DOC_COLUMNS} FROM policy_docs WHERE policy_version_id = ?1 ORDER BY page"
            );
            let mut stmt = conn.prepare(&sql)?;
            let docs = stmt
                .query_map([version_id], row_to_doc)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(docs)
        })
        .await
    }

    async fn upsert_doc(
        &self,
        version_id: i64,
        page: &str,
        content_md: &str,
    ) -> Result<PolicyDoc, StoreError> {
        let (page, content_md) = (page.to_string(), content_md.to_string());
        self.run(move |conn| {
            write_doc(
                conn,
                version_id,
                &page,
                &content_md,
                Self::current_timestamp_ms(),
            )
        })
        .await
    }
}
