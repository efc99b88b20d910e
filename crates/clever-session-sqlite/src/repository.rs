//! SQLite implementation of [`SessionRepository`].

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use clever_session::{
    OnlineFlag, Page, RepositoryError, RepositoryResult, SessionRecord, SessionRepository,
};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use tracing::{debug, info};

use crate::error::{Result, SqliteError};

// ─────────────────────────────────────────────────────────────────────────────
// Schema Version
// ─────────────────────────────────────────────────────────────────────────────

/// Current schema version for migrations.
const SCHEMA_VERSION: i32 = 1;

const SELECT_COLUMNS: &str =
    "session_id, login_name, session_blob, online, host_ip, created_at, updated_at";

// ─────────────────────────────────────────────────────────────────────────────
// Repository
// ─────────────────────────────────────────────────────────────────────────────

/// Session repository backed by SQLite.
///
/// Records survive process restarts. Uses WAL mode so reporting queries do
/// not block request traffic. All statements run on the blocking thread pool.
#[derive(Clone)]
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRepository").finish_non_exhaustive()
    }
}

impl SqliteRepository {
    /// Open or create a session database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| SqliteError::CreateDir {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;
        initialize(&conn, true)?;

        info!("Session database opened at {:?}", path);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        initialize(&conn, false)?;

        debug!("In-memory session database created");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Total number of stored records.
    pub fn count_all(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM login_sessions", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Run a statement on the blocking pool with the connection locked.
    async fn with_conn<T, F>(&self, f: F) -> RepositoryResult<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await
        .map_err(|e| RepositoryError::Unavailable(format!("database task failed: {e}")))?
        .map_err(RepositoryError::from)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Initialization
// ─────────────────────────────────────────────────────────────────────────────

fn initialize(conn: &Connection, wal: bool) -> Result<()> {
    if wal {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
    }

    let current_version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .unwrap_or(0);

    if current_version >= SCHEMA_VERSION {
        debug!("Schema up to date (version {})", current_version);
        return Ok(());
    }

    conn.execute_batch(
        r#"
        -- One row per live session
        CREATE TABLE IF NOT EXISTS login_sessions (
            session_id TEXT PRIMARY KEY CHECK (length(trim(session_id)) > 0),
            login_name TEXT,
            session_blob BLOB NOT NULL,
            online TEXT NOT NULL CHECK (online IN ('online', 'offline')),
            host_ip TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- Online reporting pages by flag, newest first
        CREATE INDEX IF NOT EXISTS idx_login_sessions_online_updated
            ON login_sessions(online, updated_at);

        -- Idle purge
        CREATE INDEX IF NOT EXISTS idx_login_sessions_updated_at
            ON login_sessions(updated_at);
        "#,
    )?;

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

    info!("Session schema created (version {})", SCHEMA_VERSION);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    let online: String = row.get(3)?;
    let online = online
        .parse::<OnlineFlag>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into()))?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;

    Ok(SessionRecord {
        session_id: row.get(0)?,
        login_name: row.get(1)?,
        session_blob: row.get(2)?,
        online,
        host_ip: row.get(4)?,
        created_at: parse_timestamp(5, &created_at)?,
        updated_at: parse_timestamp(6, &updated_at)?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// SessionRepository
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl SessionRepository for SqliteRepository {
    async fn save(&self, record: &SessionRecord) -> RepositoryResult<()> {
        let record = record.clone();
        let session_id = record.session_id.clone();
        self.with_conn(move |conn| {
            conn.execute(
                r#"
                INSERT INTO login_sessions
                    (session_id, login_name, session_blob, online, host_ip, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    record.session_id,
                    record.login_name,
                    record.session_blob,
                    record.online.as_str(),
                    record.host_ip,
                    format_timestamp(&record.created_at),
                    format_timestamp(&record.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| match e {
            RepositoryError::Duplicate(_) => RepositoryError::Duplicate(session_id),
            other => other,
        })
    }

    async fn update(&self, record: &SessionRecord) -> RepositoryResult<()> {
        let record = record.clone();
        let session_id = record.session_id.clone();
        let rows = self
            .with_conn(move |conn| {
                let rows = conn.execute(
                    r#"
                    UPDATE login_sessions
                    SET login_name = ?2, session_blob = ?3, online = ?4, host_ip = ?5,
                        created_at = ?6, updated_at = ?7
                    WHERE session_id = ?1
                    "#,
                    params![
                        record.session_id,
                        record.login_name,
                        record.session_blob,
                        record.online.as_str(),
                        record.host_ip,
                        format_timestamp(&record.created_at),
                        format_timestamp(&record.updated_at),
                    ],
                )?;
                Ok(rows)
            })
            .await?;

        if rows == 0 {
            return Err(RepositoryError::NotFound(session_id));
        }
        Ok(())
    }

    async fn delete_by_session_id(&self, session_id: &str) -> RepositoryResult<bool> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            let rows = conn.execute(
                "DELETE FROM login_sessions WHERE session_id = ?1",
                params![session_id],
            )?;
            Ok(rows > 0)
        })
        .await
    }

    async fn get_by_session_id(&self, session_id: &str) -> RepositoryResult<Option<SessionRecord>> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {SELECT_COLUMNS} FROM login_sessions WHERE session_id = ?1");
            let record = conn
                .query_row(&sql, params![session_id], row_to_record)
                .optional()?;
            Ok(record)
        })
        .await
    }

    async fn list_by_online(&self, online: OnlineFlag, page: Page) -> RepositoryResult<Vec<SessionRecord>> {
        // SQLite reads a negative OFFSET as zero, so saturate instead of wrapping.
        let limit = i64::try_from(page.size).unwrap_or(i64::MAX);
        let offset = i64::try_from(page.offset()).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let sql = format!(
                r#"
                SELECT {SELECT_COLUMNS}
                FROM login_sessions
                WHERE online = ?1
                ORDER BY updated_at DESC, session_id ASC
                LIMIT ?2 OFFSET ?3
                "#
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![online.as_str(), limit, offset],
                row_to_record,
            )?;

            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
        .await
    }

    async fn count_by_online(&self, online: OnlineFlag) -> RepositoryResult<u64> {
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM login_sessions WHERE online = ?1",
                params![online.as_str()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }

    async fn delete_updated_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<u64> {
        self.with_conn(move |conn| {
            let rows = conn.execute(
                "DELETE FROM login_sessions WHERE updated_at < ?1",
                params![format_timestamp(&cutoff)],
            )?;
            debug!(removed = rows, "Deleted idle session records");
            Ok(rows as u64)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, online: OnlineFlag) -> SessionRecord {
        let now = Utc::now();
        SessionRecord {
            session_id: id.to_string(),
            login_name: Some("alice".to_string()),
            session_blob: vec![0, 159, 146, 150],
            online,
            host_ip: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_schema_initialized() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let conn = repo.conn.lock();
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_timestamp_format_sorts_lexically() {
        let earlier = DateTime::parse_from_rfc3339("2024-01-01T00:00:00.5Z").unwrap().with_timezone(&Utc);
        let later = DateTime::parse_from_rfc3339("2024-01-01T00:00:01Z").unwrap().with_timezone(&Utc);
        assert!(format_timestamp(&earlier) < format_timestamp(&later));
        assert_eq!(parse_timestamp(0, &format_timestamp(&earlier)).unwrap(), earlier);
    }

    #[tokio::test]
    async fn test_crud_round_trip() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let original = record("abc123", OnlineFlag::Online);

        repo.save(&original).await.unwrap();
        let stored = repo.get_by_session_id("abc123").await.unwrap().unwrap();
        assert_eq!(stored, original);

        let mut changed = original.clone();
        changed.online = OnlineFlag::Offline;
        changed.login_name = None;
        repo.update(&changed).await.unwrap();
        let stored = repo.get_by_session_id("abc123").await.unwrap().unwrap();
        assert_eq!(stored.online, OnlineFlag::Offline);
        assert_eq!(stored.login_name, None);

        assert!(repo.delete_by_session_id("abc123").await.unwrap());
        assert!(repo.get_by_session_id("abc123").await.unwrap().is_none());
        assert!(!repo.delete_by_session_id("abc123").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_and_missing_rows() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.save(&record("a", OnlineFlag::Online)).await.unwrap();

        assert_eq!(
            repo.save(&record("a", OnlineFlag::Online)).await.unwrap_err(),
            RepositoryError::Duplicate("a".to_string())
        );
        assert_eq!(
            repo.update(&record("b", OnlineFlag::Online)).await.unwrap_err(),
            RepositoryError::NotFound("b".to_string())
        );
    }

    #[tokio::test]
    async fn test_page_past_the_end_is_empty() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.save(&record("a", OnlineFlag::Online)).await.unwrap();

        let page = repo
            .list_by_online(OnlineFlag::Online, Page::new(usize::MAX, 20))
            .await
            .unwrap();
        assert!(page.is_empty());

        let all = repo
            .list_by_online(OnlineFlag::Online, Page::new(0, usize::MAX))
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_id_rejected_by_schema() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        assert!(repo.save(&record("  ", OnlineFlag::Online)).await.is_err());
        assert_eq!(repo.count_all().unwrap(), 0);
    }
}
