use crate::migrations::run_migrations;
use chrono::{DateTime, Utc};
use loreline_schema::{ConversationTurn, NewTurn, StorageError};
use rusqlite::{params, Connection, ErrorCode, Row};
use std::sync::{Arc, Mutex};
use tokio::task;

/// Append-only log of conversation turns on SQLite.
///
/// All calls hop to `spawn_blocking`; the inner `Mutex` serializes writes so
/// each append is atomic, and reads copy a snapshot out under the same lock.
#[derive(Clone)]
pub struct ConversationStore {
    db: Arc<Mutex<Connection>>,
}

impl ConversationStore {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(open_error)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(open_error)?;
        run_migrations(&conn).map_err(open_error)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(open_error)?;
        run_migrations(&conn).map_err(open_error)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Inserts one turn, assigning its id and creation timestamp. All-or-nothing.
    pub async fn append(&self, turn: NewTurn) -> Result<ConversationTurn, StorageError> {
        let db = Arc::clone(&self.db);
        run_blocking(move || {
            let conn = lock(&db)?;
            let created_at = Utc::now();
            conn.execute(
                r#"
                INSERT INTO turns (query, answer, used_knowledge, source_url, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    turn.query,
                    turn.answer,
                    turn.used_knowledge as i64,
                    turn.source_url,
                    created_at.to_rfc3339(),
                ],
            )
            .map_err(map_sqlite_error)?;
            let id = conn.last_insert_rowid();
            Ok(ConversationTurn {
                id,
                query: turn.query,
                answer: turn.answer,
                used_knowledge: turn.used_knowledge,
                source_url: turn.source_url,
                created_at,
            })
        })
        .await
    }

    /// All turns, ascending by id (chronological). The result is a consistent
    /// snapshot taken at call time.
    pub async fn list_all(&self) -> Result<Vec<ConversationTurn>, StorageError> {
        let db = Arc::clone(&self.db);
        run_blocking(move || {
            let conn = lock(&db)?;
            query_turns(
                &conn,
                "SELECT id, query, answer, used_knowledge, source_url, created_at
                 FROM turns ORDER BY id ASC",
                params![],
            )
        })
        .await
    }

    /// A page of turns, newest first, for the history endpoint.
    pub async fn list_recent(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ConversationTurn>, StorageError> {
        let db = Arc::clone(&self.db);
        run_blocking(move || {
            let conn = lock(&db)?;
            query_turns(
                &conn,
                "SELECT id, query, answer, used_knowledge, source_url, created_at
                 FROM turns ORDER BY id DESC LIMIT ?1 OFFSET ?2",
                params![limit as i64, offset as i64],
            )
        })
        .await
    }

    /// Irreversibly removes every turn, returning how many were deleted.
    pub async fn clear(&self) -> Result<usize, StorageError> {
        let db = Arc::clone(&self.db);
        run_blocking(move || {
            let conn = lock(&db)?;
            let deleted = conn
                .execute("DELETE FROM turns", [])
                .map_err(map_sqlite_error)?;
            Ok(deleted)
        })
        .await
    }

    pub async fn count(&self) -> Result<u64, StorageError> {
        let db = Arc::clone(&self.db);
        run_blocking(move || {
            let conn = lock(&db)?;
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM turns", [], |row| row.get(0))
                .map_err(map_sqlite_error)?;
            Ok(count as u64)
        })
        .await
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, StorageError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::permanent(format!("storage task aborted: {e}")))?
}

fn lock(db: &Arc<Mutex<Connection>>) -> Result<std::sync::MutexGuard<'_, Connection>, StorageError> {
    db.lock()
        .map_err(|_| StorageError::permanent("sqlite connection lock poisoned"))
}

fn query_turns(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<ConversationTurn>, StorageError> {
    let mut stmt = conn.prepare(sql).map_err(map_sqlite_error)?;
    let rows = stmt
        .query_map(params, row_to_turn)
        .map_err(map_sqlite_error)?;
    let mut turns = Vec::new();
    for row in rows {
        turns.push(row.map_err(map_sqlite_error)?);
    }
    Ok(turns)
}

fn row_to_turn(row: &Row<'_>) -> rusqlite::Result<ConversationTurn> {
    let created_at: String = row.get(5)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                5,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?;
    Ok(ConversationTurn {
        id: row.get(0)?,
        query: row.get(1)?,
        answer: row.get(2)?,
        used_knowledge: row.get::<_, i64>(3)? != 0,
        source_url: row.get(4)?,
        created_at,
    })
}

fn open_error(e: rusqlite::Error) -> StorageError {
    StorageError::permanent(format!("failed to open conversation store: {e}"))
}

fn map_sqlite_error(e: rusqlite::Error) -> StorageError {
    let transient = matches!(
        &e,
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    );
    if transient {
        StorageError::transient(e.to_string())
    } else {
        StorageError::permanent(e.to_string())
    }
}
