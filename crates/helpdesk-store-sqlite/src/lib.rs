#![allow(clippy::missing_errors_doc)]

//! SQLite-backed ticket store.
//!
//! Every public operation borrows one pooled connection for its duration via
//! [`TicketStore::with_connection`]. Writes that touch more than one table go
//! through [`in_transaction`], so a reply or update row never persists without
//! the matching change to its parent ticket.

use std::path::PathBuf;
use std::time::Duration;

use helpdesk_core::{
    format_timestamp, now_utc, parse_timestamp, NewReply, NewTicket, NewUpdate, Ticket,
    TicketDetail, TicketEffect, TicketError, TicketId, TicketReply, TicketUpdate, UpdateKind,
    TICKET_STATUS_OPEN,
};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;

mod transaction;

pub use transaction::{in_transaction, read_snapshot};

const SCHEMA_VERSION: i64 = 1;

const SCHEMA_V1: &str = r"
CREATE TABLE IF NOT EXISTS tickets (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  title TEXT NOT NULL CHECK (length(title) BETWEEN 1 AND 200),
  body TEXT NOT NULL CHECK (length(body) >= 1),
  status TEXT NOT NULL CHECK (length(status) >= 1),
  created_by_upn TEXT,
  created_at TEXT NOT NULL,
  last_updated_at TEXT NOT NULL CHECK (last_updated_at >= created_at)
);

CREATE TABLE IF NOT EXISTS ticket_replies (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  ticket_id INTEGER NOT NULL,
  agent_upn TEXT,
  body TEXT NOT NULL CHECK (length(body) >= 1),
  created_at TEXT NOT NULL,
  FOREIGN KEY (ticket_id) REFERENCES tickets(id)
);

CREATE TABLE IF NOT EXISTS ticket_updates (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  ticket_id INTEGER NOT NULL,
  author_upn TEXT,
  kind TEXT NOT NULL CHECK (kind IN ('progress', 'status')),
  message TEXT,
  new_status TEXT,
  created_at TEXT NOT NULL,
  CHECK (kind <> 'status' OR (new_status IS NOT NULL AND length(new_status) >= 1)),
  FOREIGN KEY (ticket_id) REFERENCES tickets(id)
);

CREATE TRIGGER IF NOT EXISTS trg_tickets_no_delete
BEFORE DELETE ON tickets
BEGIN
  SELECT RAISE(FAIL, 'tickets are never deleted');
END;

CREATE TRIGGER IF NOT EXISTS trg_ticket_replies_no_update
BEFORE UPDATE ON ticket_replies
BEGIN
  SELECT RAISE(FAIL, 'ticket_replies is append-only');
END;

CREATE TRIGGER IF NOT EXISTS trg_ticket_replies_no_delete
BEFORE DELETE ON ticket_replies
BEGIN
  SELECT RAISE(FAIL, 'ticket_replies is append-only');
END;

CREATE TRIGGER IF NOT EXISTS trg_ticket_updates_no_update
BEFORE UPDATE ON ticket_updates
BEGIN
  SELECT RAISE(FAIL, 'ticket_updates is append-only');
END;

CREATE TRIGGER IF NOT EXISTS trg_ticket_updates_no_delete
BEFORE DELETE ON ticket_updates
BEGIN
  SELECT RAISE(FAIL, 'ticket_updates is append-only');
END;

CREATE INDEX IF NOT EXISTS idx_ticket_replies_ticket_id
  ON ticket_replies(ticket_id, id);
CREATE INDEX IF NOT EXISTS idx_ticket_updates_ticket_id
  ON ticket_updates(ticket_id, id);
";

const TICKET_COLUMNS: &str =
    "id, title, body, status, created_by_upn, created_at, last_updated_at";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("ticket {0} does not exist")]
    MissingTicket(TicketId),
    #[error("timestamp error: {0}")]
    Timestamp(#[from] TicketError),
}

impl StoreError {
    /// Extended SQLite result code, when the failure came from the engine.
    #[must_use]
    pub fn sqlite_code(&self) -> Option<i32> {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => Some(err.extended_code),
            _ => None,
        }
    }
}

/// Connection settings for the store. Built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_path: PathBuf,
    pub pool_size: u32,
    pub busy_timeout: Duration,
    pub connection_timeout: Duration,
}

impl StoreConfig {
    #[must_use]
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            pool_size: 8,
            busy_timeout: Duration::from_millis(5000),
            connection_timeout: Duration::from_secs(5),
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.database_path.as_os_str().is_empty() {
            return Err(StoreError::Configuration(
                "database path MUST be provided".to_string(),
            ));
        }
        if self.pool_size == 0 {
            return Err(StoreError::Configuration(
                "pool size MUST be >= 1".to_string(),
            ));
        }
        if self.connection_timeout.is_zero() {
            return Err(StoreError::Configuration(
                "connection timeout MUST be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct TicketStore {
    pool: Pool<SqliteConnectionManager>,
}

impl TicketStore {
    /// Validates `config` and builds the connection pool. No connection is
    /// opened until the first unit of work asks for one.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;

        let busy_timeout = config.busy_timeout;
        let manager = SqliteConnectionManager::file(&config.database_path).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |_row| Ok(()))?;
            conn.pragma_update(None, "foreign_keys", "ON")
        });

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .min_idle(Some(0))
            .connection_timeout(config.connection_timeout)
            .build(manager)?;

        Ok(Self { pool })
    }

    /// Borrows a pooled connection for the duration of `work`. The connection
    /// goes back to the pool when `work` returns, fails, or unwinds.
    pub fn with_connection<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError>,
    {
        let mut conn: PooledConnection<SqliteConnectionManager> = self.pool.get()?;
        work(&mut conn)
    }

    pub fn migrate(&self) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            in_transaction(conn, |tx| {
                tx.execute_batch(
                    "CREATE TABLE IF NOT EXISTS schema_migrations (
                        version INTEGER PRIMARY KEY,
                        applied_at TEXT NOT NULL
                    );",
                )?;
                tx.execute_batch(SCHEMA_V1)?;
                tx.execute(
                    "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                    params![SCHEMA_VERSION, format_timestamp(now_utc())?],
                )?;
                Ok(())
            })
        })
    }

    pub fn create_ticket(&self, input: &NewTicket) -> Result<TicketId, StoreError> {
        let now = format_timestamp(now_utc())?;
        self.with_connection(|conn| {
            let id = conn.query_row(
                "INSERT INTO tickets(title, body, status, created_by_upn, created_at, last_updated_at)
                 VALUES (?1, ?2, ?3, NULL, ?4, ?4)
                 RETURNING id",
                params![input.title(), input.body(), TICKET_STATUS_OPEN, now],
                |row| row.get::<_, i64>(0),
            )?;
            Ok(TicketId(id))
        })
    }

    /// Most recent tickets first, capped at `limit`.
    pub fn list_tickets(&self, limit: usize) -> Result<Vec<Ticket>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TICKET_COLUMNS} FROM tickets ORDER BY id DESC LIMIT ?1"
            ))?;
            let rows = stmt
                .query_map(params![limit], parse_ticket_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Ticket plus its replies and updates, read from one snapshot. `None` when
    /// no ticket has this id.
    pub fn ticket_detail(&self, id: TicketId) -> Result<Option<TicketDetail>, StoreError> {
        self.with_connection(|conn| {
            read_snapshot(conn, |tx| {
                let ticket = tx
                    .query_row(
                        &format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1"),
                        params![id.0],
                        parse_ticket_row,
                    )
                    .optional()?;
                let Some(ticket) = ticket else {
                    return Ok(None);
                };

                let replies = tx
                    .prepare(
                        "SELECT id, ticket_id, agent_upn, body, created_at
                         FROM ticket_replies
                         WHERE ticket_id = ?1
                         ORDER BY id ASC",
                    )?
                    .query_map(params![id.0], parse_reply_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                let updates = tx
                    .prepare(
                        "SELECT id, ticket_id, author_upn, kind, message, new_status, created_at
                         FROM ticket_updates
                         WHERE ticket_id = ?1
                         ORDER BY id ASC",
                    )?
                    .query_map(params![id.0], parse_update_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                Ok(Some(TicketDetail { ticket, replies, updates }))
            })
        })
    }

    /// Appends a reply and advances the ticket's `last_updated_at` atomically.
    pub fn append_reply(&self, id: TicketId, input: &NewReply) -> Result<(), StoreError> {
        let now = format_timestamp(now_utc())?;
        self.with_connection(|conn| {
            in_transaction(conn, |tx| {
                tx.execute(
                    "INSERT INTO ticket_replies(ticket_id, agent_upn, body, created_at)
                     VALUES (?1, NULL, ?2, ?3)",
                    params![id.0, input.body(), now],
                )?;
                apply_effect(tx, id, TicketEffect::Touch, &now)
            })
        })
    }

    /// Appends an update and then either sets the ticket status or only
    /// advances `last_updated_at`, depending on the update kind.
    pub fn append_update(&self, id: TicketId, input: &NewUpdate) -> Result<(), StoreError> {
        let now = format_timestamp(now_utc())?;
        let effect = input.ticket_effect();
        self.with_connection(|conn| {
            in_transaction(conn, |tx| {
                tx.execute(
                    "INSERT INTO ticket_updates(ticket_id, author_upn, kind, message, new_status, created_at)
                     VALUES (?1, NULL, ?2, ?3, ?4, ?5)",
                    params![
                        id.0,
                        input.kind().as_str(),
                        input.message(),
                        input.new_status(),
                        now
                    ],
                )?;
                apply_effect(tx, id, effect, &now)
            })
        })
    }
}

/// Next `last_updated_at` for a ticket. `now` wins when it is later than the
/// stored value; otherwise the stored value advances by one microsecond, so
/// every touch strictly increases it even within one clock tick or after the
/// wall clock steps back.
fn next_touch(stored: &str, now: &str) -> Result<String, StoreError> {
    if now > stored {
        return Ok(now.to_string());
    }
    let stored = parse_timestamp(stored)?;
    Ok(format_timestamp(stored + time::Duration::microseconds(1))?)
}

fn apply_effect(
    conn: &Connection,
    id: TicketId,
    effect: TicketEffect<'_>,
    now: &str,
) -> Result<(), StoreError> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT last_updated_at FROM tickets WHERE id = ?1",
            params![id.0],
            |row| row.get(0),
        )
        .optional()?;
    let Some(stored) = stored else {
        return Err(StoreError::MissingTicket(id));
    };
    let touched = next_touch(&stored, now)?;

    let changed = match effect {
        TicketEffect::Touch => conn.execute(
            "UPDATE tickets SET last_updated_at = ?2 WHERE id = ?1",
            params![id.0, touched],
        )?,
        TicketEffect::SetStatus(status) => conn.execute(
            "UPDATE tickets SET status = ?2, last_updated_at = ?3 WHERE id = ?1",
            params![id.0, status, touched],
        )?,
    };

    if changed == 0 {
        return Err(StoreError::MissingTicket(id));
    }
    Ok(())
}

fn parse_ticket_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Ticket> {
    Ok(Ticket {
        id: TicketId(row.get(0)?),
        title: row.get(1)?,
        body: row.get(2)?,
        status: row.get(3)?,
        created_by_upn: row.get(4)?,
        created_at: timestamp_column(row, 5)?,
        last_updated_at: timestamp_column(row, 6)?,
    })
}

fn parse_reply_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TicketReply> {
    Ok(TicketReply {
        id: row.get(0)?,
        ticket_id: TicketId(row.get(1)?),
        agent_upn: row.get(2)?,
        body: row.get(3)?,
        created_at: timestamp_column(row, 4)?,
    })
}

fn parse_update_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TicketUpdate> {
    let kind_raw: String = row.get(3)?;
    let kind = UpdateKind::parse(&kind_raw)
        .ok_or_else(|| invalid_column(3, Type::Text, format!("invalid kind: {kind_raw}")))?;

    Ok(TicketUpdate {
        id: row.get(0)?,
        ticket_id: TicketId(row.get(1)?),
        author_upn: row.get(2)?,
        kind,
        message: row.get(4)?,
        new_status: row.get(5)?,
        created_at: timestamp_column(row, 6)?,
    })
}

fn timestamp_column(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<OffsetDateTime> {
    let raw: String = row.get(index)?;
    parse_timestamp(&raw).map_err(|err| invalid_column(index, Type::Text, err.to_string()))
}

fn invalid_column(index: usize, ty: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        ty,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}
