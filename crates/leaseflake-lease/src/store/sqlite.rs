use core::time::Duration;
use std::path::Path;
use std::sync::Arc;

use leaseflake::LeaseflakeId;
use parking_lot::Mutex;
use rand::Rng;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::{
    LeaseCandidate, LeaseError, LeaseStore, OwnerToken, Result, SlotLeaseRecord, config::millis_i64,
};

/// Database clock in Unix milliseconds. SQLite fixes `'now'` for the duration
/// of one statement, so every use within a statement agrees.
const DB_NOW_MILLIS: &str = "CAST((julianday('now') - 2440587.5) * 86400000.0 AS INTEGER)";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SLOT_COUNT: u16 = LeaseflakeId::MAX_SLOT as u16 + 1;

/// Where [`SqliteLeaseStore::find_expired`](LeaseStore::find_expired) starts
/// scanning for an expired row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExpiredRowOrder {
    /// Start at a random slot and wrap around, so processes starting
    /// together mostly target different rows.
    #[default]
    RandomStart,
    /// Always offer the lowest expired slot.
    LowestSlot,
}

/// SQL with the table name already spliced in.
#[derive(Debug)]
struct Statements {
    create: String,
    provision: String,
    find_owned: String,
    find_expired: String,
    claim: String,
    records: String,
}

impl Statements {
    fn for_table(table: &str) -> Self {
        Self {
            create: format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    slot INTEGER PRIMARY KEY,
                    owner_token TEXT NOT NULL DEFAULT '',
                    version INTEGER NOT NULL DEFAULT 0,
                    expires_at INTEGER NOT NULL DEFAULT 0
                )"
            ),
            provision: format!("INSERT OR IGNORE INTO {table} (slot) VALUES (?1)"),
            find_owned: format!(
                "SELECT slot, version, {DB_NOW_MILLIS} FROM {table}
                 WHERE owner_token = ?1 AND expires_at > {DB_NOW_MILLIS} + ?2
                 ORDER BY slot LIMIT 1"
            ),
            find_expired: format!(
                "SELECT slot, version, {DB_NOW_MILLIS} FROM {table}
                 WHERE expires_at < {DB_NOW_MILLIS} - ?1
                 ORDER BY (slot + ?2) % {SLOT_COUNT} LIMIT 1"
            ),
            claim: format!(
                "UPDATE {table}
                 SET owner_token = ?1, version = version + 1, expires_at = {DB_NOW_MILLIS} + ?2
                 WHERE slot = ?3 AND version = ?4"
            ),
            records: format!(
                "SELECT slot, owner_token, version, expires_at FROM {table} ORDER BY slot"
            ),
        }
    }
}

/// [`LeaseStore`] over a SQLite table.
///
/// Processes on one host coordinate through a shared database file; SQLite's
/// own locking serializes the compare-and-swap updates. Clones share the
/// connection.
#[derive(Clone, Debug)]
pub struct SqliteLeaseStore {
    conn: Arc<Mutex<Connection>>,
    table: Arc<str>,
    sql: Arc<Statements>,
    expired_order: ExpiredRowOrder,
}

impl SqliteLeaseStore {
    /// Opens (or creates) the database file at `path`.
    ///
    /// # Errors
    ///
    /// - [`LeaseError::InvalidTableName`] if `table` is not a plain identifier.
    /// - [`LeaseError::Database`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>, table: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::from_connection(conn, table)
    }

    /// A private in-memory database, mostly for tests.
    ///
    /// # Errors
    ///
    /// Same as [`Self::open`].
    pub fn open_in_memory(table: &str) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, table)
    }

    /// Wraps an existing connection.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::InvalidTableName`] if `table` is not a plain
    /// identifier.
    pub fn from_connection(conn: Connection, table: &str) -> Result<Self> {
        Self::from_shared(Arc::new(Mutex::new(conn)), table)
    }

    /// Wraps a connection that the caller keeps using elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::InvalidTableName`] if `table` is not a plain
    /// identifier.
    pub fn from_shared(conn: Arc<Mutex<Connection>>, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        Ok(Self {
            conn,
            table: table.into(),
            sql: Arc::new(Statements::for_table(table)),
            expired_order: ExpiredRowOrder::default(),
        })
    }

    /// Overrides the default [`ExpiredRowOrder::RandomStart`].
    #[must_use]
    pub fn with_expired_order(mut self, order: ExpiredRowOrder) -> Self {
        self.expired_order = order;
        self
    }

    fn scan_offset(&self) -> u16 {
        match self.expired_order {
            ExpiredRowOrder::RandomStart => rand::rng().random_range(0..SLOT_COUNT),
            ExpiredRowOrder::LowestSlot => 0,
        }
    }

    /// Creates the lease table if needed and inserts unleased rows for slots
    /// `0..slots`. Existing rows are left alone.
    ///
    /// Returns the number of rows inserted.
    ///
    /// # Errors
    ///
    /// - [`LeaseError::InvalidConfig`] if `slots` exceeds 128.
    /// - [`LeaseError::Database`] on any SQL failure; nothing is inserted.
    pub fn provision(&self, slots: usize) -> Result<usize> {
        let capacity = usize::from(LeaseflakeId::MAX_SLOT) + 1;
        if slots > capacity {
            return Err(LeaseError::InvalidConfig {
                reason: format!("cannot provision {slots} slots, the ID layout has {capacity}"),
            });
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(&self.sql.create, [])?;
        let mut inserted = 0;
        {
            let mut insert = tx.prepare(&self.sql.provision)?;
            for slot in 0..slots {
                inserted += insert.execute(params![i64::try_from(slot).unwrap_or(i64::MAX)])?;
            }
        }
        tx.commit()?;

        tracing::info!(table = %self.table, slots, inserted, "provisioned lease table");
        Ok(inserted)
    }

    /// Every row of the lease table, by slot.
    ///
    /// # Errors
    ///
    /// - [`LeaseError::Database`] on SQL failure.
    /// - [`LeaseError::InvalidSlot`] if a row holds a slot above 127.
    pub fn records(&self) -> Result<Vec<SlotLeaseRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&self.sql.records)?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (slot, owner_token, version, expires_at_millis) = row?;
            records.push(SlotLeaseRecord {
                slot: slot_from_column(slot)?,
                owner_token,
                version,
                expires_at_millis,
            });
        }
        Ok(records)
    }

    fn query_candidate(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Option<LeaseCandidate>> {
        let raw = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare_cached(sql)?;
            stmt.query_row(params, read_candidate_row).optional()?
        };

        raw.map(|(slot, version, db_now_millis)| {
            Ok(LeaseCandidate {
                slot: slot_from_column(slot)?,
                version,
                db_now_millis,
            })
        })
        .transpose()
    }
}

impl LeaseStore for SqliteLeaseStore {
    fn find_owned(&self, owner: &OwnerToken, guard: Duration) -> Result<Option<LeaseCandidate>> {
        self.query_candidate(
            &self.sql.find_owned,
            params![owner.as_str(), millis_i64(guard)],
        )
    }

    fn find_expired(&self, guard: Duration) -> Result<Option<LeaseCandidate>> {
        self.query_candidate(
            &self.sql.find_expired,
            params![millis_i64(guard), self.scan_offset()],
        )
    }

    fn claim(
        &self,
        candidate: &LeaseCandidate,
        owner: &OwnerToken,
        lease: Duration,
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&self.sql.claim)?;
        let updated = stmt.execute(params![
            owner.as_str(),
            millis_i64(lease),
            i64::from(candidate.slot),
            candidate.version,
        ])?;
        Ok(updated == 1)
    }
}

fn read_candidate_row(row: &Row<'_>) -> rusqlite::Result<(i64, i64, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn slot_from_column(slot: i64) -> Result<u8> {
    u8::try_from(slot)
        .ok()
        .filter(|s| *s <= LeaseflakeId::MAX_SLOT)
        .ok_or(LeaseError::InvalidSlot(slot))
}

fn validate_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(LeaseError::InvalidTableName(table.to_owned()))
    }
}
