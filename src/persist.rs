// used for persistence
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
// used for timestamps in the database
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, WhereaboutsError};

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    InMemory,
    File(String),
}
impl PersistenceMode {
    /// Accepts `:memory:`, `sqlite::memory:`, `sqlite://path`, `sqlite:path` or a bare path.
    pub fn from_url(url: &str) -> PersistenceMode {
        let url = url.trim();
        match url {
            ":memory:" | "sqlite::memory:" | "sqlite://:memory:" => PersistenceMode::InMemory,
            _ => {
                let path = url
                    .strip_prefix("sqlite://")
                    .or_else(|| url.strip_prefix("sqlite:"))
                    .unwrap_or(url);
                PersistenceMode::File(path.to_string())
            }
        }
    }
}

// ------------- Rows -------------
/// One sample as stored. An absent signal means the room reported but saw nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub room: String,
    pub signal: Option<i32>,
    pub captured_at: DateTime<Utc>,
}

/// The strongest room of a round. `average` is absent when every room only
/// holds no-signal readings.
#[derive(Debug, Clone, PartialEq)]
pub struct Standing {
    pub room: String,
    pub average: Option<f64>,
}

// ------------- Persistence -------------
pub struct Persistor {
    connection: Connection,
}
impl Persistor {
    pub fn new(mode: &PersistenceMode) -> Result<Persistor> {
        let connection = match mode {
            PersistenceMode::InMemory => Connection::open_in_memory()?,
            PersistenceMode::File(path) => {
                let connection = Connection::open(path)?;
                // readers of the device directory must not block behind an inference
                let journal: String =
                    connection.query_row("pragma journal_mode = wal", [], |r| r.get(0))?;
                debug!(path = %path, journal = %journal, "opened reading store");
                connection
            }
        };
        Persistor::with_connection(connection)
    }
    pub fn with_connection(connection: Connection) -> Result<Persistor> {
        connection.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        connection.execute_batch(
            "
            create table if not exists Reading (
                Room text not null,
                SignalStrength integer null,
                CapturedAt text not null
            );
            create index if not exists Reading_by_Room on Reading (
                Room
            );
            create table if not exists RoomAssignment (
                DeviceId text not null,
                Room text not null,
                constraint unique_and_referenceable_DeviceId primary key (
                    DeviceId
                )
            );
            create table if not exists Position (
                Position_Slot integer not null default 1,
                Room text not null,
                constraint referenceable_Position_Slot primary key (
                    Position_Slot
                ),
                constraint at_most_one_Position check (
                    Position_Slot = 1
                )
            );
            ",
        )?;
        Ok(Persistor { connection })
    }
    /// Bounds how long SQLite waits for a competing writer before failing.
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        self.connection.busy_timeout(timeout)?;
        Ok(())
    }
    /// Starts a transaction that holds the database write lock from its first statement.
    pub fn exclusive(&mut self) -> Result<Transaction<'_>> {
        Ok(self
            .connection
            .transaction_with_behavior(TransactionBehavior::Exclusive)?)
    }
    /// Adds or reassigns a device in the directory.
    pub fn assign_device(&self, device: &str, room: &str) -> Result<()> {
        self.connection
            .prepare_cached(
                "
                insert into RoomAssignment (
                    DeviceId,
                    Room
                ) values (?1, ?2)
                on conflict (DeviceId) do update set Room = excluded.Room
            ",
            )?
            .execute(params![device, room])?;
        Ok(())
    }
    pub fn room_of(&self, device: &str) -> Result<Option<String>> {
        lookup_room(&self.connection, device)
    }
    pub fn last_known_room(&self) -> Result<Option<String>> {
        last_known_room(&self.connection)
    }
    /// The readings currently held for a room, in insertion order.
    pub fn readings(&self, room: &str) -> Result<Vec<Reading>> {
        let mut statement = self.connection.prepare_cached(
            "
            select Room, SignalStrength, CapturedAt
                from Reading
                where Room = ?1
                order by rowid
        ",
        )?;
        let rows = statement.query_map(params![room], |row| {
            Ok(Reading {
                room: row.get(0)?,
                signal: row.get(1)?,
                captured_at: row.get(2)?,
            })
        })?;
        let mut readings = Vec::new();
        for reading in rows {
            readings.push(reading?);
        }
        Ok(readings)
    }
    pub fn reading_count(&self) -> Result<usize> {
        let count: i64 = self
            .connection
            .query_row("select count(*) from Reading", [], |r| r.get(0))?;
        to_count(count)
    }
}

// ------------- Statements shared by the inference transaction -------------
pub(crate) fn lookup_room(connection: &Connection, device: &str) -> Result<Option<String>> {
    Ok(connection
        .prepare_cached(
            "
            select Room
                from RoomAssignment
                where DeviceId = ?1
        ",
        )?
        .query_row(params![device], |r| r.get(0))
        .optional()?)
}

/// Replaces the room's batch. An absent signal is stored as null.
pub(crate) fn replace_readings(
    connection: &Connection,
    room: &str,
    signals: &[Option<i32>],
    captured_at: DateTime<Utc>,
) -> Result<()> {
    connection
        .prepare_cached("delete from Reading where Room = ?1")?
        .execute(params![room])?;
    let mut add_reading = connection.prepare_cached(
        "
        insert into Reading (
            Room,
            SignalStrength,
            CapturedAt
        ) values (?1, ?2, ?3)
    ",
    )?;
    for signal in signals {
        add_reading.execute(params![room, signal, captured_at])?;
    }
    Ok(())
}

/// Number of distinct rooms with at least one reading captured in `[from, to]`.
pub(crate) fn rooms_reporting(
    connection: &Connection,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<usize> {
    let count: i64 = connection
        .prepare_cached(
            "
            select count(distinct Room)
                from Reading
                where CapturedAt between ?1 and ?2
        ",
        )?
        .query_row(params![from, to], |r| r.get(0))?;
    to_count(count)
}

/// Rooms without any real signal rank last; equal averages go to the smallest room name.
pub(crate) fn strongest_room(connection: &Connection) -> Result<Option<Standing>> {
    Ok(connection
        .prepare_cached(
            "
            select Room, avg(SignalStrength) as Average
                from Reading
                group by Room
                order by Average is null, Average desc, Room
                limit 1
        ",
        )?
        .query_row([], |r| {
            Ok(Standing {
                room: r.get(0)?,
                average: r.get(1)?,
            })
        })
        .optional()?)
}

pub(crate) fn last_known_room(connection: &Connection) -> Result<Option<String>> {
    Ok(connection
        .prepare_cached("select Room from Position limit 1")?
        .query_row([], |r| r.get(0))
        .optional()?)
}

pub(crate) fn clear_position(connection: &Connection) -> Result<()> {
    connection
        .prepare_cached("delete from Position")?
        .execute([])?;
    Ok(())
}

pub(crate) fn record_position(connection: &Connection, room: &str) -> Result<()> {
    clear_position(connection)?;
    connection
        .prepare_cached(
            "
            insert into Position (
                Position_Slot,
                Room
            ) values (1, ?1)
        ",
        )?
        .execute(params![room])?;
    Ok(())
}

fn to_count(count: i64) -> Result<usize> {
    usize::try_from(count)
        .map_err(|_| WhereaboutsError::Storage(format!("invalid row count {count}")))
}
