//! Durable player progression storage
//!
//! The connection worker only needs the [`PlayerStore`] capability: an upsert
//! keyed by player id. Two implementations are provided, a SQLite-backed store
//! for real deployments and an in-memory map for tests and throwaway servers.

use log::{error, info};
use relay_protocol::{SavePayload, SessionId};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("player store lock poisoned")]
    Poisoned,
}

/// Insert-or-update of player progression
///
/// Calls may block on disk I/O, so callers on the async runtime should run
/// them on a blocking thread. Repeating an upsert with the same player id
/// overwrites the previous record.
pub trait PlayerStore: Send + Sync {
    fn upsert(&self, player_id: SessionId, save: &SavePayload) -> Result<(), StoreError>;
}

/// One stored row of player progression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    pub player_id: SessionId,
    pub level: i32,
    pub experience: i32,
    pub weapon_name: String,
    pub weapon_upgrade: i32,
}

impl PlayerRecord {
    /// Builds a record from a decoded save; a missing weapon name is stored empty
    pub fn from_save(player_id: SessionId, save: &SavePayload) -> Self {
        Self {
            player_id,
            level: save.level,
            experience: save.experience,
            weapon_name: save.weapon_name.clone().unwrap_or_default(),
            weapon_upgrade: save.weapon_upgrade,
        }
    }
}

const CREATE_PLAYERS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS Players (
        PlayerId INTEGER PRIMARY KEY,
        Lv INTEGER,
        Exp INTEGER,
        WeaponName TEXT,
        WeaponUpgrade INTEGER,
        LastUpdated TEXT
    );";

const UPSERT_PLAYER: &str = "
    INSERT INTO Players (PlayerId, Lv, Exp, WeaponName, WeaponUpgrade, LastUpdated)
    VALUES (?1, ?2, ?3, ?4, ?5, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    ON CONFLICT(PlayerId) DO UPDATE SET
        Lv = excluded.Lv,
        Exp = excluded.Exp,
        WeaponName = excluded.WeaponName,
        WeaponUpgrade = excluded.WeaponUpgrade,
        LastUpdated = excluded.LastUpdated;";

/// SQLite-backed player store
///
/// Holds a single connection behind a mutex; SQLite serialises writers anyway.
pub struct SqlitePlayerStore {
    conn: Mutex<Connection>,
}

impl SqlitePlayerStore {
    /// Opens (or creates) the database file and ensures the schema exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(CREATE_PLAYERS_TABLE)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Reads back a player's stored progression
    pub fn load(&self, player_id: SessionId) -> Result<Option<PlayerRecord>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let record = conn
            .query_row(
                "SELECT PlayerId, Lv, Exp, WeaponName, WeaponUpgrade
                 FROM Players WHERE PlayerId = ?1",
                params![player_id],
                |row| {
                    Ok(PlayerRecord {
                        player_id: row.get(0)?,
                        level: row.get(1)?,
                        experience: row.get(2)?,
                        weapon_name: row.get(3)?,
                        weapon_upgrade: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Timestamp of the player's last save, as stored
    pub fn last_updated(&self, player_id: SessionId) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let stamp = conn
            .query_row(
                "SELECT LastUpdated FROM Players WHERE PlayerId = ?1",
                params![player_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(stamp)
    }
}

impl PlayerStore for SqlitePlayerStore {
    fn upsert(&self, player_id: SessionId, save: &SavePayload) -> Result<(), StoreError> {
        let record = PlayerRecord::from_save(player_id, save);
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;

        match conn.execute(
            UPSERT_PLAYER,
            params![
                record.player_id,
                record.level,
                record.experience,
                record.weapon_name,
                record.weapon_upgrade
            ],
        ) {
            Ok(_) => {
                info!(
                    "Saved player {}: Lv={}, Exp={}, Weapon={}, Upgrade={}",
                    record.player_id,
                    record.level,
                    record.experience,
                    record.weapon_name,
                    record.weapon_upgrade
                );
                Ok(())
            }
            Err(e) => {
                error!("Failed to save player {}: {}", player_id, e);
                Err(e.into())
            }
        }
    }
}

/// In-memory player store
#[derive(Debug, Default)]
pub struct MemoryPlayerStore {
    records: Mutex<HashMap<SessionId, PlayerRecord>>,
}

impl MemoryPlayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, player_id: SessionId) -> Option<PlayerRecord> {
        self.records
            .lock()
            .ok()
            .and_then(|records| records.get(&player_id).cloned())
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PlayerStore for MemoryPlayerStore {
    fn upsert(&self, player_id: SessionId, save: &SavePayload) -> Result<(), StoreError> {
        let record = PlayerRecord::from_save(player_id, save);
        let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        records.insert(player_id, record);
        Ok(())
    }
}
