//! Position Persistence
//!
//! Snapshots the live position set to disk so a restart resumes monitoring
//! instead of abandoning positions whose funds are still exposed.

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use super::position::{Position, PositionKey};

/// Default snapshot file name
pub const DEFAULT_SNAPSHOT_FILE: &str = "positions.json";

#[derive(Error, Debug, Clone)]
pub enum PersistError {
    #[error("Failed to serialize snapshot: {0}")]
    SerializationError(String),

    #[error("Failed to deserialize snapshot: {0}")]
    DeserializationError(String),

    #[error("Failed to write snapshot file: {0}")]
    WriteError(String),

    #[error("Failed to read snapshot file: {0}")]
    ReadError(String),

    #[error("Snapshot is corrupted: {0}")]
    CorruptedFile(String),

    #[error("Failed to create directory: {0}")]
    DirectoryError(String),
}

/// One position as written to disk. Amounts are decimal strings so the file
/// stays readable and lossless.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedPosition {
    pub wallet_index: usize,
    pub token: String,
    pub reference_price_wei: String,
    pub balance: String,
    pub initial_balance: String,
    pub approved: bool,
    pub take_profit_done: bool,
    pub opened_at: DateTime<Utc>,
}

impl From<&Position> for PersistedPosition {
    fn from(position: &Position) -> Self {
        Self {
            wallet_index: position.key.wallet_index,
            token: position.key.token.to_checksum(None),
            reference_price_wei: position.reference_price.to_string(),
            balance: position.balance.to_string(),
            initial_balance: position.initial_balance.to_string(),
            approved: position.approved,
            take_profit_done: position.take_profit_done,
            opened_at: position.opened_at,
        }
    }
}

impl PersistedPosition {
    /// Rebuild the in-memory position, validating every field
    pub fn to_position(&self) -> Result<Position, PersistError> {
        let token = Address::from_str(&self.token)
            .map_err(|e| PersistError::CorruptedFile(format!("token {}: {}", self.token, e)))?;

        Ok(Position {
            key: PositionKey::new(self.wallet_index, token),
            reference_price: parse_amount("reference_price_wei", &self.reference_price_wei)?,
            balance: parse_amount("balance", &self.balance)?,
            initial_balance: parse_amount("initial_balance", &self.initial_balance)?,
            sold: false,
            approved: self.approved,
            take_profit_done: self.take_profit_done,
            opened_at: self.opened_at,
        })
    }
}

fn parse_amount(field: &str, value: &str) -> Result<U256, PersistError> {
    U256::from_str_radix(value, 10)
        .map_err(|e| PersistError::CorruptedFile(format!("{} '{}': {}", field, value, e)))
}

/// Whole-set snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub saved_at: DateTime<Utc>,
    pub positions: Vec<PersistedPosition>,
}

/// Result of trying to load a snapshot at startup
#[derive(Debug)]
pub enum RecoveryStatus {
    /// No snapshot file, or an empty one
    NoSnapshot,
    Recovered(Vec<Position>),
    /// Unreadable snapshot, left on disk for manual inspection
    Corrupted(String),
}

impl PositionSnapshot {
    /// Build a snapshot of the live (unsold) positions
    pub fn capture<'a>(positions: impl IntoIterator<Item = &'a Position>) -> Self {
        let mut positions: Vec<PersistedPosition> = positions
            .into_iter()
            .filter(|p| !p.sold)
            .map(PersistedPosition::from)
            .collect();
        positions.sort_by(|a, b| (a.wallet_index, &a.token).cmp(&(b.wallet_index, &b.token)));

        Self {
            saved_at: Utc::now(),
            positions,
        }
    }

    /// Write via a temp file and rename so a crash never leaves half a snapshot
    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| PersistError::DirectoryError(e.to_string()))?;
            }
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| PersistError::SerializationError(e.to_string()))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|e| PersistError::WriteError(e.to_string()))?;
        fs::rename(&tmp, path).map_err(|e| PersistError::WriteError(e.to_string()))?;

        tracing::debug!(
            "Snapshot saved: {} position(s) -> {}",
            self.positions.len(),
            path.display()
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Option<Self>, PersistError> {
        if !path.exists() {
            return Ok(None);
        }

        let content =
            fs::read_to_string(path).map_err(|e| PersistError::ReadError(e.to_string()))?;

        if content.trim().is_empty() {
            return Ok(None);
        }

        let snapshot: Self = serde_json::from_str(&content)
            .map_err(|e| PersistError::DeserializationError(e.to_string()))?;
        Ok(Some(snapshot))
    }

    pub fn try_recover(path: &Path) -> RecoveryStatus {
        let snapshot = match Self::load(path) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return RecoveryStatus::NoSnapshot,
            Err(e) => return RecoveryStatus::Corrupted(e.to_string()),
        };

        let positions: Result<Vec<Position>, PersistError> = snapshot
            .positions
            .iter()
            .map(PersistedPosition::to_position)
            .collect();

        match positions {
            Ok(positions) if positions.is_empty() => RecoveryStatus::NoSnapshot,
            Ok(positions) => RecoveryStatus::Recovered(positions),
            Err(e) => RecoveryStatus::Corrupted(e.to_string()),
        }
    }

    pub fn default_path(data_dir: &Path) -> PathBuf {
        data_dir.join(DEFAULT_SNAPSHOT_FILE)
    }
}
