//! Key-value access to stored map blocks.
//!
//! [`BlockStorage`] is the narrow contract the rest of the crate needs:
//! point lookup, point upsert and a bounded region scan. [`Storage`] is the
//! closed set of backends a world can be opened with, chosen once from
//! `world.mt`.

pub mod postgres;
pub mod sqlite;

use std::future::Future;
use std::path::Path;

use anyhow::Context;
use thiserror::Error;

use lopater_engine::world::position::{Position, Region};

use crate::metadata::{BackendKind, WorldMetadata};

pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;

#[derive(Debug, Error)]
pub enum StorageError {
    /// Connectivity or query failure. Aborts the operation that hit it.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The position cannot be packed into the backend's scalar key.
    #[error("position {0} is outside the addressable key range")]
    PositionOutOfRange(Position),

    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),
}

/// Outcome of a completed region scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Blocks the callback accepted.
    pub delivered: u64,
    /// Blocks the callback rejected; logged and skipped.
    pub skipped: u64,
}

impl ScanSummary {
    /// Hand one row to the scan callback. A callback error is logged and
    /// counted, never propagated.
    pub(crate) async fn deliver<F, Fut>(&mut self, on_block: &mut F, pos: Position, data: Vec<u8>)
    where
        F: FnMut(Position, Vec<u8>) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let len = data.len();
        match on_block(pos, data).await {
            Ok(()) => self.delivered += 1,
            Err(e) => {
                tracing::warn!("Skipping block {} ({} bytes): {:#}", pos, len, e);
                self.skipped += 1;
            }
        }
    }
}

/// Storage contract over map block positions.
///
/// An absent block is `Ok(None)`, never an error.
#[allow(async_fn_in_trait)]
pub trait BlockStorage {
    async fn get_block(&self, pos: Position) -> Result<Option<Vec<u8>>, StorageError>;

    /// Insert or replace the blob stored at `pos`.
    async fn set_block(&self, pos: Position, data: &[u8]) -> Result<(), StorageError>;

    /// Call `on_block` once for every stored block inside `region`
    /// (inclusive), in backend-defined order.
    ///
    /// A callback error skips that block and the scan continues; a query
    /// error aborts the whole scan.
    async fn scan_region<F, Fut>(
        &self,
        region: Region,
        on_block: F,
    ) -> Result<ScanSummary, StorageError>
    where
        F: FnMut(Position, Vec<u8>) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>;
}

/// The backend a world was opened with.
pub enum Storage {
    Sqlite(SqliteStorage),
    Postgres(PostgresStorage),
}

impl Storage {
    /// Open the backend `metadata` selects for the world at `world_dir`.
    pub async fn open(world_dir: &Path, metadata: &WorldMetadata) -> anyhow::Result<Self> {
        match metadata.backend {
            BackendKind::Sqlite => {
                let path = world_dir.join(sqlite::SQLITE_FILE);
                let storage = SqliteStorage::open(&path)
                    .await
                    .with_context(|| format!("opening {}", path.display()))?;
                Ok(Self::Sqlite(storage))
            }
            BackendKind::Postgres => {
                let storage = PostgresStorage::connect(metadata.pgsql_connection())
                    .await
                    .context("connecting to PostgreSQL")?;
                Ok(Self::Postgres(storage))
            }
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Sqlite(_) => BackendKind::Sqlite,
            Self::Postgres(_) => BackendKind::Postgres,
        }
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        match self {
            Self::Sqlite(s) => s.close().await,
            Self::Postgres(s) => s.close().await,
        }
    }
}

impl BlockStorage for Storage {
    async fn get_block(&self, pos: Position) -> Result<Option<Vec<u8>>, StorageError> {
        match self {
            Self::Sqlite(s) => s.get_block(pos).await,
            Self::Postgres(s) => s.get_block(pos).await,
        }
    }

    async fn set_block(&self, pos: Position, data: &[u8]) -> Result<(), StorageError> {
        match self {
            Self::Sqlite(s) => s.set_block(pos, data).await,
            Self::Postgres(s) => s.set_block(pos, data).await,
        }
    }

    async fn scan_region<F, Fut>(
        &self,
        region: Region,
        on_block: F,
    ) -> Result<ScanSummary, StorageError>
    where
        F: FnMut(Position, Vec<u8>) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        match self {
            Self::Sqlite(s) => s.scan_region(region, on_block).await,
            Self::Postgres(s) => s.scan_region(region, on_block).await,
        }
    }
}
