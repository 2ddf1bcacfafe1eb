//! Point-keyed backend: `blocks(pos INTEGER PRIMARY KEY, data BLOB)` with the
//! position packed into `pos` by [`Position::to_key`].

use std::future::Future;
use std::path::Path;

use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use lopater_engine::world::position::{Position, Region};

use super::{BlockStorage, ScanSummary, StorageError};

/// File name of the map database inside a world directory.
pub const SQLITE_FILE: &str = "map.sqlite";

const MAX_CONNECTIONS: u32 = 4;

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open an existing map database, read-only.
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(false)
            .read_only(true);
        Self::connect(options, MAX_CONNECTIONS).await
    }

    /// Create (or open) a map database and make sure the `blocks` table exists.
    pub async fn create(path: &Path) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let storage = Self::connect(options, MAX_CONNECTIONS).await?;
        storage.create_schema().await?;
        Ok(storage)
    }

    /// Private in-memory database with the `blocks` table. Pinned to a
    /// single connection, which owns the data.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let storage = Self::connect(options, 1).await?;
        storage.create_schema().await?;
        Ok(storage)
    }

    async fn connect(options: SqliteConnectOptions, max_connections: u32) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    async fn create_schema(&self) -> Result<(), StorageError> {
        sqlx::query("CREATE TABLE IF NOT EXISTS blocks (pos INTEGER PRIMARY KEY, data BLOB)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn key(pos: Position) -> Result<i64, StorageError> {
    if Region::WORLD.contains(pos) {
        Ok(pos.to_key())
    } else {
        Err(StorageError::PositionOutOfRange(pos))
    }
}

impl BlockStorage for SqliteStorage {
    async fn get_block(&self, pos: Position) -> Result<Option<Vec<u8>>, StorageError> {
        let row = sqlx::query("SELECT data FROM blocks WHERE pos = ?")
            .bind(key(pos)?)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(row.try_get("data")?)),
            None => Ok(None),
        }
    }

    async fn set_block(&self, pos: Position, data: &[u8]) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO blocks (pos, data) VALUES (?, ?) \
             ON CONFLICT (pos) DO UPDATE SET data = excluded.data",
        )
        .bind(key(pos)?)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Narrows on the key range of the region's corners, then filters the
    /// unpacked positions against the region itself.
    async fn scan_region<F, Fut>(
        &self,
        region: Region,
        mut on_block: F,
    ) -> Result<ScanSummary, StorageError>
    where
        F: FnMut(Position, Vec<u8>) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let mut summary = ScanSummary::default();
        let Some(bounds) = region.intersection(&Region::WORLD) else {
            return Ok(summary);
        };
        let keys = bounds.key_range();

        let mut rows = sqlx::query("SELECT pos, data FROM blocks WHERE pos BETWEEN ? AND ?")
            .bind(*keys.start())
            .bind(*keys.end())
            .fetch(&self.pool);

        while let Some(row) = rows.try_next().await? {
            let pos = Position::from_key(row.try_get("pos")?);
            if !bounds.contains(pos) {
                continue;
            }
            summary.deliver(&mut on_block, pos, row.try_get("data")?).await;
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    async fn storage_with(blocks: &[(Position, &[u8])]) -> SqliteStorage {
        let storage = SqliteStorage::in_memory().await.unwrap();
        for (pos, data) in blocks {
            storage.set_block(*pos, data).await.unwrap();
        }
        storage
    }

    #[tokio::test]
    async fn missing_block_is_none() {
        let storage = storage_with(&[]).await;
        assert_eq!(storage.get_block(Position::new(0, 0, 0)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn upsert_replaces() {
        let pos = Position::new(-3, 7, 100);
        let storage = storage_with(&[(pos, &b"first"[..])]).await;
        storage.set_block(pos, b"second").await.unwrap();
        assert_eq!(storage.get_block(pos).await.unwrap().as_deref(), Some(&b"second"[..]));
    }

    #[tokio::test]
    async fn rows_use_packed_key() {
        let pos = Position::new(1, 2, 3);
        let storage = storage_with(&[(pos, &b"x"[..])]).await;
        let key: i64 = sqlx::query_scalar("SELECT pos FROM blocks")
            .fetch_one(&storage.pool)
            .await
            .unwrap();
        assert_eq!(key, 3 * 0x1000000 + 2 * 0x1000 + 1);
    }

    #[tokio::test]
    async fn out_of_range_position_rejected() {
        let storage = storage_with(&[]).await;
        let err = storage.get_block(Position::new(4000, 0, 0)).await.unwrap_err();
        assert!(matches!(err, StorageError::PositionOutOfRange(_)));
    }

    #[tokio::test]
    async fn scan_filters_region_exactly() {
        let inside = [Position::new(0, 0, 0), Position::new(-2, 1, 2), Position::new(2, -2, -2)];
        // Key lies between the corner keys but x is outside the box.
        let between_keys = Position::new(100, 0, 0);
        let outside = Position::new(0, 0, 50);

        let mut blocks: Vec<(Position, &[u8])> = inside.iter().map(|p| (*p, &b"in"[..])).collect();
        blocks.push((between_keys, &b"out"[..]));
        blocks.push((outside, &b"out"[..]));
        let storage = storage_with(&blocks).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let region = Region::new(Position::new(-2, -2, -2), Position::new(2, 2, 2));
        let summary = storage
            .scan_region(region, |pos, data| {
                let seen = Arc::clone(&seen);
                async move {
                    assert_eq!(data, b"in");
                    seen.lock().unwrap().push(pos);
                    Ok(())
                }
            })
            .await
            .unwrap();

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        let mut expected = inside.to_vec();
        expected.sort();
        assert_eq!(seen, expected);
        assert_eq!(summary, ScanSummary { delivered: 3, skipped: 0 });
    }

    #[tokio::test]
    async fn callback_error_skips_item() {
        let storage = storage_with(&[
            (Position::new(0, 0, 0), &b"bad"[..]),
            (Position::new(1, 0, 0), &b"good"[..]),
        ])
        .await;

        let summary = storage
            .scan_region(Region::WORLD, |_, data| async move {
                if data == b"bad" {
                    anyhow::bail!("rejected");
                }
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(summary, ScanSummary { delivered: 1, skipped: 1 });
    }

    #[tokio::test]
    async fn opened_database_is_read_only() {
        let dir = std::env::temp_dir().join("lopater_test_sqlite_read_only");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(SQLITE_FILE);

        let pos = Position::new(1, 1, 1);
        let created = SqliteStorage::create(&path).await.unwrap();
        created.set_block(pos, b"stored").await.unwrap();
        created.close().await;

        let opened = SqliteStorage::open(&path).await.unwrap();
        assert_eq!(opened.get_block(pos).await.unwrap().as_deref(), Some(&b"stored"[..]));
        let err = opened.set_block(pos, b"changed").await.unwrap_err();
        assert!(matches!(err, StorageError::Database(_)));
        assert_eq!(opened.get_block(pos).await.unwrap().as_deref(), Some(&b"stored"[..]));
        opened.close().await;

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn query_failure_aborts_scan() {
        let storage = storage_with(&[(Position::new(0, 0, 0), &b"x"[..])]).await;
        sqlx::query("DROP TABLE blocks").execute(&storage.pool).await.unwrap();
        let result = storage.scan_region(Region::WORLD, |_, _| async { Ok(()) }).await;
        assert!(matches!(result, Err(StorageError::Database(_))));
    }
}
