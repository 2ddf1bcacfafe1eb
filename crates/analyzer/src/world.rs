use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use lopater_engine::mapblock::{self, MapBlock};
use lopater_engine::world::position::Position;

use crate::metadata::{METADATA_FILE, WorldMetadata};
use crate::storage::{BlockStorage, Storage};

/// An opened world: its metadata plus the backend `world.mt` selected.
pub struct World {
    path: PathBuf,
    metadata: WorldMetadata,
    storage: Storage,
}

impl World {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = WorldMetadata::read(&path.join(METADATA_FILE))?;
        let storage = Storage::open(path, &metadata)
            .await
            .with_context(|| format!("opening {} storage of {}", metadata.backend, path.display()))?;
        tracing::info!("Opened world {} ({} backend)", path.display(), metadata.backend);

        Ok(Self {
            path: path.to_path_buf(),
            metadata,
            storage,
        })
    }

    /// Fetch and decode the block at `pos`. `Ok(None)` when nothing is stored there.
    pub async fn get_block(&self, pos: Position) -> Result<Option<MapBlock>> {
        let Some(data) = self
            .storage
            .get_block(pos)
            .await
            .with_context(|| format!("reading block {pos}"))?
        else {
            return Ok(None);
        };
        let block = mapblock::decode(&data).with_context(|| format!("decoding block {pos}"))?;
        Ok(Some(block))
    }

    pub fn metadata(&self) -> &WorldMetadata {
        &self.metadata
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub async fn close(self) {
        self.storage.close().await;
        tracing::debug!("Closed world {}", self.path.display());
    }
}
