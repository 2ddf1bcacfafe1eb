//! Read-side model of persisted voxel world data.
//!
//! [`world`] holds the fixed geometry (block positions, scan regions, node
//! layout); [`mapblock`] turns stored block blobs into [`mapblock::MapBlock`]
//! records. Nothing in this crate performs I/O.

pub mod mapblock;
pub mod world;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;
