//! Reads map blocks out of a world database and runs batch jobs over them.

pub mod metadata;
pub mod pipeline;
pub mod stats;
pub mod storage;
pub mod world;
