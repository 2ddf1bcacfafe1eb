/// Block-local content identifier. Resolved to a content name only through
/// the id→name mapping of the map block it was read from; ids carry no
/// meaning across blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ContentId(pub u16);

/// A single voxel as stored in the node grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Node {
    pub content_id: ContentId,
    /// Content-dependent parameter (usually light levels).
    pub param1: u8,
    /// Content-dependent parameter (facing, liquid level, ...).
    pub param2: u8,
}
