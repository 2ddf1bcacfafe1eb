use thiserror::Error;

/// Why a blob could not be decoded into a [`super::MapBlock`].
///
/// Every variant is local to the one blob being decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unsupported map block version {0}")]
    UnsupportedVersion(u8),

    #[error("invalid content width {0}, expected 2")]
    InvalidContentWidth(u8),

    #[error("invalid param width {0}, expected 2")]
    InvalidParamWidth(u8),

    #[error("invalid static object version {0}, expected 0")]
    InvalidStaticObjectVersion(u8),

    #[error("invalid name-id mapping version {0}, expected 0")]
    InvalidMappingVersion(u8),

    #[error("invalid node timer data length {0}, expected 10")]
    InvalidTimerDataLength(u8),

    #[error("node data inflated to {0} bytes, expected 16384")]
    InvalidNodeDataLength(usize),

    #[error("truncated input: needed {needed} bytes at offset {offset}, {available} available")]
    TruncatedInput {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("corrupt compressed stream: {0}")]
    CorruptCompressedStream(String),
}

impl DecodeError {
    /// Short stable label, used to group failures in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedVersion(_) => "unsupported_version",
            Self::InvalidContentWidth(_) => "invalid_content_width",
            Self::InvalidParamWidth(_) => "invalid_param_width",
            Self::InvalidStaticObjectVersion(_) => "invalid_static_object_version",
            Self::InvalidMappingVersion(_) => "invalid_mapping_version",
            Self::InvalidTimerDataLength(_) => "invalid_timer_data_length",
            Self::InvalidNodeDataLength(_) => "invalid_node_data_length",
            Self::TruncatedInput { .. } => "truncated_input",
            Self::CorruptCompressedStream(_) => "corrupt_compressed_stream",
        }
    }
}
