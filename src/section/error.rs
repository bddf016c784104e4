use crate::section::{LineId, StationId};

#[derive(Debug, thiserror::Error)]
pub enum SectionError {
    #[error("Invalid segment: {0}")]
    InvalidSegment(String),

    #[error("Segment cannot be added: {0}")]
    SegmentAddition(String),

    #[error("Segment cannot be removed: {0}")]
    SegmentDeletion(String),

    #[error("Station not found: {0}")]
    StationNotFound(StationId),

    #[error("Line not found: {0}")]
    LineNotFound(LineId),

    #[error("Line has no segments")]
    EmptyLine,

    #[error("Segments do not form a single path: {0}")]
    BrokenChain(String),
}

impl SectionError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::StationNotFound(_) | Self::LineNotFound(_) | Self::EmptyLine
        )
    }
}

pub type Result<T> = std::result::Result<T, SectionError>;
