pub mod memory;

use crate::section::{InsertOutcome, LineId, RemoveOutcome, Segment, Station, StationId};

pub trait SegmentStore {
    type Error;

    /// Returns every segment of the line, in any order, as one consistent snapshot.
    fn load_segments(&self, line: LineId) -> Result<Vec<Segment>, Self::Error>;

    /// Stores the added segment and, if it split one, the shortened remainder, atomically.
    fn persist_insert(&mut self, line: LineId, outcome: &InsertOutcome) -> Result<(), Self::Error>;

    /// Deletes the removed segments and stores the merged replacement, atomically.
    fn persist_remove(&mut self, line: LineId, outcome: &RemoveOutcome) -> Result<(), Self::Error>;
}

pub trait StationDirectory {
    type Error;

    fn resolve(&self, id: StationId) -> Result<Station, Self::Error>;
}
