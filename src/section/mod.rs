use std::{fmt, hash::Hash};

use serde::{Deserialize, Serialize};

pub mod chain;
pub mod error;
pub mod segment;

pub use chain::{InsertOutcome, RemoveOutcome, SegmentChain, SegmentChange};
pub use error::SectionError;
pub use segment::Segment;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Deserialize, Serialize,
)]
pub struct StationId(u64);

impl StationId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Deserialize, Serialize,
)]
pub struct LineId(u64);

impl LineId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Station {
    pub id: StationId,
    pub name: String,
}

impl Station {
    pub fn new(id: StationId, name: String) -> Self {
        Self { id, name }
    }
}

impl PartialEq for Station {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Station {}

impl Hash for Station {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_station_identity_ignores_name() {
        let a = Station::new(StationId::new(1), "Gangnam".into());
        let b = Station::new(StationId::new(1), "Gangnam Stn".into());
        let c = Station::new(StationId::new(2), "Gangnam".into());

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_identifier_display() {
        assert_eq!(StationId::new(42).to_string(), "42");
        assert_eq!(LineId::new(7).to_string(), "7");
    }
}
