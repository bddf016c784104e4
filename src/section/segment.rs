use serde::{Deserialize, Serialize};

use crate::section::{
    StationId,
    error::{Result, SectionError},
};

/// One directed edge of a line: `up -> down`, `distance` apart.
///
/// Values are immutable; splitting or merging always yields a fresh `Segment`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "RawSegment", into = "RawSegment")]
pub struct Segment {
    up: StationId,
    down: StationId,
    distance: u32,
}

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct RawSegment {
    up_station_id: StationId,
    down_station_id: StationId,
    distance: u32,
}

impl TryFrom<RawSegment> for Segment {
    type Error = SectionError;

    fn try_from(raw: RawSegment) -> Result<Self> {
        Segment::new(raw.up_station_id, raw.down_station_id, raw.distance)
    }
}

impl From<Segment> for RawSegment {
    fn from(s: Segment) -> Self {
        Self {
            up_station_id: s.up,
            down_station_id: s.down,
            distance: s.distance,
        }
    }
}

impl Segment {
    pub fn new(up: StationId, down: StationId, distance: u32) -> Result<Self> {
        if up == down {
            return Err(SectionError::InvalidSegment(format!(
                "up and down station are both {up}"
            )));
        }
        if distance == 0 {
            return Err(SectionError::InvalidSegment(format!(
                "distance between {up} and {down} must be positive"
            )));
        }

        Ok(Self { up, down, distance })
    }

    pub fn up(&self) -> StationId {
        self.up
    }

    pub fn down(&self) -> StationId {
        self.down
    }

    pub fn distance(&self) -> u32 {
        self.distance
    }

    pub fn has_up_station(&self, station: StationId) -> bool {
        self.up == station
    }

    pub fn has_down_station(&self, station: StationId) -> bool {
        self.down == station
    }

    pub fn has_station(&self, station: StationId) -> bool {
        self.has_up_station(station) || self.has_down_station(station)
    }

    /// `[A->D]` split by `[A->B]` leaves `[B->D]`.
    pub fn split_by_new_up_station(&self, new: &Segment) -> Result<Segment> {
        if !self.has_up_station(new.up) {
            return Err(SectionError::InvalidSegment(format!(
                "{new} does not start at {}",
                self.up
            )));
        }
        let remaining = self.remaining_after(new)?;
        Segment::new(new.down, self.down, remaining)
    }

    /// `[A->D]` split by `[B->D]` leaves `[A->B]`.
    pub fn split_by_new_down_station(&self, new: &Segment) -> Result<Segment> {
        if !self.has_down_station(new.down) {
            return Err(SectionError::InvalidSegment(format!(
                "{new} does not end at {}",
                self.down
            )));
        }
        let remaining = self.remaining_after(new)?;
        Segment::new(self.up, new.up, remaining)
    }

    /// Joins two directly adjacent segments into one spanning their outer stations.
    pub fn merge(&self, other: &Segment) -> Result<Segment> {
        let (first, second) = if self.down == other.up {
            (self, other)
        } else if other.down == self.up {
            (other, self)
        } else {
            return Err(SectionError::InvalidSegment(format!(
                "{self} and {other} are not adjacent"
            )));
        };

        let distance = first.distance.checked_add(second.distance).ok_or_else(|| {
            SectionError::InvalidSegment(format!("merging {first} and {second} overflows"))
        })?;
        Segment::new(first.up, second.down, distance)
    }

    fn remaining_after(&self, new: &Segment) -> Result<u32> {
        if new.distance >= self.distance {
            return Err(SectionError::InvalidSegment(format!(
                "{new} must be shorter than {self}"
            )));
        }
        Ok(self.distance - new.distance)
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}->{}, {}]", self.up, self.down, self.distance)
    }
}
