use std::{collections::BTreeMap, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    section::{
        InsertOutcome, LineId, RemoveOutcome, SectionError, Segment, SegmentChain, Station,
        StationId,
    },
    store::{SegmentStore, StationDirectory},
};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LineRecord {
    pub name: String,
    pub color: String,
    segments: Vec<Segment>,
}

impl LineRecord {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

/// Stations and line segments held in process memory.
///
/// The whole store can be written to and read back from a postcard snapshot,
/// or built from a hand-written JSON seed.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MemoryStore {
    stations: BTreeMap<StationId, Station>,
    lines: BTreeMap<LineId, LineRecord>,
}

#[derive(Deserialize)]
struct Seed {
    stations: Vec<Station>,
    lines: Vec<SeedLine>,
}

#[derive(Deserialize)]
struct SeedLine {
    id: LineId,
    name: String,
    color: String,
    segments: Vec<Segment>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes =
            std::fs::read(&path).with_context(|| format!("reading {:?}", path.as_ref()))?;
        Self::from_bytes(&bytes)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(&path, &bytes).with_context(|| format!("writing {:?}", path.as_ref()))?;
        Ok(())
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(postcard::from_bytes(bytes)?)
    }

    /// Postcard encoding of the whole store, as written by [`MemoryStore::save`].
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(postcard::to_stdvec(self)?)
    }

    pub fn from_seed<P: AsRef<Path>>(path: P) -> Result<Self> {
        let seed = std::fs::read_to_string(&path)
            .with_context(|| format!("reading seed {:?}", path.as_ref()))?;
        Self::from_seed_str(&seed)
    }

    /// Parses a JSON seed. Every line must already form a single valid path.
    pub fn from_seed_str(s: &str) -> Result<Self> {
        let seed: Seed = serde_json::from_str(s).context("parsing seed JSON")?;
        let mut store = Self::new();

        for station in seed.stations {
            store.stations.insert(station.id, station);
        }

        for line in seed.lines {
            for segment in &line.segments {
                store.resolve(segment.up())?;
                store.resolve(segment.down())?;
            }
            SegmentChain::new(line.segments.iter().copied())
                .with_context(|| format!("line {} ({})", line.id, line.name))?;

            store.lines.insert(
                line.id,
                LineRecord {
                    name: line.name,
                    color: line.color,
                    segments: line.segments,
                },
            );
        }

        info!(
            stations = store.stations.len(),
            lines = store.lines.len(),
            "Loaded seed"
        );
        Ok(store)
    }

    pub fn add_station(&mut self, name: impl Into<String>) -> StationId {
        let id = StationId::new(self.stations.keys().next_back().map_or(1, |id| id.get() + 1));
        self.stations.insert(id, Station::new(id, name.into()));
        id
    }

    /// Opens a new line made of a single segment between two known stations.
    pub fn create_line(
        &mut self,
        name: impl Into<String>,
        color: impl Into<String>,
        first: Segment,
    ) -> Result<LineId, SectionError> {
        self.resolve(first.up())?;
        self.resolve(first.down())?;

        let id = LineId::new(self.lines.keys().next_back().map_or(1, |id| id.get() + 1));
        self.lines.insert(
            id,
            LineRecord {
                name: name.into(),
                color: color.into(),
                segments: vec![first],
            },
        );
        Ok(id)
    }

    /// Renames and recolours a line. Its segments are left alone.
    pub fn update_line(
        &mut self,
        id: LineId,
        name: impl Into<String>,
        color: impl Into<String>,
    ) -> Result<(), SectionError> {
        let record = self.line_mut(id)?;
        record.name = name.into();
        record.color = color.into();
        Ok(())
    }

    /// Drops a line together with all of its segments. Stations stay registered.
    pub fn delete_line(&mut self, id: LineId) -> Result<LineRecord, SectionError> {
        self.lines.remove(&id).ok_or(SectionError::LineNotFound(id))
    }

    pub fn line(&self, id: LineId) -> Result<&LineRecord, SectionError> {
        self.lines.get(&id).ok_or(SectionError::LineNotFound(id))
    }

    pub fn lines(&self) -> impl Iterator<Item = (LineId, &LineRecord)> {
        self.lines.iter().map(|(&id, line)| (id, line))
    }

    fn line_mut(&mut self, id: LineId) -> Result<&mut LineRecord, SectionError> {
        self.lines.get_mut(&id).ok_or(SectionError::LineNotFound(id))
    }
}

fn take_row(rows: &mut Vec<Segment>, segment: &Segment) -> Result<Segment, SectionError> {
    let idx = rows.iter().position(|s| s == segment).ok_or_else(|| {
        SectionError::BrokenChain(format!("stored segment {segment} changed underneath"))
    })?;
    Ok(rows.swap_remove(idx))
}

impl SegmentStore for MemoryStore {
    type Error = SectionError;

    fn load_segments(&self, line: LineId) -> Result<Vec<Segment>, SectionError> {
        Ok(self.line(line)?.segments.clone())
    }

    fn persist_insert(&mut self, line: LineId, outcome: &InsertOutcome) -> Result<(), SectionError> {
        let record = self.line_mut(line)?;
        let mut rows = record.segments.clone();

        if let Some(change) = outcome.split {
            take_row(&mut rows, &change.before)?;
            rows.push(change.after);
        }
        rows.push(outcome.added);

        record.segments = rows;
        Ok(())
    }

    fn persist_remove(&mut self, line: LineId, outcome: &RemoveOutcome) -> Result<(), SectionError> {
        let record = self.line_mut(line)?;
        let mut rows = record.segments.clone();

        for removed in &outcome.removed {
            take_row(&mut rows, removed)?;
        }
        rows.extend(outcome.merged);

        record.segments = rows;
        Ok(())
    }
}

impl StationDirectory for MemoryStore {
    type Error = SectionError;

    fn resolve(&self, id: StationId) -> Result<Station, SectionError> {
        self.stations
            .get(&id)
            .cloned()
            .ok_or(SectionError::StationNotFound(id))
    }
}
