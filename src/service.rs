use anyhow::Result;
use tracing::info;

use crate::{
    section::{LineId, Segment, SegmentChain, Station, StationId},
    store::{SegmentStore, StationDirectory},
};

/// Applies section changes to a line through the store.
///
/// Each call rebuilds the line's chain from the store and drops it once the
/// delta is persisted, so callers must serialise writes to the same line.
#[derive(Clone)]
pub struct LineService<S> {
    store: S,
}

impl<S> LineService<S>
where
    S: SegmentStore + StationDirectory,
    <S as SegmentStore>::Error: std::error::Error + Send + Sync + 'static,
    <S as StationDirectory>::Error: std::error::Error + Send + Sync + 'static,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Stations of the line from its first to its last stop.
    pub fn stations(&self, line: LineId) -> Result<Vec<Station>> {
        let chain = self.chain(line)?;
        self.render(&chain)
    }

    pub fn add_section(
        &mut self,
        line: LineId,
        up: StationId,
        down: StationId,
        distance: u32,
    ) -> Result<Vec<Station>> {
        let up = self.store.resolve(up)?;
        let down = self.store.resolve(down)?;
        let segment = Segment::new(up.id, down.id, distance)?;

        let mut chain = self.chain(line)?;
        let outcome = chain.insert(segment)?;
        self.store.persist_insert(line, &outcome)?;

        info!(
            %line,
            added = %outcome.added,
            split = outcome.split.is_some(),
            segments = chain.segment_count(),
            "Added section"
        );
        self.render(&chain)
    }

    pub fn remove_section(&mut self, line: LineId, station: StationId) -> Result<Vec<Station>> {
        let station = self.store.resolve(station)?;

        let mut chain = self.chain(line)?;
        let outcome = chain.remove(station.id)?;
        self.store.persist_remove(line, &outcome)?;

        info!(
            %line,
            station = %station.name,
            merged = outcome.merged.is_some(),
            segments = chain.segment_count(),
            "Removed station from line"
        );
        self.render(&chain)
    }

    fn chain(&self, line: LineId) -> Result<SegmentChain> {
        let segments = self.store.load_segments(line)?;
        Ok(SegmentChain::new(segments)?)
    }

    fn render(&self, chain: &SegmentChain) -> Result<Vec<Station>> {
        chain
            .ordered_stations()
            .map(|id| -> Result<Station> { Ok(self.store.resolve(id)?) })
            .collect()
    }
}
