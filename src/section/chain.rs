//! Ordered, non-branching chain of segments for a single line.
//!
//! Segments live in an arena and are linked to their neighbours by key, so
//! splicing a segment in or out never shifts the position of any other one.
//! A chain is rebuilt from the stored rows for every operation and dropped
//! once the resulting delta has been persisted.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use tracing::debug;

use crate::section::{
    StationId,
    error::{Result, SectionError},
    segment::Segment,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct SegmentKey(usize);

#[derive(Clone, Debug)]
struct Node {
    segment: Segment,
    prev: Option<SegmentKey>,
    next: Option<SegmentKey>,
}

/// Replacement of one stored segment by another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentChange {
    pub before: Segment,
    pub after: Segment,
}

/// What the caller has to persist after [`SegmentChain::insert`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InsertOutcome {
    pub added: Segment,
    pub split: Option<SegmentChange>,
}

/// What the caller has to persist after [`SegmentChain::remove`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoveOutcome {
    pub removed: Vec<Segment>,
    pub merged: Option<Segment>,
}

#[derive(Clone, Debug)]
pub struct SegmentChain {
    // Unlinked nodes stay in the arena; keys are never reused.
    nodes: Vec<Node>,
    head: SegmentKey,
    tail: SegmentKey,
    len: usize,
}

impl SegmentChain {
    /// Rebuilds path order from a snapshot of a line's segments in any order.
    pub fn new<I: IntoIterator<Item = Segment>>(segments: I) -> Result<Self> {
        let segments: Vec<Segment> = segments.into_iter().collect();
        if segments.is_empty() {
            return Err(SectionError::EmptyLine);
        }

        if let Some(station) = segments.iter().map(Segment::up).duplicates().next() {
            return Err(SectionError::BrokenChain(format!(
                "more than one segment leaves station {station}"
            )));
        }
        if let Some(station) = segments.iter().map(Segment::down).duplicates().next() {
            return Err(SectionError::BrokenChain(format!(
                "more than one segment arrives at station {station}"
            )));
        }

        let by_up: HashMap<StationId, usize> = segments
            .iter()
            .enumerate()
            .map(|(i, s)| (s.up(), i))
            .collect();
        let downs: HashSet<StationId> = segments.iter().map(Segment::down).collect();

        let start = match segments
            .iter()
            .positions(|s| !downs.contains(&s.up()))
            .at_most_one()
        {
            Ok(Some(start)) => start,
            Ok(None) => {
                return Err(SectionError::BrokenChain(
                    "no start station, segments form a cycle".into(),
                ));
            }
            Err(starts) => {
                return Err(SectionError::BrokenChain(format!(
                    "line has {} separate start stations",
                    starts.count()
                )));
            }
        };

        let mut order = vec![start];
        while let Some(&next) = by_up.get(&segments[order[order.len() - 1]].down()) {
            if order.len() == segments.len() {
                break;
            }
            order.push(next);
        }

        if order.len() != segments.len() {
            return Err(SectionError::BrokenChain(format!(
                "{} of {} segments are not reachable from the start station",
                segments.len() - order.len(),
                segments.len()
            )));
        }

        let last = order.len() - 1;
        let nodes = order
            .iter()
            .enumerate()
            .map(|(pos, &i)| Node {
                segment: segments[i],
                prev: pos.checked_sub(1).map(SegmentKey),
                next: (pos < last).then_some(SegmentKey(pos + 1)),
            })
            .collect();

        Ok(Self {
            nodes,
            head: SegmentKey(0),
            tail: SegmentKey(last),
            len: segments.len(),
        })
    }

    pub fn segment_count(&self) -> usize {
        self.len
    }

    /// Segments in path order.
    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.keys().map(|key| &self.nodes[key.0].segment)
    }

    /// Stations from the start of the line to its end. Each call starts over.
    pub fn ordered_stations(&self) -> impl Iterator<Item = StationId> {
        let first = self.nodes[self.head.0].segment.up();
        std::iter::once(first).chain(self.segments().map(Segment::down))
    }

    pub fn contains_station(&self, station: StationId) -> bool {
        self.segments().any(|s| s.has_station(station))
    }

    /// Adds `new` to the line, splitting the segment it lands inside of if needed.
    ///
    /// Exactly one of the new segment's stations must already be on the line.
    pub fn insert(&mut self, new: Segment) -> Result<InsertOutcome> {
        match (
            self.contains_station(new.up()),
            self.contains_station(new.down()),
        ) {
            (true, true) => Err(SectionError::SegmentAddition(format!(
                "stations {} and {} are both already on the line",
                new.up(),
                new.down()
            ))),
            (false, false) => Err(SectionError::SegmentAddition(format!(
                "neither station {} nor {} is on the line",
                new.up(),
                new.down()
            ))),
            (true, false) => self.insert_from_up_station(new),
            (false, true) => self.insert_from_down_station(new),
        }
    }

    fn insert_from_up_station(&mut self, new: Segment) -> Result<InsertOutcome> {
        let Some(key) = self.find_key(|s| s.has_up_station(new.up())) else {
            debug!(segment = %new, "appending after the last station");
            self.insert_after(self.tail, new);
            return Ok(InsertOutcome {
                added: new,
                split: None,
            });
        };

        let existing = self.nodes[key.0].segment;
        ensure_shorter(&existing, &new)?;
        let remainder = existing.split_by_new_up_station(&new)?;
        debug!(%existing, %remainder, "splitting segment at its up station");

        self.insert_before(key, new);
        self.nodes[key.0].segment = remainder;

        Ok(InsertOutcome {
            added: new,
            split: Some(SegmentChange {
                before: existing,
                after: remainder,
            }),
        })
    }

    fn insert_from_down_station(&mut self, new: Segment) -> Result<InsertOutcome> {
        let Some(key) = self.find_key(|s| s.has_down_station(new.down())) else {
            debug!(segment = %new, "prepending before the first station");
            self.insert_before(self.head, new);
            return Ok(InsertOutcome {
                added: new,
                split: None,
            });
        };

        let existing = self.nodes[key.0].segment;
        ensure_shorter(&existing, &new)?;
        let remainder = existing.split_by_new_down_station(&new)?;
        debug!(%existing, %remainder, "splitting segment at its down station");

        self.insert_after(key, new);
        self.nodes[key.0].segment = remainder;

        Ok(InsertOutcome {
            added: new,
            split: Some(SegmentChange {
                before: existing,
                after: remainder,
            }),
        })
    }

    /// Takes `station` off the line. An end station drops its only segment;
    /// an interior station has its two segments merged into one.
    pub fn remove(&mut self, station: StationId) -> Result<RemoveOutcome> {
        if self.len <= 1 {
            return Err(SectionError::SegmentDeletion(
                "a line needs at least two stations".into(),
            ));
        }

        let touching: Vec<SegmentKey> = self
            .keys()
            .filter(|key| self.nodes[key.0].segment.has_station(station))
            .collect();

        match touching[..] {
            [] => Err(SectionError::StationNotFound(station)),
            [only] => {
                let removed = self.unlink(only);
                debug!(segment = %removed, "removed end station");
                Ok(RemoveOutcome {
                    removed: vec![removed],
                    merged: None,
                })
            }
            [a, b] => {
                let (upper_key, lower_key) =
                    if self.nodes[a.0].segment.has_down_station(station) {
                        (a, b)
                    } else {
                        (b, a)
                    };
                let upper = self.nodes[upper_key.0].segment;
                let lower = self.nodes[lower_key.0].segment;
                let merged = upper.merge(&lower)?;
                debug!(%upper, %lower, %merged, "merged around removed station");

                self.nodes[upper_key.0].segment = merged;
                self.unlink(lower_key);

                Ok(RemoveOutcome {
                    removed: vec![upper, lower],
                    merged: Some(merged),
                })
            }
            _ => Err(SectionError::BrokenChain(format!(
                "station {station} is touched by {} segments",
                touching.len()
            ))),
        }
    }

    fn keys(&self) -> Keys<'_> {
        Keys {
            nodes: &self.nodes,
            next: Some(self.head),
        }
    }

    fn find_key(&self, pred: impl Fn(&Segment) -> bool) -> Option<SegmentKey> {
        self.keys().find(|key| pred(&self.nodes[key.0].segment))
    }

    fn push_node(&mut self, node: Node) -> SegmentKey {
        self.nodes.push(node);
        self.len += 1;
        SegmentKey(self.nodes.len() - 1)
    }

    fn insert_before(&mut self, at: SegmentKey, segment: Segment) -> SegmentKey {
        let prev = self.nodes[at.0].prev;
        let key = self.push_node(Node {
            segment,
            prev,
            next: Some(at),
        });

        self.nodes[at.0].prev = Some(key);
        match prev {
            Some(p) => self.nodes[p.0].next = Some(key),
            None => self.head = key,
        }
        key
    }

    fn insert_after(&mut self, at: SegmentKey, segment: Segment) -> SegmentKey {
        let next = self.nodes[at.0].next;
        let key = self.push_node(Node {
            segment,
            prev: Some(at),
            next,
        });

        self.nodes[at.0].next = Some(key);
        match next {
            Some(n) => self.nodes[n.0].prev = Some(key),
            None => self.tail = key,
        }
        key
    }

    // Callers guarantee the chain keeps at least one segment.
    fn unlink(&mut self, key: SegmentKey) -> Segment {
        let Node {
            segment,
            prev,
            next,
        } = self.nodes[key.0].clone();

        match prev {
            Some(p) => self.nodes[p.0].next = next,
            None => {
                if let Some(n) = next {
                    self.head = n;
                }
            }
        }
        match next {
            Some(n) => self.nodes[n.0].prev = prev,
            None => {
                if let Some(p) = prev {
                    self.tail = p;
                }
            }
        }

        self.nodes[key.0].prev = None;
        self.nodes[key.0].next = None;
        self.len -= 1;
        segment
    }
}

fn ensure_shorter(existing: &Segment, new: &Segment) -> Result<()> {
    if new.distance() >= existing.distance() {
        return Err(SectionError::SegmentAddition(format!(
            "{new} must be shorter than the segment it splits, {existing}"
        )));
    }
    Ok(())
}

struct Keys<'a> {
    nodes: &'a [Node],
    next: Option<SegmentKey>,
}

impl Iterator for Keys<'_> {
    type Item = SegmentKey;

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.next?;
        self.next = self.nodes[key.0].next;
        Some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: u64 = 1;
    const B: u64 = 2;
    const C: u64 = 3;
    const D: u64 = 4;
    const E: u64 = 5;

    fn seg(up: u64, down: u64, distance: u32) -> Segment {
        Segment::new(StationId::new(up), StationId::new(down), distance).unwrap()
    }

    fn chain(rows: &[(u64, u64, u32)]) -> SegmentChain {
        SegmentChain::new(rows.iter().map(|&(u, d, dist)| seg(u, d, dist))).unwrap()
    }

    fn stations(chain: &SegmentChain) -> Vec<u64> {
        chain.ordered_stations().map(StationId::get).collect()
    }

    fn rows(chain: &SegmentChain) -> Vec<(u64, u64, u32)> {
        chain
            .segments()
            .map(|s| (s.up().get(), s.down().get(), s.distance()))
            .collect()
    }

    #[test]
    fn test_reconstructs_order_from_shuffled_rows() {
        let c = chain(&[(C, D, 2), (A, B, 5), (D, E, 7), (B, C, 3)]);

        assert_eq!(stations(&c), vec![A, B, C, D, E]);
        assert_eq!(rows(&c), vec![(A, B, 5), (B, C, 3), (C, D, 2), (D, E, 7)]);
    }

    #[test]
    fn test_station_count_is_segments_plus_one() {
        let c = chain(&[(B, C, 3), (A, B, 5), (C, D, 1)]);
        let listed = stations(&c);

        assert_eq!(listed.len(), c.segment_count() + 1);
        assert_eq!(listed.iter().unique().count(), listed.len());
        // Restartable
        assert_eq!(stations(&c), listed);
    }

    #[test]
    fn test_rejects_empty_snapshot() {
        assert!(matches!(
            SegmentChain::new(Vec::new()),
            Err(SectionError::EmptyLine)
        ));
    }

    #[test]
    fn test_rejects_broken_snapshots() {
        let branching = SegmentChain::new([seg(A, B, 1), seg(A, C, 1)]);
        assert!(matches!(branching, Err(SectionError::BrokenChain(_))));

        let merging = SegmentChain::new([seg(A, C, 1), seg(B, C, 1)]);
        assert!(matches!(merging, Err(SectionError::BrokenChain(_))));

        let cycle = SegmentChain::new([seg(A, B, 1), seg(B, C, 1), seg(C, A, 1)]);
        assert!(matches!(cycle, Err(SectionError::BrokenChain(_))));

        let islands = SegmentChain::new([seg(A, B, 1), seg(C, D, 1)]);
        assert!(matches!(islands, Err(SectionError::BrokenChain(_))));

        // A path plus a detached loop still has a single start station
        let path_and_loop =
            SegmentChain::new([seg(A, B, 1), seg(C, D, 1), seg(D, C, 1)]);
        assert!(matches!(path_and_loop, Err(SectionError::BrokenChain(_))));
    }

    #[test]
    fn test_insert_appends_after_last_station() {
        let mut c = chain(&[(A, B, 5)]);
        let outcome = c.insert(seg(B, C, 3)).unwrap();

        assert_eq!(outcome.added, seg(B, C, 3));
        assert_eq!(outcome.split, None);
        assert_eq!(stations(&c), vec![A, B, C]);
    }

    #[test]
    fn test_insert_prepends_before_first_station() {
        let mut c = chain(&[(B, C, 3)]);
        let outcome = c.insert(seg(A, B, 5)).unwrap();

        assert_eq!(outcome.split, None);
        assert_eq!(rows(&c), vec![(A, B, 5), (B, C, 3)]);

        // The new head is a valid anchor for further inserts
        c.insert(seg(E, A, 2)).unwrap();
        assert_eq!(stations(&c), vec![E, A, B, C]);
    }

    #[test]
    fn test_insert_splits_at_shared_up_station() {
        let mut c = chain(&[(A, B, 5), (B, C, 3)]);
        let outcome = c.insert(seg(B, D, 1)).unwrap();

        assert_eq!(rows(&c), vec![(A, B, 5), (B, D, 1), (D, C, 2)]);
        assert_eq!(
            outcome.split,
            Some(SegmentChange {
                before: seg(B, C, 3),
                after: seg(D, C, 2),
            })
        );
    }

    #[test]
    fn test_insert_splits_first_segment() {
        let mut c = chain(&[(A, D, 10)]);
        c.insert(seg(A, B, 4)).unwrap();

        assert_eq!(stations(&c), vec![A, B, D]);
        let total: u32 = c.segments().map(Segment::distance).sum();
        assert_eq!(total, 10);
        assert_eq!(rows(&c), vec![(A, B, 4), (B, D, 6)]);
    }

    #[test]
    fn test_insert_splits_at_shared_down_station() {
        let mut c = chain(&[(A, B, 5), (B, C, 3)]);
        let outcome = c.insert(seg(D, C, 1)).unwrap();

        assert_eq!(rows(&c), vec![(A, B, 5), (B, D, 2), (D, C, 1)]);
        assert_eq!(
            outcome.split,
            Some(SegmentChange {
                before: seg(B, C, 3),
                after: seg(B, D, 2),
            })
        );

        // Tail moved to the newly inserted last segment
        c.insert(seg(C, E, 4)).unwrap();
        assert_eq!(stations(&c), vec![A, B, D, C, E]);
    }

    #[test]
    fn test_insert_rejects_known_or_unknown_endpoints() {
        let mut c = chain(&[(A, B, 5), (B, C, 3)]);

        assert!(matches!(
            c.insert(seg(A, C, 1)),
            Err(SectionError::SegmentAddition(_))
        ));
        assert!(matches!(
            c.insert(seg(C, A, 1)),
            Err(SectionError::SegmentAddition(_))
        ));
        assert!(matches!(
            c.insert(seg(D, E, 1)),
            Err(SectionError::SegmentAddition(_))
        ));
        assert_eq!(stations(&c), vec![A, B, C]);
    }

    #[test]
    fn test_insert_rejects_split_that_is_not_shorter() {
        let mut c = chain(&[(A, B, 5), (B, C, 3)]);

        assert!(matches!(
            c.insert(seg(B, D, 3)),
            Err(SectionError::SegmentAddition(_))
        ));
        assert!(matches!(
            c.insert(seg(D, B, 7)),
            Err(SectionError::SegmentAddition(_))
        ));
        assert_eq!(rows(&c), vec![(A, B, 5), (B, C, 3)]);
    }

    #[test]
    fn test_remove_interior_station_merges() {
        let mut c = chain(&[(A, B, 5), (B, C, 3)]);
        let outcome = c.remove(StationId::new(B)).unwrap();

        assert_eq!(rows(&c), vec![(A, C, 8)]);
        assert_eq!(outcome.removed, vec![seg(A, B, 5), seg(B, C, 3)]);
        assert_eq!(outcome.merged, Some(seg(A, C, 8)));
    }

    #[test]
    fn test_remove_merged_segment_keeps_position() {
        let mut c = chain(&[(A, B, 1), (B, C, 2), (C, D, 3), (D, E, 4)]);
        c.remove(StationId::new(C)).unwrap();

        assert_eq!(rows(&c), vec![(A, B, 1), (B, D, 5), (D, E, 4)]);
    }

    #[test]
    fn test_remove_end_stations() {
        let mut c = chain(&[(A, B, 5), (B, C, 3), (C, D, 2)]);

        let head = c.remove(StationId::new(A)).unwrap();
        assert_eq!(head.removed, vec![seg(A, B, 5)]);
        assert_eq!(head.merged, None);
        assert_eq!(stations(&c), vec![B, C, D]);

        let tail = c.remove(StationId::new(D)).unwrap();
        assert_eq!(tail.removed, vec![seg(C, D, 2)]);
        assert_eq!(stations(&c), vec![B, C]);

        // Head and tail links survive both removals
        c.insert(seg(A, B, 1)).unwrap();
        c.insert(seg(C, D, 1)).unwrap();
        assert_eq!(stations(&c), vec![A, B, C, D]);
    }

    #[test]
    fn test_remove_keeps_two_stations() {
        let mut c = chain(&[(A, B, 5), (B, C, 3)]);
        c.remove(StationId::new(C)).unwrap();
        assert_eq!(c.segment_count(), 1);

        assert!(matches!(
            c.remove(StationId::new(A)),
            Err(SectionError::SegmentDeletion(_))
        ));
        assert_eq!(stations(&c), vec![A, B]);
    }

    #[test]
    fn test_remove_unknown_station() {
        let mut c = chain(&[(A, B, 5), (B, C, 3)]);

        assert!(matches!(
            c.remove(StationId::new(E)),
            Err(SectionError::StationNotFound(s)) if s == StationId::new(E)
        ));
    }

    #[test]
    fn test_insert_then_remove_restores_distance() {
        let mut c = chain(&[(A, C, 9)]);
        c.insert(seg(A, B, 4)).unwrap();
        assert_eq!(rows(&c), vec![(A, B, 4), (B, C, 5)]);

        c.remove(StationId::new(B)).unwrap();
        assert_eq!(rows(&c), vec![(A, C, 9)]);
        assert!(c.contains_station(StationId::new(A)));
        assert!(!c.contains_station(StationId::new(B)));
    }
}
