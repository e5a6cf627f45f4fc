//! Binning index builder.
//!
//! Features are appended in position order; the builder files each one
//! under its `reg2bin` bin as a chunk of virtual offsets and keeps the
//! per-window linear index at the minimum start offset of anything
//! overlapping the window.

use std::collections::BTreeMap;

use log::debug;

use htx_core::error::{HtxError, Result};
use htx_core::vpos::VirtualOffset;

use crate::binning::{reg2bin, window_of};

/// Half-open range of virtual offsets occupied by one or more features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub begin: VirtualOffset,
    pub end: VirtualOffset,
}

/// Append `chunk` to an ordered chunk list, merging it into the last entry
/// when the two touch or overlap.
pub(crate) fn push_coalesced(chunks: &mut Vec<Chunk>, chunk: Chunk) {
    if let Some(last) = chunks.last_mut() {
        if last.end >= chunk.begin {
            last.end = last.end.max(chunk.end);
            return;
        }
    }
    chunks.push(chunk);
}

/// Index content for one reference sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefIndex {
    /// Bin number to ordered, coalesced chunk list.
    pub bins: BTreeMap<u32, Vec<Chunk>>,
    /// Minimum start offset per 16 kb window; `None` where nothing
    /// overlaps.
    pub linear: Vec<Option<VirtualOffset>>,
}

impl RefIndex {
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty() && self.linear.is_empty()
    }
}

/// A finished binning index: one entry per reference in the sequence
/// dictionary. References between observed ones that never saw a feature
/// are `None`; trailing dictionary entries get empty content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinningIndex {
    pub refs: Vec<Option<RefIndex>>,
    /// Virtual offset of the end of the indexed data.
    pub eof: VirtualOffset,
}

/// Builds a `BinningIndex` from position-sorted features.
///
/// Dropping the builder without calling `finish` produces nothing.
pub struct IndexBuilder {
    reference_count: usize,
    observed: BTreeMap<usize, RefIndex>,
    last: Option<(usize, u32)>,
}

impl IndexBuilder {
    /// `reference_count` comes from the sequence dictionary and bounds the
    /// reference indexes that may be fed in.
    pub fn new(reference_count: usize) -> Self {
        Self {
            reference_count,
            observed: BTreeMap::new(),
            last: None,
        }
    }

    /// Record a feature spanning the closed 1-based interval
    /// `[start, end]`, stored in the file at `[vo_begin, vo_end)`.
    ///
    /// Features must arrive in non-decreasing `(reference_index, start)`
    /// order.
    pub fn add_feature(
        &mut self,
        reference_index: usize,
        start: u32,
        end: u32,
        vo_begin: VirtualOffset,
        vo_end: VirtualOffset,
    ) -> Result<()> {
        if reference_index >= self.reference_count {
            return Err(HtxError::invalid_parameters(
                "index builder",
                format!(
                    "reference {} is outside the {}-entry sequence dictionary",
                    reference_index, self.reference_count
                ),
            ));
        }
        if end < start || start == 0 {
            return Err(HtxError::InvalidInterval { start, end });
        }
        if let Some((last_reference_index, last_start)) = self.last {
            if (reference_index, start) < (last_reference_index, last_start) {
                return Err(HtxError::UnorderedFeature {
                    reference_index,
                    start,
                    last_reference_index,
                    last_start,
                });
            }
        }
        if vo_begin >= vo_end {
            return Err(HtxError::invalid_parameters(
                "index builder",
                format!("feature chunk [{}, {}) is empty or inverted", vo_begin, vo_end),
            ));
        }
        self.last = Some((reference_index, start));

        let content = self.observed.entry(reference_index).or_default();

        // 1-based closed interval to 0-based half-open.
        let beg0 = start - 1;
        let end0 = end;
        let bin = reg2bin(beg0, end0);
        push_coalesced(
            content.bins.entry(bin).or_default(),
            Chunk {
                begin: vo_begin,
                end: vo_end,
            },
        );

        let last_window = window_of(end0 - 1);
        if content.linear.len() <= last_window {
            content.linear.resize(last_window + 1, None);
        }
        for slot in &mut content.linear[window_of(beg0)..=last_window] {
            match slot {
                Some(existing) if *existing <= vo_begin => {}
                _ => *slot = Some(vo_begin),
            }
        }
        Ok(())
    }

    /// Materialize the index. `eof` is the virtual offset one past the last
    /// indexed byte; every recorded chunk must end at or before it.
    pub fn finish(self, eof: VirtualOffset) -> Result<BinningIndex> {
        let last_observed = self.observed.keys().next_back().copied();
        let mut refs: Vec<Option<RefIndex>> = Vec::with_capacity(self.reference_count);
        for reference_index in 0..self.reference_count {
            match self.observed.get(&reference_index) {
                Some(content) => {
                    for chunks in content.bins.values() {
                        for chunk in chunks {
                            if chunk.end > eof {
                                return Err(HtxError::invalid_parameters(
                                    "index builder",
                                    format!(
                                        "chunk ends at {} beyond the stream end {}",
                                        chunk.end, eof
                                    ),
                                ));
                            }
                        }
                    }
                    refs.push(Some(content.clone()));
                }
                // Dictionary entries past the last feature get empty
                // content; gaps between observed references stay None.
                None if Some(reference_index) > last_observed => {
                    refs.push(Some(RefIndex::default()))
                }
                None => refs.push(None),
            }
        }
        debug!(
            "finished index: {} references, {} with content",
            refs.len(),
            refs.iter().filter(|r| r.is_some()).count()
        );
        Ok(BinningIndex { refs, eof })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vo(raw: u64) -> VirtualOffset {
        VirtualOffset::from_raw(raw)
    }

    #[test]
    fn two_features_reference_content() {
        let mut b = IndexBuilder::new(1);
        b.add_feature(0, 1, 100, vo(0x10000), vo(0x20000)).unwrap();
        b.add_feature(0, 150, 250, vo(0x20000), vo(0x28000))
            .unwrap();
        let index = b.finish(vo(0x30000)).unwrap();

        let content = index.refs[0].as_ref().unwrap();
        assert_eq!(content.linear[0], Some(vo(0x10000)));
        // Both features fall in the first leaf bin and their chunks touch,
        // so they coalesce.
        let chunks = &content.bins[&4681];
        assert_eq!(
            chunks.as_slice(),
            &[Chunk {
                begin: vo(0x10000),
                end: vo(0x28000),
            }]
        );
    }

    #[test]
    fn disjoint_chunks_stay_separate() {
        let mut b = IndexBuilder::new(1);
        b.add_feature(0, 1, 10, vo(0x10000), vo(0x18000)).unwrap();
        b.add_feature(0, 20, 30, vo(0x20000), vo(0x28000)).unwrap();
        let index = b.finish(vo(0x30000)).unwrap();
        assert_eq!(index.refs[0].as_ref().unwrap().bins[&4681].len(), 2);
    }

    #[test]
    fn descending_positions_rejected() {
        let mut b = IndexBuilder::new(2);
        b.add_feature(0, 500, 600, vo(0x10000), vo(0x20000)).unwrap();
        assert!(matches!(
            b.add_feature(0, 400, 450, vo(0x20000), vo(0x30000)),
            Err(HtxError::UnorderedFeature { .. })
        ));
        // A lower reference index is just as unordered.
        let mut b = IndexBuilder::new(2);
        b.add_feature(1, 10, 20, vo(0x10000), vo(0x20000)).unwrap();
        assert!(matches!(
            b.add_feature(0, 100, 200, vo(0x20000), vo(0x30000)),
            Err(HtxError::UnorderedFeature { .. })
        ));
    }

    #[test]
    fn equal_starts_are_in_order() {
        let mut b = IndexBuilder::new(1);
        b.add_feature(0, 100, 200, vo(0x10000), vo(0x20000)).unwrap();
        b.add_feature(0, 100, 150, vo(0x20000), vo(0x30000)).unwrap();
    }

    #[test]
    fn inverted_interval_rejected() {
        let mut b = IndexBuilder::new(1);
        assert!(matches!(
            b.add_feature(0, 100, 50, vo(0x10000), vo(0x20000)),
            Err(HtxError::InvalidInterval { start: 100, end: 50 })
        ));
    }

    #[test]
    fn skipped_and_trailing_references() {
        let mut b = IndexBuilder::new(4);
        b.add_feature(0, 1, 10, vo(0x10000), vo(0x20000)).unwrap();
        b.add_feature(2, 1, 10, vo(0x20000), vo(0x30000)).unwrap();
        let index = b.finish(vo(0x40000)).unwrap();

        assert!(index.refs[0].is_some());
        assert!(index.refs[1].is_none(), "skipped reference");
        assert!(index.refs[2].is_some());
        let trailing = index.refs[3].as_ref().unwrap();
        assert!(trailing.is_empty(), "trailing reference is empty content");
    }

    #[test]
    fn chunk_past_eof_rejected_at_finish() {
        let mut b = IndexBuilder::new(1);
        b.add_feature(0, 1, 10, vo(0x10000), vo(0x50000)).unwrap();
        assert!(b.finish(vo(0x30000)).is_err());
    }

    #[test]
    fn linear_index_covers_every_overlapped_window() {
        let mut b = IndexBuilder::new(1);
        // Spans windows 0..=3 (1-based 1..=65536 covers four 16 kb windows).
        b.add_feature(0, 1, 65_536, vo(0x10000), vo(0x20000)).unwrap();
        // A later feature in window 2 must not lower entries set earlier.
        b.add_feature(0, 40_000, 40_100, vo(0x20000), vo(0x30000))
            .unwrap();
        let index = b.finish(vo(0x30000)).unwrap();
        let linear = &index.refs[0].as_ref().unwrap().linear;
        assert_eq!(linear.len(), 4);
        assert!(linear.iter().all(|w| *w == Some(vo(0x10000))));
    }
}
