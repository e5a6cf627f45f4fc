//! Merging per-part tabix indexes of a partitioned file.
//!
//! When a block-compressed file is produced in parts and concatenated,
//! each part's index still addresses positions relative to the part's own
//! start. Merging shifts every virtual offset by the cumulative compressed
//! length of the preceding parts, then concatenates bins and folds linear
//! indexes together.

use std::collections::BTreeMap;
use std::io::Write;

use log::debug;

use htx_core::error::{HtxError, Result};
use htx_core::vpos::VirtualOffset;

use crate::index::{push_coalesced, Chunk, RefIndex};
use crate::tabix::TabixIndex;

/// Merge part indexes into one index over the concatenated file.
///
/// `part_lengths[i]` is the compressed byte length of part `i` in the
/// concatenated output. Parts must agree on the format descriptor and the
/// sequence-name list.
pub fn merge(parts: &[TabixIndex], part_lengths: &[u64]) -> Result<TabixIndex> {
    let first = parts.first().ok_or_else(|| {
        HtxError::IncompatibleMerge("no part indexes to merge".into())
    })?;
    if parts.len() != part_lengths.len() {
        return Err(HtxError::IncompatibleMerge(format!(
            "{} indexes but {} part lengths",
            parts.len(),
            part_lengths.len()
        )));
    }
    for (i, part) in parts.iter().enumerate() {
        if part.header != first.header {
            return Err(HtxError::IncompatibleMerge(format!(
                "part {} has a different format descriptor",
                i
            )));
        }
        if part.names != first.names {
            return Err(HtxError::IncompatibleMerge(format!(
                "part {} has a different sequence-name list",
                i
            )));
        }
    }

    // offsets[i] = compressed bytes preceding part i.
    let mut offsets = Vec::with_capacity(parts.len());
    let mut total = 0u64;
    for &len in part_lengths {
        offsets.push(total);
        total += len;
    }

    let n_ref = first.names.len();
    let mut refs = Vec::with_capacity(n_ref);
    for r in 0..n_ref {
        let mut bins: BTreeMap<u32, Vec<Chunk>> = BTreeMap::new();
        let mut linear: Vec<Option<VirtualOffset>> = Vec::new();

        for (part, &delta) in parts.iter().zip(&offsets) {
            let content = &part.refs[r];
            for (&bin, chunks) in &content.bins {
                let merged = bins.entry(bin).or_default();
                for chunk in chunks {
                    push_coalesced(
                        merged,
                        Chunk {
                            begin: chunk.begin.shift_compressed(delta)?,
                            end: chunk.end.shift_compressed(delta)?,
                        },
                    );
                }
            }
            if linear.len() < content.linear.len() {
                linear.resize(content.linear.len(), None);
            }
            for (slot, part_slot) in linear.iter_mut().zip(&content.linear) {
                if let Some(vo) = part_slot {
                    let shifted = vo.shift_compressed(delta)?;
                    match slot {
                        Some(existing) if *existing <= shifted => {}
                        _ => *slot = Some(shifted),
                    }
                }
            }
        }
        refs.push(RefIndex { bins, linear });
    }

    debug!(
        "merged {} part indexes covering {} compressed bytes",
        parts.len(),
        total
    );
    Ok(TabixIndex {
        header: first.header,
        names: first.names.clone(),
        refs,
    })
}

/// Merge and serialize in one step, BGZF-compressed onto `sink`.
pub fn merge_to<W: Write>(parts: &[TabixIndex], part_lengths: &[u64], sink: W) -> Result<W> {
    merge(parts, part_lengths)?.write(sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexBuilder;
    use crate::tabix::TabixHeader;

    fn vo(raw: u64) -> VirtualOffset {
        VirtualOffset::from_raw(raw)
    }

    fn part(features: &[(usize, u32, u32, u64, u64)]) -> TabixIndex {
        let mut b = IndexBuilder::new(2);
        let mut eof = 0;
        for &(r, start, end, begin, finish) in features {
            b.add_feature(r, start, end, vo(begin), vo(finish)).unwrap();
            eof = eof.max(finish);
        }
        b.finish(vo(eof))
            .unwrap()
            .into_tabix(
                TabixHeader::vcf(),
                vec!["chr1".to_string(), "chr2".to_string()],
            )
            .unwrap()
    }

    #[test]
    fn offsets_shift_by_cumulative_part_length() {
        let a = part(&[(0, 1, 100, 0x1_0000, 0x2_0000)]);
        let b = part(&[(0, 200, 300, 0x1_0000, 0x2_0000)]);

        let merged = merge(&[a, b], &[0xAAAA, 0xBBBB]).unwrap();
        let chunks = &merged.refs[0].bins[&4681];
        assert_eq!(chunks.len(), 2);
        // Part 0 is untouched.
        assert_eq!(chunks[0].begin.raw(), 0x1_0000);
        // Part 1 moves by 0xAAAA compressed bytes.
        assert_eq!(chunks[1].begin.raw(), (0xAAAA << 16) | 0x1_0000);
        assert_eq!(chunks[1].end.raw(), (0xAAAA << 16) | 0x2_0000);
    }

    #[test]
    fn single_part_merge_is_identity() {
        let a = part(&[(0, 1, 100, 0x1_0000, 0x2_0000), (1, 5, 50, 0x2_0000, 0x3_0000)]);
        let merged = merge(std::slice::from_ref(&a), &[0x5000]).unwrap();
        assert_eq!(merged, a);
    }

    #[test]
    fn mismatched_names_refuse_to_merge() {
        let a = part(&[(0, 1, 100, 0x1_0000, 0x2_0000)]);
        let mut b = part(&[(0, 1, 100, 0x1_0000, 0x2_0000)]);
        b.names[1] = "chrX".to_string();
        assert!(matches!(
            merge(&[a, b], &[1, 1]),
            Err(HtxError::IncompatibleMerge(_))
        ));
    }

    #[test]
    fn mismatched_headers_refuse_to_merge() {
        let a = part(&[(0, 1, 100, 0x1_0000, 0x2_0000)]);
        let mut b = part(&[(0, 1, 100, 0x1_0000, 0x2_0000)]);
        b.header = TabixHeader::bed();
        assert!(matches!(
            merge(&[a, b], &[1, 1]),
            Err(HtxError::IncompatibleMerge(_))
        ));
    }

    #[test]
    fn linear_index_takes_elementwise_minimum() {
        // Part 0 covers window 0 only; part 1 covers windows 0..=1.
        let a = part(&[(0, 1, 100, 0x1_0000, 0x2_0000)]);
        let b = part(&[(0, 1, 20_000, 0x1_0000, 0x2_0000)]);
        let merged = merge(&[a, b], &[0x10, 0x20]).unwrap();

        let linear = &merged.refs[0].linear;
        assert_eq!(linear.len(), 2);
        // Window 0: part 0's (unshifted) offset is the minimum.
        assert_eq!(linear[0], Some(vo(0x1_0000)));
        // Window 1: only part 1 contributes, shifted by its 0x10 preceding
        // bytes.
        assert_eq!(linear[1], Some(vo((0x10 << 16) | 0x1_0000)));
    }

    #[test]
    fn uncompressed_portion_survives_the_shift() {
        let vo_in = vo((0x5 << 16) | 0x1234);
        let shifted = vo_in.shift_compressed(0xAAAA).unwrap();
        assert_eq!(shifted.uncompressed(), 0x1234);
        assert_eq!(shifted.compressed(), 0xAAAF);
    }
}
