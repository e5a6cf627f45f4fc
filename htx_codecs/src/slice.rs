//! Stream context a codec set is bound to.
//!
//! A slice carries one core bit stream plus any number of external byte
//! blocks keyed by content id. Every codec built for the slice either
//! shares the core bit cursor or owns exactly one external block; the
//! `BlockBinder` is how the encoding factory enforces the latter.

use std::collections::HashMap;
use std::collections::HashSet;
use std::io::Cursor;

use htx_core::bits::{BitReader, BitWriter};
use htx_core::error::{HtxError, Result};

/// Tracks which external blocks exist and which are already bound.
///
/// The factory claims a content id when it materializes a codec that reads
/// or writes that block; a second claim fails rather than silently sharing
/// a cursor between two codecs.
#[derive(Debug, Default)]
pub struct BlockBinder {
    available: HashSet<i32>,
    claimed: HashSet<i32>,
}

impl BlockBinder {
    pub fn new<I: IntoIterator<Item = i32>>(content_ids: I) -> Self {
        Self {
            available: content_ids.into_iter().collect(),
            claimed: HashSet::new(),
        }
    }

    pub fn claim(&mut self, content_id: i32) -> Result<()> {
        if !self.available.contains(&content_id) {
            return Err(HtxError::MissingExternalBlock { content_id });
        }
        if !self.claimed.insert(content_id) {
            return Err(HtxError::BlockInUse { content_id });
        }
        Ok(())
    }
}

/// Decode-side slice context: a bit reader over the core block and one
/// cursor per external block.
pub struct SliceReader<'a> {
    core: BitReader<Cursor<&'a [u8]>>,
    external: HashMap<i32, Cursor<&'a [u8]>>,
}

impl<'a> SliceReader<'a> {
    pub fn new<I>(core: &'a [u8], external: I) -> Self
    where
        I: IntoIterator<Item = (i32, &'a [u8])>,
    {
        Self {
            core: BitReader::new(Cursor::new(core)),
            external: external
                .into_iter()
                .map(|(id, data)| (id, Cursor::new(data)))
                .collect(),
        }
    }

    pub fn content_ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.external.keys().copied()
    }

    pub fn core_mut(&mut self) -> &mut BitReader<Cursor<&'a [u8]>> {
        &mut self.core
    }

    pub fn external_mut(&mut self, content_id: i32) -> Result<&mut Cursor<&'a [u8]>> {
        self.external
            .get_mut(&content_id)
            .ok_or(HtxError::MissingExternalBlock { content_id })
    }
}

/// Encode-side slice context: a bit writer for the core block and an
/// append-only sink per external block. Blocks are created on first write.
pub struct SliceWriter {
    core: BitWriter<Vec<u8>>,
    external: HashMap<i32, Vec<u8>>,
}

impl Default for SliceWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl SliceWriter {
    pub fn new() -> Self {
        Self {
            core: BitWriter::new(Vec::new()),
            external: HashMap::new(),
        }
    }

    pub fn core_mut(&mut self) -> &mut BitWriter<Vec<u8>> {
        &mut self.core
    }

    pub fn external_mut(&mut self, content_id: i32) -> &mut Vec<u8> {
        self.external.entry(content_id).or_default()
    }

    /// Flush the core bit stream and hand back `(core, external blocks)`.
    pub fn finish(self) -> Result<(Vec<u8>, HashMap<i32, Vec<u8>>)> {
        let core = self.core.into_inner()?;
        Ok((core, self.external))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binder_rejects_missing_and_double_claims() {
        let mut binder = BlockBinder::new([1, 2]);
        binder.claim(1).unwrap();
        assert!(matches!(
            binder.claim(1),
            Err(HtxError::BlockInUse { content_id: 1 })
        ));
        assert!(matches!(
            binder.claim(3),
            Err(HtxError::MissingExternalBlock { content_id: 3 })
        ));
        binder.claim(2).unwrap();
    }

    #[test]
    fn writer_creates_blocks_on_first_touch() {
        let mut w = SliceWriter::new();
        w.external_mut(7).extend_from_slice(b"abc");
        w.core_mut().write_bits(0b1, 1).unwrap();
        let (core, blocks) = w.finish().unwrap();
        assert_eq!(core, vec![0b1000_0000]);
        assert_eq!(blocks[&7], b"abc");
    }
}
