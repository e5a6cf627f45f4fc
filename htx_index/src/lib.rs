pub mod bgzf;
pub mod binning;
pub mod index;
pub mod merge;
pub mod tabix;

pub use bgzf::{BgzfReader, BgzfWriter};
pub use binning::reg2bin;
pub use index::{BinningIndex, Chunk, IndexBuilder, RefIndex};
pub use merge::{merge, merge_to};
pub use tabix::{TabixHeader, TabixIndex};
