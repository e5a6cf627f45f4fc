pub mod beta;
pub mod block;
pub mod codec;
pub mod encoding;
pub mod external;
pub mod gamma;
pub mod golomb;
pub mod huffman;
pub mod slice;
pub mod subexponential;

pub use beta::Beta;
pub use block::{CompressionMethod, ExternalBlock};
pub use codec::{ByteArrayCodec, ByteCodec, IntCodec, LongCodec};
pub use encoding::{CompressionHeaderMap, DataSeriesId, Encoding, EncodingId};
pub use gamma::Gamma;
pub use golomb::{Golomb, GolombRice};
pub use huffman::{CanonicalCodes, HuffmanParams};
pub use slice::{BlockBinder, SliceReader, SliceWriter};
pub use subexponential::Subexponential;
