use thiserror::Error;

pub type Result<T> = std::result::Result<T, HtxError>;

/// Error taxonomy shared by every htx crate.
///
/// The library never retries: each variant is surfaced to the caller with
/// enough context (codec name, content id, position) to decide what to do.
/// After an error the underlying stream may hold a partial write and must
/// not be resumed.
#[derive(Debug, Error)]
pub enum HtxError {
    /// Bit or byte stream exhausted mid-codeword.
    #[error("unexpected end of stream in {context}")]
    UnexpectedEof { context: &'static str },

    /// ITF8/LTF8 first byte announces more continuation bytes than remain.
    #[error("malformed {kind}: first byte announces {announced} continuation bytes, stream has fewer")]
    MalformedVarint {
        kind: &'static str,
        announced: usize,
    },

    #[error("invalid parameters for {codec}: {reason}")]
    InvalidParameters {
        codec: &'static str,
        reason: String,
    },

    /// Huffman write of a symbol that is not in the alphabet.
    #[error("symbol {symbol} is not in the huffman alphabet")]
    SymbolNotInAlphabet { symbol: i64 },

    /// Canonical code assignment overflowed its bit length: the declared
    /// code-word lengths violate the Kraft inequality.
    #[error("huffman code lengths violate the kraft inequality")]
    InvalidCodeLengths,

    /// An encoding references a content id with no matching block.
    #[error("external block {content_id} is not present in the slice")]
    MissingExternalBlock { content_id: i32 },

    /// A second codec tried to bind an already-claimed external block.
    #[error("external block {content_id} is already bound to another codec")]
    BlockInUse { content_id: i32 },

    /// `read_n` called on a codec family where fixed-length reads have no
    /// meaning.
    #[error("{codec} does not support fixed-length reads")]
    NotApplicable { codec: &'static str },

    #[error("feature ({reference_index}, {start}) arrived after ({last_reference_index}, {last_start}); features must be position-sorted")]
    UnorderedFeature {
        reference_index: usize,
        start: u32,
        last_reference_index: usize,
        last_start: u32,
    },

    #[error("invalid interval: end {end} precedes start {start}")]
    InvalidInterval { start: u32, end: u32 },

    #[error("indexes cannot be merged: {0}")]
    IncompatibleMerge(String),

    /// Compressed file offset does not fit in the 48-bit field of a virtual
    /// offset.
    #[error("compressed offset {0:#x} does not fit in 48 bits")]
    BadVirtualOffset(u64),

    /// Bad magic, truncated section, checksum mismatch.
    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HtxError {
    /// Shorthand used by codec constructors and the encoding factory.
    pub fn invalid_parameters(codec: &'static str, reason: impl Into<String>) -> Self {
        HtxError::InvalidParameters {
            codec,
            reason: reason.into(),
        }
    }
}
