//! Error types for the replica codec.
//!
//! Every failure the reader can hit is reported through [`CodecError`]; the
//! codec never panics on malformed input.

/// Enumeration of codec failures.
///
/// Decode errors carry enough context (bit counts, declared lengths, field
/// names) to be logged meaningfully by the dispatch layer before the frame is
/// dropped.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The buffer ended before a fixed-size value could be read
    #[error("Unexpected end of buffer: needed {needed} bits, {remaining} remaining")]
    UnexpectedEnd { needed: usize, remaining: usize },

    /// A length prefix declared more data than the buffer still holds
    #[error("Declared length {declared} exceeds the {remaining} bits left in the buffer")]
    LengthOverflow { declared: usize, remaining: usize },

    /// A narrow string body was not valid UTF-8
    #[error("Invalid UTF-8 string: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A wide string body was not valid UTF-16
    #[error("Invalid UTF-16 string: {0}")]
    InvalidUtf16(#[from] std::string::FromUtf16Error),

    /// Dictionary entry carried a type tag outside the known set
    #[error("Unknown dictionary value type {0}")]
    UnknownLdfType(u8),

    /// Dictionary key does not fit the one-byte length prefix
    #[error("Dictionary key '{0}' is longer than 255 UTF-16 units")]
    KeyTooLong(String),

    /// Text form of a dictionary entry could not be parsed
    #[error("Malformed dictionary entry '{0}'")]
    MalformedLdfText(String),

    /// Compressed dictionary declares an inflated size above the accepted maximum
    #[error("Dictionary blob of {0} bytes exceeds the maximum size")]
    DictionaryTooLarge(usize),

    /// zlib compression or decompression of a dictionary blob failed
    #[error("Dictionary compression error: {0}")]
    Compression(#[from] std::io::Error),

    /// Frame did not start with a recognised header
    #[error("Invalid frame header: {0}")]
    InvalidHeader(String),

    /// A field of a schema type failed to decode
    #[error("Failed to decode field '{field}' of {type_name}: {source}")]
    Field {
        type_name: &'static str,
        field: &'static str,
        #[source]
        source: Box<CodecError>,
    },
}

impl CodecError {
    /// Strips field context and returns the innermost error.
    pub fn root(&self) -> &CodecError {
        match self {
            CodecError::Field { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
