use thiserror::Error;

#[derive(Debug, Error)]
pub enum RsrcError {
    #[error("Not enough data for {target}; Expected {expected}, Actual {actual}")]
    BufferTooSmall { target: String, expected: u64, actual: u64 },

    #[error("Invalid argument; {0}")]
    InvalidArgument(&'static str),

    #[error("Invalid timestamp {0:#010x}")]
    InvalidTimestamp(i64),

    #[error("Invalid {target} signature; Expected {expected:#010x}, Actual {actual:#010x}")]
    SignatureMismatch { target: &'static str, expected: u64, actual: u64 },

    #[error("Invalid {target}; {reason}")]
    InvalidData { target: &'static str, reason: String },

    #[error("String table bundle identifier 0 is out of range")]
    InvalidBundleIdentifier,

    #[error("String {identifier} already set for language {lcid:#06x}")]
    ValueAlreadySet { identifier: u32, lcid: u32 },

    #[error("Message ranges {0:#010x}..={1:#010x} and {2:#010x}..={3:#010x} overlap")]
    OverlappingRanges(u32, u32, u32, u32),

    #[error("Offset {offset:#010x} outside of {lower:#010x}..{upper:#010x}")]
    OffsetOutOfBounds { offset: u64, lower: u64, upper: u64 },

    #[error("Seek to negative offset {0}")]
    SeekOutOfBounds(i64),

    #[error("Resource node flags {0:#010x} are not supported")]
    UnsupportedNodeFlags(u32),

    #[error("Codepage {0} is not supported")]
    UnsupportedCodepage(u32),

    #[error("Access mode {0:#04x} is not supported")]
    UnsupportedAccess(u32),

    #[error("MUI version {0:#010x} is not supported")]
    UnsupportedMuiVersion(u32),

    #[error("Resource node deeper than {0} levels")]
    RecursionDepthExceeded(u32),

    #[error("Abort requested")]
    AbortRequested,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
