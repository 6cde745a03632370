use thiserror::Error;

/// Primary error type for DLX operations.
///
/// Structured variants for the failure modes of the binary interchange
/// codec, the matrix builder, and the stream writers. Malformed input is
/// terminal for the stream that produced it; callers never retry.
#[derive(Error, Debug)]
pub enum DlxError {
    // === I/O ===
    /// Underlying stream or socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fewer bytes than a frame requires.
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    // === Format ===
    /// Leading magic did not match the expected section constant.
    #[error("bad magic: expected {expected:#010x}, got {actual:#010x}")]
    BadMagic { expected: u32, actual: u32 },

    /// Wire format version this build does not understand.
    #[error("unsupported format version {version}")]
    UnsupportedVersion { version: u16 },

    /// Row chunk that cannot be interpreted against its header.
    #[error("malformed row chunk: {detail}")]
    MalformedChunk { detail: String },

    /// Column index at or beyond the declared column count.
    #[error("column index {column} out of range for {column_count} columns")]
    ColumnOutOfRange { column: u32, column_count: u32 },

    /// The same column listed twice within one row chunk.
    #[error("duplicate column index {column} in row {row_id}")]
    DuplicateColumn { column: u32, row_id: u32 },

    /// Row with more entries than the wire format can carry.
    #[error("row has {entries} entries (max {max})")]
    OversizeRow { entries: usize, max: usize },

    // === Resource ===
    /// Node arena would exceed addressable size.
    #[error("cover matrix requires {nodes} nodes (max {max})")]
    TooManyNodes { nodes: u64, max: u64 },

    /// Row identifier or row count outside the representable range.
    #[error("{what} {value} exceeds solver limit")]
    RowCountOverflow { what: &'static str, value: u64 },

    // === State ===
    /// A row was written before `start` produced a header.
    #[error("solution row written before stream header")]
    RowBeforeHeader,

    /// More rows written than the header declared.
    #[error("row count exceeds declared {declared}")]
    RowCountExceeded { declared: u32 },

    /// Writer reused after `finish` without a fresh `start`.
    #[error("stream writer already finished")]
    WriterFinished,
}

impl DlxError {
    /// Process exit code for CLI use. I/O failures and format errors get
    /// distinct codes so shell pipelines can tell them apart.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Io(_) | Self::ShortRead { .. } => 2,
            Self::BadMagic { .. }
            | Self::UnsupportedVersion { .. }
            | Self::MalformedChunk { .. }
            | Self::ColumnOutOfRange { .. }
            | Self::DuplicateColumn { .. }
            | Self::OversizeRow { .. } => 3,
            Self::TooManyNodes { .. } | Self::RowCountOverflow { .. } => 4,
            Self::RowBeforeHeader | Self::RowCountExceeded { .. } | Self::WriterFinished => 5,
        }
    }

    /// Whether the error indicates malformed input rather than an
    /// environmental failure.
    pub const fn is_format(&self) -> bool {
        matches!(
            self,
            Self::BadMagic { .. }
                | Self::UnsupportedVersion { .. }
                | Self::MalformedChunk { .. }
                | Self::ColumnOutOfRange { .. }
                | Self::DuplicateColumn { .. }
                | Self::OversizeRow { .. }
        )
    }

    /// Create a malformed-chunk error.
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedChunk {
            detail: detail.into(),
        }
    }
}

/// Result type alias using `DlxError`.
pub type Result<T> = std::result::Result<T, DlxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_bad_magic() {
        let err = DlxError::BadMagic {
            expected: 0x444C_5842,
            actual: 0xDEAD_BEEF,
        };
        assert_eq!(
            err.to_string(),
            "bad magic: expected 0x444c5842, got 0xdeadbeef"
        );
    }

    #[test]
    fn error_display_duplicate_column() {
        let err = DlxError::DuplicateColumn { column: 7, row_id: 3 };
        assert_eq!(err.to_string(), "duplicate column index 7 in row 3");
    }

    #[test]
    fn error_display_short_read() {
        let err = DlxError::ShortRead {
            expected: 16,
            actual: 3,
        };
        assert_eq!(err.to_string(), "short read: expected 16 bytes, got 3");
    }

    #[test]
    fn io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "peer reset");
        let err: DlxError = io_err.into();
        assert!(matches!(err, DlxError::Io(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn exit_codes_by_kind() {
        assert_eq!(
            DlxError::UnsupportedVersion { version: 9 }.exit_code(),
            3
        );
        assert_eq!(
            DlxError::TooManyNodes {
                nodes: u64::MAX,
                max: i32::MAX as u64,
            }
            .exit_code(),
            4
        );
        assert_eq!(DlxError::WriterFinished.exit_code(), 5);
    }

    #[test]
    fn format_classification() {
        assert!(DlxError::malformed("truncated entry list").is_format());
        assert!(
            DlxError::ColumnOutOfRange {
                column: 5,
                column_count: 3,
            }
            .is_format()
        );
        assert!(!DlxError::RowBeforeHeader.is_format());
        assert!(
            !DlxError::ShortRead {
                expected: 4,
                actual: 0,
            }
            .is_format()
        );
    }
}
