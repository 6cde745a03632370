//! DLXB/DLXS binary interchange codec.
//!
//! Cover problems (`DLXB`) and solution streams (`DLXS`) are framed,
//! big-endian, and carry no padding or alignment assumptions. Whole-container
//! reads/writes live alongside chunked streaming readers and writers that
//! reuse a scratch buffer across rows.
//!
//! Error semantics: a short read at a header is fatal; a short read at the
//! first byte of a new chunk when no fixed row count is pending is
//! end-of-stream; a short read mid-chunk is fatal.

use std::io::{Read, Write};

use dlx_error::{DlxError, Result};
use dlx_types::{
    limits, CoverHeader, Problem, RowChunk, Solution, SolutionHeader, SolutionRow, BINARY_VERSION,
    COVER_MAGIC, SOLUTION_MAGIC,
};

// ---------------------------------------------------------------------------
// Byte-level helpers
// ---------------------------------------------------------------------------

#[inline]
fn be_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

#[inline]
fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Read until `buf` is full or the stream ends. Returns the byte count
/// actually read; `Interrupted` is retried.
fn read_full<R: Read>(input: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read an exact frame; anything less than `buf.len()` bytes is fatal.
fn read_exact_frame<R: Read>(input: &mut R, buf: &mut [u8]) -> Result<()> {
    let filled = read_full(input, buf)?;
    if filled < buf.len() {
        return Err(DlxError::ShortRead {
            expected: buf.len(),
            actual: filled,
        });
    }
    Ok(())
}

/// Read a frame that may legitimately not start: `Ok(false)` on clean EOF at
/// the first byte, an error on a partial frame.
fn read_frame_or_eof<R: Read>(input: &mut R, buf: &mut [u8]) -> Result<bool> {
    let filled = read_full(input, buf)?;
    if filled == 0 {
        return Ok(false);
    }
    if filled < buf.len() {
        return Err(DlxError::ShortRead {
            expected: buf.len(),
            actual: filled,
        });
    }
    Ok(true)
}

/// Growth policy for reusable chunk buffers: start at exactly the required
/// size, then double until the cap, past which growth clamps to the exact
/// required size again.
fn grown_capacity(current: usize, required: usize) -> usize {
    if current >= required {
        return current;
    }
    let mut new_capacity = if current == 0 { required } else { current };
    while new_capacity < required {
        if new_capacity > limits::CAPACITY_DOUBLING_CAP {
            new_capacity = required;
            break;
        }
        new_capacity *= 2;
    }
    new_capacity
}

fn ensure_capacity(buf: &mut Vec<u32>, required: usize) {
    let target = grown_capacity(buf.capacity(), required);
    if target > buf.capacity() {
        buf.reserve_exact(target - buf.len());
    }
}

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

/// Read and validate a DLXB cover header.
pub fn read_cover_header<R: Read>(input: &mut R) -> Result<CoverHeader> {
    let mut raw = [0u8; CoverHeader::WIRE_SIZE];
    read_exact_frame(input, &mut raw)?;

    let header = CoverHeader {
        magic: be_u32(&raw[0..4]),
        version: be_u16(&raw[4..6]),
        flags: be_u16(&raw[6..8]),
        column_count: be_u32(&raw[8..12]),
        row_count: be_u32(&raw[12..16]),
    };

    if header.magic != COVER_MAGIC {
        return Err(DlxError::BadMagic {
            expected: COVER_MAGIC,
            actual: header.magic,
        });
    }
    if header.version != BINARY_VERSION {
        return Err(DlxError::UnsupportedVersion {
            version: header.version,
        });
    }
    Ok(header)
}

/// Write a DLXB cover header.
pub fn write_cover_header<W: Write>(output: &mut W, header: &CoverHeader) -> Result<()> {
    let mut raw = [0u8; CoverHeader::WIRE_SIZE];
    raw[0..4].copy_from_slice(&header.magic.to_be_bytes());
    raw[4..6].copy_from_slice(&header.version.to_be_bytes());
    raw[6..8].copy_from_slice(&header.flags.to_be_bytes());
    raw[8..12].copy_from_slice(&header.column_count.to_be_bytes());
    raw[12..16].copy_from_slice(&header.row_count.to_be_bytes());
    output.write_all(&raw)?;
    Ok(())
}

/// Read and validate a DLXS solution header.
pub fn read_solution_header<R: Read>(input: &mut R) -> Result<SolutionHeader> {
    let mut raw = [0u8; SolutionHeader::WIRE_SIZE];
    read_exact_frame(input, &mut raw)?;

    let header = SolutionHeader {
        magic: be_u32(&raw[0..4]),
        version: be_u16(&raw[4..6]),
        flags: be_u16(&raw[6..8]),
        column_count: be_u32(&raw[8..12]),
    };

    if header.magic != SOLUTION_MAGIC {
        return Err(DlxError::BadMagic {
            expected: SOLUTION_MAGIC,
            actual: header.magic,
        });
    }
    if header.version != BINARY_VERSION {
        return Err(DlxError::UnsupportedVersion {
            version: header.version,
        });
    }
    Ok(header)
}

/// Write a DLXS solution header.
pub fn write_solution_header<W: Write>(output: &mut W, header: &SolutionHeader) -> Result<()> {
    let mut raw = [0u8; SolutionHeader::WIRE_SIZE];
    raw[0..4].copy_from_slice(&header.magic.to_be_bytes());
    raw[4..6].copy_from_slice(&header.version.to_be_bytes());
    raw[6..8].copy_from_slice(&header.flags.to_be_bytes());
    raw[8..12].copy_from_slice(&header.column_count.to_be_bytes());
    output.write_all(&raw)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Row frames (shared shape: u32 id, u16 count, count x u32)
// ---------------------------------------------------------------------------

/// Write one row frame. Used for both DLXB chunks and DLXS rows.
fn write_row_frame<W: Write>(output: &mut W, id: u32, entries: &[u32]) -> Result<()> {
    if entries.len() > limits::MAX_ROW_ENTRIES {
        return Err(DlxError::OversizeRow {
            entries: entries.len(),
            max: limits::MAX_ROW_ENTRIES,
        });
    }
    output.write_all(&id.to_be_bytes())?;
    output.write_all(&(entries.len() as u16).to_be_bytes())?;
    for &value in entries {
        output.write_all(&value.to_be_bytes())?;
    }
    Ok(())
}

/// Read one row frame into `(id, entries)`. Returns `Ok(false)` on clean EOF
/// at the first byte when `allow_eof` is set.
fn read_row_frame<R: Read>(
    input: &mut R,
    id: &mut u32,
    entries: &mut Vec<u32>,
    allow_eof: bool,
) -> Result<bool> {
    let mut id_raw = [0u8; 4];
    if allow_eof {
        if !read_frame_or_eof(input, &mut id_raw)? {
            return Ok(false);
        }
    } else {
        read_exact_frame(input, &mut id_raw)?;
    }

    let mut count_raw = [0u8; 2];
    read_exact_frame(input, &mut count_raw)?;
    let count = be_u16(&count_raw) as usize;

    entries.clear();
    ensure_capacity(entries, count);
    let mut value_raw = [0u8; 4];
    for _ in 0..count {
        read_exact_frame(input, &mut value_raw)?;
        entries.push(be_u32(&value_raw));
    }

    *id = be_u32(&id_raw);
    Ok(true)
}

/// Write one DLXB row chunk.
pub fn write_row_chunk<W: Write>(output: &mut W, row_id: u32, columns: &[u32]) -> Result<()> {
    write_row_frame(output, row_id, columns)
}

/// Write one DLXS solution row.
pub fn write_solution_row<W: Write>(
    output: &mut W,
    solution_id: u32,
    row_indices: &[u32],
) -> Result<()> {
    write_row_frame(output, solution_id, row_indices)
}

/// Write the `{0, 0}` sentinel row that terminates a solution stream.
pub fn write_solution_sentinel<W: Write>(output: &mut W) -> Result<()> {
    write_row_frame(output, 0, &[])
}

// ---------------------------------------------------------------------------
// Whole-container operations
// ---------------------------------------------------------------------------

/// Validate one chunk's column indices against the declared column count:
/// every index in `[0, column_count)` and no duplicates.
fn validate_chunk_columns(row_id: u32, columns: &[u32], column_count: u32) -> Result<()> {
    for &column in columns {
        if column >= column_count {
            return Err(DlxError::ColumnOutOfRange {
                column,
                column_count,
            });
        }
    }
    if columns.len() > 1 {
        let mut sorted = columns.to_vec();
        sorted.sort_unstable();
        for pair in sorted.windows(2) {
            if pair[0] == pair[1] {
                return Err(DlxError::DuplicateColumn {
                    column: pair[0],
                    row_id,
                });
            }
        }
    }
    Ok(())
}

/// Read a full DLXB cover problem: header plus exactly `row_count` chunks.
pub fn read_problem<R: Read>(input: &mut R) -> Result<Problem> {
    let header = read_cover_header(input)?;

    let mut rows = Vec::with_capacity(header.row_count.min(1 << 16) as usize);
    let mut id = 0u32;
    let mut scratch: Vec<u32> = Vec::new();
    for _ in 0..header.row_count {
        read_row_frame(input, &mut id, &mut scratch, false)?;
        validate_chunk_columns(id, &scratch, header.column_count)?;
        rows.push(RowChunk::new(id, scratch.clone()));
    }

    tracing::debug!(
        target: "dlx::codec",
        columns = header.column_count,
        rows = rows.len(),
        "decoded cover problem"
    );
    Ok(Problem { header, rows })
}

/// Write a full DLXB cover problem. The emitted `row_count` is the container
/// row vector's length, overriding any stale header field.
pub fn write_problem<W: Write>(output: &mut W, problem: &Problem) -> Result<()> {
    let mut header = problem.header;
    header.row_count =
        u32::try_from(problem.rows.len()).map_err(|_| DlxError::RowCountOverflow {
            what: "row count",
            value: problem.rows.len() as u64,
        })?;
    write_cover_header(output, &header)?;
    for row in &problem.rows {
        write_row_chunk(output, row.row_id, &row.columns)?;
    }
    Ok(())
}

/// Read a full DLXS solution stream: header, then rows until the `{0, 0}`
/// sentinel or clean EOF.
pub fn read_solution<R: Read>(input: &mut R) -> Result<Solution> {
    let header = read_solution_header(input)?;

    let mut rows = Vec::new();
    let mut id = 0u32;
    let mut scratch: Vec<u32> = Vec::new();
    loop {
        if !read_row_frame(input, &mut id, &mut scratch, true)? {
            break;
        }
        if id == 0 && scratch.is_empty() {
            break;
        }
        rows.push(SolutionRow::new(id, scratch.clone()));
    }
    Ok(Solution { header, rows })
}

/// Write a full DLXS solution stream: header, rows, sentinel.
pub fn write_solution<W: Write>(output: &mut W, solution: &Solution) -> Result<()> {
    write_solution_header(output, &solution.header)?;
    for row in &solution.rows {
        write_solution_row(output, row.solution_id, &row.row_indices)?;
    }
    write_solution_sentinel(output)
}

// ---------------------------------------------------------------------------
// Streaming readers
// ---------------------------------------------------------------------------

/// Chunked reader for DLXB cover problems.
///
/// `read_header` once, then `read_chunk` until it yields `None`. The reader
/// owns a reusable scratch chunk whose column buffer follows the
/// doubling-then-clamp capacity policy.
pub struct ProblemStreamReader<R> {
    input: R,
    scratch: RowChunk,
    remaining_rows: u32,
    has_row_count: bool,
}

impl<R: Read> ProblemStreamReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            scratch: RowChunk::default(),
            remaining_rows: 0,
            has_row_count: false,
        }
    }

    /// Read the cover header and arm the fixed row count.
    pub fn read_header(&mut self) -> Result<CoverHeader> {
        let header = read_cover_header(&mut self.input)?;
        self.remaining_rows = header.row_count;
        self.has_row_count = true;
        Ok(header)
    }

    /// Read the next chunk. `None` means end-of-stream: the declared row
    /// count is exhausted, or (with no header read) the input hit clean EOF.
    pub fn read_chunk(&mut self) -> Result<Option<&RowChunk>> {
        if self.has_row_count {
            if self.remaining_rows == 0 {
                return Ok(None);
            }
            read_row_frame(
                &mut self.input,
                &mut self.scratch.row_id,
                &mut self.scratch.columns,
                false,
            )?;
            self.remaining_rows -= 1;
            return Ok(Some(&self.scratch));
        }

        if !read_row_frame(
            &mut self.input,
            &mut self.scratch.row_id,
            &mut self.scratch.columns,
            true,
        )? {
            return Ok(None);
        }
        Ok(Some(&self.scratch))
    }

    /// Consume the reader and return the underlying input.
    pub fn into_inner(self) -> R {
        self.input
    }
}

/// Chunked reader for DLXS solution streams.
///
/// `read_header` once, then `read_row` until `None` (sentinel consumed or
/// clean EOF). After the sentinel, `read_header` may be called again: bytes
/// following a sentinel on the same connection begin a new header.
pub struct SolutionStreamReader<R> {
    input: R,
    scratch: SolutionRow,
}

impl<R: Read> SolutionStreamReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            scratch: SolutionRow::default(),
        }
    }

    pub fn read_header(&mut self) -> Result<SolutionHeader> {
        read_solution_header(&mut self.input)
    }

    /// Read the next solution row; `None` at the sentinel or clean EOF.
    pub fn read_row(&mut self) -> Result<Option<&SolutionRow>> {
        if !read_row_frame(
            &mut self.input,
            &mut self.scratch.solution_id,
            &mut self.scratch.row_indices,
            true,
        )? {
            return Ok(None);
        }
        if self.scratch.is_sentinel() {
            return Ok(None);
        }
        Ok(Some(&self.scratch))
    }

    pub fn into_inner(self) -> R {
        self.input
    }
}

// ---------------------------------------------------------------------------
// Streaming writers
// ---------------------------------------------------------------------------

/// Chunked writer for DLXB cover problems.
///
/// `start` writes a header and arms the declared row count; writing past it
/// is a state error. `start` may be re-invoked to begin a fresh problem on
/// the same output.
pub struct ProblemStreamWriter<W> {
    output: W,
    declared_rows: u32,
    remaining_rows: u32,
    started: bool,
}

impl<W: Write> ProblemStreamWriter<W> {
    pub fn new(output: W) -> Self {
        Self {
            output,
            declared_rows: 0,
            remaining_rows: 0,
            started: false,
        }
    }

    pub fn start(&mut self, header: &CoverHeader) -> Result<()> {
        write_cover_header(&mut self.output, header)?;
        self.declared_rows = header.row_count;
        self.remaining_rows = header.row_count;
        self.started = true;
        Ok(())
    }

    pub fn write_row(&mut self, row_id: u32, columns: &[u32]) -> Result<()> {
        if !self.started {
            return Err(DlxError::RowBeforeHeader);
        }
        if self.remaining_rows == 0 {
            return Err(DlxError::RowCountExceeded {
                declared: self.declared_rows,
            });
        }
        write_row_chunk(&mut self.output, row_id, columns)?;
        self.remaining_rows -= 1;
        Ok(())
    }

    /// Finish the current problem and allow a fresh `start`.
    pub fn finish(&mut self) -> Result<()> {
        self.output.flush()?;
        self.started = false;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.output
    }
}

/// Chunked writer for DLXS solution streams.
///
/// `start` writes a header and resets the monotonic solution id; `write_row`
/// assigns ids from 1; `finish` emits the `{0, 0}` sentinel. `start` may be
/// re-invoked to begin a fresh stream on the same output.
pub struct SolutionStreamWriter<W> {
    output: W,
    next_solution_id: u32,
    started: bool,
    finished: bool,
}

impl<W: Write> SolutionStreamWriter<W> {
    pub fn new(output: W) -> Self {
        Self {
            output,
            next_solution_id: 1,
            started: false,
            finished: false,
        }
    }

    pub fn start(&mut self, header: &SolutionHeader) -> Result<()> {
        write_solution_header(&mut self.output, header)?;
        self.output.flush()?;
        self.next_solution_id = 1;
        self.started = true;
        self.finished = false;
        Ok(())
    }

    /// Write one solution row, returning the id it was assigned.
    pub fn write_row(&mut self, row_indices: &[u32]) -> Result<u32> {
        if !self.started {
            if self.finished {
                return Err(DlxError::WriterFinished);
            }
            return Err(DlxError::RowBeforeHeader);
        }
        let id = self.next_solution_id;
        write_solution_row(&mut self.output, id, row_indices)?;
        self.output.flush()?;
        self.next_solution_id += 1;
        Ok(id)
    }

    /// Write the sentinel row and allow a fresh `start`.
    pub fn finish(&mut self) -> Result<()> {
        if !self.started {
            return Err(DlxError::WriterFinished);
        }
        write_solution_sentinel(&mut self.output)?;
        self.output.flush()?;
        self.started = false;
        self.finished = true;
        Ok(())
    }

    /// Number of rows written so far on the active stream.
    #[must_use]
    pub fn rows_written(&self) -> u32 {
        self.next_solution_id - 1
    }

    pub fn into_inner(self) -> W {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_problem() -> Problem {
        let mut problem = Problem::new(3);
        problem.push_row(1, vec![0]);
        problem.push_row(2, vec![1]);
        problem.push_row(3, vec![2]);
        problem
    }

    #[test]
    fn cover_header_wire_bytes() {
        let mut buf = Vec::new();
        write_cover_header(&mut buf, &CoverHeader::new(3, 2)).unwrap();
        assert_eq!(
            buf,
            vec![
                0x44, 0x4C, 0x58, 0x42, // "DLXB"
                0x00, 0x01, // version
                0x00, 0x00, // flags
                0x00, 0x00, 0x00, 0x03, // column_count
                0x00, 0x00, 0x00, 0x02, // row_count
            ]
        );
    }

    #[test]
    fn solution_header_wire_bytes() {
        let mut buf = Vec::new();
        write_solution_header(&mut buf, &SolutionHeader::new(324)).unwrap();
        assert_eq!(
            buf,
            vec![
                0x44, 0x4C, 0x58, 0x53, // "DLXS"
                0x00, 0x01, // version
                0x00, 0x00, // flags
                0x00, 0x00, 0x01, 0x44, // column_count = 324
            ]
        );
    }

    #[test]
    fn row_chunk_wire_bytes() {
        let mut buf = Vec::new();
        write_row_chunk(&mut buf, 7, &[0, 2]).unwrap();
        assert_eq!(
            buf,
            vec![
                0x00, 0x00, 0x00, 0x07, // row_id
                0x00, 0x02, // entry_count
                0x00, 0x00, 0x00, 0x00, // column 0
                0x00, 0x00, 0x00, 0x02, // column 2
            ]
        );
    }

    #[test]
    fn problem_roundtrip() {
        let problem = sample_problem();
        let mut buf = Vec::new();
        write_problem(&mut buf, &problem).unwrap();
        let decoded = read_problem(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded, problem);
    }

    #[test]
    fn problem_write_overrides_stale_row_count() {
        let mut problem = sample_problem();
        problem.header.row_count = 99;
        let mut buf = Vec::new();
        write_problem(&mut buf, &problem).unwrap();
        let decoded = read_problem(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded.header.row_count, 3);
        assert_eq!(decoded.rows.len(), 3);
    }

    #[test]
    fn solution_roundtrip() {
        let mut solution = Solution::new(3);
        solution.rows.push(SolutionRow::new(1, vec![1, 2, 3]));
        solution.rows.push(SolutionRow::new(2, vec![3, 2, 1]));
        let mut buf = Vec::new();
        write_solution(&mut buf, &solution).unwrap();
        let decoded = read_solution(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded, solution);
    }

    #[test]
    fn solution_terminates_at_sentinel_with_trailing_bytes() {
        let mut buf = Vec::new();
        let mut solution = Solution::new(2);
        solution.rows.push(SolutionRow::new(1, vec![4]));
        write_solution(&mut buf, &solution).unwrap();
        // A second stream begins immediately after the sentinel.
        write_solution(&mut buf, &Solution::new(5)).unwrap();

        let mut cursor = Cursor::new(&buf);
        let first = read_solution(&mut cursor).unwrap();
        assert_eq!(first.rows.len(), 1);
        let second = read_solution(&mut cursor).unwrap();
        assert_eq!(second.header.column_count, 5);
        assert!(second.rows.is_empty());
    }

    #[test]
    fn solution_accepts_clean_eof_without_sentinel() {
        let mut buf = Vec::new();
        write_solution_header(&mut buf, &SolutionHeader::new(2)).unwrap();
        write_solution_row(&mut buf, 1, &[9]).unwrap();
        let decoded = read_solution(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded.rows, vec![SolutionRow::new(1, vec![9])]);
    }

    #[test]
    fn bad_magic_rejected() {
        let mut buf = Vec::new();
        write_cover_header(&mut buf, &CoverHeader::new(1, 0)).unwrap();
        buf[0] = 0xFF;
        let err = read_problem(&mut Cursor::new(&buf)).unwrap_err();
        assert!(matches!(err, DlxError::BadMagic { .. }));
    }

    #[test]
    fn unsupported_version_rejected() {
        let mut header = CoverHeader::new(1, 0);
        header.version = 2;
        let mut buf = Vec::new();
        write_cover_header(&mut buf, &header).unwrap();
        let err = read_problem(&mut Cursor::new(&buf)).unwrap_err();
        assert!(matches!(
            err,
            DlxError::UnsupportedVersion { version: 2 }
        ));
    }

    #[test]
    fn truncated_header_is_short_read() {
        let err = read_cover_header(&mut Cursor::new(&[0x44, 0x4C])).unwrap_err();
        assert!(matches!(
            err,
            DlxError::ShortRead {
                expected: 16,
                actual: 2,
            }
        ));
    }

    #[test]
    fn truncated_chunk_is_fatal_under_declared_count() {
        let mut buf = Vec::new();
        write_cover_header(&mut buf, &CoverHeader::new(3, 2)).unwrap();
        write_row_chunk(&mut buf, 1, &[0]).unwrap();
        // Second declared chunk missing entirely.
        let err = read_problem(&mut Cursor::new(&buf)).unwrap_err();
        assert!(matches!(err, DlxError::ShortRead { .. }));
    }

    #[test]
    fn truncated_mid_chunk_is_fatal() {
        let mut buf = Vec::new();
        write_cover_header(&mut buf, &CoverHeader::new(3, 1)).unwrap();
        write_row_chunk(&mut buf, 1, &[0, 1]).unwrap();
        buf.truncate(buf.len() - 2); // cut into the last column entry
        let err = read_problem(&mut Cursor::new(&buf)).unwrap_err();
        assert!(matches!(err, DlxError::ShortRead { .. }));
    }

    #[test]
    fn out_of_range_column_rejected() {
        let mut buf = Vec::new();
        write_cover_header(&mut buf, &CoverHeader::new(3, 1)).unwrap();
        write_row_chunk(&mut buf, 1, &[3]).unwrap();
        let err = read_problem(&mut Cursor::new(&buf)).unwrap_err();
        assert!(matches!(
            err,
            DlxError::ColumnOutOfRange {
                column: 3,
                column_count: 3,
            }
        ));
    }

    #[test]
    fn duplicate_column_rejected() {
        let mut buf = Vec::new();
        write_cover_header(&mut buf, &CoverHeader::new(3, 1)).unwrap();
        write_row_chunk(&mut buf, 5, &[2, 0, 2]).unwrap();
        let err = read_problem(&mut Cursor::new(&buf)).unwrap_err();
        assert!(matches!(
            err,
            DlxError::DuplicateColumn { column: 2, row_id: 5 }
        ));
    }

    #[test]
    fn capacity_policy_first_use_is_exact() {
        assert_eq!(grown_capacity(0, 12), 12);
    }

    #[test]
    fn capacity_policy_doubles_below_cap() {
        assert_eq!(grown_capacity(12, 13), 24);
        assert_eq!(grown_capacity(24, 100), 192);
    }

    #[test]
    fn capacity_policy_clamps_past_cap() {
        // 40_000 > u16::MAX / 2, so the next growth clamps to the exact size.
        assert_eq!(grown_capacity(40_000, 50_000), 50_000);
        // Doubling that would cross the cap still runs until it exceeds it.
        assert_eq!(grown_capacity(20_000, 50_000), 50_000);
    }

    #[test]
    fn stream_reader_scratch_reuses_buffer() {
        let mut buf = Vec::new();
        write_cover_header(&mut buf, &CoverHeader::new(10, 3)).unwrap();
        write_row_chunk(&mut buf, 1, &[0, 1, 2, 3]).unwrap();
        write_row_chunk(&mut buf, 2, &[4]).unwrap();
        write_row_chunk(&mut buf, 3, &[5, 6]).unwrap();

        let mut reader = ProblemStreamReader::new(Cursor::new(&buf));
        let header = reader.read_header().unwrap();
        assert_eq!(header.row_count, 3);

        let chunk = reader.read_chunk().unwrap().unwrap();
        assert_eq!(chunk.row_id, 1);
        assert_eq!(chunk.columns, vec![0, 1, 2, 3]);
        let capacity_after_first = 4;

        let chunk = reader.read_chunk().unwrap().unwrap();
        assert_eq!(chunk.row_id, 2);
        assert_eq!(chunk.columns, vec![4]);
        assert!(chunk.columns.capacity() >= capacity_after_first);

        let chunk = reader.read_chunk().unwrap().unwrap();
        assert_eq!(chunk.columns, vec![5, 6]);

        assert!(reader.read_chunk().unwrap().is_none());
        // Past the declared count the reader stays at end-of-stream.
        assert!(reader.read_chunk().unwrap().is_none());
    }

    #[test]
    fn stream_reader_without_header_reads_to_eof() {
        let mut buf = Vec::new();
        write_row_chunk(&mut buf, 1, &[0]).unwrap();
        write_row_chunk(&mut buf, 2, &[1]).unwrap();

        let mut reader = ProblemStreamReader::new(Cursor::new(&buf));
        assert_eq!(reader.read_chunk().unwrap().unwrap().row_id, 1);
        assert_eq!(reader.read_chunk().unwrap().unwrap().row_id, 2);
        assert!(reader.read_chunk().unwrap().is_none());
    }

    #[test]
    fn stream_writer_row_states() {
        let mut writer = SolutionStreamWriter::new(Vec::new());
        assert!(matches!(
            writer.write_row(&[1]).unwrap_err(),
            DlxError::RowBeforeHeader
        ));

        writer.start(&SolutionHeader::new(3)).unwrap();
        assert_eq!(writer.write_row(&[1, 2, 3]).unwrap(), 1);
        assert_eq!(writer.write_row(&[3, 2, 1]).unwrap(), 2);
        assert_eq!(writer.rows_written(), 2);
        writer.finish().unwrap();

        assert!(matches!(
            writer.write_row(&[1]).unwrap_err(),
            DlxError::WriterFinished
        ));
        assert!(matches!(
            writer.finish().unwrap_err(),
            DlxError::WriterFinished
        ));

        // A fresh start begins a new stream with ids from 1 again.
        writer.start(&SolutionHeader::new(3)).unwrap();
        assert_eq!(writer.write_row(&[9]).unwrap(), 1);
        writer.finish().unwrap();

        let bytes = writer.into_inner();
        let mut cursor = Cursor::new(&bytes);
        let first = read_solution(&mut cursor).unwrap();
        assert_eq!(first.rows.len(), 2);
        let second = read_solution(&mut cursor).unwrap();
        assert_eq!(second.rows, vec![SolutionRow::new(1, vec![9])]);
    }

    #[test]
    fn problem_stream_writer_enforces_declared_count() {
        let mut writer = ProblemStreamWriter::new(Vec::new());
        assert!(matches!(
            writer.write_row(1, &[0]).unwrap_err(),
            DlxError::RowBeforeHeader
        ));

        writer.start(&CoverHeader::new(2, 1)).unwrap();
        writer.write_row(1, &[0]).unwrap();
        assert!(matches!(
            writer.write_row(2, &[1]).unwrap_err(),
            DlxError::RowCountExceeded { .. }
        ));
        writer.finish().unwrap();

        let decoded = read_problem(&mut Cursor::new(&writer.into_inner())).unwrap();
        assert_eq!(decoded.rows.len(), 1);
    }

    #[test]
    fn solution_stream_reader_consumes_sentinel_between_streams() {
        let mut buf = Vec::new();
        write_solution_header(&mut buf, &SolutionHeader::new(4)).unwrap();
        write_solution_row(&mut buf, 1, &[2, 4]).unwrap();
        write_solution_sentinel(&mut buf).unwrap();
        write_solution_header(&mut buf, &SolutionHeader::new(4)).unwrap();
        write_solution_row(&mut buf, 1, &[6]).unwrap();
        write_solution_sentinel(&mut buf).unwrap();

        let mut reader = SolutionStreamReader::new(Cursor::new(&buf));
        assert_eq!(reader.read_header().unwrap().column_count, 4);
        assert_eq!(reader.read_row().unwrap().unwrap().row_indices, vec![2, 4]);
        assert!(reader.read_row().unwrap().is_none());

        assert_eq!(reader.read_header().unwrap().column_count, 4);
        assert_eq!(reader.read_row().unwrap().unwrap().row_indices, vec![6]);
        assert!(reader.read_row().unwrap().is_none());
    }

    // -----------------------------------------------------------------------
    // proptest: round-trip over arbitrary valid containers
    // -----------------------------------------------------------------------

    use proptest::prelude::*;

    fn arb_problem() -> BoxedStrategy<Problem> {
        (1u32..64)
            .prop_flat_map(|column_count| {
                let row = proptest::collection::btree_set(0..column_count, 0..8)
                    .prop_map(|set| set.into_iter().collect::<Vec<u32>>());
                (
                    Just(column_count),
                    proptest::collection::vec((0u32..1000, row), 0..32),
                )
            })
            .prop_map(|(column_count, rows)| {
                let mut problem = Problem::new(column_count);
                for (row_id, columns) in rows {
                    problem.push_row(row_id, columns);
                }
                problem
            })
            .boxed()
    }

    proptest::proptest! {
        /// Problem encode/decode round-trip in container equality.
        #[test]
        fn prop_problem_roundtrip(problem in arb_problem()) {
            let mut buf = Vec::new();
            write_problem(&mut buf, &problem).unwrap();
            let decoded = read_problem(&mut Cursor::new(&buf)).unwrap();
            prop_assert_eq!(decoded, problem);
        }

        /// Double round-trip is byte-stable.
        #[test]
        fn prop_problem_double_roundtrip_bytes(problem in arb_problem()) {
            let mut first = Vec::new();
            write_problem(&mut first, &problem).unwrap();
            let decoded = read_problem(&mut Cursor::new(&first)).unwrap();
            let mut second = Vec::new();
            write_problem(&mut second, &decoded).unwrap();
            prop_assert_eq!(first, second);
        }

        /// Solution encode/decode round-trip.
        #[test]
        fn prop_solution_roundtrip(
            column_count in 1u32..512,
            rows in proptest::collection::vec(
                proptest::collection::vec(1u32..10_000, 0..16),
                0..16,
            )
        ) {
            let mut solution = Solution::new(column_count);
            for (i, indices) in rows.into_iter().enumerate() {
                solution.rows.push(SolutionRow::new(i as u32 + 1, indices));
            }
            let mut buf = Vec::new();
            write_solution(&mut buf, &solution).unwrap();
            let decoded = read_solution(&mut Cursor::new(&buf)).unwrap();
            prop_assert_eq!(decoded, solution);
        }
    }
}
