//! Polymorphic solution output.
//!
//! The search engine makes exactly one `on_solution` call per solution and
//! never branches on the output kind in its hot path. Sinks latch their
//! first I/O error internally instead of failing the search; the driver
//! inspects the latch after the search returns.

use std::io::Write;

use dlx_codec::SolutionStreamWriter;
use dlx_error::{DlxError, Result};
use dlx_types::SolutionHeader;

/// Borrowed view of one solution: textual row ids and the parallel numeric
/// buffer, both in choice order. Must not be retained past `on_solution`.
#[derive(Debug, Clone, Copy)]
pub struct SolutionView<'a> {
    pub labels: &'a [String],
    pub row_ids: &'a [u32],
}

impl SolutionView<'_> {
    /// Number of chosen rows (the search depth at emission).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.row_ids.len()
    }
}

/// Receiver for solutions found by the search engine.
pub trait SolutionSink {
    fn on_solution(&mut self, view: &SolutionView<'_>);

    /// Invoked after each solution.
    fn flush(&mut self) {}
}

/// Writes space-separated textual row ids terminated by newline.
pub struct TextSink<W> {
    output: W,
    error: Option<DlxError>,
}

impl<W: Write> TextSink<W> {
    pub fn new(output: W) -> Self {
        Self {
            output,
            error: None,
        }
    }

    /// First write error observed, if any.
    pub fn take_error(&mut self) -> Option<DlxError> {
        self.error.take()
    }

    pub fn into_inner(self) -> W {
        self.output
    }

    fn latch(&mut self, result: std::io::Result<()>) {
        if self.error.is_none() {
            if let Err(e) = result {
                self.error = Some(DlxError::Io(e));
            }
        }
    }
}

impl<W: Write> SolutionSink for TextSink<W> {
    fn on_solution(&mut self, view: &SolutionView<'_>) {
        for (i, label) in view.labels.iter().enumerate() {
            let sep: &[u8] = if i + 1 == view.labels.len() {
                b"\n"
            } else {
                b" "
            };
            let write = self
                .output
                .write_all(label.as_bytes())
                .and_then(|()| self.output.write_all(sep));
            self.latch(write);
        }
    }

    fn flush(&mut self) {
        let result = self.output.flush();
        self.latch(result);
    }
}

/// Delegates to a [`SolutionStreamWriter`] using the numeric row-id buffer.
///
/// Empty solutions are skipped: a zero-entry row on the wire is
/// indistinguishable from the stream sentinel.
pub struct BinarySink<W: Write> {
    writer: SolutionStreamWriter<W>,
    error: Option<DlxError>,
}

impl<W: Write> BinarySink<W> {
    /// Write a DLXS header for `column_count` and return the armed sink.
    pub fn start(output: W, column_count: u32) -> Result<Self> {
        let mut writer = SolutionStreamWriter::new(output);
        writer.start(&SolutionHeader::new(column_count))?;
        Ok(Self {
            writer,
            error: None,
        })
    }

    /// Emit the sentinel and surface the first latched error, if any.
    pub fn finish(mut self) -> Result<W> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        self.writer.finish()?;
        Ok(self.writer.into_inner())
    }
}

impl<W: Write> SolutionSink for BinarySink<W> {
    fn on_solution(&mut self, view: &SolutionView<'_>) {
        if view.row_ids.is_empty() || self.error.is_some() {
            return;
        }
        if let Err(e) = self.writer.write_row(view.row_ids) {
            self.error = Some(e);
        }
    }
}

/// Broadcasts to an ordered list of child sinks; empty means "no sink".
#[derive(Default)]
pub struct CompositeSink<'a> {
    sinks: Vec<&'a mut dyn SolutionSink>,
}

impl<'a> CompositeSink<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(&mut self, sink: &'a mut dyn SolutionSink) {
        self.sinks.push(sink);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl SolutionSink for CompositeSink<'_> {
    fn on_solution(&mut self, view: &SolutionView<'_>) {
        for sink in &mut self.sinks {
            sink.on_solution(view);
        }
    }

    fn flush(&mut self) {
        for sink in &mut self.sinks {
            sink.flush();
        }
    }
}

/// Records invocation count and last depth. Test collaborator.
#[derive(Debug, Default)]
pub struct CountingSink {
    solutions: usize,
    last_depth: usize,
}

impl CountingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn solutions(&self) -> usize {
        self.solutions
    }

    #[must_use]
    pub fn last_depth(&self) -> usize {
        self.last_depth
    }
}

impl SolutionSink for CountingSink {
    fn on_solution(&mut self, view: &SolutionView<'_>) {
        self.solutions += 1;
        self.last_depth = view.depth();
    }
}
