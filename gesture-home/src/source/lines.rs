//! JSON-lines frame source (stdin or a recorded file).

use std::io::{self, BufRead};

use anyhow::Context;
use tracing::debug;

use super::{now_ms, Frame, LandmarkSource, SourceEvent};

/// Reads one frame per line.  Blank lines are skipped.
///
/// Reads go through `fill_buf` rather than `read_line`, which retries on
/// `EINTR`: a signal interrupting a blocked read surfaces as `Waiting` so
/// the frame loop can notice a shutdown request.
pub struct LineSource<R> {
    reader: R,
    line: Vec<u8>,
    line_no: u64,
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
            line_no: 0,
        }
    }

    /// Append input to `line` until a newline.  Returns false at EOF.
    fn fill_line(&mut self) -> io::Result<bool> {
        loop {
            let available = self.reader.fill_buf()?;
            if available.is_empty() {
                return Ok(false);
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(end) => {
                    self.line.extend_from_slice(&available[..end]);
                    self.reader.consume(end + 1);
                    return Ok(true);
                }
                None => {
                    let len = available.len();
                    self.line.extend_from_slice(available);
                    self.reader.consume(len);
                }
            }
        }
    }
}

impl<R: BufRead> LandmarkSource for LineSource<R> {
    fn next_frame(&mut self) -> anyhow::Result<SourceEvent> {
        loop {
            let more = match self.fill_line() {
                Ok(more) => more,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(SourceEvent::Waiting),
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("failed to read landmark line {}", self.line_no + 1))
                }
            };
            if !more && self.line.is_empty() {
                debug!(lines = self.line_no, "end of landmark input");
                return Ok(SourceEvent::Ended);
            }
            self.line_no += 1;

            let text = String::from_utf8_lossy(&self.line).trim().to_string();
            self.line.clear();
            if text.is_empty() {
                continue;
            }
            return Ok(SourceEvent::Frame(Frame::from_json(&text, now_ms())));
        }
    }
}
