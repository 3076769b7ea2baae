//! Incremental `data: ` line framer for `text/event-stream` bodies.
//!
//! Works on bytes only; payloads are handed out undecoded. Each `data: ` line is one event and
//! multi-line folding is not performed. Every other line is dropped.

const DATA_PREFIX: &[u8] = b"data: ";
const DONE_SENTINEL: &[u8] = b"[DONE]";

#[derive(Debug, Default)]
pub struct SseFramer {
    residual: Vec<u8>,
    done: bool,
}

impl SseFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return the payloads of every completed `data: ` line, in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }
        self.residual.extend_from_slice(bytes);

        let mut start = 0;
        while let Some(pos) = self.residual[start..].iter().position(|b| *b == b'\n') {
            let end = start + pos;
            let line = parse_line(&self.residual[start..end]);
            start = end + 1;
            match line {
                Line::Data(payload) => events.push(payload),
                Line::Done => {
                    self.done = true;
                    break;
                }
                Line::Skip => {}
            }
        }

        if self.done {
            self.residual.clear();
        } else {
            self.residual.drain(..start);
        }
        events
    }

    /// Flush an unterminated last line when the stream ends.
    pub fn finish(&mut self) -> Vec<Vec<u8>> {
        if self.done || self.residual.is_empty() {
            self.residual.clear();
            return Vec::new();
        }
        let line = std::mem::take(&mut self.residual);
        match parse_line(&line) {
            Line::Data(payload) => vec![payload],
            Line::Done => {
                self.done = true;
                Vec::new()
            }
            Line::Skip => Vec::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn residual(&self) -> &[u8] {
        &self.residual
    }
}

enum Line {
    Data(Vec<u8>),
    Done,
    Skip,
}

fn parse_line(line: &[u8]) -> Line {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
        return Line::Skip;
    };
    if rest == DONE_SENTINEL {
        Line::Done
    } else {
        Line::Data(rest.to_vec())
    }
}
