//! Delimiter buffer: retained, unconsumed received bytes and the matching
//! machinery behind `receive_buf`.
//!
//! The buffer is a pure state machine — bytes go in with [`RecvBuffer::push`],
//! records come out with [`RecvBuffer::take_match`] — so framing behavior is
//! testable without any transport underneath. The socket clears it on every
//! I/O call other than `receive_buf`, per the buffered-read contract.

use crate::error::{Failure, Status};

use regex::bytes::Regex;

/// Half-open `[start, end)` span of a delimiter match within the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

enum Matcher {
    Pattern {
        source: String,
        compiled: Option<Regex>,
    },
    Func(Box<dyn FnMut(&[u8]) -> Result<Option<Span>, String>>),
}

/// What terminates a buffered read: a byte-pattern (regex over the raw
/// bytes) or a caller-supplied predicate reporting a match span.
pub struct Delimiter {
    matcher: Matcher,
}

impl Delimiter {
    /// A bytes-regex delimiter, e.g. `"\r?\n"`. Invalid patterns surface
    /// as a pattern-evaluation failure on first use.
    pub fn pattern(source: impl Into<String>) -> Self {
        Self {
            matcher: Matcher::Pattern {
                source: source.into(),
                compiled: None,
            },
        }
    }

    /// A predicate delimiter: given the accumulated buffer, report the
    /// `[start, end)` span of the delimiter or `None` when more bytes are
    /// needed. A textual error return fails the read.
    pub fn func<F>(f: F) -> Self
    where
        F: FnMut(&[u8]) -> Result<Option<Span>, String> + 'static,
    {
        Self {
            matcher: Matcher::Func(Box::new(f)),
        }
    }

    fn find(&mut self, data: &[u8]) -> Status<Option<Span>> {
        match &mut self.matcher {
            Matcher::Pattern { source, compiled } => {
                if compiled.is_none() {
                    let regex =
                        Regex::new(source).map_err(|e| Failure::Pattern(e.to_string()))?;
                    *compiled = Some(regex);
                }
                let regex = compiled.as_ref().expect("compiled above");
                Ok(regex.find(data).map(|m| Span {
                    start: m.start(),
                    end: m.end(),
                }))
            }
            Matcher::Func(f) => {
                let span = f(data).map_err(Failure::DelimiterFn)?;
                if let Some(span) = span {
                    if span.end < span.start {
                        return Err(Failure::InvertedSpan);
                    }
                    if span.end > data.len() {
                        return Err(Failure::DelimiterFn(String::from(
                            "match span extends past the buffer",
                        )));
                    }
                }
                Ok(span)
            }
        }
    }
}

/// Received-but-unconsumed bytes, retained across buffered-read calls.
#[derive(Default)]
pub(crate) struct RecvBuffer {
    data: Vec<u8>,
}

impl RecvBuffer {
    pub(crate) fn clear(&mut self) {
        self.data.clear();
    }

    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Cuts one record off the front of the buffer if the delimiter
    /// matches.
    ///
    /// With `keep_delimiter` the record runs through the end of the match;
    /// without, it stops at the match start. Either way the bytes after
    /// the match stay buffered for the next call.
    pub(crate) fn take_match(
        &mut self,
        delimiter: &mut Delimiter,
        keep_delimiter: bool,
    ) -> Status<Option<Vec<u8>>> {
        let span = match delimiter.find(&self.data)? {
            Some(span) => span,
            None => return Ok(None),
        };

        let cut = if keep_delimiter { span.end } else { span.start };

        let remainder = self.data.split_off(span.end);
        self.data.truncate(cut);
        let record = std::mem::replace(&mut self.data, remainder);

        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_come_out_in_order_without_loss() {
        let mut buffer = RecvBuffer::default();
        buffer.push(b"alpha\nbeta\ngamma\ntrail");

        let mut newline = Delimiter::pattern("\n");
        let mut records = Vec::new();
        while let Some(record) = buffer.take_match(&mut newline, false).unwrap() {
            records.push(record);
        }

        assert_eq!(records, vec![b"alpha".to_vec(), b"beta".to_vec(), b"gamma".to_vec()]);
        // The unmatched tail stays for the next call.
        buffer.push(b"er\n");
        let last = buffer.take_match(&mut newline, false).unwrap().unwrap();
        assert_eq!(last, b"trailer");
    }

    #[test]
    fn keep_delimiter_includes_the_match() {
        let mut buffer = RecvBuffer::default();
        buffer.push(b"status: ok\r\nrest");

        let mut crlf = Delimiter::pattern("\r\n");
        let record = buffer.take_match(&mut crlf, true).unwrap().unwrap();
        assert_eq!(record, b"status: ok\r\n");

        assert!(buffer.take_match(&mut crlf, true).unwrap().is_none());
        assert_eq!(buffer.data, b"rest");
    }

    #[test]
    fn predicate_delimiters_report_spans() {
        let mut buffer = RecvBuffer::default();
        buffer.push(b"aaaXXbbb");

        let mut delim = Delimiter::func(|data| {
            Ok(data
                .windows(2)
                .position(|w| w == b"XX")
                .map(|start| Span {
                    start,
                    end: start + 2,
                }))
        });

        let record = buffer.take_match(&mut delim, false).unwrap().unwrap();
        assert_eq!(record, b"aaa");
        assert_eq!(buffer.data, b"bbb");
    }

    #[test]
    fn inverted_span_is_rejected() {
        let mut buffer = RecvBuffer::default();
        buffer.push(b"data");

        let mut delim = Delimiter::func(|_| Ok(Some(Span { start: 3, end: 1 })));
        assert_eq!(
            buffer.take_match(&mut delim, false),
            Err(Failure::InvertedSpan)
        );
    }

    #[test]
    fn predicate_errors_fail_the_read() {
        let mut buffer = RecvBuffer::default();
        buffer.push(b"data");

        let mut delim = Delimiter::func(|_| Err(String::from("boom")));
        assert_eq!(
            buffer.take_match(&mut delim, false),
            Err(Failure::DelimiterFn(String::from("boom")))
        );
    }

    #[test]
    fn bad_patterns_fail_the_read() {
        let mut buffer = RecvBuffer::default();
        buffer.push(b"data");

        let mut delim = Delimiter::pattern("(unclosed");
        assert!(matches!(
            buffer.take_match(&mut delim, false),
            Err(Failure::Pattern(_))
        ));
    }
}
