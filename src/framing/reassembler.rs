//! Byte-stream to message reassembly.
//!
//! CoT has no length prefix. A message is everything from the `<event` start
//! marker through the matching `</event>` end marker (or the end of a
//! self-closing `<event .../>` tag). An XML declaration immediately before the
//! start marker belongs to the message; any other leading bytes are garbage
//! and are discarded when the next message is extracted. Events never nest,
//! so a candidate still open when a later start marker arrives is dropped as
//! truncated.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::{
    BufferOverflow, BUFFER_CRITICAL, BUFFER_HIGH_WATER, EVENT_END_MARKER, EVENT_START_MARKER,
    XML_DECL_MARKER,
};

/// Buffer thresholds for a [`Reassembler`], in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassemblerLimits {
    /// Buffered bytes without a complete message before a warning is logged.
    pub high_water: usize,
    /// Buffered bytes without a complete message before the buffer is cleared.
    pub critical: usize,
}

impl Default for ReassemblerLimits {
    fn default() -> Self {
        Self {
            high_water: BUFFER_HIGH_WATER,
            critical: BUFFER_CRITICAL,
        }
    }
}

/// Location of the next complete message in the buffer.
#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
}

/// Accumulates inbound bytes and yields complete CoT messages.
///
/// Owned by exactly one peer pipeline; never shared.
#[derive(Debug)]
pub struct Reassembler {
    buffer: Vec<u8>,
    limits: ReassemblerLimits,
    /// Offset from which the end-marker search resumes.
    scan_from: usize,
    /// Largest size the buffer reached since the last reset.
    peak: usize,
    /// Whether the high-water warning fired for the current partial message.
    warned: bool,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reassembler {
    /// Create a reassembler with default limits.
    pub fn new() -> Self {
        Self::with_limits(ReassemblerLimits::default())
    }

    /// Create a reassembler with custom limits.
    pub fn with_limits(limits: ReassemblerLimits) -> Self {
        Self {
            buffer: Vec::new(),
            limits,
            scan_from: 0,
            peak: 0,
            warned: false,
        }
    }

    /// Append received bytes.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        self.peak = self.peak.max(self.buffer.len());
    }

    /// Extract the next complete message, if any.
    ///
    /// Call repeatedly after each [`feed`](Self::feed) until it returns
    /// `Ok(None)`: one feed may carry several coalesced messages.
    ///
    /// When no complete message is buffered and the buffer exceeds the
    /// critical limit, the buffer is cleared and `Err(BufferOverflow)` is
    /// returned. Subsequent calls start from an empty buffer.
    pub fn extract_next(&mut self) -> Result<Option<Vec<u8>>, BufferOverflow> {
        if let Some(span) = self.find_message() {
            let message = self.buffer[span.start..span.end].to_vec();
            if span.start > 0 {
                debug!(discarded = span.start, "discarding bytes before start marker");
            }
            self.buffer.drain(..span.end);
            self.scan_from = 0;
            self.warned = false;
            return Ok(Some(message));
        }

        let len = self.buffer.len();
        if len > self.limits.critical {
            warn!(
                buffered = len,
                limit = self.limits.critical,
                "receive buffer exceeded critical size, clearing"
            );
            self.clear();
            return Err(BufferOverflow {
                discarded: len,
                limit: self.limits.critical,
            });
        }
        if len > self.limits.high_water && !self.warned {
            warn!(
                buffered = len,
                high_water = self.limits.high_water,
                "receive buffer above high-water mark without a complete message"
            );
            self.warned = true;
        }
        Ok(None)
    }

    /// Discard all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scan_from = 0;
        self.warned = false;
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Largest buffered size observed since creation.
    pub fn peak(&self) -> usize {
        self.peak
    }

    /// Configured limits.
    pub fn limits(&self) -> ReassemblerLimits {
        self.limits
    }

    fn find_message(&mut self) -> Option<Span> {
        loop {
            let start = find_start_marker(&self.buffer, 0)?;
            let next = find_start_marker(&self.buffer, start + EVENT_START_MARKER.len());
            let limit = next.unwrap_or(self.buffer.len());
            if let Some(end) = self.find_end(start, limit) {
                return Some(Span {
                    start: declaration_start(&self.buffer, start),
                    end,
                });
            }

            // Events never nest: a later start marker means this one was cut short.
            let next = next?;
            let cut = declaration_start(&self.buffer, next);
            debug!(discarded = cut, "discarding truncated message");
            self.buffer.drain(..cut);
            self.scan_from = 0;
        }
    }

    /// End offset of the message starting at `start`, searching before `limit`.
    fn find_end(&mut self, start: usize, limit: usize) -> Option<usize> {
        let tag_end = find_tag_end(&self.buffer[..limit], start + EVENT_START_MARKER.len())?;
        if self.buffer[tag_end - 1] == b'/' {
            return Some(tag_end + 1);
        }

        let from = self.scan_from.max(tag_end + 1).min(limit);
        match find(&self.buffer[from..limit], EVENT_END_MARKER) {
            Some(pos) => Some(from + pos + EVENT_END_MARKER.len()),
            None => {
                // Resume where a split end marker could still begin.
                self.scan_from = limit
                    .saturating_sub(EVENT_END_MARKER.len() - 1)
                    .max(tag_end + 1);
                None
            }
        }
    }
}

/// Locate `<event` at or after `from`, followed by a character that may end
/// the element name.
fn find_start_marker(buf: &[u8], from: usize) -> Option<usize> {
    let mut offset = from;
    while let Some(pos) = find(buf.get(offset..)?, EVENT_START_MARKER) {
        let at = offset + pos;
        match buf.get(at + EVENT_START_MARKER.len()) {
            Some(b' ' | b'\t' | b'\r' | b'\n' | b'>' | b'/') => return Some(at),
            // Need more bytes to decide.
            None => return None,
            Some(_) => offset = at + 1,
        }
    }
    None
}

/// Find the `>` closing a start tag, skipping quoted attribute values.
fn find_tag_end(buf: &[u8], from: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, &b) in buf.iter().enumerate().skip(from) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Some(i),
            None => {}
        }
    }
    None
}

/// Extend a message start back over an adjacent XML declaration.
fn declaration_start(buf: &[u8], event_start: usize) -> usize {
    let head = &buf[..event_start];
    let Some(decl) = rfind(head, XML_DECL_MARKER) else {
        return event_start;
    };
    let Some(close) = find(&head[decl..], b"?>") else {
        return event_start;
    };
    let after = decl + close + 2;
    if head[after..].iter().all(u8::is_ascii_whitespace) {
        decl
    } else {
        event_start
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MSG: &[u8] = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><event version="2.0" uid="U-1" type="a-f-G-U-C" time="2024-01-01T00:00:00.000Z" start="2024-01-01T00:00:00.000Z" stale="2024-01-01T00:02:00.000Z" how="m-g"><point lat="38.8977" lon="-77.0365" hae="50" ce="10" le="5"/><detail><remarks>a &gt; b</remarks></detail></event>"#;

    fn drain(r: &mut Reassembler) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(m) = r.extract_next().unwrap() {
            out.push(m);
        }
        out
    }

    #[test]
    fn test_single_message() {
        let mut r = Reassembler::new();
        r.feed(MSG);
        assert_eq!(drain(&mut r), vec![MSG.to_vec()]);
        assert!(r.is_empty());
    }

    #[test]
    fn test_coalesced_messages() {
        let mut r = Reassembler::new();
        let mut data = Vec::new();
        for _ in 0..5 {
            data.extend_from_slice(MSG);
            data.push(b'\n');
        }
        r.feed(&data);

        let out = drain(&mut r);
        assert_eq!(out.len(), 5);
        assert!(out.iter().all(|m| m == MSG));
        // Trailing newline stays until the next message or reset.
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn test_leading_garbage_discarded() {
        let mut r = Reassembler::new();
        r.feed(b"garbage\x00\xff<eventually>");
        r.feed(b"<event uid=\"x\"></event>");
        assert_eq!(drain(&mut r), vec![b"<event uid=\"x\"></event>".to_vec()]);
        assert!(r.is_empty());
    }

    #[test]
    fn test_self_closing_event() {
        let mut r = Reassembler::new();
        r.feed(b"<event uid=\"a\" note=\"x>y\"/><event uid=\"b\"></event>");
        let out = drain(&mut r);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], b"<event uid=\"a\" note=\"x>y\"/>".to_vec());
    }

    #[test]
    fn test_partial_waits_for_more() {
        let mut r = Reassembler::new();
        r.feed(&MSG[..MSG.len() - 3]);
        assert_eq!(r.extract_next().unwrap(), None);
        r.feed(&MSG[MSG.len() - 3..]);
        assert_eq!(r.extract_next().unwrap(), Some(MSG.to_vec()));
    }

    #[test]
    fn test_overflow_resets_buffer() {
        let limits = ReassemblerLimits {
            high_water: 64,
            critical: 256,
        };
        let mut r = Reassembler::with_limits(limits);
        r.feed(b"<event uid=\"never-closed\">");

        let mut overflow = None;
        for _ in 0..100 {
            r.feed(&[b'x'; 16]);
            match r.extract_next() {
                Ok(None) => {}
                Ok(Some(_)) => panic!("no message should complete"),
                Err(e) => {
                    overflow = Some(e);
                    break;
                }
            }
        }

        let overflow = overflow.expect("critical threshold must trip");
        assert_eq!(overflow.limit, 256);
        assert!(overflow.discarded > 256);
        assert!(r.is_empty());

        // Usable again after reset.
        r.feed(MSG);
        assert_eq!(r.extract_next().unwrap(), Some(MSG.to_vec()));
    }

    #[test]
    fn test_large_complete_message_not_discarded() {
        let limits = ReassemblerLimits {
            high_water: 16,
            critical: 32,
        };
        let mut r = Reassembler::with_limits(limits);
        r.feed(MSG);
        assert_eq!(r.extract_next().unwrap(), Some(MSG.to_vec()));
    }

    #[test]
    fn test_truncated_start_tag_does_not_stall() {
        let mut r = Reassembler::new();
        r.feed(br#"<event uid="trunc" type="a-f-G" time="2024"#);
        for _ in 0..50 {
            r.feed(MSG);
        }

        let out = drain(&mut r);
        assert_eq!(out.len(), 50);
        assert!(out.iter().all(|m| m == MSG));
        assert!(r.is_empty());
    }

    #[test]
    fn test_truncated_body_dropped_at_next_event() {
        let mut r = Reassembler::new();
        r.feed(b"<event uid=\"cut\"><point lat=\"1\"/><detail><remarks>half");
        assert_eq!(r.extract_next().unwrap(), None);

        // The following message arrives in a separate read.
        r.feed(MSG);
        assert_eq!(drain(&mut r), vec![MSG.to_vec()]);
        assert!(r.is_empty());
    }

    #[test]
    fn test_truncated_fragment_split_across_feeds() {
        let mut data = br#"<event uid="t" how="m-g"#.to_vec();
        data.extend_from_slice(MSG);
        data.extend_from_slice(MSG);

        for split in 0..=data.len() {
            let mut r = Reassembler::new();
            r.feed(&data[..split]);
            let mut out = drain(&mut r);
            r.feed(&data[split..]);
            out.extend(drain(&mut r));
            assert_eq!(out, vec![MSG.to_vec(), MSG.to_vec()], "split at {}", split);
        }
    }

    #[test]
    fn test_every_split_point() {
        for split in 0..=MSG.len() {
            let mut r = Reassembler::new();
            r.feed(&MSG[..split]);
            let mut out = drain(&mut r);
            r.feed(&MSG[split..]);
            out.extend(drain(&mut r));
            assert_eq!(out, vec![MSG.to_vec()], "split at {}", split);
        }
    }

    proptest! {
        #[test]
        fn prop_fragmented_feed_yields_original(cuts in proptest::collection::vec(0..MSG.len(), 0..12)) {
            let mut cuts = cuts;
            cuts.sort_unstable();
            cuts.dedup();

            let mut r = Reassembler::new();
            let mut out = Vec::new();
            let mut prev = 0;
            for cut in cuts.into_iter().chain(std::iter::once(MSG.len())) {
                r.feed(&MSG[prev..cut]);
                out.extend(drain(&mut r));
                prev = cut;
            }
            prop_assert_eq!(out, vec![MSG.to_vec()]);
        }

        #[test]
        fn prop_coalesced_count(n in 1usize..20) {
            let mut r = Reassembler::new();
            r.feed(&MSG.repeat(n));
            let out = drain(&mut r);
            prop_assert_eq!(out.len(), n);
        }
    }
}
