//! Reassembles newline-terminated lines from raw process output chunks.

use tracing::warn;

/// Longest line kept. A child that never prints a newline must not grow the
/// buffer forever.
pub const MAX_PENDING_LINE: usize = 64 * 1024;

/// Line framer for one output stream.
///
/// Bytes are buffered until a `\n` arrives, so a line (or a multi-byte UTF-8
/// character, or a `\r\n` pair) split across chunks is emitted whole. `\r\n`
/// is treated as `\n`. Lines that are blank after trimming are dropped, and
/// so are lines longer than [`MAX_PENDING_LINE`], however they were chunked.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: Vec<u8>,
    /// Skipping the rest of an oversized line up to its newline
    discarding: bool,
}

impl LineFramer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every line it completes, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let chunk = if self.discarding {
            let Some(newline) = chunk.iter().position(|&b| b == b'\n') else {
                return Vec::new();
            };
            self.discarding = false;
            &chunk[newline + 1..]
        } else {
            chunk
        };
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            self.check_pending_len();
            return Vec::new();
        };

        let tail = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, tail);
        self.check_pending_len();

        complete
            .split(|&b| b == b'\n')
            .filter(|raw| {
                if raw.len() > MAX_PENDING_LINE {
                    warn!("Dropped server output line of {} bytes", raw.len());
                    return false;
                }
                true
            })
            .filter_map(decode_line)
            .collect()
    }

    fn check_pending_len(&mut self) {
        if self.pending.len() > MAX_PENDING_LINE {
            warn!("Dropping server output line longer than {MAX_PENDING_LINE} bytes");
            self.pending.clear();
            self.discarding = true;
        }
    }

    /// Emit whatever incomplete line is buffered (end of stream).
    pub fn flush(&mut self) -> Option<String> {
        self.discarding = false;
        let pending = std::mem::take(&mut self.pending);
        decode_line(&pending)
    }

    /// Bytes of the buffered incomplete line.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = String::from_utf8_lossy(raw);
    if line.trim().is_empty() {
        None
    } else {
        Some(line.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_complete_lines_emitted_in_order() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"first\nsecond\n");
        assert_eq!(lines, vec!["first", "second"]);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_chunk_without_newline_is_buffered() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"INFO|000.1|Server st").is_empty());
        assert_eq!(framer.pending(), b"INFO|000.1|Server st");

        let lines = framer.push(b"atus: ok|in x(1)\n");
        assert_eq!(lines, vec!["INFO|000.1|Server status: ok|in x(1)"]);
    }

    #[test]
    fn test_trailing_partial_line_retained() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"done\npart");
        assert_eq!(lines, vec!["done"]);
        assert_eq!(framer.pending(), b"part");
        assert_eq!(framer.push(b"ial\n"), vec!["partial"]);
    }

    #[test]
    fn test_crlf_normalized_even_when_split() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"windows line\r").is_empty());
        assert_eq!(framer.push(b"\nnext\r\n"), vec!["windows line", "next"]);
    }

    #[test]
    fn test_blank_lines_dropped() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"\n   \n\t\nreal\n\r\n");
        assert_eq!(lines, vec!["real"]);
    }

    #[test]
    fn test_split_utf8_character_survives() {
        let mut framer = LineFramer::new();
        let text = "température\n".as_bytes();
        let split = text.iter().position(|&b| b == 0xC3).unwrap() + 1;
        assert!(framer.push(&text[..split]).is_empty());
        assert_eq!(framer.push(&text[split..]), vec!["température"]);
    }

    #[test]
    fn test_flush_returns_pending_line() {
        let mut framer = LineFramer::new();
        framer.push(b"crash report");
        assert_eq!(framer.flush(), Some("crash report".to_string()));
        assert_eq!(framer.flush(), None);
    }

    #[test]
    fn test_oversized_line_dropped_until_newline() {
        let mut framer = LineFramer::new();
        let blob = vec![b'x'; MAX_PENDING_LINE + 1];
        assert!(framer.push(&blob).is_empty());
        assert!(framer.pending().is_empty());

        assert!(framer.push(b"still the same line").is_empty());
        assert_eq!(framer.push(b" end\nnext\n"), vec!["next"]);
    }

    #[test]
    fn test_oversized_line_dropped_regardless_of_chunking() {
        let mut text = vec![b'x'; MAX_PENDING_LINE + 10];
        text.extend_from_slice(b"\nshort\n");

        let mut whole = LineFramer::new();
        assert_eq!(whole.push(&text), vec!["short"]);

        let mut pieces = LineFramer::new();
        let mut emitted = Vec::new();
        for chunk in text.chunks(4096) {
            emitted.extend(pieces.push(chunk));
        }
        assert_eq!(emitted, vec!["short"]);
        assert!(pieces.pending().is_empty());
    }

    #[test]
    fn test_line_at_limit_is_kept() {
        let mut text = vec![b'y'; MAX_PENDING_LINE];
        text.push(b'\n');

        let mut framer = LineFramer::new();
        let mut emitted = Vec::new();
        for chunk in text.chunks(1000) {
            emitted.extend(framer.push(chunk));
        }
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].len(), MAX_PENDING_LINE);
    }

    fn trimmed_lines(text: &str) -> Vec<String> {
        text.replace("\r\n", "\n")
            .split('\n')
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.trim().to_string())
            .collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn chunk_boundaries_do_not_change_lines(
            lines in proptest::collection::vec("[a-zA-Z0-9|:() \\r]{0,40}", 0..12),
            cuts in proptest::collection::vec(0usize..400, 0..8),
        ) {
            let mut text = lines.join("\n");
            text.push('\n');
            let bytes = text.as_bytes();

            let mut cuts: Vec<usize> = cuts.into_iter().map(|c| c.min(bytes.len())).collect();
            cuts.sort_unstable();

            let mut framer = LineFramer::new();
            let mut emitted = Vec::new();
            let mut start = 0;
            for cut in cuts.into_iter().chain(std::iter::once(bytes.len())) {
                emitted.extend(framer.push(&bytes[start..cut]));
                start = cut;
            }

            let emitted: Vec<String> = emitted.iter().map(|l| l.trim().to_string()).collect();
            prop_assert_eq!(emitted, trimmed_lines(&text));
            prop_assert!(framer.pending().is_empty());
        }
    }
}
