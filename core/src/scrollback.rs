//! Fixed-capacity line-oriented scrollback ring.
//!
//! Stores *completed lines* plus one pending partial-line carry, so
//! `read_all` can hand back a scrollback string that lines up one-for-one
//! with what a terminal would have shown.

/// A fixed-capacity ring of completed lines, plus a carry for the
/// not-yet-terminated tail of the most recent write.
///
/// Backed by a structurally bounded `Vec<Option<String>>` (capacity fixed at
/// construction) rather than a `VecDeque`, so the capacity bound is a Vec
/// length invariant, not a post-hoc truncation after every push.
pub struct ScrollbackRing {
    lines: Vec<Option<String>>,
    /// Index where the next line will be written.
    head: usize,
    /// Number of valid lines currently stored (≤ capacity).
    len: usize,
    capacity: usize,
    /// Bytes of the most recent write with no line terminator yet.
    carry: Vec<u8>,
}

impl ScrollbackRing {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ScrollbackRing capacity must be non-zero");
        Self {
            lines: vec![None; capacity],
            head: 0,
            len: 0,
            capacity,
            carry: Vec::new(),
        }
    }

    /// Append raw PTY bytes. Splits on CR, LF, or CRLF boundaries; anything
    /// after the last terminator becomes the new carry. Never allocates more
    /// than the size of the carry plus the incoming chunk.
    pub fn append(&mut self, data: &[u8]) {
        let mut buf = std::mem::take(&mut self.carry);
        buf.extend_from_slice(data);

        let mut start = 0usize;
        let mut i = 0usize;
        while i < buf.len() {
            match buf[i] {
                b'\n' => {
                    self.push_line(&buf[start..i]);
                    i += 1;
                    start = i;
                }
                b'\r' => {
                    self.push_line(&buf[start..i]);
                    i += 1;
                    if i < buf.len() && buf[i] == b'\n' {
                        i += 1;
                    }
                    start = i;
                }
                _ => i += 1,
            }
        }
        self.carry = buf[start..].to_vec();
    }

    fn push_line(&mut self, bytes: &[u8]) {
        let line = String::from_utf8_lossy(bytes).into_owned();
        self.lines[self.head] = Some(line);
        self.head = (self.head + 1) % self.capacity;
        if self.len < self.capacity {
            self.len += 1;
        }
    }

    /// Oldest-to-newest completed lines followed by the carry (lossily
    /// decoded) if non-empty.
    pub fn read_all(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.len + 1);
        let start = if self.len == self.capacity {
            self.head
        } else {
            0
        };
        for offset in 0..self.len {
            let idx = (start + offset) % self.capacity;
            if let Some(line) = &self.lines[idx] {
                out.push(line.clone());
            }
        }
        if !self.carry.is_empty() {
            out.push(String::from_utf8_lossy(&self.carry).into_owned());
        }
        out
    }

    /// Last `k` entries of the sequence `read_all` would return.
    pub fn read_recent(&self, k: usize) -> Vec<String> {
        let all = self.read_all();
        if all.len() <= k {
            all
        } else {
            all[all.len() - k..].to_vec()
        }
    }

    /// All lines joined with LF, matching the attach-reply scrollback shape.
    pub fn joined(&self) -> String {
        self.read_all().join("\n")
    }

    pub fn clear(&mut self) {
        self.lines.iter_mut().for_each(|l| *l = None);
        self.head = 0;
        self.len = 0;
        self.carry.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_keeps_newest_lines() {
        let mut ring = ScrollbackRing::new(3);
        ring.append(b"a\nb\nc\nd\ne\n");
        assert_eq!(ring.read_all(), vec!["c", "d", "e"]);
    }

    #[test]
    fn partial_line_carries_across_writes() {
        let mut ring = ScrollbackRing::new(10);
        ring.append(b"x");
        ring.append(b" y\n");
        assert_eq!(ring.read_all(), vec!["x y"]);
    }

    #[test]
    fn carry_without_terminator_is_visible_in_read_all() {
        let mut ring = ScrollbackRing::new(10);
        ring.append(b"line one\npartial");
        assert_eq!(ring.read_all(), vec!["line one", "partial"]);
    }

    #[test]
    fn capacity_bound_holds_including_carry() {
        let mut ring = ScrollbackRing::new(3);
        ring.append(b"a\nb\nc\nd\ne\nf");
        assert!(ring.read_all().len() <= ring.capacity() + 1);
        assert_eq!(ring.read_all(), vec!["c", "d", "e", "f"]);
    }

    #[test]
    fn crlf_is_a_single_terminator() {
        let mut ring = ScrollbackRing::new(10);
        ring.append(b"hi\r\nthere\r\n");
        assert_eq!(ring.read_all(), vec!["hi", "there"]);
    }

    #[test]
    fn read_recent_returns_suffix() {
        let mut ring = ScrollbackRing::new(10);
        ring.append(b"a\nb\nc\nd\n");
        assert_eq!(ring.read_recent(2), vec!["c", "d"]);
    }

    #[test]
    fn clear_resets_everything() {
        let mut ring = ScrollbackRing::new(3);
        ring.append(b"a\nb\npartial");
        ring.clear();
        assert!(ring.read_all().is_empty());
    }

    #[test]
    fn joined_uses_lf_separator() {
        let mut ring = ScrollbackRing::new(10);
        ring.append(b"one\ntwo\n");
        assert_eq!(ring.joined(), "one\ntwo");
    }

    #[test]
    fn multibyte_utf8_split_across_appends_survives() {
        let mut ring = ScrollbackRing::new(10);
        let bytes = "héllo\n".as_bytes().to_vec();
        ring.append(&bytes[..2]);
        ring.append(&bytes[2..]);
        assert_eq!(ring.read_all(), vec!["héllo"]);
    }
}
