use std::collections::VecDeque;

/// Bounded service log; the oldest bytes go first.
#[derive(Debug)]
pub(crate) struct LogTail {
    bytes: VecDeque<u8>,
    max_bytes: usize,
}

impl LogTail {
    pub(crate) fn new(max_bytes: usize) -> Self {
        LogTail {
            bytes: VecDeque::new(),
            max_bytes: max_bytes.max(1),
        }
    }

    pub(crate) fn append(&mut self, chunk: &[u8]) {
        let chunk = if chunk.len() > self.max_bytes {
            &chunk[chunk.len() - self.max_bytes..]
        } else {
            chunk
        };
        let overflow = (self.bytes.len() + chunk.len()).saturating_sub(self.max_bytes);
        self.bytes.drain(..overflow);
        self.bytes.extend(chunk);
    }

    pub(crate) fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Text view of the tail. A UTF-8 sequence cut by truncation is skipped.
    pub(crate) fn text(&self) -> String {
        let skip = self
            .bytes
            .iter()
            .take_while(|byte| (**byte & 0xC0) == 0x80)
            .count();
        let bytes = self.bytes.iter().skip(skip).copied().collect::<Vec<_>>();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_from_the_head() {
        let mut tail = LogTail::new(8);
        tail.append(b"hello ");
        tail.append(b"world");
        assert_eq!(tail.text(), "lo world");
        assert_eq!(tail.len(), 8);
    }

    #[test]
    fn oversized_chunk_keeps_its_end() {
        let mut tail = LogTail::new(4);
        tail.append(b"abcdefgh");
        assert_eq!(tail.text(), "efgh");
    }

    #[test]
    fn skips_a_cut_multibyte_character() {
        let mut tail = LogTail::new(3);
        tail.append("aé!".as_bytes());
        tail.append(b"x");
        assert_eq!(tail.text(), "!x");
    }
}
