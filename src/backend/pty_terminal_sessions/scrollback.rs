use std::collections::VecDeque;

/// Byte ring holding the tail of a session's output, bounded by line count
/// and by total size. Whole lines are dropped from the head first.
#[derive(Debug, Clone)]
pub struct ScrollbackBuffer {
    data: VecDeque<u8>,
    newline_count: usize,
    max_lines: usize,
    max_bytes: usize,
    dropped_bytes: u64,
}

impl ScrollbackBuffer {
    pub fn new(max_lines: usize, max_bytes: usize) -> Self {
        ScrollbackBuffer {
            data: VecDeque::new(),
            newline_count: 0,
            max_lines: max_lines.max(1),
            max_bytes: max_bytes.max(1),
            dropped_bytes: 0,
        }
    }

    pub fn append(&mut self, chunk: &[u8]) {
        self.data.extend(chunk.iter().copied());
        self.newline_count += chunk.iter().filter(|byte| **byte == b'\n').count();

        while self.newline_count > self.max_lines {
            self.drop_first_line();
        }
        while self.data.len() > self.max_bytes {
            if self.data.pop_front() == Some(b'\n') {
                self.newline_count -= 1;
            }
            self.dropped_bytes += 1;
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        self.data.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes discarded from the head since creation.
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped_bytes
    }

    fn drop_first_line(&mut self) {
        while let Some(byte) = self.data.pop_front() {
            self.dropped_bytes += 1;
            if byte == b'\n' {
                self.newline_count -= 1;
                return;
            }
        }
    }
}
