//! Line splitting for subprocess output.
//!
//! Maven, Gradle and Tomcat redraw progress with bare `\r`, so both `\r` and
//! `\n` terminate a line. Blank lines are dropped.

/// Accumulates raw output chunks and yields complete lines.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                self.flush_into(&mut lines);
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    /// Flush a trailing unterminated line once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        let mut lines = Vec::new();
        self.flush_into(&mut lines);
        lines.pop()
    }

    fn flush_into(&mut self, lines: &mut Vec<String>) {
        if self.pending.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.pending).trim_end().to_string();
        self.pending.clear();
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_newline_and_carriage_return() {
        let mut splitter = LineSplitter::new();
        let lines = splitter.push(b"one\r\ntwo\rthree\n");
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn keeps_partial_line_until_terminated() {
        let mut splitter = LineSplitter::new();
        assert!(splitter.push(b"[INFO] Buil").is_empty());
        assert_eq!(splitter.push(b"ding war\n"), vec!["[INFO] Building war"]);
    }

    #[test]
    fn drops_blank_lines() {
        let mut splitter = LineSplitter::new();
        assert_eq!(splitter.push(b"\n\n   \r\nx\n"), vec!["x"]);
    }

    #[test]
    fn finish_returns_unterminated_tail() {
        let mut splitter = LineSplitter::new();
        splitter.push(b"done\ntail");
        assert_eq!(splitter.finish().as_deref(), Some("tail"));
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn preserves_leading_indentation() {
        let mut splitter = LineSplitter::new();
        assert_eq!(
            splitter.push(b"\tat com.acme.Foo.bar(Foo.java:10)\n"),
            vec!["\tat com.acme.Foo.bar(Foo.java:10)"]
        );
    }

    #[test]
    fn invalid_utf8_is_replaced_not_dropped() {
        let mut splitter = LineSplitter::new();
        let lines = splitter.push(b"caf\xe9\n");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("caf"));
    }
}
