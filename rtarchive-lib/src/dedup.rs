use std::io::Write;

use xxhash_rust::xxh3::xxh3_64;

/// A writer that drops a chunk identical to the one written immediately before it.
///
/// Redundant downlinks deliver the same packet twice in a row; only adjacent repeats are
/// caught, nothing older than the previous chunk is remembered.
#[derive(Debug)]
pub struct NoDuplicate<W: Write> {
    inner: W,
    last: Option<u64>,
    dropped: usize,
}

impl<W: Write> NoDuplicate<W> {
    pub fn new(inner: W) -> Self {
        NoDuplicate {
            inner,
            last: None,
            dropped: 0,
        }
    }

    /// Number of chunks suppressed so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for NoDuplicate<W> {
    /// Writes all of `buf` or nothing at all; a suppressed chunk still reports its full length.
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let hash = xxh3_64(buf);
        if self.last == Some(hash) {
            self.dropped += 1;
            return Ok(buf.len());
        }
        self.inner.write_all(buf)?;
        self.last = Some(hash);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[derive(Default)]
    struct Counting {
        writes: usize,
        data: Vec<u8>,
    }

    impl Write for Counting {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.writes += 1;
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test_case(&["A", "A"], 1, "A"; "repeat")]
    #[test_case(&["A", "B", "A"], 3, "ABA"; "not adjacent")]
    #[test_case(&["A", "A", "B", "B", "A"], 3, "ABA"; "runs")]
    fn writes(chunks: &[&str], expected: usize, expected_data: &str) {
        let mut w = NoDuplicate::new(Counting::default());
        for chunk in chunks {
            assert_eq!(w.write(chunk.as_bytes()).unwrap(), chunk.len());
        }
        assert_eq!(w.dropped(), chunks.len() - expected);
        let inner = w.into_inner();
        assert_eq!(inner.writes, expected);
        assert_eq!(inner.data, expected_data.as_bytes());
    }
}
