use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use tracing::trace;

/// Presents several files as one continuous byte source.
///
/// Files are opened lazily in the order given, so a record may span a file boundary.
#[derive(Debug)]
pub struct MultiReader {
    paths: VecDeque<PathBuf>,
    current: Option<BufReader<File>>,
}

impl MultiReader {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        MultiReader {
            paths: paths.into_iter().map(|p| p.as_ref().to_path_buf()).collect(),
            current: None,
        }
    }
}

impl Read for MultiReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.current.is_none() {
                let Some(path) = self.paths.pop_front() else {
                    return Ok(0);
                };
                trace!(?path, "opening");
                self.current = Some(BufReader::new(File::open(&path)?));
            }
            if let Some(reader) = self.current.as_mut() {
                let n = reader.read(buf)?;
                if n > 0 {
                    return Ok(n);
                }
            }
            self.current = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn concatenates_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for (name, content) in [("a", &b"abc"[..]), ("b", b""), ("c", b"de")] {
            let path = dir.path().join(name);
            fs::write(&path, content).unwrap();
            paths.push(path);
        }

        let mut reader = MultiReader::new(&paths);
        let mut dat = Vec::new();
        reader.read_to_end(&mut dat).unwrap();
        assert_eq!(dat, b"abcde");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut reader = MultiReader::new([dir.path().join("nope.dat")]);
        let mut dat = Vec::new();
        assert!(reader.read_to_end(&mut dat).is_err());
    }
}
