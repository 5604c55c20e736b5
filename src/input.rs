use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};

/// Reads a whole input from a file, or from stdin when the path is "-".
pub struct InputReader {
    reader: Box<dyn Read>,
    is_pipe: bool,
}

impl InputReader {
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let path = input_path.as_ref();
        let is_pipe = path.as_os_str() == "-";

        let reader: Box<dyn Read> = if is_pipe {
            Box::new(io::stdin().lock())
        } else {
            let file = File::open(path)
                .with_context(|| format!("Cannot open {}", path.display()))?;
            Box::new(BufReader::new(file))
        };

        Ok(Self { reader, is_pipe })
    }

    pub fn is_pipe(&self) -> bool {
        self.is_pipe
    }

    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.reader.read_to_end(&mut data)?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"RIFF1234").unwrap();

        let mut reader = InputReader::new(file.path()).unwrap();
        assert!(!reader.is_pipe());
        assert_eq!(reader.read_all().unwrap(), b"RIFF1234");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = InputReader::new(dir.path().join("nope.wav")).err().unwrap();
        assert!(err.to_string().contains("nope.wav"));
    }
}
