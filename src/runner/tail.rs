//! Incremental reader over a growing output file.

use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::MonitorError;

/// Read cursor over a file that another process is still appending to.
///
/// The handle stays open for the lifetime of the tail; every read returns
/// only the text appended since the previous read. Incomplete UTF-8
/// sequences at the end of a read are carried over to the next one.
#[derive(Debug)]
pub struct OutputTail {
    file: File,
    carry: Vec<u8>,
    bytes_read: u64,
}

impl OutputTail {
    /// Opens the file; a missing file is a precondition failure.
    pub async fn open(path: &Path) -> Result<Self, MonitorError> {
        let file = File::open(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MonitorError::OutputMissing {
                    path: path.to_path_buf(),
                }
            } else {
                MonitorError::Io(e)
            }
        })?;

        Ok(Self {
            file,
            carry: Vec::new(),
            bytes_read: 0,
        })
    }

    /// Reads everything appended since the last call.
    pub async fn read_new(&mut self) -> std::io::Result<String> {
        let mut buf = Vec::new();
        let n = self.file.read_to_end(&mut buf).await?;
        self.bytes_read += n as u64;
        if n == 0 && self.carry.is_empty() {
            return Ok(String::new());
        }

        self.carry.extend_from_slice(&buf);
        Ok(decode_available(&mut self.carry))
    }

    /// Returns whatever undecodable bytes are still pending, lossily.
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.carry);
        String::from_utf8_lossy(&rest).into_owned()
    }

    /// Total bytes read from the file so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

/// Decodes the longest valid prefix, keeping a truncated trailing sequence.
fn decode_available(pending: &mut Vec<u8>) -> String {
    match std::str::from_utf8(pending) {
        Ok(text) => {
            let text = text.to_string();
            pending.clear();
            text
        }
        Err(e) if e.error_len().is_none() => {
            let rest = pending.split_off(e.valid_up_to());
            let text = String::from_utf8_lossy(pending).into_owned();
            *pending = rest;
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_decode_keeps_truncated_sequence() {
        // "é" is 0xC3 0xA9
        let mut pending = vec![b'a', 0xC3];
        assert_eq!(decode_available(&mut pending), "a");
        assert_eq!(pending, vec![0xC3]);

        pending.push(0xA9);
        assert_eq!(decode_available(&mut pending), "é");
        assert!(pending.is_empty());
    }

    #[test]
    fn test_decode_replaces_invalid_bytes() {
        let mut pending = vec![b'a', 0xFF, b'b'];
        assert_eq!(decode_available(&mut pending), "a\u{FFFD}b");
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_read_new_returns_only_appended_text() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("run.out");
        let mut writer = std::fs::File::create(&path).unwrap();

        let mut tail = OutputTail::open(&path).await.unwrap();
        assert_eq!(tail.read_new().await.unwrap(), "");

        write!(writer, "first\n").unwrap();
        writer.flush().unwrap();
        assert_eq!(tail.read_new().await.unwrap(), "first\n");

        write!(writer, "second\n").unwrap();
        writer.flush().unwrap();
        assert_eq!(tail.read_new().await.unwrap(), "second\n");
        assert_eq!(tail.bytes_read(), 13);
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = OutputTail::open(&dir.path().join("absent.out"))
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::OutputMissing { .. }));
    }
}
