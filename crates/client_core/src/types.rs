use std::{fmt, path::Path};

use serde_json::Value;

pub const DEFAULT_ARCHIVE_NAME: &str = "compressed_images.zip";

/// Compressed output of one finished compression task.
#[derive(Clone, PartialEq, Eq)]
pub struct Archive {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Archive {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Last path component of the server-suggested name, so a hostile
    /// `../` name cannot escape the download directory.
    pub fn safe_filename(&self) -> &str {
        Path::new(&self.filename)
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_ARCHIVE_NAME)
    }
}

impl fmt::Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("filename", &self.filename)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Successful result of a polling sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskPayload {
    Archive(Archive),
    Result(Value),
}
