//! Storage models.

use bytes::Bytes;
use std::collections::HashMap;

/// An object as held by a storage backend: payload plus the metadata written
/// alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    pub data: Bytes,
    /// Size the backend reports for the object. Compared against the number
    /// of bytes actually read to detect truncation.
    pub size: u64,
    pub content_type: Option<String>,
    /// User metadata (the integrity tag lives here).
    pub metadata: HashMap<String, String>,
}
impl Object {
    /// Create a new object whose declared size matches its payload.
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            size: data.len() as u64,
            data,
            content_type: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
