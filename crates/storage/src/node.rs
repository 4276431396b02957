use crate::PipeHandle;
use crate::path::extension;
use std::fmt::{Debug, Formatter, Result as FmtResult};

/// Declarative descriptor of one resource: where its bytes live and how to
/// pick a scanner or loader for it.
///
/// Nodes are plain values. Cloning one shares the pipe.
#[derive(Clone)]
pub struct Node {
    pub pipe: PipeHandle,
    /// Canonical path, relative to the owning source's root.
    pub path: String,
    /// MIME type, or empty when unknown.
    pub mime: String,
    /// Free-form classification, not used for dispatch.
    pub tag: String,
    /// Whether content sniffing may be used to find a scanner or loader.
    pub inspect: bool,
}

impl Node {
    pub fn new(pipe: PipeHandle, path: impl Into<String>) -> Self {
        Self { pipe, path: path.into(), mime: String::new(), tag: String::new(), inspect: true }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    #[must_use]
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = mime.into();
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    #[must_use]
    pub fn with_inspect(mut self, inspect: bool) -> Self {
        self.inspect = inspect;
        self
    }

    /// Lowercased extension of the node's path, or empty.
    pub fn extension(&self) -> String {
        extension(&self.path)
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Node")
            .field("path", &self.path)
            .field("origin", &self.pipe.origin())
            .field("mime", &self.mime)
            .field("tag", &self.tag)
            .field("inspect", &self.inspect)
            .finish()
    }
}
