use crate::dispatch::{DispatchTable, Keyed};
use crate::priority::Prioritized;
use quarry_storage::error::Result;
use quarry_storage::{Node, PipeHandle, PreloadedPipe};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use tracing::instrument;

/// Bytes buffered from the head of a node while its scanners are tried.
pub const PRELOAD_BYTES: usize = 1024;

/// A scanner decomposes the content of a pipe into child nodes, reporting
/// each through the callback. It returns `false` if it doesn't recognise the
/// content.
pub type ScanFn = dyn Fn(&PipeHandle, &mut dyn FnMut(Node)) -> Result<bool> + Send + Sync;

pub struct ScannerRecord {
    name: String,
    scanner: Box<ScanFn>,
    mime_types: Vec<String>,
    extensions: Vec<String>,
    inspect: bool,
    priority: i32,
}

impl ScannerRecord {
    pub fn new(
        name: impl Into<String>,
        scanner: impl Fn(&PipeHandle, &mut dyn FnMut(Node)) -> Result<bool> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            scanner: Box::new(scanner),
            mime_types: Vec::new(),
            extensions: Vec::new(),
            inspect: false,
            priority: 0,
        }
    }

    #[must_use]
    pub fn mime_types<S: AsRef<str>>(mut self, mime_types: impl IntoIterator<Item = S>) -> Self {
        self.mime_types = mime_types.into_iter().map(|m| m.as_ref().to_lowercase()).collect();
        self
    }

    #[must_use]
    pub fn extensions<S: AsRef<str>>(mut self, extensions: impl IntoIterator<Item = S>) -> Self {
        self.extensions = extensions.into_iter().map(|e| e.as_ref().to_lowercase()).collect();
        self
    }

    #[must_use]
    pub fn inspect(mut self, inspect: bool) -> Self {
        self.inspect = inspect;
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl Prioritized for ScannerRecord {
    fn priority(&self) -> i32 {
        self.priority
    }
}

impl Keyed for ScannerRecord {
    fn name(&self) -> &str {
        &self.name
    }

    fn mime_types(&self) -> &[String] {
        &self.mime_types
    }

    fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn inspect(&self) -> bool {
        self.inspect
    }
}

impl Debug for ScannerRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ScannerRecord")
            .field("name", &self.name)
            .field("mime_types", &self.mime_types)
            .field("extensions", &self.extensions)
            .field("inspect", &self.inspect)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct ScannerRegistry {
    table: DispatchTable<ScannerRecord>,
}

impl ScannerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, record: ScannerRecord) -> &mut Self {
        tracing::trace!(name = %record.name, priority = record.priority, "registering scanner");
        self.table.insert(record);
        self
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Offer `node` to the registered scanners; returns `true` once one of
    /// them accepts it. Children are passed to `callback` with paths relative
    /// to `node`.
    ///
    /// A MIME type or extension claimed by registered scanners that all
    /// decline is a [`NotFound`](quarry_storage::error::ErrorKind::NotFound)
    /// error rather than a fallthrough.
    #[instrument(level = "trace", skip_all, fields(path = %node.path))]
    pub fn scan(&self, node: &Node, callback: &mut dyn FnMut(Node)) -> Result<bool> {
        let pipe: PipeHandle = Arc::new(PreloadedPipe::new(node.pipe.clone(), PRELOAD_BYTES));
        let accepted = self.table.select(node, |record, step| {
            let accepted = (record.scanner)(&pipe, &mut *callback)?;
            if accepted {
                tracing::trace!(scanner = %record.name, ?step, "scanner accepted node");
            }
            Ok(accepted.then_some(()))
        })?;
        Ok(accepted.is_some())
    }
}
