use crate::dispatch::{DispatchTable, Keyed, Step};
use crate::priority::Prioritized;
use crate::scan::PRELOAD_BYTES;
use crate::types::{Loaded, TypeKey};
use quarry_storage::error::Result;
use quarry_storage::{Node, PipeHandle, PreloadedPipe};
use std::any::Any;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use tracing::instrument;

type LoadFn = dyn Fn(&PipeHandle) -> Result<Option<Loaded>> + Send + Sync;
type CompatibleFn = dyn Fn(&PipeHandle) -> bool + Send + Sync;

/// A loader for one resource type.
///
/// The loader itself answers `Ok(None)` when the content turns out not to be
/// something it understands; errors are for content it claimed and then
/// found broken.
pub struct LoaderRecord {
    name: String,
    type_key: TypeKey,
    loader: Box<LoadFn>,
    compatible: Option<Box<CompatibleFn>>,
    mime_types: Vec<String>,
    extensions: Vec<String>,
    inspect: bool,
    priority: i32,
}

impl LoaderRecord {
    pub fn new<T: Any + Send + Sync>(
        name: impl Into<String>,
        loader: impl Fn(&PipeHandle) -> Result<Option<T>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            type_key: TypeKey::of::<T>(),
            loader: Box::new(move |pipe: &PipeHandle| Ok(loader(pipe)?.map(|value| Box::new(value) as Loaded))),
            compatible: None,
            mime_types: Vec::new(),
            extensions: Vec::new(),
            inspect: true,
            priority: 0,
        }
    }

    /// Cheap content check. It must not fail, and only loaders that have one
    /// take part in content sniffing.
    #[must_use]
    pub fn compatible(mut self, predicate: impl Fn(&PipeHandle) -> bool + Send + Sync + 'static) -> Self {
        self.compatible = Some(Box::new(predicate));
        self
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

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_key(&self) -> TypeKey {
        self.type_key
    }

    pub fn load(&self, pipe: &PipeHandle) -> Result<Option<Loaded>> {
        (self.loader)(pipe)
    }

    fn accepts(&self, pipe: &PipeHandle, step: Step) -> bool {
        match (&self.compatible, step) {
            (Some(predicate), _) => predicate(pipe),
            (None, Step::Inspect) => false,
            (None, _) => true,
        }
    }
}

impl Prioritized for LoaderRecord {
    fn priority(&self) -> i32 {
        self.priority
    }
}

impl Keyed for LoaderRecord {
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

impl Debug for LoaderRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("LoaderRecord")
            .field("name", &self.name)
            .field("type", &self.type_key)
            .field("mime_types", &self.mime_types)
            .field("extensions", &self.extensions)
            .field("inspect", &self.inspect)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// One independent dispatch table per resource type.
#[derive(Debug, Default)]
pub struct LoaderRegistry {
    types: HashMap<TypeKey, DispatchTable<LoaderRecord>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, record: LoaderRecord) -> &mut Self {
        let (name, type_key) = (&record.name, record.type_key);
        tracing::trace!(%name, r#type = %type_key, priority = record.priority, "registering loader");
        self.types.entry(record.type_key).or_default().insert(record);
        self
    }

    pub fn has_loaders(&self, key: TypeKey) -> bool {
        self.types.get(&key).is_some_and(|table| !table.is_empty())
    }

    /// Pick the loader for `node` as a `key`.
    ///
    /// `Ok(None)` means no loader for the type recognised the node; a MIME
    /// type or extension that has loaders, none of which accept, is an error.
    #[instrument(level = "trace", skip(self, node), fields(path = %node.path))]
    pub fn get_loader(&self, key: TypeKey, node: &Node) -> Result<Option<Arc<LoaderRecord>>> {
        let Some(table) = self.types.get(&key) else {
            return Ok(None);
        };
        let pipe: PipeHandle = Arc::new(PreloadedPipe::new(node.pipe.clone(), PRELOAD_BYTES));
        table.select(node, |record, step| Ok(record.accepts(&pipe, step).then(|| record.clone())))
    }
}
