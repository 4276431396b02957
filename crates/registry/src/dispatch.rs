//! MIME / extension / content-sniff dispatch shared by the scanner and loader
//! registries.

use crate::priority::{PriorityList, Prioritized};
use quarry_storage::Node;
use quarry_storage::error::{ErrorKind, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Keys a record is selected by.
pub trait Keyed: Prioritized {
    fn name(&self) -> &str;
    fn mime_types(&self) -> &[String];
    fn extensions(&self) -> &[String];
    fn inspect(&self) -> bool;
}

/// Which selection step produced a candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Mime,
    Extension,
    Inspect,
}

#[derive(Debug)]
pub struct DispatchTable<R> {
    by_mime: HashMap<String, PriorityList<Arc<R>>>,
    by_extension: HashMap<String, PriorityList<Arc<R>>>,
    inspect: PriorityList<Arc<R>>,
    len: usize,
}

impl<R> Default for DispatchTable<R> {
    fn default() -> Self {
        Self { by_mime: HashMap::new(), by_extension: HashMap::new(), inspect: PriorityList::default(), len: 0 }
    }
}

impl<R: Keyed> DispatchTable<R> {
    pub fn insert(&mut self, record: R) -> Arc<R> {
        debug_assert!(
            !record.mime_types().is_empty() || !record.extensions().is_empty() || record.inspect(),
            "record `{}` can never be selected",
            record.name()
        );
        let record = Arc::new(record);
        for mime in record.mime_types() {
            self.by_mime.entry(mime.to_lowercase()).or_default().insert(record.clone());
        }
        for extension in record.extensions() {
            self.by_extension.entry(extension.to_lowercase()).or_default().insert(record.clone());
        }
        if record.inspect() {
            self.inspect.insert(record.clone());
        }
        self.len += 1;
        record
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offer `node` to candidates until `attempt` returns a value.
    ///
    /// 1. If the node has a MIME type with registered records, one of them
    ///    must accept or the whole selection fails with "mismatched mime type".
    /// 2. The same for the node's extension ("mismatched extension").
    /// 3. If the node allows inspection, every inspect-capable record is
    ///    offered in priority order.
    ///
    /// Each record is attempted at most once per call. Errors from `attempt`
    /// propagate. `Ok(None)` means nobody accepted and no table claimed the
    /// node.
    pub fn select<T>(
        &self,
        node: &Node,
        mut attempt: impl FnMut(&Arc<R>, Step) -> Result<Option<T>>,
    ) -> Result<Option<T>> {
        let mut tried: Vec<*const R> = Vec::new();
        let mut offer = |list: &PriorityList<Arc<R>>, step: Step| -> Result<Option<T>> {
            for record in list {
                if tried.contains(&Arc::as_ptr(record)) {
                    continue;
                }
                tried.push(Arc::as_ptr(record));
                if let Some(value) = attempt(record, step)? {
                    return Ok(Some(value));
                }
            }
            Ok(None)
        };

        if !node.mime.is_empty()
            && let Some(list) = self.by_mime.get(&node.mime.to_lowercase())
        {
            if let Some(value) = offer(list, Step::Mime)? {
                return Ok(Some(value));
            }
            exn::bail!(ErrorKind::not_found("mismatched mime type", node.mime.clone()));
        }

        let extension = node.extension();
        if !extension.is_empty()
            && let Some(list) = self.by_extension.get(&extension)
        {
            if let Some(value) = offer(list, Step::Extension)? {
                return Ok(Some(value));
            }
            exn::bail!(ErrorKind::not_found("mismatched extension", extension));
        }

        if node.inspect {
            return offer(&self.inspect, Step::Inspect);
        }
        Ok(None)
    }
}
