//! Per-source path catalog.
//!
//! Every source keeps the same two maps: canonical path to indexed node (with
//! a weak slot per loaded type), and group key to the paths indexed under it.
//! Groups are the unit of refresh: when a backing file changes, its group is
//! cleared and indexed again.

use crate::context::SourceContext;
use parking_lot::Mutex;
use quarry_registry::{LoaderRecord, Resource, TypeKey};
use quarry_storage::error::{ErrorKind, Result};
use quarry_storage::path::cat_path;
use quarry_storage::{Node, Stream};
use std::any::Any;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::{Arc, Weak};
use tracing::instrument;

struct Slot {
    loader: Arc<LoaderRecord>,
    data: Weak<dyn Any + Send + Sync>,
}

struct Entry {
    node: Node,
    types: HashMap<TypeKey, Slot>,
}

#[derive(Default)]
struct State {
    paths: HashMap<String, Entry>,
    groups: HashMap<String, Vec<String>>,
}

pub struct Catalog {
    context: SourceContext,
    state: Mutex<State>,
}

impl Catalog {
    pub fn new(context: SourceContext) -> Self {
        Self { context, state: Mutex::new(State::default()) }
    }

    pub fn context(&self) -> &SourceContext {
        &self.context
    }

    /// Index `node` and everything the scanners find inside it, as one group
    /// keyed by the node's path.
    pub fn index(&self, node: Node) {
        let group = node.path.clone();
        let node = node.with_path("");
        let root = group.clone();
        self.scan_to_build_index(node, &group, &root, 0);
    }

    fn scan_to_build_index(&self, node: Node, group: &str, root: &str, depth: usize) {
        let path = cat_path(root, &node.path);
        if self.context.excludes.is_excluded(&path) {
            tracing::debug!(%path, "excluded");
            return;
        }
        if self.context.verbose {
            tracing::info!(%path, depth, "indexing");
        } else {
            tracing::trace!(%path, depth, "indexing");
        }
        let node = node.with_path(path.clone());
        {
            let mut state = self.state.lock();
            let fresh = !state.paths.contains_key(&path);
            state.paths.insert(path.clone(), Entry { node: node.clone(), types: HashMap::new() });
            if fresh {
                state.groups.entry(group.to_string()).or_default().push(path.clone());
            }
        }

        let mut children = Vec::new();
        let scanned = self.context.registries.scanners.scan(&node, &mut |child| children.push(child));
        for child in children {
            self.scan_to_build_index(child, group, &path, depth + 1);
        }
        if let Err(err) = scanned {
            tracing::warn!(%path, error = %*err, "failed to scan resource");
        }
    }

    /// Forget every path indexed under `group`, returning them.
    pub fn clear(&self, group: &str) -> Vec<String> {
        let mut state = self.state.lock();
        let cleared = state.groups.remove(group).unwrap_or_default();
        for path in &cleared {
            state.paths.remove(path);
        }
        cleared
    }

    pub fn contains(&self, path: &str) -> bool {
        self.state.lock().paths.contains_key(path)
    }

    pub fn node(&self, path: &str) -> Option<Node> {
        self.state.lock().paths.get(path).map(|entry| entry.node.clone())
    }

    /// Every indexed path, unordered.
    pub fn paths(&self) -> Vec<String> {
        self.state.lock().paths.keys().cloned().collect()
    }

    pub fn groups(&self) -> Vec<String> {
        self.state.lock().groups.keys().cloned().collect()
    }

    /// Name of the loader that produced the value held for `path` as `key`.
    pub fn loaded_by(&self, key: TypeKey, path: &str) -> Option<String> {
        let state = self.state.lock();
        let slot = state.paths.get(path)?.types.get(&key)?;
        Some(slot.loader.name().to_string())
    }

    /// `Ok(None)` if the path isn't indexed here.
    pub fn open(&self, path: &str) -> Result<Option<Stream>> {
        match self.node(path) {
            Some(node) => node.pipe.open().map(Some),
            None => Ok(None),
        }
    }

    /// Load `path` as `key`, reusing the live value from an earlier load.
    ///
    /// `Ok(None)` if the path isn't indexed here. Loading runs without the
    /// catalog lock held, so loaders may go back through the index.
    #[instrument(level = "debug", skip(self), fields(r#type = %key))]
    pub fn load(&self, key: TypeKey, path: &str) -> Result<Option<Resource>> {
        let node = {
            let state = self.state.lock();
            let Some(entry) = state.paths.get(path) else {
                return Ok(None);
            };
            if let Some(data) = entry.types.get(&key).and_then(|slot| slot.data.upgrade()) {
                tracing::trace!("reusing live resource");
                return Ok(Some(data));
            }
            entry.node.clone()
        };

        match self.load_from_pipe(key, &node) {
            Ok((loader, data)) => {
                let mut state = self.state.lock();
                if let Some(entry) = state.paths.get_mut(path) {
                    entry.types.insert(key, Slot { loader, data: Arc::downgrade(&data) });
                }
                Ok(Some(data))
            },
            Err(err) => {
                if let Some(entry) = self.state.lock().paths.get_mut(path) {
                    entry.types.remove(&key);
                }
                Err(err)
            },
        }
    }

    fn load_from_pipe(&self, key: TypeKey, node: &Node) -> Result<(Arc<LoaderRecord>, Resource)> {
        let registries = &self.context.registries;
        let name = registries.types.name(key);
        let mismatch = || ErrorKind::not_found("resource type mismatch", format!("{} ({name})", node.path));
        tracing::info!(r#type = %name, path = %node.path, "loading {name} from {}", node.path);

        let Some(loader) = registries.loaders.get_loader(key, node)? else {
            exn::bail!(mismatch());
        };
        let Some(mut loaded) = loader.load(&node.pipe)? else {
            exn::bail!(mismatch());
        };
        registries.types.post_load(key, &mut loaded)?;
        Ok((loader, Arc::from(loaded)))
    }
}

impl Debug for Catalog {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let state = self.state.lock();
        f.debug_struct("Catalog").field("paths", &state.paths.len()).field("groups", &state.groups.len()).finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use quarry_registry::testing::count_warnings;
    use quarry_registry::{Registries, ScannerRecord};
    use quarry_storage::{MemoryPipe, PipeHandle};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    pub(crate) struct Note(pub String);

    /// Loader for `.note` files that counts every parse.
    pub(crate) fn note_registries(parses: Arc<AtomicUsize>) -> Registries {
        let mut registries = Registries::new();
        registries.types.register::<Note>("note");
        registries.loaders.register(
            LoaderRecord::new("note", move |pipe: &PipeHandle| {
                parses.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Note(pipe.open()?.get_text()?)))
            })
            .extensions(["note"]),
        );
        registries
    }

    fn memory(path: &str, data: &str) -> Node {
        Node::new(Arc::new(MemoryPipe::new(path, data.as_bytes().to_vec())), path)
    }

    /// Treats each line of a `.list` node as a child note.
    fn list_scanner() -> ScannerRecord {
        ScannerRecord::new("list", |pipe, callback| {
            let text = pipe.open()?.get_text()?;
            for line in text.lines() {
                if line == "!" {
                    exn::bail!(ErrorKind::Format("bang".into()));
                }
                callback(memory(line, line));
            }
            Ok(true)
        })
        .extensions(["list"])
    }

    #[test]
    fn test_load_is_idempotent_while_held() {
        let parses = Arc::new(AtomicUsize::new(0));
        let catalog = Catalog::new(SourceContext::new(Arc::new(note_registries(parses.clone()))));
        catalog.index(memory("a.note", "hello"));

        let first = catalog.load(TypeKey::of::<Note>(), "a.note").unwrap().unwrap();
        let second = catalog.load(TypeKey::of::<Note>(), "a.note").unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(parses.load(Ordering::SeqCst), 1);
        assert_eq!(first.downcast_ref::<Note>(), Some(&Note("hello".into())));

        drop((first, second));
        let third = catalog.load(TypeKey::of::<Note>(), "a.note").unwrap().unwrap();
        assert_eq!(parses.load(Ordering::SeqCst), 2);
        assert_eq!(third.downcast_ref::<Note>(), Some(&Note("hello".into())));
    }

    #[test]
    fn test_unknown_path() {
        let catalog = Catalog::new(SourceContext::new(Arc::new(Registries::new())));
        assert!(catalog.load(TypeKey::of::<Note>(), "missing").unwrap().is_none());
        assert!(catalog.open("missing").unwrap().is_none());
    }

    #[test]
    fn test_type_mismatch_keeps_node() {
        let catalog = Catalog::new(SourceContext::new(Arc::new(note_registries(Arc::default()))));
        catalog.index(memory("a.txt", "plain"));
        let err = catalog.load(TypeKey::of::<Note>(), "a.txt").unwrap_err();
        assert_eq!(*err, ErrorKind::not_found("resource type mismatch", "a.txt (note)"));
        assert_eq!(catalog.open("a.txt").unwrap().unwrap().get_text().unwrap(), "plain");
    }

    #[test]
    fn test_failed_load_rolls_back_slot() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let mut registries = Registries::new();
        registries.loaders.register(
            LoaderRecord::new("flaky", move |_: &PipeHandle| match counter.fetch_add(1, Ordering::SeqCst) {
                0 => exn::bail!(ErrorKind::Format("truncated".into())),
                _ => Ok(Some(Note("ok".into()))),
            })
            .extensions(["note"]),
        );
        let catalog = Catalog::new(SourceContext::new(Arc::new(registries)));
        catalog.index(memory("a.note", ""));

        assert!(catalog.load(TypeKey::of::<Note>(), "a.note").is_err());
        assert_eq!(catalog.loaded_by(TypeKey::of::<Note>(), "a.note"), None);
        let note = catalog.load(TypeKey::of::<Note>(), "a.note").unwrap().unwrap();
        assert_eq!(note.downcast_ref::<Note>(), Some(&Note("ok".into())));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(catalog.loaded_by(TypeKey::of::<Note>(), "a.note").as_deref(), Some("flaky"));
    }

    #[test]
    fn test_scan_children_and_clear_group() {
        let mut registries = Registries::new();
        registries.scanners.register(list_scanner());
        let catalog = Catalog::new(SourceContext::new(Arc::new(registries)));
        catalog.index(memory("set.list", "one.note\ntwo.note"));
        catalog.index(memory("other.note", "x"));

        let mut paths = catalog.paths();
        paths.sort();
        assert_eq!(paths, ["other.note", "set.list", "set.list/one.note", "set.list/two.note"]);

        let mut cleared = catalog.clear("set.list");
        cleared.sort();
        assert_eq!(cleared, ["set.list", "set.list/one.note", "set.list/two.note"]);
        assert_eq!(catalog.paths(), ["other.note"]);
        assert!(catalog.clear("set.list").is_empty());
    }

    #[test]
    fn test_scan_error_warns_once_and_keeps_siblings() {
        let mut registries = Registries::new();
        registries.scanners.register(list_scanner());
        let catalog = Catalog::new(SourceContext::new(Arc::new(registries)));

        let ((), warnings) = count_warnings(|| catalog.index(memory("root.list", "a.note\n!")));
        assert_eq!(warnings, 1);
        assert!(catalog.contains("root.list"));
        assert!(catalog.contains("root.list/a.note"));
    }

    #[test]
    fn test_excluded_subtree() {
        let mut registries = Registries::new();
        registries.scanners.register(list_scanner());
        let context = SourceContext::new(Arc::new(registries))
            .with_excludes(crate::context::Excludes::new([r"skip\.list$"]).unwrap());
        let catalog = Catalog::new(context);
        catalog.index(memory("skip.list", "a.note"));
        assert!(catalog.paths().is_empty());
    }
}
