use crate::priority::{PriorityList, Prioritized};
use crate::types::{TypeKey, TypeRegistry};
use exn::ResultExt;
use quarry_storage::error::{ErrorKind, Result};
use std::any::Any;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

type SaveFn = dyn Fn(&(dyn Any + Send + Sync), &mut dyn Write) -> Result<()> + Send + Sync;

pub struct SaverRecord {
    name: String,
    type_key: TypeKey,
    saver: Box<SaveFn>,
    formats: Vec<String>,
    extensions: Vec<String>,
    priority: i32,
}

impl SaverRecord {
    pub fn new<T: Any + Send + Sync>(
        name: impl Into<String>,
        saver: impl Fn(&T, &mut dyn Write) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        let type_key = TypeKey::of::<T>();
        let erased = move |value: &(dyn Any + Send + Sync), writer: &mut dyn Write| match value.downcast_ref::<T>() {
            Some(value) => saver(value, writer),
            None => exn::bail!(ErrorKind::Format(format!("saver expected {}", type_key.short_name()))),
        };
        Self {
            name: name.into(),
            type_key,
            saver: Box::new(erased),
            formats: Vec::new(),
            extensions: Vec::new(),
            priority: 0,
        }
    }

    #[must_use]
    pub fn formats<S: AsRef<str>>(mut self, formats: impl IntoIterator<Item = S>) -> Self {
        self.formats = formats.into_iter().map(|f| f.as_ref().to_lowercase()).collect();
        self
    }

    /// Recognised extensions; the first one is the default.
    #[must_use]
    pub fn extensions<S: AsRef<str>>(mut self, extensions: impl IntoIterator<Item = S>) -> Self {
        self.extensions = extensions.into_iter().map(|e| e.as_ref().to_lowercase()).collect();
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

    pub fn formats_list(&self) -> &[String] {
        &self.formats
    }

    pub fn extensions_list(&self) -> &[String] {
        &self.extensions
    }

    pub fn default_extension(&self) -> Option<&str> {
        self.extensions.first().map(String::as_str)
    }

    fn has_format(&self, format: &str) -> bool {
        self.formats.iter().any(|f| f == format)
    }

    fn has_extension(&self, extension: &str) -> bool {
        self.extensions.iter().any(|e| e == extension)
    }

    pub fn save(&self, value: &(dyn Any + Send + Sync), writer: &mut dyn Write) -> Result<()> {
        (self.saver)(value, writer)
    }
}

impl Prioritized for SaverRecord {
    fn priority(&self) -> i32 {
        self.priority
    }
}

impl Debug for SaverRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("SaverRecord")
            .field("name", &self.name)
            .field("type", &self.type_key)
            .field("formats", &self.formats)
            .field("extensions", &self.extensions)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct SaverRegistry {
    types: HashMap<TypeKey, PriorityList<Arc<SaverRecord>>>,
}

impl SaverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, record: SaverRecord) -> &mut Self {
        let (name, type_key) = (&record.name, record.type_key);
        tracing::trace!(%name, r#type = %type_key, priority = record.priority, "registering saver");
        self.types.entry(record.type_key).or_default().insert(Arc::new(record));
        self
    }

    /// Choose a saver for `key`.
    ///
    /// With `best_match`, the choice degrades from format and extension, to
    /// format, to extension, to whatever saver has the highest priority.
    /// Without it, the given format and/or extension must match exactly, and
    /// giving neither matches nothing.
    pub fn get_saver(
        &self,
        types: &TypeRegistry,
        key: TypeKey,
        format: Option<&str>,
        extension: Option<&str>,
        best_match: bool,
    ) -> Result<Arc<SaverRecord>> {
        let type_name = types.name(key);
        let not_available = || ErrorKind::NotAvailable(format!("{type_name} savers"));
        let Some(records) = self.types.get(&key) else {
            exn::bail!(not_available());
        };
        let format = format.map(str::to_lowercase).filter(|f| !f.is_empty());
        let extension = extension.map(str::to_lowercase).filter(|e| !e.is_empty());
        let find = |predicate: &dyn Fn(&SaverRecord) -> bool| records.iter().find(|r| predicate(r)).cloned();

        let found = if best_match {
            let mut found = None;
            if let (Some(f), Some(e)) = (&format, &extension) {
                found = find(&|r| r.has_format(f) && r.has_extension(e));
            }
            if found.is_none()
                && let Some(f) = &format
            {
                found = find(&|r| r.has_format(f));
                if found.is_none() {
                    tracing::warn!(r#type = %type_name, format = %f, "unknown {type_name} format: {f}");
                }
            }
            if found.is_none()
                && let Some(e) = &extension
            {
                found = find(&|r| r.has_extension(e));
                if found.is_none() {
                    tracing::warn!(r#type = %type_name, extension = %e, "unknown {type_name} extension: {e}");
                }
            }
            found.or_else(|| records.first().cloned())
        } else {
            match (&format, &extension) {
                (Some(f), Some(e)) => find(&|r| r.has_format(f) && r.has_extension(e)),
                (Some(f), None) => find(&|r| r.has_format(f)),
                (None, Some(e)) => find(&|r| r.has_extension(e)),
                (None, None) => None,
            }
        };
        match found {
            Some(record) => Ok(record),
            None => exn::bail!(not_available()),
        }
    }

    /// Save `value` to `path`, returning the path actually written.
    ///
    /// If the chosen saver doesn't recognise the path's extension, its
    /// default extension is appended.
    pub fn save<T: Any + Send + Sync>(
        &self,
        types: &TypeRegistry,
        value: &T,
        path: &Path,
        format: Option<&str>,
        best_match: bool,
    ) -> Result<PathBuf> {
        self.save_erased(types, TypeKey::of::<T>(), value, path, format, best_match)
    }

    #[instrument(level = "debug", skip(self, types, value), fields(path = %path.display()))]
    pub fn save_erased(
        &self,
        types: &TypeRegistry,
        key: TypeKey,
        value: &(dyn Any + Send + Sync),
        path: &Path,
        format: Option<&str>,
        best_match: bool,
    ) -> Result<PathBuf> {
        let extension = path_extension(path);
        let record = self.get_saver(types, key, format, Some(&extension), best_match)?;

        let target = match record.default_extension() {
            Some(default) if !record.has_extension(&extension) => with_added_extension(path, default),
            _ => path.to_path_buf(),
        };
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).or_raise(|| ErrorKind::FileAccess(parent.to_path_buf()))?;
        }
        let file = File::create(&target).or_raise(|| ErrorKind::FileAccess(target.clone()))?;
        let mut writer = BufWriter::new(file);
        record.save(value, &mut writer).or_raise(|| ErrorKind::FileWrite(target.clone()))?;
        writer.flush().or_raise(|| ErrorKind::FileWrite(target.clone()))?;

        let type_name = types.name(key);
        tracing::info!(r#type = %type_name, saver = %record.name, "{type_name} saved as {}", target.display());
        Ok(target)
    }
}

fn path_extension(path: &Path) -> String {
    path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).unwrap_or_default()
}

fn with_added_extension(path: &Path, extension: &str) -> PathBuf {
    let mut target = path.as_os_str().to_os_string();
    target.push(".");
    target.push(extension);
    PathBuf::from(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::count_warnings;
    use rstest::rstest;
    use tempfile::tempdir;

    #[derive(Debug)]
    struct Note(String);

    fn writer(tag: &'static str) -> impl Fn(&Note, &mut dyn Write) -> Result<()> + Send + Sync + 'static {
        move |note: &Note, out: &mut dyn Write| {
            write!(out, "{tag}:{}", note.0).map_err(|e| ErrorKind::platform("io", e))
        }
    }

    fn registry() -> (SaverRegistry, TypeRegistry) {
        let mut types = TypeRegistry::new();
        types.register::<Note>("note");
        let mut savers = SaverRegistry::new();
        let plain = SaverRecord::new("plain", writer("plain")).formats(["plain"]).extensions(["txt", "text"]);
        savers.register(plain.priority(1));
        savers.register(SaverRecord::new("rich", writer("rich")).formats(["rich"]).extensions(["rtf"]).priority(5));
        (savers, types)
    }

    fn pick(
        savers: &SaverRegistry,
        types: &TypeRegistry,
        format: Option<&str>,
        ext: Option<&str>,
        best: bool,
    ) -> Option<String> {
        savers.get_saver(types, TypeKey::of::<Note>(), format, ext, best).ok().map(|r| r.name().to_string())
    }

    #[rstest]
    #[case(Some("plain"), Some("txt"), true, Some("plain"))]
    #[case(Some("PLAIN"), Some("rtf"), true, Some("plain"))]
    #[case(None, Some("TEXT"), true, Some("plain"))]
    #[case(None, None, true, Some("rich"))]
    #[case(Some("plain"), Some("rtf"), false, None)]
    #[case(None, Some("rtf"), false, Some("rich"))]
    #[case(Some("rich"), None, false, Some("rich"))]
    #[case(Some("sepia"), None, false, None)]
    #[case(None, None, false, None)]
    fn test_get_saver(
        #[case] format: Option<&str>,
        #[case] ext: Option<&str>,
        #[case] best: bool,
        #[case] expected: Option<&str>,
    ) {
        let (savers, types) = registry();
        assert_eq!(pick(&savers, &types, format, ext, best).as_deref(), expected);
    }

    #[test]
    fn test_best_match_warns_on_unknown_keys() {
        let (savers, types) = registry();
        let (picked, warnings) = count_warnings(|| pick(&savers, &types, Some("sepia"), Some("doc"), true));
        assert_eq!(picked.as_deref(), Some("rich"));
        assert_eq!(warnings, 2);
    }

    #[test]
    fn test_no_savers_for_type() {
        let savers = SaverRegistry::new();
        let err = savers.get_saver(&TypeRegistry::new(), TypeKey::of::<Note>(), None, None, true).unwrap_err();
        assert_eq!(*err, ErrorKind::NotAvailable("Note savers".to_string()));
    }

    #[test]
    fn test_save_forces_known_extension() {
        let dir = tempdir().unwrap();
        let mut types = TypeRegistry::new();
        types.register::<Note>("note");
        let mut savers = SaverRegistry::new();
        savers.register(SaverRecord::new("foo", writer("foo")).extensions(["foo"]));

        let requested = dir.path().join("out/notes.bar");
        let saved = savers.save(&types, &Note("hi".into()), &requested, None, true).unwrap();
        assert_eq!(saved, dir.path().join("out/notes.bar.foo"));
        assert_eq!(std::fs::read_to_string(&saved).unwrap(), "foo:hi");
        assert!(!requested.exists());
    }

    #[test]
    fn test_save_keeps_recognised_extension() {
        let dir = tempdir().unwrap();
        let (savers, types) = registry();
        let requested = dir.path().join("a.TEXT");
        let saved = savers.save(&types, &Note("x".into()), &requested, None, true).unwrap();
        assert_eq!(saved, requested);
        assert_eq!(std::fs::read_to_string(&saved).unwrap(), "plain:x");
    }

    #[test]
    fn test_save_unwritable_target() {
        let dir = tempdir().unwrap();
        let (savers, types) = registry();
        // A directory where the file should go.
        let requested = dir.path().join("taken.txt");
        std::fs::create_dir(&requested).unwrap();
        let err = savers.save(&types, &Note("x".into()), &requested, None, true).unwrap_err();
        assert!(matches!(&*err, ErrorKind::FileAccess(_)));
    }
}
