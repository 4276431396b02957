use quarry_storage::error::{ErrorKind, Result};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::hash::{Hash, Hasher};

/// A value produced by a loader, shared between every holder.
pub type Resource = std::sync::Arc<dyn Any + Send + Sync>;

/// A freshly loaded value, still exclusively owned so the post-loader can
/// adjust it.
pub type Loaded = Box<dyn Any + Send + Sync>;

/// Identity of a resource type. Compares by [`TypeId`] only; the name is for
/// humans.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: Any>() -> Self {
        Self { id: TypeId::of::<T>(), name: std::any::type_name::<T>() }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Last path segment of the Rust type name.
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Debug for TypeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "TypeKey({})", self.name)
    }
}

impl Display for TypeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.short_name())
    }
}

type PostLoad = Box<dyn Fn(&mut (dyn Any + Send + Sync)) -> Result<()> + Send + Sync>;

struct TypeRecord {
    name: String,
    post_load: Option<PostLoad>,
}

/// Human-readable names and post-load hooks for resource types.
#[derive(Default)]
pub struct TypeRegistry {
    types: HashMap<TypeKey, TypeRecord>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Any>(&mut self, name: impl Into<String>) -> &mut Self {
        self.types.insert(TypeKey::of::<T>(), TypeRecord { name: name.into(), post_load: None });
        self
    }

    /// Register a type with a hook that runs on every freshly loaded value
    /// before it is shared.
    pub fn register_with_post_loader<T: Any>(
        &mut self,
        name: impl Into<String>,
        post_load: impl Fn(&mut T) -> Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        let key = TypeKey::of::<T>();
        let erased: PostLoad = Box::new(move |value: &mut (dyn Any + Send + Sync)| match value.downcast_mut::<T>() {
            Some(value) => post_load(value),
            None => exn::bail!(ErrorKind::Format(format!("post-loader expected {}", key.short_name()))),
        });
        self.types.insert(key, TypeRecord { name: name.into(), post_load: Some(erased) });
        self
    }

    pub fn contains(&self, key: TypeKey) -> bool {
        self.types.contains_key(&key)
    }

    /// Registered name, or the Rust type name for unregistered types.
    pub fn name(&self, key: TypeKey) -> String {
        match self.types.get(&key) {
            Some(record) => record.name.clone(),
            None => key.short_name().to_string(),
        }
    }

    pub fn post_load(&self, key: TypeKey, value: &mut Loaded) -> Result<()> {
        match self.types.get(&key).and_then(|record| record.post_load.as_ref()) {
            Some(post_load) => post_load(&mut **value),
            None => Ok(()),
        }
    }
}

impl Debug for TypeRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_list().entries(self.types.values().map(|record| &record.name)).finish()
    }
}
