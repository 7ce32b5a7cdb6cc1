//! Versioned, dependency-checked global values.
//!
//! Resources are keyed by [`ResourceType`], which is resolved from a
//! [`ResourceToken`]: a string name, a [`Symbol`], or a Rust type. Names map
//! by value. Symbols and types go through process-wide identity caches that
//! hand out auto-incrementing ids, so the same token always lands on the same
//! key for the lifetime of the process.
//!
//! # Invariants
//! - The map-wide revision counter increases on every successful insert.
//! - A failed insert leaves the map untouched.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};

use keel_common::Symbol;
use parking_lot::Mutex;

use crate::component::short_type_name;

/// A key as supplied by callers, before resolution.
#[derive(Debug, Clone)]
pub enum ResourceToken {
    Name(String),
    Symbol(Symbol),
    Type { id: TypeId, name: &'static str },
}

impl ResourceToken {
    pub fn of<T: 'static>() -> Self {
        Self::Type {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }
}

impl From<&str> for ResourceToken {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<String> for ResourceToken {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<Symbol> for ResourceToken {
    fn from(symbol: Symbol) -> Self {
        Self::Symbol(symbol)
    }
}

impl From<&Symbol> for ResourceToken {
    fn from(symbol: &Symbol) -> Self {
        Self::Symbol(symbol.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ResourceKey {
    Name(Arc<str>),
    Symbol(u32),
    Type(u32),
}

#[derive(Default)]
struct TokenCache {
    symbols: HashMap<u64, u32>,
    types: HashMap<TypeId, u32>,
}

impl TokenCache {
    fn intern_symbol(&mut self, symbol: &Symbol) -> u32 {
        let next = self.symbols.len() as u32 + 1;
        *self.symbols.entry(symbol.id()).or_insert(next)
    }

    fn intern_type(&mut self, id: TypeId) -> u32 {
        let next = self.types.len() as u32 + 1;
        *self.types.entry(id).or_insert(next)
    }
}

static TOKEN_CACHE: LazyLock<Mutex<TokenCache>> =
    LazyLock::new(|| Mutex::new(TokenCache::default()));

/// Resolved identity of a resource.
///
/// Equality and hashing only consider the internal key; the label is kept for
/// display.
#[derive(Clone)]
pub struct ResourceType {
    key: ResourceKey,
    label: Arc<str>,
}

impl ResourceType {
    pub fn from_token(token: impl Into<ResourceToken>) -> Self {
        match token.into() {
            ResourceToken::Name(name) => {
                let name: Arc<str> = Arc::from(name);
                Self {
                    key: ResourceKey::Name(name.clone()),
                    label: name,
                }
            }
            ResourceToken::Symbol(symbol) => {
                let id = TOKEN_CACHE.lock().intern_symbol(&symbol);
                Self {
                    key: ResourceKey::Symbol(id),
                    label: Arc::from(symbol.description()),
                }
            }
            ResourceToken::Type { id, name } => {
                let id = TOKEN_CACHE.lock().intern_type(id);
                let short = short_type_name(name);
                Self {
                    key: ResourceKey::Type(id),
                    label: Arc::from(short),
                }
            }
        }
    }

    /// Key for a resource identified by its Rust type.
    pub fn of<T: 'static>() -> Self {
        Self::from_token(ResourceToken::of::<T>())
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl PartialEq for ResourceType {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ResourceType {}

impl Hash for ResourceType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            ResourceKey::Name(name) => write!(f, "ResourceType(name {name:?})"),
            ResourceKey::Symbol(id) => write!(f, "ResourceType(symbol #{id} {})", self.label),
            ResourceKey::Type(id) => write!(f, "ResourceType(type #{id} {})", self.label),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl From<&str> for ResourceType {
    fn from(name: &str) -> Self {
        Self::from_token(name)
    }
}

impl From<String> for ResourceType {
    fn from(name: String) -> Self {
        Self::from_token(name)
    }
}

impl From<Symbol> for ResourceType {
    fn from(symbol: Symbol) -> Self {
        Self::from_token(symbol)
    }
}

impl From<&Symbol> for ResourceType {
    fn from(symbol: &Symbol) -> Self {
        Self::from_token(symbol)
    }
}

impl From<ResourceToken> for ResourceType {
    fn from(token: ResourceToken) -> Self {
        Self::from_token(token)
    }
}

impl From<&ResourceType> for ResourceType {
    fn from(ty: &ResourceType) -> Self {
        ty.clone()
    }
}

/// A dependency declared by a resource at insert time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDependency {
    pub ty: ResourceType,
    pub min_version: u32,
}

/// Version and dependency declaration for an inserted resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMeta {
    pub version: u32,
    pub dependencies: Vec<ResourceDependency>,
}

impl Default for ResourceMeta {
    fn default() -> Self {
        Self {
            version: 1,
            dependencies: Vec::new(),
        }
    }
}

impl ResourceMeta {
    pub fn version(version: u32) -> Self {
        Self {
            version,
            dependencies: Vec::new(),
        }
    }

    pub fn depends_on(mut self, ty: impl Into<ResourceType>, min_version: u32) -> Self {
        self.dependencies.push(ResourceDependency {
            ty: ty.into(),
            min_version,
        });
        self
    }
}

/// Errors from resource lookups and inserts.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("resource {0} is not installed")]
    Missing(ResourceType),
    #[error("resource {resource} holds a {found}, not a {expected}")]
    TypeMismatch {
        resource: ResourceType,
        expected: &'static str,
        found: &'static str,
    },
    #[error("resource {resource} depends on {dependency}, which is not installed")]
    MissingDependency {
        resource: ResourceType,
        dependency: ResourceType,
    },
    #[error("resource {resource} needs {dependency} v{required} or newer, found v{found}")]
    VersionMismatch {
        resource: ResourceType,
        dependency: ResourceType,
        required: u32,
        found: u32,
    },
}

struct ResourceEntry {
    value: Box<dyn Any>,
    type_name: &'static str,
    version: u32,
    revision: u64,
}

/// Global typed values keyed by [`ResourceType`].
#[derive(Default)]
pub struct ResourceMap {
    entries: HashMap<ResourceType, ResourceEntry>,
    revision: u64,
}

impl ResourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `value` at version 1 with no dependencies, replacing any
    /// previous value. Returns the new revision.
    pub fn insert<T: 'static>(&mut self, ty: impl Into<ResourceType>, value: T) -> u64 {
        self.install(ty.into(), value, 1)
    }

    /// Install `value` after checking every declared dependency. On failure
    /// nothing is changed.
    pub fn insert_with_meta<T: 'static>(
        &mut self,
        ty: impl Into<ResourceType>,
        value: T,
        meta: ResourceMeta,
    ) -> Result<u64, ResourceError> {
        let ty = ty.into();
        for dep in &meta.dependencies {
            let installed = self.entries.get(&dep.ty).ok_or_else(|| {
                ResourceError::MissingDependency {
                    resource: ty.clone(),
                    dependency: dep.ty.clone(),
                }
            })?;
            if installed.version < dep.min_version {
                return Err(ResourceError::VersionMismatch {
                    resource: ty.clone(),
                    dependency: dep.ty.clone(),
                    required: dep.min_version,
                    found: installed.version,
                });
            }
        }
        Ok(self.install(ty, value, meta.version))
    }

    fn install<T: 'static>(&mut self, ty: ResourceType, value: T, version: u32) -> u64 {
        self.revision += 1;
        tracing::debug!(resource = %ty, version, revision = self.revision, "resource installed");
        self.entries.insert(
            ty,
            ResourceEntry {
                value: Box::new(value),
                type_name: std::any::type_name::<T>(),
                version,
                revision: self.revision,
            },
        );
        self.revision
    }

    pub fn get<T: 'static>(&self, ty: impl Into<ResourceType>) -> Result<&T, ResourceError> {
        let ty = ty.into();
        let entry = self
            .entries
            .get(&ty)
            .ok_or_else(|| ResourceError::Missing(ty.clone()))?;
        let found = entry.type_name;
        entry
            .value
            .downcast_ref()
            .ok_or_else(|| ResourceError::TypeMismatch {
                resource: ty,
                expected: std::any::type_name::<T>(),
                found,
            })
    }

    pub fn get_mut<T: 'static>(
        &mut self,
        ty: impl Into<ResourceType>,
    ) -> Result<&mut T, ResourceError> {
        let ty = ty.into();
        let entry = self
            .entries
            .get_mut(&ty)
            .ok_or_else(|| ResourceError::Missing(ty.clone()))?;
        let found = entry.type_name;
        entry
            .value
            .downcast_mut()
            .ok_or_else(|| ResourceError::TypeMismatch {
                resource: ty,
                expected: std::any::type_name::<T>(),
                found,
            })
    }

    /// Like [`ResourceMap::get`], but absent or mistyped values are `None`.
    pub fn try_get<T: 'static>(&self, ty: impl Into<ResourceType>) -> Option<&T> {
        let ty: ResourceType = ty.into();
        self.entries.get(&ty)?.value.downcast_ref()
    }

    pub fn try_get_mut<T: 'static>(&mut self, ty: impl Into<ResourceType>) -> Option<&mut T> {
        let ty: ResourceType = ty.into();
        self.entries.get_mut(&ty)?.value.downcast_mut()
    }

    pub fn has(&self, ty: impl Into<ResourceType>) -> bool {
        let ty: ResourceType = ty.into();
        self.entries.contains_key(&ty)
    }

    /// Uninstall a resource. Dependents that were validated against it are
    /// left in place.
    pub fn remove(&mut self, ty: impl Into<ResourceType>) -> bool {
        let ty: ResourceType = ty.into();
        self.entries.remove(&ty).is_some()
    }

    /// Revision stamped on the resource when it was last inserted.
    pub fn revision(&self, ty: impl Into<ResourceType>) -> Option<u64> {
        let ty: ResourceType = ty.into();
        self.entries.get(&ty).map(|entry| entry.revision)
    }

    pub fn version(&self, ty: impl Into<ResourceType>) -> Option<u32> {
        let ty: ResourceType = ty.into();
        self.entries.get(&ty).map(|entry| entry.version)
    }

    /// Map-wide revision counter.
    pub fn current_revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Installed resource types, ordered by insertion revision.
    pub fn types(&self) -> Vec<ResourceType> {
        let mut entries: Vec<(&ResourceType, u64)> = self
            .entries
            .iter()
            .map(|(ty, entry)| (ty, entry.revision))
            .collect();
        entries.sort_by_key(|(_, revision)| *revision);
        entries.into_iter().map(|(ty, _)| ty.clone()).collect()
    }

    pub fn insert_resource<T: 'static>(&mut self, value: T) -> u64 {
        self.insert(ResourceType::of::<T>(), value)
    }

    pub fn resource<T: 'static>(&self) -> Result<&T, ResourceError> {
        self.get(ResourceType::of::<T>())
    }

    pub fn resource_mut<T: 'static>(&mut self) -> Result<&mut T, ResourceError> {
        self.get_mut(ResourceType::of::<T>())
    }
}

impl fmt::Debug for ResourceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceMap")
            .field("resources", &self.types())
            .field("revision", &self.revision)
            .finish()
    }
}
