//! Resource store abstraction.
//!
//! Objects are keyed by group, kind and identity. The stored version is
//! whatever was last written, so `get` returns the object at its stored
//! version regardless of the version asked for; callers compare
//! `resource_type` to detect objects already at another version.

use crate::resource::{GroupKind, Resource, ResourceIdentity, ResourceType};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Errors returned by a resource store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// No object with this kind and identity.
    #[error("{kind} {identity} not found")]
    NotFound {
        kind: GroupKind,
        identity: ResourceIdentity,
    },

    /// An object with this kind and identity already exists.
    #[error("{kind} {identity} already exists")]
    AlreadyExists {
        kind: GroupKind,
        identity: ResourceIdentity,
    },

    /// The write carried a stale concurrency token.
    #[error("conflict writing {identity}: expected resource version {expected}, found {actual}")]
    Conflict {
        identity: ResourceIdentity,
        expected: String,
        actual: String,
    },

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Any other store failure.
    #[error("store error: {0}")]
    Other(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict { .. } | StoreError::Unavailable(_))
    }
}

/// Access to the external store holding resources.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch one object.
    async fn get(
        &self,
        resource_type: &ResourceType,
        identity: &ResourceIdentity,
    ) -> Result<Resource, StoreError>;

    /// List objects of a kind, optionally restricted to one namespace.
    async fn list(
        &self,
        resource_type: &ResourceType,
        namespace: Option<&str>,
    ) -> Result<Vec<Resource>, StoreError>;

    /// Create a new object. Returns the stored object.
    async fn create(&self, resource: Resource) -> Result<Resource, StoreError>;

    /// Replace an existing object.
    ///
    /// A non-empty `resource_version` is a precondition: it must match the
    /// stored token or the call fails with [`StoreError::Conflict`].
    async fn update(&self, resource: Resource) -> Result<Resource, StoreError>;

    /// Delete an object.
    async fn delete(
        &self,
        resource_type: &ResourceType,
        identity: &ResourceIdentity,
    ) -> Result<(), StoreError>;
}

type StoreKey = (GroupKind, ResourceIdentity);

/// In-memory resource store with optimistic concurrency.
#[derive(Debug, Default)]
pub struct InMemoryResourceStore {
    objects: RwLock<BTreeMap<StoreKey, Resource>>,
    next_version: AtomicU64,
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with the given objects.
    pub fn with_resources(resources: impl IntoIterator<Item = Resource>) -> Self {
        let store = Self::new();
        for resource in resources {
            store.insert(resource);
        }
        store
    }

    /// Insert or overwrite an object without any precondition.
    pub fn insert(&self, mut resource: Resource) -> Resource {
        let key = (resource.group_kind(), resource.identity());
        if resource.metadata.uid.is_empty() {
            resource.metadata.uid = generate_uid(&key);
        }
        resource.metadata.resource_version = self.bump();
        self.objects.write().insert(key, resource.clone());
        resource
    }

    /// All stored objects, ordered by kind and identity.
    pub fn snapshot(&self) -> Vec<Resource> {
        self.objects.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    fn bump(&self) -> String {
        (self.next_version.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }
}

fn generate_uid(key: &StoreKey) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(key.0.to_string().as_bytes());
    hasher.update(b"/");
    hasher.update(key.1.to_string().as_bytes());
    hasher.update(&crate::current_timestamp().to_be_bytes());
    hex::encode(&hasher.finalize().as_bytes()[..16])
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn get(
        &self,
        resource_type: &ResourceType,
        identity: &ResourceIdentity,
    ) -> Result<Resource, StoreError> {
        let key = (resource_type.group_kind(), identity.clone());
        self.objects
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: key.0,
                identity: key.1,
            })
    }

    async fn list(
        &self,
        resource_type: &ResourceType,
        namespace: Option<&str>,
    ) -> Result<Vec<Resource>, StoreError> {
        let kind = resource_type.group_kind();
        Ok(self
            .objects
            .read()
            .iter()
            .filter(|((k, id), _)| *k == kind && namespace.map_or(true, |ns| id.namespace == ns))
            .map(|(_, resource)| resource.clone())
            .collect())
    }

    async fn create(&self, mut resource: Resource) -> Result<Resource, StoreError> {
        let key = (resource.group_kind(), resource.identity());
        let mut objects = self.objects.write();
        if objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: key.0,
                identity: key.1,
            });
        }
        if resource.metadata.uid.is_empty() {
            resource.metadata.uid = generate_uid(&key);
        }
        resource.metadata.resource_version = self.bump();
        objects.insert(key, resource.clone());
        Ok(resource)
    }

    async fn update(&self, mut resource: Resource) -> Result<Resource, StoreError> {
        let key = (resource.group_kind(), resource.identity());
        let mut objects = self.objects.write();
        let Some(existing) = objects.get(&key) else {
            return Err(StoreError::NotFound {
                kind: key.0,
                identity: key.1,
            });
        };

        let expected = &resource.metadata.resource_version;
        if !expected.is_empty() && *expected != existing.metadata.resource_version {
            return Err(StoreError::Conflict {
                identity: key.1,
                expected: expected.clone(),
                actual: existing.metadata.resource_version.clone(),
            });
        }

        resource.metadata.uid = existing.metadata.uid.clone();
        resource.metadata.resource_version = self.bump();
        objects.insert(key, resource.clone());
        Ok(resource)
    }

    async fn delete(
        &self,
        resource_type: &ResourceType,
        identity: &ResourceIdentity,
    ) -> Result<(), StoreError> {
        let key = (resource_type.group_kind(), identity.clone());
        match self.objects.write().remove(&key) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound {
                kind: key.0,
                identity: key.1,
            }),
        }
    }
}
