//! Resource model: types, identities and the resource document itself.
//!
//! A [`Resource`] is one instance of a versioned custom resource. Its schema
//! is identified by a [`ResourceType`] (group, version, kind); its place in
//! the store by a [`ResourceIdentity`] (namespace, name).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error parsing a resource type or identity from its string form.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Resource type is not of the form `group/version/Kind` or `version/Kind`.
    #[error("invalid resource type '{0}': expected group/version/Kind")]
    InvalidType(String),

    /// Identity is not of the form `namespace/name` or `name`.
    #[error("invalid resource identity '{0}': expected namespace/name")]
    InvalidIdentity(String),
}

/// Version-independent key for a resource kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKind {
    #[serde(default)]
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    pub fn new(group: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

/// The (group, version, kind) triple identifying a resource's schema.
///
/// Serialized as `group/version/Kind` (or `version/Kind` for the core group).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceType {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl ResourceType {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    pub fn group_kind(&self) -> GroupKind {
        GroupKind::new(self.group.clone(), self.kind.clone())
    }

    /// The `apiVersion` string for this type.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Same type at a different version.
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self {
            group: self.group.clone(),
            version: version.into(),
            kind: self.kind.clone(),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.kind)
    }
}

impl FromStr for ResourceType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        let (group, version, kind) = match parts.as_slice() {
            [group, version, kind] => (*group, *version, *kind),
            [version, kind] => ("", *version, *kind),
            _ => return Err(ParseError::InvalidType(s.to_string())),
        };
        if version.is_empty() || kind.is_empty() {
            return Err(ParseError::InvalidType(s.to_string()));
        }
        Ok(Self::new(group, version, kind))
    }
}

impl TryFrom<String> for ResourceType {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceType> for String {
    fn from(value: ResourceType) -> Self {
        value.to_string()
    }
}

/// Unique key of a resource within a plan.
///
/// An empty namespace means the resource is cluster-scoped. Serialized as
/// `namespace/name`, or just `name` when cluster-scoped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceIdentity {
    pub namespace: String,
    pub name: String,
}

impl ResourceIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self::new("", name)
    }

    pub fn is_cluster_scoped(&self) -> bool {
        self.namespace.is_empty()
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

impl FromStr for ResourceIdentity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let identity = match s.split_once('/') {
            Some((namespace, name)) => Self::new(namespace, name),
            None => Self::cluster_scoped(s),
        };
        if identity.name.is_empty() || identity.name.contains('/') {
            return Err(ParseError::InvalidIdentity(s.to_string()));
        }
        Ok(identity)
    }
}

impl TryFrom<String> for ResourceIdentity {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceIdentity> for String {
    fn from(value: ResourceIdentity) -> Self {
        value.to_string()
    }
}

/// Store-managed metadata of a resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    /// Store-assigned unique id; stable across updates.
    #[serde(default)]
    pub uid: String,
    /// Store-assigned concurrency token; changes on every write.
    #[serde(default)]
    pub resource_version: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// One instance of a custom resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub metadata: ObjectMeta,
    #[serde(default = "empty_object")]
    pub spec: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Resource {
    pub fn new(resource_type: ResourceType, identity: ResourceIdentity) -> Self {
        Self {
            resource_type,
            metadata: ObjectMeta {
                namespace: identity.namespace,
                name: identity.name,
                ..Default::default()
            },
            spec: empty_object(),
            status: None,
        }
    }

    pub fn with_spec(mut self, spec: Value) -> Self {
        self.spec = spec;
        self
    }

    pub fn with_status(mut self, status: Value) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.annotations.insert(key.into(), value.into());
        self
    }

    pub fn identity(&self) -> ResourceIdentity {
        ResourceIdentity::new(self.metadata.namespace.clone(), self.metadata.name.clone())
    }

    pub fn group_kind(&self) -> GroupKind {
        self.resource_type.group_kind()
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata.labels.get(key).map(String::as_str)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.get(key).map(String::as_str)
    }

    /// Look up a dotted field path.
    ///
    /// Paths starting with `spec.` or `status.` are resolved against that
    /// section; any other path is resolved relative to `spec`.
    pub fn field(&self, path: &str) -> Option<&Value> {
        if path == "spec" {
            return Some(&self.spec);
        }
        if path == "status" {
            return self.status.as_ref();
        }
        if let Some(rest) = path.strip_prefix("spec.") {
            return lookup_path(&self.spec, rest);
        }
        if let Some(rest) = path.strip_prefix("status.") {
            return self.status.as_ref().and_then(|s| lookup_path(s, rest));
        }
        lookup_path(&self.spec, path)
    }

    /// Serialized size in bytes, used as a cost estimate.
    pub fn estimated_size(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

/// Walk a dotted path through nested JSON objects.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

/// Remove the value at a dotted path, returning it.
pub fn take_path(value: &mut Value, path: &str) -> Option<Value> {
    let (parent, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (lookup_path_mut(value, parent)?, leaf),
        None => (value, path),
    };
    parent.as_object_mut()?.remove(leaf)
}

/// Insert a value at a dotted path, creating intermediate objects.
pub fn insert_path(value: &mut Value, path: &str, new_value: Value) -> bool {
    let mut current = value;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let Some(map) = current.as_object_mut() else {
            return false;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), new_value);
            return true;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    false
}

fn lookup_path_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| current.as_object_mut()?.get_mut(segment))
}
