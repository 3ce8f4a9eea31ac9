//! Conversion seam between schema versions.
//!
//! The executor and optimizer only depend on the [`Converter`] trait. The
//! shipped [`FieldMappingConverter`] covers the common case of renamed and
//! dropped spec fields.

use crate::resource::{insert_path, take_path, Resource, ResourceIdentity, ResourceType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by a converter.
#[derive(Debug, Clone, Error)]
pub enum ConversionError {
    /// The converter has no mapping between these types.
    #[error("no conversion from {from} to {to}")]
    Unsupported { from: ResourceType, to: ResourceType },

    /// The source document cannot be converted.
    #[error("cannot convert {identity}: {reason}")]
    Failed {
        identity: ResourceIdentity,
        reason: String,
    },
}

/// Estimated impact of fields that do not survive a conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataLossEstimate {
    /// Dotted paths of source fields with no target counterpart.
    pub lost_fields: Vec<String>,
    pub description: String,
}

impl DataLossEstimate {
    pub fn is_empty(&self) -> bool {
        self.lost_fields.is_empty()
    }
}

/// Output of one conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversion {
    pub resource: Resource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_loss: Option<DataLossEstimate>,
}

impl Conversion {
    pub fn lossless(resource: Resource) -> Self {
        Self {
            resource,
            data_loss: None,
        }
    }
}

/// Converts one resource from its current schema to a target schema.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(
        &self,
        source: &Resource,
        target: &ResourceType,
    ) -> Result<Conversion, ConversionError>;
}

/// A single spec rewrite applied by [`FieldMappingConverter`].
#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldMapping {
    Rename { from: String, to: String },
    Drop(String),
}

/// Converter applying a fixed list of spec field renames and drops.
///
/// Metadata and status are carried over unchanged; the resource type is
/// replaced by the target type.
#[derive(Debug, Clone)]
pub struct FieldMappingConverter {
    source: ResourceType,
    target: ResourceType,
    mappings: Vec<FieldMapping>,
}

impl FieldMappingConverter {
    pub fn new(source: ResourceType, target: ResourceType) -> Self {
        Self {
            source,
            target,
            mappings: Vec::new(),
        }
    }

    /// Move the value at `from` to `to` (dotted spec paths).
    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.mappings.push(FieldMapping::Rename {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Remove the value at `path`; reported as data loss when present.
    pub fn drop_field(mut self, path: impl Into<String>) -> Self {
        self.mappings.push(FieldMapping::Drop(path.into()));
        self
    }

    pub fn source(&self) -> &ResourceType {
        &self.source
    }

    pub fn target(&self) -> &ResourceType {
        &self.target
    }
}

#[async_trait]
impl Converter for FieldMappingConverter {
    async fn convert(
        &self,
        source: &Resource,
        target: &ResourceType,
    ) -> Result<Conversion, ConversionError> {
        if source.resource_type != self.source || *target != self.target {
            return Err(ConversionError::Unsupported {
                from: source.resource_type.clone(),
                to: target.clone(),
            });
        }
        if !source.spec.is_object() {
            return Err(ConversionError::Failed {
                identity: source.identity(),
                reason: "spec is not an object".to_string(),
            });
        }

        let mut converted = source.clone();
        converted.resource_type = target.clone();
        let mut lost_fields = Vec::new();

        for mapping in &self.mappings {
            match mapping {
                FieldMapping::Rename { from, to } => {
                    if let Some(value) = take_path(&mut converted.spec, from) {
                        if !insert_path(&mut converted.spec, to, value) {
                            return Err(ConversionError::Failed {
                                identity: source.identity(),
                                reason: format!("cannot write field '{to}'"),
                            });
                        }
                    }
                }
                FieldMapping::Drop(path) => {
                    if take_path(&mut converted.spec, path).is_some() {
                        lost_fields.push(format!("spec.{path}"));
                    }
                }
            }
        }

        let data_loss = (!lost_fields.is_empty()).then(|| DataLossEstimate {
            description: format!("{} field(s) have no equivalent in {}", lost_fields.len(), target),
            lost_fields,
        });

        Ok(Conversion {
            resource: converted,
            data_loss,
        })
    }
}
