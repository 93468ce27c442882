//! Domain model shared by every stage of the retrieval pipeline.
//!
//! These mirror `spec.md §3` ("Data model"): entities, areas, devices, clusters and
//! documents are owned by external ingestion (out of scope) and read-only within the
//! core; the types here are the read-side view the pipeline operates over.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A controllable or observable object in the home.
///
/// Identity is `entity_id`; `domain.slug` by convention (e.g. `sensor.kert_humidity`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    /// Globally unique identifier, `domain.slug`.
    pub entity_id: String,
    /// Domain portion of the id (e.g. `sensor`, `light`, `climate`).
    pub domain: String,
    /// Device class for sensors (e.g. `temperature`, `humidity`).
    pub device_class: Option<String>,
    /// Area the entity belongs to, inherited from its device if absent here.
    pub area: Option<String>,
    /// Human-friendly display name.
    pub friendly_name: Option<String>,
    /// The device this entity belongs to, if any (used to traverse
    /// `device_has_manual` edges for manual hints).
    pub device_id: Option<String>,
    /// Prose description used for lexical search and reranker input; may embed aliases.
    pub text: String,
    /// Fixed-dimension embedding vector.
    pub embedding: Vec<f32>,
    /// Opaque ingestion-time attributes.
    #[serde(default)]
    pub attributes: serde_json::Value,
    /// Current live state, if known at retrieval time.
    pub state: Option<EntityState>,
}

impl Entity {
    /// `describe()` concatenates the fields the reranker's cross-encoder sees.
    ///
    /// `entity_id | friendly_name | "terület: "+area | domain[+device_class] | text`
    #[must_use]
    pub fn describe(&self) -> String {
        let mut parts = vec![self.entity_id.clone()];
        if let Some(name) = &self.friendly_name {
            parts.push(name.clone());
        }
        if let Some(area) = &self.area {
            parts.push(format!("terület: {area}"));
        }
        let domain_part = match &self.device_class {
            Some(dc) => format!("{}+{}", self.domain, dc),
            None => self.domain.clone(),
        };
        parts.push(domain_part);
        parts.push(self.text.clone());
        parts.join("|")
    }
}

/// Live state snapshot for an entity, sourced from the live-state service or a
/// preferred time-series store (`spec.md §6.2`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityState {
    /// Raw state string (e.g. `"22.5"`, `"on"`).
    pub state: String,
    /// Unit of measurement, if any.
    pub unit: Option<String>,
    /// Additional attributes reported alongside state.
    #[serde(default)]
    pub attributes: serde_json::Value,
}

/// A named room or zone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Area {
    /// Stable area identifier (e.g. `kert`).
    pub area_id: String,
    /// Display name.
    pub name: String,
    /// Alternate names/spellings used for natural-language matching.
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// A physical device that may own one or more entities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    /// Stable device identifier.
    pub device_id: String,
    /// Area the device is installed in, if known.
    pub area_id: Option<String>,
    /// Manufacturer name.
    pub manufacturer: Option<String>,
    /// Model name.
    pub model: Option<String>,
    /// Display name.
    pub name: Option<String>,
}

/// Kind of precomputed semantic cluster, selected per scope (`spec.md §4.5`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterType {
    /// A cluster anchored on one specific entity.
    Specific,
    /// A cluster grouping entities belonging to one device.
    Device,
    /// A cluster grouping entities belonging to one area.
    Area,
    /// A cluster grouping entities of one domain.
    Domain,
    /// A cluster of climate-control entities (temperature/humidity/thermostat).
    Climate,
    /// A house-wide overview cluster.
    Overview,
}

/// One membership edge from a [`Cluster`] to an [`Entity`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterMember {
    /// Member entity id.
    pub entity_id: String,
    /// Role this entity plays within the cluster (e.g. `"primary"`, `"related"`).
    pub role: String,
    /// Static membership weight.
    pub weight: f32,
    /// Additional contextual boost applied when this membership is used.
    pub context_boost: f32,
}

/// A precomputed semantic grouping of entities with roles and boost metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cluster {
    /// Cluster key (`_key` in the underlying graph store).
    pub key: String,
    /// Cluster kind, used to select candidate cluster types per scope.
    pub cluster_type: ClusterType,
    /// Embedding vector summarizing the cluster's members.
    pub embedding: Vec<f32>,
    /// Membership edges.
    pub members: Vec<ClusterMember>,
}

/// A manual/document hint linked to a device via a `device_has_manual` edge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Stable document identifier.
    pub document_id: String,
    /// Document text.
    pub text: String,
    /// Embedding vector over `text`.
    pub embedding: Vec<f32>,
    /// Device this document is a manual for.
    pub device_id: String,
}

/// Retrieval width policy (`spec.md` Glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Scope {
    /// Few, precise results for a single-entity action.
    Micro,
    /// Area-scoped results.
    Macro,
    /// House-wide results.
    Overview,
}

impl Scope {
    /// Widen one step, per the workflow engine's retry-broaden strategy (`spec.md §4.1`).
    #[must_use]
    pub const fn widen(self) -> Self {
        match self {
            Self::Micro => Self::Macro,
            Self::Macro | Self::Overview => Self::Overview,
        }
    }
}

/// Coarse user intent: are they trying to change something, or learn its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// The user wants to actuate a device.
    Control,
    /// The user wants to read a value.
    #[default]
    Read,
}

/// Map of domain name (or synthetic cluster types) to free-form metadata, used
/// wherever the pipeline needs to pass opaque per-candidate annotations around.
pub type AttributeMap = HashMap<String, serde_json::Value>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entity() -> Entity {
        Entity {
            entity_id: "sensor.kert_humidity".to_string(),
            domain: "sensor".to_string(),
            device_class: Some("humidity".to_string()),
            area: Some("kert".to_string()),
            friendly_name: Some("Kert páratartalom".to_string()),
            device_id: Some("device.kert_szenzor".to_string()),
            text: "Kerti páratartalom szenzor".to_string(),
            embedding: vec![0.1, 0.2, 0.3],
            attributes: serde_json::Value::Null,
            state: None,
        }
    }

    #[test]
    fn describe_concatenates_fields_in_order() {
        let entity = sample_entity();
        let described = entity.describe();
        assert_eq!(
            described,
            "sensor.kert_humidity|Kert páratartalom|terület: kert|sensor+humidity|Kerti páratartalom szenzor"
        );
    }

    #[test]
    fn describe_without_device_class_omits_plus() {
        let mut entity = sample_entity();
        entity.device_class = None;
        assert!(entity.describe().contains("|sensor|"));
    }

    #[test]
    fn scope_widens_monotonically_to_overview() {
        assert_eq!(Scope::Micro.widen(), Scope::Macro);
        assert_eq!(Scope::Macro.widen(), Scope::Overview);
        assert_eq!(Scope::Overview.widen(), Scope::Overview);
    }
}
