//! Fact Query Interface.
//!
//! The agents only ever see [`FactQuery`]: a read-only view over a store
//! of typed entities, their attributes, and the relations between them.
//! [`SqliteFactStore`] is the bundled implementation.

pub mod seed;
pub mod sqlite;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::FactError;

pub use seed::{FactSeed, SeedEntity, SeedRelation};
pub use sqlite::SqliteFactStore;

/// Default database location, relative to the working directory.
pub const DEFAULT_DB_PATH: &str = ".pvkg/facts.db";

/// A row returned by [`FactQuery::raw_query`], keyed by column name.
pub type QueryRow = serde_json::Map<String, serde_json::Value>;

/// A typed record in the fact base.
///
/// Names are unique within an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity name.
    pub name: String,
    /// Type tag (e.g. `"Absorber"`).
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Literal attributes (e.g. `bandgap_eV → 1.55`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

/// One relation or attribute of an entity.
///
/// Exactly one of `target_name` / `literal_value` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDetail {
    /// Relation or attribute name.
    pub relation: String,
    /// Name of the related entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    /// Literal attribute value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literal_value: Option<String>,
}

impl EntityDetail {
    /// Returns the object side of the detail, whichever form it takes.
    #[must_use]
    pub fn object(&self) -> Option<&str> {
        self.target_name
            .as_deref()
            .or(self.literal_value.as_deref())
            .filter(|s| !s.is_empty())
    }
}

/// A `(subject, relation, object)` fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    /// Subject entity name.
    pub subject: String,
    /// Relation label.
    pub relation: String,
    /// Object entity name or literal.
    pub object: String,
}

/// Absorber material with its key optical properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbsorberRow {
    /// Material name.
    pub name: String,
    /// Description.
    pub description: Option<String>,
    /// Bandgap in eV.
    pub bandgap_ev: Option<f64>,
    /// Crystal structure.
    pub crystal_structure: Option<String>,
}

/// Cell architecture with its record power conversion efficiency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureRow {
    /// Architecture name.
    pub name: String,
    /// Description.
    pub description: Option<String>,
    /// Record efficiency in percent.
    pub record_efficiency_pct: Option<f64>,
}

/// A defect and one performance metric it affects.
///
/// Defects affecting several metrics produce one row per metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefectImpactRow {
    /// Defect name.
    pub defect: String,
    /// Defect description.
    pub description: Option<String>,
    /// Affected metric, if any.
    pub metric: Option<String>,
}

/// Aggregate counts over the fact base.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactSummary {
    /// Entities + attributes + relations.
    pub total_facts: usize,
    /// Number of entities.
    pub entity_count: usize,
    /// Number of relations.
    pub relation_count: usize,
    /// Entity count per type, sorted by type name.
    pub by_type: BTreeMap<String, usize>,
}

/// Read-only access to the fact base.
///
/// Every operation must be safe to call repeatedly and return identical
/// results while the underlying data is unchanged.
pub trait FactQuery: Send + Sync {
    /// Lists entities, optionally restricted to one type.
    fn list_entities(&self, type_filter: Option<&str>) -> Result<Vec<Entity>, FactError>;

    /// Returns every attribute and relation of the named entity.
    fn entity_details(&self, name: &str) -> Result<Vec<EntityDetail>, FactError>;

    /// Case-insensitive search over entity names and descriptions.
    fn search_by_keyword(&self, keyword: &str) -> Result<Vec<Entity>, FactError>;

    /// Absorber materials ordered by bandgap.
    fn absorbers(&self) -> Result<Vec<AbsorberRow>, FactError>;

    /// Cell architectures ordered by record efficiency, best first.
    fn architectures(&self) -> Result<Vec<ArchitectureRow>, FactError>;

    /// Defects with the metrics they affect.
    fn defects_with_impacts(&self) -> Result<Vec<DefectImpactRow>, FactError>;

    /// All entity-to-entity relations.
    fn relationships(&self) -> Result<Vec<Triple>, FactError>;

    /// Aggregate counts.
    fn summary(&self) -> Result<FactSummary, FactError>;

    /// Runs a read-only query in the store's native language, returning at
    /// most `max_rows` rows.
    fn raw_query(&self, query: &str, max_rows: usize) -> Result<Vec<QueryRow>, FactError>;
}
