//! JSON seed format used to populate a fact store.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::FactError;

/// A complete fact base snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactSeed {
    /// Entities to create.
    #[serde(default)]
    pub entities: Vec<SeedEntity>,
    /// Relations between entities, by name.
    #[serde(default)]
    pub relations: Vec<SeedRelation>,
}

/// An entity in a seed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedEntity {
    /// Entity name.
    pub name: String,
    /// Type tag.
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Literal attributes. Numbers and booleans are stored as text.
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

/// A relation in a seed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRelation {
    /// Subject entity name.
    pub subject: String,
    /// Relation label.
    pub predicate: String,
    /// Object entity name.
    pub object: String,
}

impl FactSeed {
    /// Reads and parses a seed file.
    pub fn from_path(path: &Path) -> Result<Self, FactError> {
        let text = std::fs::read_to_string(path).map_err(|e| FactError::Seed {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::from_json(&text)
    }

    /// Parses a seed from JSON text and checks it for duplicate entities.
    pub fn from_json(text: &str) -> Result<Self, FactError> {
        let seed: Self = serde_json::from_str(text).map_err(|e| FactError::Seed {
            message: e.to_string(),
        })?;
        seed.validate()?;
        Ok(seed)
    }

    fn validate(&self) -> Result<(), FactError> {
        let mut seen = std::collections::HashSet::new();
        for entity in &self.entities {
            if entity.name.trim().is_empty() {
                return Err(FactError::Seed {
                    message: "entity with empty name".to_string(),
                });
            }
            if !seen.insert((entity.entity_type.as_str(), entity.name.as_str())) {
                return Err(FactError::Seed {
                    message: format!(
                        "duplicate entity '{}' of type {}",
                        entity.name, entity.entity_type
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Renders a seed attribute value as stored text.
pub(crate) fn attribute_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seed() {
        let seed = FactSeed::from_json(
            r#"{
                "entities": [
                    {"name": "MAPbI3", "type": "Absorber", "attributes": {"bandgap_eV": 1.55}}
                ],
                "relations": []
            }"#,
        )
        .unwrap_or_default();
        assert_eq!(seed.entities.len(), 1);
        assert_eq!(
            attribute_text(&seed.entities[0].attributes["bandgap_eV"]),
            "1.55"
        );
    }

    #[test]
    fn test_duplicate_entity_rejected() {
        let result = FactSeed::from_json(
            r#"{"entities": [
                {"name": "ITO", "type": "Electrode"},
                {"name": "ITO", "type": "Electrode"}
            ]}"#,
        );
        assert!(matches!(result, Err(FactError::Seed { .. })));
    }

    #[test]
    fn test_same_name_different_type_allowed() {
        let result = FactSeed::from_json(
            r#"{"entities": [
                {"name": "Silicon", "type": "Absorber"},
                {"name": "Silicon", "type": "Semiconductor"}
            ]}"#,
        );
        assert!(result.is_ok());
    }
}
