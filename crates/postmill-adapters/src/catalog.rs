//! Read-only reference catalogs (authors, roles, badges) keyed by entity id.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// Lookup capability the enricher needs from any catalog.
pub trait Catalog: Send + Sync {
    fn name(&self) -> &str;
    fn lookup(&self, id: &str) -> Option<&Value>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityCatalog {
    name: String,
    entities: HashMap<String, Value>,
}

/// Catalog files come either as an array of entities or as an `id -> entity` map.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogDocument {
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl EntityCatalog {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entities: HashMap::new(),
        }
    }

    /// Index entities by their string `id`; entities without one are skipped.
    pub fn from_entities(name: impl Into<String>, entities: impl IntoIterator<Item = Value>) -> Self {
        let mut catalog = Self::new(name);
        for entity in entities {
            match entity.get("id").and_then(Value::as_str).map(str::to_string) {
                Some(id) => {
                    catalog.entities.insert(id, entity);
                }
                None => warn!(catalog = %catalog.name, "skipping catalog entity without an id"),
            }
        }
        catalog
    }

    pub fn from_json(name: impl Into<String>, document: Value) -> Result<Self> {
        let name = name.into();
        let document: CatalogDocument = serde_json::from_value(document)
            .with_context(|| format!("{name} catalog is neither a list nor an id map"))?;
        Ok(match document {
            CatalogDocument::List(entities) => Self::from_entities(name, entities),
            CatalogDocument::Map(map) => Self {
                name,
                entities: map.into_iter().collect(),
            },
        })
    }

    pub async fn load(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(name, read_json_value(path.as_ref()).await?)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl Catalog for EntityCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, id: &str) -> Option<&Value> {
        self.entities.get(id)
    }
}

#[derive(Debug, Deserialize)]
struct RolesAndBadgesFile {
    #[serde(default)]
    roles: Vec<Value>,
    /// Badges grouped by category; the grouping is irrelevant for lookup.
    #[serde(default)]
    badges: BTreeMap<String, Vec<Value>>,
}

/// The two-level `{roles: [...], badges: {category: [...]}}` catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoleBadgeCatalog {
    pub roles: EntityCatalog,
    pub badges: EntityCatalog,
}

impl RoleBadgeCatalog {
    pub fn from_json(document: Value) -> Result<Self> {
        let file: RolesAndBadgesFile =
            serde_json::from_value(document).context("parsing roles and badges catalog")?;
        Ok(Self {
            roles: EntityCatalog::from_entities("roles", file.roles),
            badges: EntityCatalog::from_entities("badges", file.badges.into_values().flatten()),
        })
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(read_json_value(path.as_ref()).await?)
    }
}

async fn read_json_value(path: &Path) -> Result<Value> {
    let data = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn author_catalog_accepts_list_or_map() {
        let list = EntityCatalog::from_json(
            "authors",
            json!([{"id": "A007", "name": "Jane"}, {"name": "no id"}]),
        )
        .unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.lookup("A007"), Some(&json!({"id": "A007", "name": "Jane"})));

        let map = EntityCatalog::from_json("authors", json!({"A007": {"id": "A007", "name": "Jane"}}))
            .unwrap();
        assert_eq!(map.lookup("A007").unwrap()["name"], "Jane");
        assert_eq!(map.lookup("a007"), None);
    }

    #[test]
    fn scalar_document_is_rejected() {
        assert!(EntityCatalog::from_json("authors", json!("nope")).is_err());
    }

    #[test]
    fn badges_are_flattened_across_categories() {
        let catalog = RoleBadgeCatalog::from_json(json!({
            "roles": [{"id": "R1", "name": "Maintainer"}],
            "badges": {
                "community": [{"id": "B1", "name": "Helper"}],
                "skills": [{"id": "B2", "name": "RTOS"}, {"id": "B3", "name": "PCB"}]
            }
        }))
        .unwrap();
        assert_eq!(catalog.roles.len(), 1);
        assert_eq!(catalog.badges.len(), 3);
        assert_eq!(catalog.badges.lookup("B3").unwrap()["name"], "PCB");
        assert_eq!(catalog.roles.name(), "roles");
    }

    #[tokio::test]
    async fn catalogs_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let authors = dir.path().join("authors.json");
        let roles = dir.path().join("roles.json");
        std::fs::write(&authors, r#"[{"id": "A007", "name": "Jane"}]"#).unwrap();
        std::fs::write(&roles, r#"{"roles": [{"id": "R1"}], "badges": {"core": [{"id": "B1"}]}}"#).unwrap();

        let catalog = EntityCatalog::load("authors", &authors).await.unwrap();
        assert_eq!(catalog.lookup("A007").unwrap()["name"], "Jane");
        let roles = RoleBadgeCatalog::load(&roles).await.unwrap();
        assert_eq!((roles.roles.len(), roles.badges.len()), (1, 1));

        let missing = EntityCatalog::load("authors", dir.path().join("absent.json")).await;
        assert!(missing.unwrap_err().to_string().starts_with("reading "));
    }
}
