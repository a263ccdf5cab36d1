//! Attach catalog entities to records in place of raw ids.
//!
//! Enrichment never fails: an id missing from its catalog either disappears
//! (hashtag authors), stays raw (blog `author_id`, author roles) or is dropped
//! from its list (badges), with a [`Diagnostic`] where the loss matters.

use postmill_core::{Diagnostic, Record};
use serde_json::Value;
use tracing::{debug, warn};

use crate::catalog::{Catalog, RoleBadgeCatalog};

pub const AUTHOR_ID_FIELD: &str = "author_id";
pub const AUTHOR_FIELD: &str = "author";
pub const ROLE_FIELD: &str = "roles";
pub const BADGES_FIELD: &str = "badges";

/// What happens to an `author_id` placeholder the catalog cannot resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unresolved {
    Drop,
    KeepRaw,
}

/// Replace `author_id` with the full `author` entity, keeping its position.
pub fn resolve_author(mut record: Record, authors: &dyn Catalog, unresolved: Unresolved) -> Record {
    let Some(id) = record
        .get(AUTHOR_ID_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string)
    else {
        return record;
    };

    match authors.lookup(&id) {
        Some(entity) => replace_entry(record, AUTHOR_ID_FIELD, AUTHOR_FIELD, entity.clone()),
        None => {
            debug!(author_id = %id, catalog = authors.name(), "author not in catalog");
            if unresolved == Unresolved::Drop {
                record.retain(|key, _| key != AUTHOR_ID_FIELD);
            }
            record
        }
    }
}

fn replace_entry(record: Record, old_key: &str, new_key: &str, value: Value) -> Record {
    let mut value = Some(value);
    record
        .into_iter()
        .filter_map(|(key, current)| {
            if key == old_key {
                value.take().map(|v| (new_key.to_string(), v))
            } else if key == new_key {
                None
            } else {
                Some((key, current))
            }
        })
        .collect()
}

/// Id carried by a raw reference: a non-empty string or number, or an already
/// resolved entity's `id` so a second pass refreshes it.
fn reference_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.trim().is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        Value::Object(entity) => entity.get("id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn unresolved(catalog: &dyn Catalog, id: String) -> Diagnostic {
    warn!(id = %id, catalog = catalog.name(), "id not found in catalog");
    Diagnostic::UnresolvedReference {
        catalog: catalog.name().to_string(),
        id,
    }
}

/// Resolve an author's single role id and ordered badge ids.
pub fn resolve_roles_and_badges(mut record: Record, catalog: &RoleBadgeCatalog) -> (Record, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();

    if let Some(role) = record.get_mut(ROLE_FIELD) {
        if let Some(id) = reference_id(role) {
            match catalog.roles.lookup(&id) {
                Some(entity) => *role = entity.clone(),
                None => diagnostics.push(unresolved(&catalog.roles, id)),
            }
        }
    }

    if let Some(Value::Array(badges)) = record.get_mut(BADGES_FIELD) {
        let mut resolved = Vec::with_capacity(badges.len());
        for badge in badges.iter() {
            let Some(id) = reference_id(badge) else {
                debug!(badge = %badge, "badge entry carries no id, dropped");
                continue;
            };
            match catalog.badges.lookup(&id) {
                Some(entity) => resolved.push(entity.clone()),
                None => diagnostics.push(unresolved(&catalog.badges, id)),
            }
        }
        *badges = resolved;
    }

    (record, diagnostics)
}
