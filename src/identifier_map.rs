//! Bridge between SQLite numeric ids and document-store ids through the
//! entity name both stores share.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::{info, warn};

use crate::error::MigrateError;
use crate::models::{CollectionPath, Record};
use crate::source::SqliteSource;
use crate::store::{DocumentStore, FieldFilter};

/// Where each side of the map is read from
#[derive(Debug, Clone)]
pub struct MapSources {
    pub table: String,
    pub collection: CollectionPath,
    pub name_field: String,
    pub kind_field: String,
    pub kind: String,
    pub project_id: Option<i64>,
}

impl MapSources {
    /// Clientes: `equipos_entidades` ↔ `entidades`, `tipo = 'Cliente'`
    pub fn clients() -> Self {
        Self {
            table: "equipos_entidades".into(),
            collection: CollectionPath::root("entidades"),
            name_field: "nombre".into(),
            kind_field: "tipo".into(),
            kind: "Cliente".into(),
            project_id: None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Resolution<'a> {
    Resolved(&'a str),
    UnknownSourceId(i64),
    UnknownName(&'a str),
}

/// Built once per run; read-only afterwards
#[derive(Debug, Clone, Default)]
pub struct IdentifierMap {
    source_to_name: HashMap<i64, String>,
    name_to_target: HashMap<String, String>,
    target_ids: HashSet<String>,
}

impl IdentifierMap {
    pub fn from_pairs<A, B>(source_names: A, target_ids: B) -> Self
    where
        A: IntoIterator<Item = (i64, String)>,
        B: IntoIterator<Item = (String, String)>,
    {
        let source_to_name: HashMap<i64, String> = source_names.into_iter().collect();
        let name_to_target: HashMap<String, String> = target_ids.into_iter().collect();
        let target_ids = name_to_target.values().cloned().collect();
        Self {
            source_to_name,
            name_to_target,
            target_ids,
        }
    }

    /// Full scan of both stores
    pub fn build<S: DocumentStore + ?Sized>(
        source: &SqliteSource,
        store: &S,
        sources: &MapSources,
    ) -> Result<Self, MigrateError> {
        let mut rows = source.fetch_table(
            &sources.table,
            Some(&FieldFilter::eq(sources.kind_field.clone(), sources.kind.clone())),
        )?;
        if let Some(project) = sources.project_id {
            rows.retain(|row| row.get("proyecto_id").and_then(Value::as_i64) == Some(project));
        }
        let source_names: Vec<(i64, String)> = rows
            .iter()
            .filter_map(|row| {
                let id = row.get("id").and_then(Value::as_i64)?;
                let name = row.get(&sources.name_field).and_then(Value::as_str)?;
                Some((id, name.to_string()))
            })
            .collect();

        let docs = store
            .stream(
                &sources.collection,
                Some(&FieldFilter::eq(sources.kind_field.clone(), sources.kind.clone())),
            )
            .map_err(MigrateError::Read)?;
        let mut map = Self::from_pairs(source_names, name_index(&docs, &sources.name_field));
        // Todo documento existente es un id válido, aunque su nombre esté repetido
        map.target_ids.extend(docs.into_iter().map(|doc| doc.id));
        info!(
            "{} en SQLite ({}): {} | en el store ({}): {} nombres, {} documentos",
            sources.kind,
            sources.table,
            map.source_len(),
            sources.collection,
            map.target_len(),
            map.target_ids.len()
        );

        Ok(map)
    }

    pub fn is_target_id(&self, id: &str) -> bool {
        self.target_ids.contains(id)
    }

    pub fn resolve(&self, source_id: i64) -> Resolution<'_> {
        let Some(name) = self.source_to_name.get(&source_id) else {
            return Resolution::UnknownSourceId(source_id);
        };
        match self.name_to_target.get(name) {
            Some(target) => Resolution::Resolved(target),
            None => Resolution::UnknownName(name),
        }
    }

    pub fn source_len(&self) -> usize {
        self.source_to_name.len()
    }

    pub fn target_len(&self) -> usize {
        self.name_to_target.len()
    }
}

/// name → doc id; documents without a name are ignored, the last
/// duplicate wins
fn name_index(docs: &[Record], name_field: &str) -> Vec<(String, String)> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    let mut index = Vec::new();
    for doc in docs {
        let Some(name) = doc.get(name_field).and_then(Value::as_str).filter(|n| !n.is_empty()) else {
            continue;
        };
        if let Some(previous) = seen.insert(name, doc.id.as_str()) {
            warn!("Nombre '{}' repetido en el store ({} y {})", name, previous, doc.id);
        }
        index.push((name.to_string(), doc.id.clone()));
    }
    index
}
