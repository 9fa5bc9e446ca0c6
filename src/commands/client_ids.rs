//! Corrige `cliente_id` en abonos: del id numérico de SQLite al id del
//! documento de la entidad en el store.

use serde_json::Value;
use tracing::warn;

use crate::error::MigrateError;
use crate::identifier_map::{IdentifierMap, MapSources, Resolution};
use crate::models::{CollectionPath, Decision, FieldChange, Mutation, Record, SkipReason};
use crate::runner::{BatchRunner, RunOptions, RunSummary};
use crate::source::SqliteSource;
use crate::store::DocumentStore;

#[derive(Debug, Clone)]
pub struct ClientIdFix {
    pub collection: CollectionPath,
    pub field: String,
}

impl Default for ClientIdFix {
    fn default() -> Self {
        Self {
            collection: CollectionPath::root("abonos"),
            field: "cliente_id".into(),
        }
    }
}

/// Id numérico de SQLite: entero o string con un entero
fn numeric_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl ClientIdFix {
    pub fn decide(&self, record: &Record, map: &IdentifierMap) -> Decision {
        let current = match record.get(&self.field) {
            None | Some(Value::Null) => return self.missing(),
            Some(Value::String(s)) if s.trim().is_empty() => return self.missing(),
            Some(value) => value,
        };

        if let Some(id) = current.as_str() {
            if map.is_target_id(id) {
                return Decision::Skip(SkipReason::AlreadyMigrated);
            }
        }

        let Some(source_id) = numeric_id(current) else {
            return Decision::Skip(SkipReason::NoMapping {
                detail: format!("{}={} is neither a known entity id nor numeric", self.field, current),
            });
        };

        match map.resolve(source_id) {
            Resolution::Resolved(target) => {
                if current.as_str() == Some(target) {
                    return Decision::Skip(SkipReason::AlreadyMigrated);
                }
                Decision::Apply(Mutation::update(
                    self.collection.doc(record.id.clone()),
                    [(self.field.clone(), FieldChange::Set(Value::from(target)))],
                ))
            }
            Resolution::UnknownSourceId(id) => {
                warn!("Abono {}: {}={} no encontrado en SQLite.", record.id, self.field, id);
                Decision::Skip(SkipReason::NoMapping {
                    detail: format!("sqlite id {} not found", id),
                })
            }
            Resolution::UnknownName(name) => {
                warn!(
                    "Abono {}: nombre '{}' no encontrado en entidades del store.",
                    record.id, name
                );
                Decision::Skip(SkipReason::NoMapping {
                    detail: format!("entity '{}' not found in store", name),
                })
            }
        }
    }

    fn missing(&self) -> Decision {
        Decision::Skip(SkipReason::MissingSourceField {
            field: self.field.clone(),
        })
    }
}

/// Construye el mapa de ids y corrige la colección
pub fn fix_client_ids<S: DocumentStore + ?Sized>(
    source: &SqliteSource,
    store: &mut S,
    sources: &MapSources,
    plan: &ClientIdFix,
    options: RunOptions,
) -> Result<RunSummary, MigrateError> {
    let map = IdentifierMap::build(source, &*store, sources)?;
    let docs = store
        .stream(&plan.collection, None)
        .map_err(MigrateError::Read)?;
    tracing::info!("Abonos encontrados en el store: {}", docs.len());

    let label = format!("{} {}", plan.collection, plan.field);
    BatchRunner::new(store, label, options).run(docs, |record| plan.decide(record, &map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SkipKind;
    use serde_json::json;

    fn map() -> IdentifierMap {
        IdentifierMap::from_pairs(
            [(16, "Juan Perez".to_string()), (17, "Sin Entidad".to_string())],
            [("Juan Perez".to_string(), "abc123".to_string())],
        )
    }

    fn abono(id: &str, cliente_id: Value) -> Record {
        Record::new(id, json!({ "cliente_id": cliente_id, "monto": 100 }).as_object().cloned().unwrap())
    }

    #[test]
    fn numeric_string_is_corrected() {
        let decision = ClientIdFix::default().decide(&abono("ab1", json!("16")), &map());
        assert_eq!(
            decision,
            Decision::Apply(Mutation::update(
                CollectionPath::root("abonos").doc("ab1"),
                [("cliente_id", FieldChange::Set(json!("abc123")))],
            ))
        );
    }

    #[test]
    fn integer_id_is_corrected() {
        let decision = ClientIdFix::default().decide(&abono("ab1", json!(16)), &map());
        assert!(matches!(decision, Decision::Apply(_)));
    }

    #[test]
    fn target_id_is_skipped() {
        assert_eq!(
            ClientIdFix::default().decide(&abono("ab1", json!("abc123")), &map()),
            Decision::Skip(SkipReason::AlreadyMigrated)
        );
    }

    #[test]
    fn unmapped_values_are_skipped_not_failed() {
        let fix = ClientIdFix::default();
        for value in [json!("xyz"), json!("99"), json!(17)] {
            let decision = fix.decide(&abono("ab1", value), &map());
            match decision {
                Decision::Skip(reason) => assert_eq!(reason.kind(), SkipKind::NoMapping),
                other => panic!("expected no-mapping skip, got {other:?}"),
            }
        }
    }

    #[test]
    fn empty_values_are_missing() {
        let fix = ClientIdFix::default();
        for value in [json!(null), json!(""), json!("  ")] {
            assert_eq!(
                fix.decide(&abono("ab1", value), &map()),
                Decision::Skip(SkipReason::MissingSourceField { field: "cliente_id".into() })
            );
        }
        let no_field = Record::new("ab2", Default::default());
        assert!(matches!(
            fix.decide(&no_field, &map()),
            Decision::Skip(SkipReason::MissingSourceField { .. })
        ));
    }

    #[test]
    fn test_numeric_id() {
        // Casos válidos
        assert_eq!(numeric_id(&json!(16)), Some(16));
        assert_eq!(numeric_id(&json!("16")), Some(16));
        assert_eq!(numeric_id(&json!(" 16 ")), Some(16));
        assert_eq!(numeric_id(&json!(16.0)), Some(16));

        // Casos inválidos
        assert_eq!(numeric_id(&json!("abc123")), None);
        assert_eq!(numeric_id(&json!(16.5)), None);
        assert_eq!(numeric_id(&json!(true)), None);
    }
}
