use crate::error::MigrateError;
use crate::models::{CollectionPath, Decision, FieldChange, Mutation, Record, SkipReason};
use crate::runner::{BatchRunner, RunOptions, RunSummary};
use crate::store::DocumentStore;

/// Elimina un campo obsoleto solo cuando su reemplazo ya tiene valor
#[derive(Debug, Clone)]
pub struct FieldRemoval {
    pub collection: CollectionPath,
    pub obsolete: String,
    pub replacement: String,
}

impl Default for FieldRemoval {
    fn default() -> Self {
        Self {
            collection: CollectionPath::root("alquileres"),
            obsolete: "conduce_url".into(),
            replacement: "conduce_storage_path".into(),
        }
    }
}

impl FieldRemoval {
    pub fn decide(&self, record: &Record) -> Decision {
        if !record.contains(&self.obsolete) {
            return Decision::Skip(SkipReason::AlreadyMigrated);
        }
        if !record.has_value(&self.replacement) {
            return Decision::Skip(SkipReason::MissingReplacement {
                field: self.replacement.clone(),
            });
        }
        Decision::Apply(Mutation::update(
            self.collection.doc(record.id.clone()),
            [(self.obsolete.clone(), FieldChange::Delete)],
        ))
    }
}

pub fn remove_obsolete_field<S: DocumentStore + ?Sized>(
    store: &mut S,
    plan: &FieldRemoval,
    options: RunOptions,
) -> Result<RunSummary, MigrateError> {
    let docs = store
        .stream(&plan.collection, None)
        .map_err(MigrateError::Read)?;
    let label = format!("limpieza {}.{}", plan.collection, plan.obsolete);
    BatchRunner::new(store, label, options).run(docs, |record| plan.decide(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Fields;
    use crate::store::MemoryDocumentStore;
    use serde_json::{json, Value};

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn only_obsolete_field_is_left_alone() {
        let decision = FieldRemoval::default().decide(&Record::new(
            "a1",
            fields(json!({"conduce_url": "https://x/conduces/1.jpg"})),
        ));
        assert_eq!(
            decision,
            Decision::Skip(SkipReason::MissingReplacement {
                field: "conduce_storage_path".into()
            })
        );

        let empty_replacement = FieldRemoval::default().decide(&Record::new(
            "a2",
            fields(json!({"conduce_url": "u", "conduce_storage_path": ""})),
        ));
        assert!(matches!(empty_replacement, Decision::Skip(SkipReason::MissingReplacement { .. })));
    }

    #[test]
    fn clean_documents_are_skipped() {
        let decision = FieldRemoval::default().decide(&Record::new(
            "a1",
            fields(json!({"conduce_storage_path": "conduces/2025/11/00620.jpeg"})),
        ));
        assert_eq!(decision, Decision::Skip(SkipReason::AlreadyMigrated));
    }

    #[test]
    fn removes_only_the_obsolete_field() {
        let alquileres = CollectionPath::root("alquileres");
        let mut store = MemoryDocumentStore::with_documents([
            (
                alquileres.doc("a1"),
                fields(json!({
                    "conduce_url": "https://x/conduces/1.jpg",
                    "conduce_storage_path": "conduces/2025/11/1.jpg",
                    "monto": 50
                })),
            ),
            (alquileres.doc("a2"), fields(json!({"conduce_url": "https://x/conduces/2.jpg"}))),
        ]);

        let summary =
            remove_obsolete_field(&mut store, &FieldRemoval::default(), RunOptions::default()).unwrap();
        assert_eq!(summary.applied, 1);
        assert!(summary.is_balanced());

        assert_eq!(
            store.get(&alquileres.doc("a1")),
            Some(&fields(json!({"conduce_storage_path": "conduces/2025/11/1.jpg", "monto": 50})))
        );
        assert_eq!(
            store.get(&alquileres.doc("a2")),
            Some(&fields(json!({"conduce_url": "https://x/conduces/2.jpg"})))
        );
    }
}
