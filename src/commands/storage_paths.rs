//! Convierte las URLs antiguas de conduces (con token, caducan) en rutas de
//! storage estables. El campo original se conserva.

use percent_encoding::percent_decode_str;
use serde_json::Value;
use url::Url;

use crate::error::MigrateError;
use crate::models::{CollectionPath, Decision, FailReason, FieldChange, Mutation, Record, SkipReason};
use crate::runner::{BatchRunner, RunOptions, RunSummary};
use crate::store::DocumentStore;

/// Campos donde pueden aparecer las URLs de conduces, en orden de prioridad
pub const URL_FIELDS: [&str; 5] = ["conducUrl", "conduce_url", "archivoUrl", "archivo_url", "url_conduce"];

const PREFIX: &str = "conduces/";

/// `.../o/conduces%2F2025%2F11%2F00620.jpeg?alt=media&token=...` o
/// `.../conduces/2025/11/00620.jpeg` → `conduces/2025/11/00620.jpeg`.
///
/// `Ok(None)` cuando el objeto está fuera de `conduces/`; error cuando la URL
/// menciona `conduces/` pero no se puede sacar una ruta de ella.
pub fn extract_storage_path(raw: &str) -> Result<Option<String>, FailReason> {
    let unparseable = || FailReason::UnparseableUrl {
        url: raw.to_string(),
    };
    let path = match Url::parse(raw) {
        Ok(url) => url.path().to_string(),
        // Rutas sin esquema: se corta la query a mano
        Err(_) => raw.split('?').next().unwrap_or_default().to_string(),
    };

    let object = if let Some((_, object)) = path.split_once("/o/") {
        percent_decode_str(object)
            .decode_utf8()
            .map_err(|_| unparseable())?
            .into_owned()
    } else if let Some((_, rest)) = path.split_once("/conduces/") {
        let rest = percent_decode_str(rest).decode_utf8().map_err(|_| unparseable())?;
        format!("{}{}", PREFIX, rest)
    } else if percent_decode_str(raw).decode_utf8_lossy().contains(PREFIX) {
        return Err(unparseable());
    } else {
        return Ok(None);
    };

    let object = object.trim_start_matches('/');
    if !object.starts_with(PREFIX) {
        return Ok(None);
    }
    if object.len() == PREFIX.len() {
        return Err(unparseable());
    }
    Ok(Some(object.to_string()))
}

#[derive(Debug, Clone)]
pub struct StoragePathMigration {
    pub collection: CollectionPath,
    pub target_field: String,
}

impl Default for StoragePathMigration {
    fn default() -> Self {
        Self {
            collection: CollectionPath::root("alquileres"),
            target_field: "conduce_storage_path".into(),
        }
    }
}

impl StoragePathMigration {
    fn legacy_url<'r>(&self, record: &'r Record) -> Option<&'r str> {
        URL_FIELDS
            .iter()
            .filter_map(|field| record.get(field).and_then(Value::as_str))
            .find(|url| !url.is_empty())
    }

    pub fn decide(&self, record: &Record) -> Decision {
        if record.has_value(&self.target_field) {
            return Decision::Skip(SkipReason::AlreadyMigrated);
        }
        let Some(url) = self.legacy_url(record) else {
            return Decision::Skip(SkipReason::MissingSourceField {
                field: URL_FIELDS.join("|"),
            });
        };
        match extract_storage_path(url) {
            Ok(Some(path)) => Decision::Apply(Mutation::update(
                self.collection.doc(record.id.clone()),
                [(self.target_field.clone(), FieldChange::Set(Value::String(path)))],
            )),
            Ok(None) => Decision::Skip(SkipReason::NotApplicable {
                detail: "url does not point to conduces/".into(),
            }),
            Err(reason) => Decision::Fail(reason),
        }
    }
}

pub fn migrate_storage_paths<S: DocumentStore + ?Sized>(
    store: &mut S,
    plan: &StoragePathMigration,
    options: RunOptions,
) -> Result<RunSummary, MigrateError> {
    let docs = store
        .stream(&plan.collection, None)
        .map_err(MigrateError::Read)?;
    let label = format!("{} {}", plan.collection, plan.target_field);
    BatchRunner::new(store, label, options).run(docs, |record| plan.decide(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Fields, SkipKind};
    use crate::store::MemoryDocumentStore;
    use serde_json::json;

    const FIREBASE_URL: &str = "https://firebasestorage.googleapis.com/v0/b/equipos-zoec.firebasestorage.app/o/conduces%2F2025%2F11%2F00620.jpeg?alt=media&token=abc";

    fn record(value: Value) -> Record {
        Record::new("a1", value.as_object().cloned().unwrap())
    }

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_extract_storage_path() {
        // Casos válidos
        assert_eq!(
            extract_storage_path(FIREBASE_URL),
            Ok(Some("conduces/2025/11/00620.jpeg".to_string()))
        );
        assert_eq!(
            extract_storage_path("https://storage.example.com/bucket/conduces/2025/11/00620.jpeg?x=1"),
            Ok(Some("conduces/2025/11/00620.jpeg".to_string()))
        );
        assert_eq!(
            extract_storage_path("/conduces/2024/01/a%20b.pdf"),
            Ok(Some("conduces/2024/01/a b.pdf".to_string()))
        );

        // Fuera de conduces/
        assert_eq!(extract_storage_path("https://x.com/o/gastos%2F1.jpg"), Ok(None));
        assert_eq!(extract_storage_path("https://x.com/otros/1.jpg"), Ok(None));

        // Casos inválidos
        assert!(extract_storage_path("https://x.com/conduces/").is_err());
        assert!(extract_storage_path("conduces/sin-barra-inicial.jpg").is_err());
    }

    #[test]
    fn encoded_firebase_url_is_migrated() {
        let decision = StoragePathMigration::default().decide(&record(json!({ "conducUrl": FIREBASE_URL })));
        assert_eq!(
            decision,
            Decision::Apply(Mutation::update(
                CollectionPath::root("alquileres").doc("a1"),
                [("conduce_storage_path", FieldChange::Set(json!("conduces/2025/11/00620.jpeg")))],
            ))
        );
    }

    #[test]
    fn first_non_empty_url_field_wins() {
        let decision = StoragePathMigration::default().decide(&record(json!({
            "conducUrl": "",
            "archivoUrl": "https://x.com/o/conduces%2F2025%2F01%2F7.jpg?alt=media",
            "url_conduce": "https://x.com/o/conduces%2Fotro.jpg"
        })));
        assert_eq!(
            decision,
            Decision::Apply(Mutation::update(
                CollectionPath::root("alquileres").doc("a1"),
                [("conduce_storage_path", FieldChange::Set(json!("conduces/2025/01/7.jpg")))],
            ))
        );
    }

    #[test]
    fn skip_and_fail_cases() {
        let plan = StoragePathMigration::default();
        assert_eq!(
            plan.decide(&record(json!({"conduce_storage_path": "conduces/1.jpg", "conducUrl": FIREBASE_URL}))),
            Decision::Skip(SkipReason::AlreadyMigrated)
        );
        assert!(matches!(
            plan.decide(&record(json!({"monto": 1}))),
            Decision::Skip(SkipReason::MissingSourceField { .. })
        ));
        assert!(matches!(
            plan.decide(&record(json!({
                "archivoUrl": "https://firebasestorage.googleapis.com/v0/b/x/o/gastos%2F2025%2F1.jpg?alt=media"
            }))),
            Decision::Skip(SkipReason::NotApplicable { .. })
        ));
        assert!(matches!(
            plan.decide(&record(json!({"archivoUrl": "conduces/sin-barra.jpg"}))),
            Decision::Fail(FailReason::UnparseableUrl { .. })
        ));
    }

    #[test]
    fn second_run_applies_nothing() {
        let alquileres = CollectionPath::root("alquileres");
        let mut store = MemoryDocumentStore::with_documents([
            (alquileres.doc("a1"), fields(json!({ "conducUrl": FIREBASE_URL, "monto": 10 }))),
            (
                alquileres.doc("a2"),
                fields(json!({"conduce_url": "https://x.com/o/gastos%2F9.jpg"})),
            ),
            (alquileres.doc("a3"), fields(json!({"monto": 3}))),
        ]);
        let plan = StoragePathMigration::default();

        let first = migrate_storage_paths(&mut store, &plan, RunOptions::default()).unwrap();
        assert_eq!(first.applied, 1);
        assert_eq!(first.skipped(SkipKind::NotApplicable), 1);
        assert_eq!(first.skipped(SkipKind::MissingSourceField), 1);
        assert_eq!(
            store.get(&alquileres.doc("a1")),
            Some(&fields(json!({
                "conducUrl": FIREBASE_URL,
                "conduce_storage_path": "conduces/2025/11/00620.jpeg",
                "monto": 10
            })))
        );

        let second = migrate_storage_paths(&mut store, &plan, RunOptions::default()).unwrap();
        assert_eq!(second.applied, 0);
        assert_eq!(second.skipped(SkipKind::AlreadyMigrated), 1);
        assert_eq!(store.commit_sizes(), &[1]);
    }
}
