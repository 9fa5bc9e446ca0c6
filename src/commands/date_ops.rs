use chrono::{Datelike, NaiveDate};
use serde_json::Value;

use crate::error::MigrateError;
use crate::models::{
    value_type_name, CollectionPath, Decision, FailReason, FieldChange, Mutation, Record,
    SkipReason,
};
use crate::runner::{BatchRunner, RunOptions, RunSummary};
use crate::store::DocumentStore;

/// Formato de las fechas guardadas como texto
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Descompone `YYYY-MM-DD` en (año, mes)
pub fn decompose_date(value: &str) -> Result<(i32, u32), FailReason> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map(|date| (date.year(), date.month()))
        .map_err(|_| FailReason::InvalidDate {
            value: value.to_string(),
        })
}

/// Campos `ano`/`mes` derivados de `fecha`
#[derive(Debug, Clone)]
pub struct DateSplit {
    pub collection: CollectionPath,
    pub source_field: String,
    pub year_field: String,
    pub month_field: String,
}

impl Default for DateSplit {
    fn default() -> Self {
        Self {
            collection: CollectionPath::root("alquileres"),
            source_field: "fecha".into(),
            year_field: "ano".into(),
            month_field: "mes".into(),
        }
    }
}

impl DateSplit {
    pub fn for_collection(collection: &str) -> Self {
        Self {
            collection: CollectionPath::root(collection),
            ..Self::default()
        }
    }

    /// Ya migrado: los dos campos existen y coinciden con la fecha
    fn is_current(&self, record: &Record, year: i32, month: u32) -> bool {
        record.get(&self.year_field).and_then(Value::as_i64) == Some(i64::from(year))
            && record.get(&self.month_field).and_then(Value::as_i64) == Some(i64::from(month))
    }

    pub fn decide(&self, record: &Record) -> Decision {
        let raw = match record.get(&self.source_field) {
            None | Some(Value::Null) => {
                return Decision::Skip(SkipReason::MissingSourceField {
                    field: self.source_field.clone(),
                })
            }
            Some(Value::String(s)) => s,
            Some(other) => {
                return Decision::Fail(FailReason::NotAString {
                    field: self.source_field.clone(),
                    found: value_type_name(other),
                })
            }
        };

        let (year, month) = match decompose_date(raw) {
            Ok(parts) => parts,
            Err(reason) => return Decision::Fail(reason),
        };

        if self.is_current(record, year, month) {
            return Decision::Skip(SkipReason::AlreadyMigrated);
        }

        Decision::Apply(Mutation::update(
            self.collection.doc(record.id.clone()),
            [
                (self.year_field.clone(), FieldChange::Set(Value::from(year))),
                (self.month_field.clone(), FieldChange::Set(Value::from(month))),
            ],
        ))
    }
}

/// Recorre la colección y agrega `ano`/`mes` donde falten o estén desfasados
pub fn split_dates<S: DocumentStore + ?Sized>(
    store: &mut S,
    plan: &DateSplit,
    options: RunOptions,
) -> Result<RunSummary, MigrateError> {
    let docs = store
        .stream(&plan.collection, None)
        .map_err(MigrateError::Read)?;
    let label = format!("fechas {}", plan.collection);
    BatchRunner::new(store, label, options).run(docs, |record| plan.decide(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Fields;
    use crate::store::MemoryDocumentStore;
    use serde_json::json;

    fn record(id: &str, value: Value) -> Record {
        Record::new(id, value.as_object().cloned().unwrap())
    }

    #[test]
    fn test_decompose_date() {
        // Casos válidos
        assert_eq!(decompose_date("2024-03-15"), Ok((2024, 3)));
        assert_eq!(decompose_date("1999-12-31"), Ok((1999, 12)));

        // Casos inválidos
        assert!(decompose_date("15/03/2024").is_err());
        assert!(decompose_date("").is_err());
        assert!(decompose_date("2024-13-01").is_err());
        assert!(decompose_date("2024-02-30").is_err());
    }

    #[test]
    fn derives_year_and_month() {
        let plan = DateSplit::default();
        let decision = plan.decide(&record("a1", json!({"fecha": "2024-03-15"})));
        assert_eq!(
            decision,
            Decision::Apply(Mutation::update(
                CollectionPath::root("alquileres").doc("a1"),
                [
                    ("ano", FieldChange::Set(json!(2024))),
                    ("mes", FieldChange::Set(json!(3))),
                ],
            ))
        );
    }

    #[test]
    fn bad_dates_fail_without_touching_the_record() {
        let plan = DateSplit::default();
        for bad in ["15/03/2024", ""] {
            let decision = plan.decide(&record("a1", json!({ "fecha": bad })));
            assert_eq!(
                decision,
                Decision::Fail(FailReason::InvalidDate { value: bad.to_string() })
            );
        }
        assert!(matches!(
            plan.decide(&record("a2", json!({"fecha": 20240315}))),
            Decision::Fail(FailReason::NotAString { found: "int", .. })
        ));
    }

    #[test]
    fn missing_and_current_fields_are_skipped() {
        let plan = DateSplit::default();
        assert_eq!(
            plan.decide(&record("a1", json!({"monto": 10}))),
            Decision::Skip(SkipReason::MissingSourceField { field: "fecha".into() })
        );
        assert_eq!(
            plan.decide(&record("a2", json!({"fecha": "2024-03-15", "ano": 2024, "mes": 3}))),
            Decision::Skip(SkipReason::AlreadyMigrated)
        );
    }

    #[test]
    fn stale_values_are_corrected() {
        let plan = DateSplit::default();
        let decision = plan.decide(&record("a1", json!({"fecha": "2024-03-15", "ano": 2024, "mes": 4})));
        assert!(matches!(decision, Decision::Apply(_)));
    }

    #[test]
    fn second_run_is_a_no_op() {
        let alquileres = CollectionPath::root("alquileres");
        let mut store = MemoryDocumentStore::with_documents((0..25).map(|i| {
            let mut fields = Fields::new();
            fields.insert("fecha".into(), json!(format!("2024-{:02}-01", i % 12 + 1)));
            (alquileres.doc(format!("a{i}")), fields)
        }));
        let options = RunOptions {
            capacity: 10,
            ..RunOptions::default()
        };

        let first = split_dates(&mut store, &DateSplit::default(), options).unwrap();
        assert_eq!(first.applied, 25);
        assert_eq!(store.commit_sizes(), &[10, 10, 5]);

        let second = split_dates(&mut store, &DateSplit::default(), options).unwrap();
        assert_eq!(second.applied, 0);
        assert_eq!(second.skipped(crate::models::SkipKind::AlreadyMigrated), 25);
        assert_eq!(store.commit_sizes().len(), 3);
    }
}
