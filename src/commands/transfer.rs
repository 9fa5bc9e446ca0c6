//! Copia de tablas SQLite al store, documento por fila.

use serde_json::Value;
use tracing::{info, warn};

use crate::commands::date_ops::decompose_date;
use crate::error::MigrateError;
use crate::models::{
    value_to_doc_id, CollectionPath, Decision, DocumentPath, FailReason, Fields, Mutation, Record,
};
use crate::runner::{BatchRunner, RunOptions, RunSummary};
use crate::source::{SourceError, SqliteSource, PRIMARY_KEY};
use crate::store::{DocumentStore, FieldFilter};

/// Categoría cuyos gastos van a `pagos_operadores`
pub const OPERATOR_PAYMENT_CATEGORY: &str = "PAGO HRS OPERADOR";

/// Tablas que se copian tal cual: (tabla, colección)
pub const SIMPLE_TABLES: [(&str, &str); 3] = [
    ("equipos", "equipos"),
    ("equipos_entidades", "entidades"),
    ("mantenimientos", "mantenimientos"),
];

/// Documento `Set` con los campos no nulos de la fila
pub fn row_document(row: &Record, target: DocumentPath) -> Mutation {
    let fields: Fields = row
        .fields
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Mutation::set(target, fields)
}

fn key_of(row: &Record, column: &str) -> Result<String, FailReason> {
    row.get(column)
        .and_then(value_to_doc_id)
        .ok_or_else(|| FailReason::MissingPrimaryKey {
            column: column.to_string(),
        })
}

/// Fila → documento `<collection>/<id>`
pub fn transfer_decision(row: &Record, collection: &CollectionPath) -> Decision {
    match key_of(row, PRIMARY_KEY) {
        Ok(id) => Decision::Apply(row_document(row, collection.doc(id))),
        Err(reason) => Decision::Fail(reason),
    }
}

/// Agrega `ano`/`mes` cuando `fecha` es válida; si no, no agrega nada
fn add_year_month(fields: &mut Fields) {
    let parts = fields
        .get("fecha")
        .and_then(Value::as_str)
        .and_then(|raw| decompose_date(raw).ok());
    if let Some((year, month)) = parts {
        fields.insert("ano".into(), Value::from(year));
        fields.insert("mes".into(), Value::from(month));
    }
}

/// 0/1 de SQLite → booleano
fn normalize_paid_flag(fields: &mut Fields) {
    if let Some(Value::Number(n)) = fields.get("pagado") {
        let paid = n.as_f64().map_or(false, |f| f != 0.0);
        fields.insert("pagado".into(), Value::Bool(paid));
    }
}

fn with_fields(decision: Decision, edit: impl FnOnce(&mut Fields)) -> Decision {
    match decision {
        Decision::Apply(Mutation {
            target,
            write: crate::models::Write::Set(mut fields),
        }) => {
            edit(&mut fields);
            Decision::Apply(Mutation::set(target, fields))
        }
        other => other,
    }
}

pub fn operator_payment_decision(row: &Record, collection: &CollectionPath) -> Decision {
    with_fields(transfer_decision(row, collection), add_year_month)
}

pub fn transaction_decision(row: &Record, collection: &CollectionPath) -> Decision {
    with_fields(transfer_decision(row, collection), |fields| {
        normalize_paid_flag(fields);
        add_year_month(fields);
    })
}

/// `pagos` → `transacciones/{transaccion_id}/pagos/{id}`
pub fn payment_decision(row: &Record, parent: &CollectionPath) -> Decision {
    let target = key_of(row, "transaccion_id").and_then(|parent_id| {
        let id = key_of(row, PRIMARY_KEY)?;
        Ok(parent.doc(parent_id).collection("pagos").doc(id))
    });
    match target {
        Ok(path) => Decision::Apply(row_document(row, path)),
        Err(reason) => Decision::Fail(reason),
    }
}

pub fn is_operator_payment(row: &Record, category_id: Option<i64>) -> bool {
    let Some(category) = category_id else {
        return false;
    };
    row.get("tipo").and_then(Value::as_str) == Some("Gasto")
        && row.get("categoria_id").and_then(Value::as_i64) == Some(category)
}

/// Resumen por paso, en el orden en que se ejecutaron
#[derive(Debug, Default)]
pub struct TransferReport {
    pub steps: Vec<(String, RunSummary)>,
}

impl TransferReport {
    pub fn total(&self) -> RunSummary {
        let mut total = RunSummary::new(self.steps.iter().any(|(_, s)| s.dry_run));
        for (_, summary) in &self.steps {
            total.absorb(summary);
        }
        total
    }

    pub fn step(&self, label: &str) -> Option<&RunSummary> {
        self.steps.iter().find(|(l, _)| l == label).map(|(_, s)| s)
    }
}

struct Transfer<'a, S: DocumentStore + ?Sized> {
    source: &'a SqliteSource,
    store: &'a mut S,
    options: RunOptions,
    report: TransferReport,
}

impl<'a, S: DocumentStore + ?Sized> Transfer<'a, S> {
    fn rows(&self, table: &str) -> Result<Option<Vec<Record>>, MigrateError> {
        let read = || -> Result<Option<Vec<Record>>, SourceError> {
            if !self.source.table_exists(table)? {
                warn!("No existe la tabla [{}]. Omitiendo.", table);
                return Ok(None);
            }
            let rows = self.source.fetch_table(table, None)?;
            if rows.is_empty() {
                warn!("No se encontraron datos en [{}]. Omitiendo.", table);
                return Ok(None);
            }
            Ok(Some(rows))
        };
        read().map_err(|source| self.interrupted(table, source))
    }

    /// Un error de lectura después de pasos ya escritos no es de arranque
    fn interrupted(&self, step: &str, source: SourceError) -> MigrateError {
        if self.report.steps.is_empty() {
            MigrateError::Source(source)
        } else {
            MigrateError::Interrupted {
                step: step.to_string(),
                completed: self.report.steps.len(),
                source,
            }
        }
    }

    fn step<F>(&mut self, label: &str, rows: Vec<Record>, decide: F) -> Result<(), MigrateError>
    where
        F: FnMut(&Record) -> Decision,
    {
        let summary = BatchRunner::new(&mut *self.store, label, self.options).run(rows, decide)?;
        info!("--- Migración de [{}] completada. Total: {} docs. ---", label, summary.applied);
        self.report.steps.push((label.to_string(), summary));
        Ok(())
    }

    fn operator_category(&self) -> Result<Option<i64>, MigrateError> {
        let read = || -> Result<Option<i64>, SourceError> {
            if !self.source.table_exists("categorias")? {
                return Ok(None);
            }
            let filter = FieldFilter::eq("nombre", OPERATOR_PAYMENT_CATEGORY);
            Ok(self
                .source
                .fetch_table("categorias", Some(&filter))?
                .first()
                .and_then(|row| row.get(PRIMARY_KEY).and_then(Value::as_i64)))
        };
        let found = read().map_err(|source| self.interrupted("categorias", source))?;
        match found {
            Some(id) => info!("ID de categoría '{}' encontrado: {}", OPERATOR_PAYMENT_CATEGORY, id),
            None => warn!("No se encontró la categoría '{}' en SQLite.", OPERATOR_PAYMENT_CATEGORY),
        }
        Ok(found)
    }
}

/// Migra las tablas simples, transacciones (separando pagos a operadores)
/// y los abonos como subcolección. Un lote rechazado detiene todo el plan.
pub fn transfer_all<S: DocumentStore + ?Sized>(
    source: &SqliteSource,
    store: &mut S,
    options: RunOptions,
) -> Result<TransferReport, MigrateError> {
    let mut transfer = Transfer {
        source,
        store,
        options,
        report: TransferReport::default(),
    };

    for (table, collection) in SIMPLE_TABLES {
        let Some(rows) = transfer.rows(table)? else {
            continue;
        };
        let target = CollectionPath::root(collection);
        transfer.step(collection, rows, |row| transfer_decision(row, &target))?;
    }

    let category = transfer.operator_category()?;
    if let Some(rows) = transfer.rows("transacciones")? {
        let (operator_payments, transactions): (Vec<Record>, Vec<Record>) = rows
            .into_iter()
            .partition(|row| is_operator_payment(row, category));

        if category.is_some() {
            if operator_payments.is_empty() {
                info!("No se encontraron 'Pagos a Operadores' para migrar.");
            } else {
                let target = CollectionPath::root("pagos_operadores");
                transfer.step("pagos_operadores", operator_payments, |row| {
                    operator_payment_decision(row, &target)
                })?;
            }
        }

        let target = CollectionPath::root("transacciones");
        transfer.step("transacciones", transactions, |row| transaction_decision(row, &target))?;
    }

    if let Some(rows) = transfer.rows("pagos")? {
        let parent = CollectionPath::root("transacciones");
        transfer.step("pagos (subcolección)", rows, |row| payment_decision(row, &parent))?;
    }

    Ok(transfer.report)
}
