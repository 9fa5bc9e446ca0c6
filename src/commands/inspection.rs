//! Sondas de solo lectura sobre el store.

use serde_json::Value;

use crate::error::MigrateError;
use crate::models::{value_type_name, CollectionPath};
use crate::store::DocumentStore;

/// Máximo de documentos/ids de ejemplo que se muestran
pub const SAMPLE_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct SampleDocument {
    pub id: String,
    pub fields: Vec<String>,
    pub has_url: bool,
    pub has_storage_path: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnosis {
    pub collections: Vec<(CollectionPath, usize)>,
    pub sampled: CollectionPath,
    pub samples: Vec<SampleDocument>,
}

pub fn diagnose<S: DocumentStore + ?Sized>(
    store: &S,
    sampled: &CollectionPath,
) -> Result<Diagnosis, MigrateError> {
    let mut collections = Vec::new();
    for collection in store.list_collections().map_err(MigrateError::Read)? {
        let count = store.stream(&collection, None).map_err(MigrateError::Read)?.len();
        collections.push((collection, count));
    }

    let samples = store
        .stream(sampled, None)
        .map_err(MigrateError::Read)?
        .into_iter()
        .take(SAMPLE_LIMIT)
        .map(|record| SampleDocument {
            has_url: record.contains("archivoUrl"),
            has_storage_path: record.contains("archivo_storage_path"),
            fields: record.fields.keys().cloned().collect(),
            id: record.id,
        })
        .collect();

    Ok(Diagnosis {
        collections,
        sampled: sampled.clone(),
        samples,
    })
}

impl Diagnosis {
    pub fn print(&self) {
        println!("╔══════════════════════════════════════════════════════════════╗");
        println!("║  Diagnóstico del store                                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝");
        if self.collections.is_empty() {
            println!("⚠️  El store no tiene colecciones");
        }
        for (collection, count) in &self.collections {
            println!("📁 {}: {} documentos", collection, count);
        }
        println!();

        if self.samples.is_empty() {
            println!("⚠️  No hay documentos en '{}'", self.sampled);
            return;
        }
        println!("🔍 Primeros {} documentos de '{}':", self.samples.len(), self.sampled);
        for sample in &self.samples {
            println!();
            println!("📄 {}", sample.id);
            println!("   Campos: {}", sample.fields.join(", "));
            println!("   archivoUrl: {}", yes_no(sample.has_url));
            println!("   archivo_storage_path: {}", yes_no(sample.has_storage_path));
        }
        println!();
    }
}

fn yes_no(present: bool) -> &'static str {
    if present {
        "✅ sí"
    } else {
        "❌ no"
    }
}

/// Conteo de documentos con `fecha` ausente o de tipo incorrecto
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DateAudit {
    pub total: usize,
    pub missing: usize,
    pub missing_examples: Vec<String>,
    pub wrong_type: usize,
    pub wrong_type_examples: Vec<(String, &'static str)>,
}

impl DateAudit {
    pub fn is_clean(&self) -> bool {
        self.missing == 0 && self.wrong_type == 0
    }

    pub fn print(&self, collection: &CollectionPath, field: &str) {
        println!("╔══════════════════════════════════════════════════════════════╗");
        println!("║  {:<60}║", format!("Fechas en {}", collection));
        println!("╚══════════════════════════════════════════════════════════════╝");
        println!("📊 Total documentos:        {}", self.total);
        println!("❓ Sin '{}':                {}", field, self.missing);
        for id in &self.missing_examples {
            println!("   - {}", id);
        }
        println!("⚠️  '{}' no es texto:       {}", field, self.wrong_type);
        for (id, kind) in &self.wrong_type_examples {
            println!("   - {} ({})", id, kind);
        }
        if self.is_clean() {
            println!("✅ Todas las fechas son texto");
        }
        println!();
    }
}

pub fn check_dates<S: DocumentStore + ?Sized>(
    store: &S,
    collection: &CollectionPath,
    field: &str,
) -> Result<DateAudit, MigrateError> {
    let mut audit = DateAudit::default();
    for record in store.stream(collection, None).map_err(MigrateError::Read)? {
        audit.total += 1;
        match record.get(field) {
            None | Some(Value::Null) => {
                audit.missing += 1;
                if audit.missing_examples.len() < SAMPLE_LIMIT {
                    audit.missing_examples.push(record.id.clone());
                }
            }
            Some(Value::String(_)) => {}
            Some(other) => {
                audit.wrong_type += 1;
                if audit.wrong_type_examples.len() < SAMPLE_LIMIT {
                    audit.wrong_type_examples.push((record.id.clone(), value_type_name(other)));
                }
            }
        }
    }
    Ok(audit)
}
