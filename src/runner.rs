//! Batched Mutation Runner.
//!
//! Walks a record set in source order, asks the decision function about
//! each record exactly once and commits the resulting mutations in batches
//! of at most `capacity` writes. A rejected batch aborts the run: earlier
//! batches stay committed and the remaining records are left for the next
//! run, which skips whatever is already migrated.

use std::collections::BTreeMap;

use tracing::{debug, error, info, warn};

use crate::config::ToolConfig;
use crate::error::MigrateError;
use crate::models::{Decision, Record, SkipKind};
use crate::progress::ProgressTracker;
use crate::store::{DocumentStore, WriteBatch, MAX_BATCH_WRITES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub capacity: usize,
    pub dry_run: bool,
    pub progress_interval: u64,
}

impl RunOptions {
    pub fn from_config(config: &ToolConfig, dry_run: bool) -> Self {
        Self {
            capacity: config.batch_size,
            dry_run,
            progress_interval: config.progress_interval,
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            capacity: crate::config::DEFAULT_BATCH_SIZE,
            dry_run: false,
            progress_interval: 1000,
        }
    }
}

/// Contadores de una ejecución
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub seen: u64,
    pub applied: u64,
    /// Mutations durably committed (always 0 in a dry run)
    pub committed: u64,
    pub skipped: BTreeMap<SkipKind, u64>,
    pub failed: u64,
    pub batches: u64,
    pub dry_run: bool,
}

impl RunSummary {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    pub fn skipped_total(&self) -> u64 {
        self.skipped.values().sum()
    }

    pub fn skipped(&self, kind: SkipKind) -> u64 {
        self.skipped.get(&kind).copied().unwrap_or(0)
    }

    /// skipped + failed + applied == seen
    pub fn is_balanced(&self) -> bool {
        self.skipped_total() + self.failed + self.applied == self.seen
    }

    pub fn absorb(&mut self, other: &RunSummary) {
        self.seen += other.seen;
        self.applied += other.applied;
        self.committed += other.committed;
        self.failed += other.failed;
        self.batches += other.batches;
        for (kind, count) in &other.skipped {
            *self.skipped.entry(*kind).or_insert(0) += count;
        }
    }

    pub fn print(&self, title: &str) {
        println!();
        println!("╔══════════════════════════════════════════════════════════════╗");
        println!("║  {:<60}║", format!("Resumen: {}", title));
        println!("╚══════════════════════════════════════════════════════════════╝");
        if self.dry_run {
            println!("⚠️  MODO SIMULACIÓN (no se modificó el store)");
        }
        println!("📊 Total documentos:   {}", self.seen);
        if self.dry_run {
            println!("🔄 Se actualizarían:   {}", self.applied);
        } else {
            println!("✅ Actualizados:       {}", self.applied);
            println!("📦 Lotes enviados:     {}", self.batches);
        }
        println!("⏭️  Omitidos:           {}", self.skipped_total());
        for (kind, count) in &self.skipped {
            println!("   - {}: {}", kind, count);
        }
        println!("❌ Errores:            {}", self.failed);
        println!();
    }
}

pub struct BatchRunner<'s, S: DocumentStore + ?Sized> {
    store: &'s mut S,
    label: String,
    options: RunOptions,
}

impl<'s, S: DocumentStore + ?Sized> BatchRunner<'s, S> {
    pub fn new(store: &'s mut S, label: impl Into<String>, options: RunOptions) -> Self {
        let capacity = options.capacity.clamp(1, MAX_BATCH_WRITES);
        Self {
            store,
            label: label.into(),
            options: RunOptions { capacity, ..options },
        }
    }

    pub fn capacity(&self) -> usize {
        self.options.capacity
    }

    pub fn run<I, F>(&mut self, records: I, mut decide: F) -> Result<RunSummary, MigrateError>
    where
        I: IntoIterator<Item = Record>,
        F: FnMut(&Record) -> Decision,
    {
        info!("--- Iniciando [{}] ---", self.label);
        let mut summary = RunSummary::new(self.options.dry_run);
        let mut batch = WriteBatch::new();
        let mut progress = ProgressTracker::new(self.label.clone(), self.options.progress_interval);

        for record in records {
            summary.seen += 1;
            match decide(&record) {
                Decision::Apply(mutation) => {
                    summary.applied += 1;
                    if self.options.dry_run {
                        debug!("[{}] would write {}", self.label, mutation.target);
                    } else {
                        batch.push(mutation);
                        if batch.len() >= self.options.capacity {
                            self.flush(&mut batch, &mut summary)?;
                        }
                    }
                }
                Decision::Skip(reason) => {
                    debug!("[{}] {} skipped: {}", self.label, record.id, reason);
                    *summary.skipped.entry(reason.kind()).or_insert(0) += 1;
                }
                Decision::Fail(reason) => {
                    warn!("[{}] Documento {}: {}. Omitiendo.", self.label, record.id, reason);
                    summary.failed += 1;
                }
            }
            progress.update(summary.seen);
        }

        if !batch.is_empty() {
            self.flush(&mut batch, &mut summary)?;
        }
        progress.finish();

        if summary.applied == 0 {
            info!(
                "[{}] No se encontraron documentos que necesitaran cambios. (Quizás ya se ejecutó)",
                self.label
            );
        }
        info!(
            "--- [{}] completado: {} vistos, {} aplicados, {} omitidos, {} con error ---",
            self.label,
            summary.seen,
            summary.applied,
            summary.skipped_total(),
            summary.failed
        );
        Ok(summary)
    }

    fn flush(&mut self, batch: &mut WriteBatch, summary: &mut RunSummary) -> Result<(), MigrateError> {
        let pending = std::mem::take(batch);
        let size = pending.len();
        let number = summary.batches as usize + 1;
        let documents = pending.document_ids();
        info!("[{}] Enviando lote #{} de {} escrituras...", self.label, number, size);

        match self.store.commit(pending) {
            Ok(()) => {
                summary.batches += 1;
                summary.committed += size as u64;
                Ok(())
            }
            Err(source) => {
                error!(
                    "[{}] Lote #{} rechazado: {}. Documentos: {}",
                    self.label,
                    number,
                    source,
                    documents.join(", ")
                );
                error!(
                    "[{}] Ejecución abortada tras {} registros; {} escrituras confirmadas en lotes anteriores. Re-ejecutar retoma desde aquí.",
                    self.label, summary.seen, summary.committed
                );
                Err(MigrateError::Flush {
                    label: self.label.clone(),
                    batch: number,
                    documents,
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CollectionPath, FailReason, FieldChange, Fields, Mutation, SkipReason};
    use crate::store::MemoryDocumentStore;
    use serde_json::json;

    fn records(n: usize) -> Vec<Record> {
        (0..n).map(|i| Record::new(i.to_string(), Fields::new())).collect()
    }

    fn set_decision(record: &Record) -> Decision {
        Decision::Apply(Mutation::set(
            CollectionPath::root("equipos").doc(record.id.clone()),
            Fields::new(),
        ))
    }

    fn options(capacity: usize) -> RunOptions {
        RunOptions {
            capacity,
            ..RunOptions::default()
        }
    }

    #[test]
    fn flushes_full_batches_then_remainder() {
        let cap = 7;
        let mut store = MemoryDocumentStore::new();
        let summary = BatchRunner::new(&mut store, "equipos", options(cap))
            .run(records(3 * cap + 4), set_decision)
            .unwrap();

        assert_eq!(store.commit_sizes(), &[cap, cap, cap, 4]);
        assert_eq!(summary.batches, 4);
        assert_eq!(summary.committed, (3 * cap + 4) as u64);
        assert!(summary.is_balanced());
    }

    #[test]
    fn exact_multiple_has_no_trailing_flush() {
        let mut store = MemoryDocumentStore::new();
        BatchRunner::new(&mut store, "equipos", options(5))
            .run(records(10), set_decision)
            .unwrap();
        assert_eq!(store.commit_sizes(), &[5, 5]);
    }

    #[test]
    fn capacity_is_clamped_to_store_limit() {
        let mut store = MemoryDocumentStore::new();
        let runner = BatchRunner::new(&mut store, "x", options(10_000));
        assert_eq!(runner.capacity(), MAX_BATCH_WRITES);
    }

    #[test]
    fn every_record_is_classified_once() {
        let mut store = MemoryDocumentStore::new();
        let mut calls = 0;
        let summary = BatchRunner::new(&mut store, "mixed", options(2))
            .run(records(9), |record| {
                calls += 1;
                match record.id.parse::<usize>().unwrap() % 3 {
                    0 => set_decision(record),
                    1 => Decision::Skip(SkipReason::AlreadyMigrated),
                    _ => Decision::Fail(FailReason::InvalidDate { value: "x".into() }),
                }
            })
            .unwrap();

        assert_eq!(calls, 9);
        assert_eq!(summary.seen, 9);
        assert_eq!(summary.applied, 3);
        assert_eq!(summary.skipped(SkipKind::AlreadyMigrated), 3);
        assert_eq!(summary.failed, 3);
        assert!(summary.is_balanced());
        assert_eq!(store.commit_sizes(), &[2, 1]);
    }

    #[test]
    fn rejected_flush_aborts_and_keeps_earlier_batches() {
        let mut store = MemoryDocumentStore::new();
        store.reject_commit(2);
        let err = BatchRunner::new(&mut store, "equipos", options(3))
            .run(records(10), set_decision)
            .unwrap_err();

        match err {
            MigrateError::Flush { batch, documents, .. } => {
                assert_eq!(batch, 2);
                assert_eq!(documents, vec!["equipos/3", "equipos/4", "equipos/5"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(store.commit_sizes(), &[3]);
        assert_eq!(store.database().document_count(), 3);
    }

    #[test]
    fn dry_run_never_commits() {
        let mut store = MemoryDocumentStore::new();
        let summary = BatchRunner::new(
            &mut store,
            "equipos",
            RunOptions {
                capacity: 2,
                dry_run: true,
                progress_interval: 1000,
            },
        )
        .run(records(5), set_decision)
        .unwrap();

        assert_eq!(summary.applied, 5);
        assert_eq!(summary.batches, 0);
        assert_eq!(summary.committed, 0);
        assert!(store.commit_sizes().is_empty());
    }

    #[test]
    fn summaries_accumulate() {
        let mut total = RunSummary::new(false);
        let mut step = RunSummary::new(false);
        step.seen = 4;
        step.applied = 3;
        step.skipped.insert(SkipKind::NoMapping, 1);
        total.absorb(&step);
        total.absorb(&step);
        assert_eq!(total.seen, 8);
        assert_eq!(total.skipped(SkipKind::NoMapping), 2);
        assert!(total.is_balanced());
    }

    #[test]
    fn update_mutations_reach_the_store() {
        let alquileres = CollectionPath::root("alquileres");
        let mut store = MemoryDocumentStore::with_documents([(alquileres.doc("a"), Fields::new())]);
        BatchRunner::new(&mut store, "alquileres", options(10))
            .run(vec![Record::new("a", Fields::new())], |r| {
                Decision::Apply(Mutation::update(
                    alquileres.doc(r.id.clone()),
                    [("ano", FieldChange::Set(json!(2024)))],
                ))
            })
            .unwrap();
        assert_eq!(store.get(&alquileres.doc("a")).unwrap().get("ano"), Some(&json!(2024)));
    }
}
