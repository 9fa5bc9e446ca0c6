use std::time::Instant;

use tracing::info;

/// Tracker de progreso: reporta cada `report_interval` registros
pub struct ProgressTracker {
    label: String,
    start_time: Instant,
    total_processed: u64,
    report_interval: u64,
}

impl ProgressTracker {
    pub fn new(label: impl Into<String>, report_interval: u64) -> Self {
        Self {
            label: label.into(),
            start_time: Instant::now(),
            total_processed: 0,
            report_interval: report_interval.max(1),
        }
    }

    pub fn update(&mut self, processed: u64) {
        self.total_processed = processed;

        if self.total_processed % self.report_interval == 0 {
            self.report();
        }
    }

    fn rate(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.total_processed as f64 / elapsed
        } else {
            0.0
        }
    }

    fn report(&self) {
        info!(
            "📊 [{}] Processed: {} | Rate: {:.0} rec/s | Time: {:.1}s",
            self.label,
            self.total_processed,
            self.rate(),
            self.start_time.elapsed().as_secs_f64()
        );
    }

    /// Segundos transcurridos desde el inicio
    pub fn finish(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        info!(
            "✅ [{}] Complete: {} records in {:.1}s ({:.0} rec/s)",
            self.label,
            self.total_processed,
            elapsed,
            self.rate()
        );
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_latest_count() {
        let mut progress = ProgressTracker::new("test", 0);
        progress.update(3);
        progress.update(5);
        assert_eq!(progress.total_processed, 5);
        assert!(progress.finish() >= 0.0);
    }
}
