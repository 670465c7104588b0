//! Fixed-window admission control.
//!
//! One counter per rate-limit key, reset when the one-second window rolls
//! over. O(1) memory and O(1) check cost per call; key cardinality is
//! bounded by the capability surface, so records are never evicted. A burst
//! straddling a window boundary can admit up to twice the ceiling across
//! the two adjacent windows; that imprecision is accepted.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

use quill_types::BridgeError;

pub const DEFAULT_CEILING: u32 = 10;

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct AdmissionRecord {
    count: u32,
    window_start: Instant,
    ceiling: u32,
}

/// Read-only view of one admission record, for diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionSnapshot {
    pub key: String,
    pub count: u32,
    pub ceiling: u32,
    pub window_elapsed_ms: u64,
}

pub struct AdmissionController {
    records: Mutex<HashMap<&'static str, AdmissionRecord>>,
}

impl AdmissionController {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject one call against `key`. Counts the attempt either
    /// way; rejected calls must not dispatch.
    pub fn check(&self, key: &'static str, ceiling: u32) -> Result<(), BridgeError> {
        let now = Instant::now();
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let record = records.entry(key).or_insert(AdmissionRecord {
            count: 0,
            window_start: now,
            ceiling,
        });

        if now.duration_since(record.window_start) >= WINDOW {
            record.count = 0;
            record.window_start = now;
        }
        record.ceiling = ceiling;
        record.count += 1;

        if record.count > ceiling {
            tracing::warn!(
                key,
                count = record.count,
                ceiling,
                "admission ceiling exceeded"
            );
            return Err(BridgeError::RateLimited {
                key: key.to_string(),
                ceiling,
            });
        }
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<AdmissionSnapshot> {
        let records = self
            .records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let now = Instant::now();
        let mut entries: Vec<AdmissionSnapshot> = records
            .iter()
            .map(|(key, record)| AdmissionSnapshot {
                key: key.to_string(),
                count: record.count,
                ceiling: record.ceiling,
                window_elapsed_ms: now.duration_since(record.window_start).as_millis() as u64,
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    /// Number of keys touched so far; stays bounded by the surface size.
    pub fn tracked_keys(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn allows_calls_within_ceiling() {
        let admission = AdmissionController::new();
        for _ in 0..5 {
            assert!(admission.check("chat", 5).is_ok());
        }
    }

    #[test]
    fn rejects_ceiling_plus_one_within_window() {
        let admission = AdmissionController::new();
        for _ in 0..3 {
            admission.check("shell", 3).unwrap();
        }
        let result = admission.check("shell", 3);
        assert!(matches!(result, Err(BridgeError::RateLimited { .. })));
    }

    #[test]
    fn keys_are_isolated() {
        let admission = AdmissionController::new();
        for _ in 0..2 {
            admission.check("fs", 2).unwrap();
        }
        assert!(admission.check("fs", 2).is_err());
        // A noisy neighbour must not starve other channels.
        assert!(admission.check("settings", 2).is_ok());
    }

    #[test]
    fn window_rollover_resets_the_counter() {
        let admission = AdmissionController::new();
        admission.check("chat", 2).unwrap();
        admission.check("chat", 2).unwrap();
        assert!(admission.check("chat", 2).is_err());

        thread::sleep(Duration::from_millis(1100));

        admission.check("chat", 2).unwrap();
        assert!(admission.check("chat", 2).is_ok());
    }

    #[test]
    fn rejections_keep_counting_without_resetting() {
        let admission = AdmissionController::new();
        for _ in 0..2 {
            admission.check("chat", 2).unwrap();
        }
        for _ in 0..3 {
            assert!(admission.check("chat", 2).is_err());
        }
        let snap = admission.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].count, 5);
        assert_eq!(snap[0].ceiling, 2);
    }

    #[test]
    fn snapshot_is_sorted_and_bounded_by_keys() {
        let admission = AdmissionController::new();
        admission.check("zeta", 10).unwrap();
        admission.check("alpha", 10).unwrap();
        let snap = admission.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].key, "alpha");
        assert_eq!(snap[1].key, "zeta");
        assert_eq!(admission.tracked_keys(), 2);
    }
}
