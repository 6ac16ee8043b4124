//! In-memory log of processed files for the dashboard.

use std::collections::VecDeque;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Last terminal outcome recorded for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Encrypted,
    Cracked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub status: FileStatus,
    /// Display size, e.g. `"12.5 KB"`.
    pub size: String,
    pub size_bytes: u64,
    /// Local time, `YYYY-MM-DD HH:MM`.
    pub upload_time: String,
}

/// Aggregates shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total_files: usize,
    pub encrypted_files: usize,
    pub cracked_files: usize,
    /// Cracked share of all records, rounded to the nearest whole percent.
    pub success_rate: u32,
}

/// Bounded, most-recent-first record store.
#[derive(Debug)]
pub struct FileRegistry {
    records: RwLock<VecDeque<FileRecord>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl FileRegistry {
    /// An empty registry keeping at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::with_capacity(capacity)),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    /// Appends an outcome, dropping the oldest record beyond capacity.
    pub fn record(&self, name: &str, status: FileStatus, size_bytes: u64) -> FileRecord {
        let record = FileRecord {
            id: self.next_id.fetch_add(1, Ordering::Relaxed).to_string(),
            name: name.to_string(),
            status,
            size: format!("{:.1} KB", size_bytes as f64 / 1024.0),
            size_bytes,
            upload_time: chrono::Local::now().format("%Y-%m-%d %H:%M").to_string(),
        };

        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.push_front(record.clone());
        records.truncate(self.capacity);
        record
    }

    /// All records, newest first.
    pub fn list(&self) -> Vec<FileRecord> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records.iter().cloned().collect()
    }

    /// Removes every record. Ids keep counting up.
    pub fn clear_all(&self) {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.clear();
    }

    /// Counts by status over the current records.
    pub fn stats(&self) -> RegistryStats {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let total_files = records.len();
        let cracked_files = records
            .iter()
            .filter(|r| r.status == FileStatus::Cracked)
            .count();
        let success_rate = if total_files == 0 {
            0
        } else {
            (cracked_files as f64 / total_files as f64 * 100.0).round() as u32
        };

        RegistryStats {
            total_files,
            encrypted_files: total_files - cracked_files,
            cracked_files,
            success_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn list_is_most_recent_first() {
        let registry = FileRegistry::new(10);
        registry.record("a.pdf", FileStatus::Encrypted, 2048);
        registry.record("b.pdf", FileStatus::Cracked, 512);

        let names: Vec<String> = registry.list().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["b.pdf", "a.pdf"]);
    }

    #[test]
    fn clear_then_list_is_empty() {
        let registry = FileRegistry::new(10);
        registry.record("a.pdf", FileStatus::Encrypted, 1);
        registry.clear_all();
        assert!(registry.list().is_empty());

        let next = registry.record("c.pdf", FileStatus::Cracked, 1);
        assert_eq!(next.id, "2");
    }

    #[test]
    fn capacity_drops_oldest() {
        let registry = FileRegistry::new(2);
        for name in ["1.pdf", "2.pdf", "3.pdf"] {
            registry.record(name, FileStatus::Encrypted, 10);
        }
        let names: Vec<String> = registry.list().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["3.pdf", "2.pdf"]);
    }

    #[test]
    fn record_formats_size_and_time() {
        let record = FileRegistry::new(1).record("a.pdf", FileStatus::Encrypted, 12_800);
        assert_eq!(record.size, "12.5 KB");
        assert_eq!(record.upload_time.len(), "2024-01-01 12:00".len());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "encrypted");
        assert_eq!(json["uploadTime"], record.upload_time.as_str());
        assert_eq!(json["sizeBytes"], 12_800);
    }

    #[test]
    fn stats_round_success_rate() {
        let registry = FileRegistry::new(10);
        assert_eq!(registry.stats().success_rate, 0);

        registry.record("a.pdf", FileStatus::Cracked, 1);
        registry.record("b.pdf", FileStatus::Encrypted, 1);
        registry.record("c.pdf", FileStatus::Encrypted, 1);

        assert_eq!(
            registry.stats(),
            RegistryStats {
                total_files: 3,
                encrypted_files: 2,
                cracked_files: 1,
                success_rate: 33,
            }
        );
    }
}
