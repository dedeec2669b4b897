//! Time-series CSV sink.
//!
//! Every decoded value becomes one line in a file partitioned by date,
//! equipment and variable:
//!
//! ```text
//! {root}/vars/{yyyy}/{MM}/{ddd}/{equipment}/{variable}/{client}_{ship}-{equipment}_{variable}_{ddd}.csv
//! ```
//!
//! Lines have the form `yyyy-MM-dd HH:mm:ss,,value` with three decimals.
//! The file is opened in append mode and closed after every line.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use tokio::io::AsyncWriteExt;

use shiplog_core::config::ShipIdentity;

use crate::error::Result;

/// Timestamp layout of the first column.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Appends readings to per-variable CSV files.
#[derive(Debug, Clone)]
pub struct CsvSink {
    root: PathBuf,
    identity: ShipIdentity,
}

impl CsvSink {
    /// Create a sink writing under `root/vars`.
    pub fn new(root: impl Into<PathBuf>, identity: ShipIdentity) -> Self {
        Self {
            root: root.into(),
            identity,
        }
    }

    /// Output root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File that holds readings of one variable for one day.
    pub fn series_path(&self, equipment: &str, variable: &str, date: NaiveDate) -> PathBuf {
        let equipment = sanitize(equipment);
        let variable = sanitize(variable);
        let day = format!("{:03}", date.day());

        let file_name = format!(
            "{}_{}-{}_{}_{}.csv",
            self.identity.client_id, self.identity.ship_id, equipment, variable, day
        );

        self.root
            .join("vars")
            .join(format!("{:04}", date.year()))
            .join(format!("{:02}", date.month()))
            .join(&day)
            .join(equipment.as_ref())
            .join(variable.as_ref())
            .join(file_name)
    }

    /// Append one reading, creating missing directories first.
    ///
    /// Returns the path written to.
    pub async fn append(
        &self,
        equipment: &str,
        variable: &str,
        timestamp: NaiveDateTime,
        value: f32,
    ) -> Result<PathBuf> {
        let path = self.series_path(equipment, variable, timestamp.date());
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(format_line(timestamp, value).as_bytes())
            .await?;
        file.flush().await?;

        Ok(path)
    }
}

/// Format one CSV line, including the trailing newline.
fn format_line(timestamp: NaiveDateTime, value: f32) -> String {
    format!("{},,{:.3}\n", timestamp.format(TIMESTAMP_FORMAT), value)
}

// Entity names become directory names; keep them inside their partition.
fn sanitize(component: &str) -> Cow<'_, str> {
    if component.contains(['/', '\\']) || component == "." || component == ".." {
        Cow::Owned(component.replace(['/', '\\', '.'], "_"))
    } else {
        Cow::Borrowed(component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32, ss: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(hh, mm, ss)
            .unwrap()
    }

    fn sink(root: &Path) -> CsvSink {
        CsvSink::new(root, ShipIdentity::new("ACME", "SHIP01"))
    }

    #[test]
    fn test_series_path_layout() {
        let sink = sink(Path::new("/data"));
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let path = sink.series_path("Engine", "RPM", date);
        assert_eq!(
            path,
            PathBuf::from("/data/vars/2024/03/007/Engine/RPM/ACME_SHIP01-Engine_RPM_007.csv")
        );
    }

    #[test]
    fn test_series_path_sanitizes_names() {
        let sink = sink(Path::new("/data"));
        let date = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let path = sink.series_path("../etc", "a/b", date);
        assert!(path.starts_with("/data/vars/2024/12/031"));
        assert!(!path.to_string_lossy().contains(".."));
        assert!(path.ends_with("ACME_SHIP01-___etc_a_b_031.csv"));
    }

    #[test]
    fn test_format_line() {
        assert_eq!(
            format_line(at(2024, 3, 7, 9, 5, 1), 1.0),
            "2024-03-07 09:05:01,,1.000\n"
        );
        assert_eq!(
            format_line(at(2024, 3, 7, 23, 59, 59), -12.34567),
            "2024-03-07 23:59:59,,-12.346\n"
        );
    }

    #[tokio::test]
    async fn test_append_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink(dir.path());

        let path = sink
            .append("Engine", "RPM", at(2024, 3, 7, 12, 0, 0), 1500.0)
            .await
            .unwrap();
        assert!(path.starts_with(dir.path().join("vars/2024/03/007/Engine/RPM")));

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "2024-03-07 12:00:00,,1500.000\n");
    }

    #[tokio::test]
    async fn test_append_never_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink(dir.path());

        let first = sink
            .append("Engine", "RPM", at(2024, 3, 7, 12, 0, 0), 1.0)
            .await
            .unwrap();
        let second = sink
            .append("Engine", "RPM", at(2024, 3, 7, 12, 1, 0), 2.0)
            .await
            .unwrap();
        assert_eq!(first, second);

        let content = std::fs::read_to_string(&first).unwrap();
        assert_eq!(
            content,
            "2024-03-07 12:00:00,,1.000\n2024-03-07 12:01:00,,2.000\n"
        );
    }

    #[tokio::test]
    async fn test_new_day_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink(dir.path());

        let today = sink
            .append("Engine", "RPM", at(2024, 3, 7, 23, 59, 59), 1.0)
            .await
            .unwrap();
        let tomorrow = sink
            .append("Engine", "RPM", at(2024, 3, 8, 0, 0, 0), 1.0)
            .await
            .unwrap();
        assert_ne!(today, tomorrow);
        assert!(tomorrow.ends_with("ACME_SHIP01-Engine_RPM_008.csv"));
    }
}
