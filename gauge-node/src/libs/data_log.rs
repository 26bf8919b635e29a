//! CSV data log of every polling cycle.

use std::{
    fs::{self, OpenOptions},
    io::{Error as IoError, ErrorKind},
    path::{Path, PathBuf},
};

use chrono::{Days, NaiveDateTime};
use log::info;

/// Date suffix of rotated files.
const ROTATE_DATE_FORMAT: &'static str = "%m-%d-%y";

/// Appends rows to a CSV file. The file is opened per row so it can be rotated at any time.
pub struct DataLog {
    path: PathBuf,
}

impl DataLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        DataLog {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Append one record, creating the file if necessary.
    pub fn append(&self, row: &[String]) -> Result<(), csv::Error> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_path())?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file);
        writer.write_record(row)?;
        writer.flush()?;
        Ok(())
    }

    /// Move the current file to `<stem>_<MM-DD-YY>.<ext>` of the day before `now`.
    ///
    /// Returns the new path, or `None` if there was nothing to rotate.
    pub fn rotate(&self, now: NaiveDateTime) -> Result<Option<PathBuf>, IoError> {
        const FN_NAME: &'static str = "DataLog::rotate";

        let dst = self.rotated_path(now);
        match fs::rename(self.path.as_path(), dst.as_path()) {
            Err(e) => match e.kind() {
                ErrorKind::NotFound => Ok(None),
                _ => Err(e),
            },
            Ok(()) => {
                info!(
                    "[{}] rotated {} to {}",
                    FN_NAME,
                    self.path.display(),
                    dst.display()
                );
                Ok(Some(dst))
            }
        }
    }

    fn rotated_path(&self, now: NaiveDateTime) -> PathBuf {
        let day = now.date().checked_sub_days(Days::new(1)).unwrap_or(now.date());
        let suffix = day.format(ROTATE_DATE_FORMAT);
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let name = match self.path.extension() {
            None => format!("{}_{}", stem, suffix),
            Some(ext) => format!("{}_{}.{}", stem, suffix, ext.to_string_lossy()),
        };
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tempfile::tempdir;

    use super::*;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 5)
            .unwrap()
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn append_rows() {
        let dir = tempdir().unwrap();
        let log = DataLog::new(dir.path().join("data_log.csv"));

        log.append(&row(&["2025-01-02 10:00:00", "", "2.5"])).unwrap();
        log.append(&row(&["2025-01-02 10:01:00", "42", "2.5", "0.1"]))
            .unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        assert_eq!(
            content,
            "2025-01-02 10:00:00,,2.5\n2025-01-02 10:01:00,42,2.5,0.1\n"
        );
    }

    #[test]
    fn rotate_names_previous_day() {
        let dir = tempdir().unwrap();
        let log = DataLog::new(dir.path().join("data_log.csv"));
        log.append(&row(&["x"])).unwrap();

        let dst = log.rotate(at(2025, 1, 2)).unwrap().unwrap();
        assert_eq!(dst, dir.path().join("data_log_01-01-25.csv"));
        assert!(dst.exists());
        assert!(!log.path().exists());

        // New rows go to a fresh file.
        log.append(&row(&["y"])).unwrap();
        assert_eq!(fs::read_to_string(log.path()).unwrap(), "y\n");
    }

    #[test]
    fn rotate_across_year_and_without_extension() {
        let dir = tempdir().unwrap();
        let log = DataLog::new(dir.path().join("events"));
        log.append(&row(&["x"])).unwrap();

        let dst = log.rotate(at(2025, 1, 1)).unwrap().unwrap();
        assert_eq!(dst, dir.path().join("events_12-31-24"));
    }

    #[test]
    fn rotate_missing_file() {
        let dir = tempdir().unwrap();
        let log = DataLog::new(dir.path().join("data_log.csv"));
        assert_eq!(log.rotate(at(2025, 1, 2)).unwrap(), None);
    }
}
