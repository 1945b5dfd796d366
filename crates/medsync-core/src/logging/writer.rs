//! Append-only JSONL files, one per instance per local day.
//!
//! A writer that outlives midnight (a long `watch`) moves on to the next
//! day's file at the first record written after the date changes.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use parking_lot::Mutex;
use tracing::warn;

use super::entry::LogRecord;

const RAW_DIR: &str = "raw";
const EXTENSION: &str = "jsonl";

struct DayFile {
    date: NaiveDate,
    path: PathBuf,
    file: BufWriter<File>,
}

impl DayFile {
    fn open(raw: &Path, instance: &str, date: NaiveDate) -> io::Result<Self> {
        let path = raw.join(format!("{}_{instance}.{EXTENSION}", date.format("%Y-%m-%d")));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            date,
            path,
            file: BufWriter::new(file),
        })
    }
}

/// Appends [`LogRecord`]s to `<log-dir>/raw/<date>_<instance>.jsonl`.
pub struct LogFileWriter {
    instance: String,
    raw: PathBuf,
    current: Mutex<DayFile>,
}

impl LogFileWriter {
    /// Open (or create) today's file for `instance`, creating the directory
    /// tree as needed.
    ///
    /// # Arguments
    /// * `log_dir` - Root log directory; files go under its `raw/` child
    /// * `instance` - Process name, part of every file name
    pub fn open(log_dir: impl AsRef<Path>, instance: impl Into<String>) -> io::Result<Self> {
        let instance = instance.into();
        let raw = log_dir.as_ref().join(RAW_DIR);
        fs::create_dir_all(&raw)?;
        let current = DayFile::open(&raw, &instance, today())?;

        Ok(Self {
            instance,
            raw,
            current: Mutex::new(current),
        })
    }

    /// Instance name written into every record's file name.
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// File the next record goes to, unless the date changes first.
    pub fn path(&self) -> PathBuf {
        self.current.lock().path.clone()
    }

    /// Append one record and flush, so a crash loses at most the current line.
    pub fn append(&self, record: &LogRecord) -> io::Result<()> {
        self.append_on(record, today())
    }

    /// Append as if the local date were `date`, switching files when it
    /// differs from the open one.
    pub(crate) fn append_on(&self, record: &LogRecord, date: NaiveDate) -> io::Result<()> {
        let line = record
            .to_line()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut current = self.current.lock();
        if current.date != date {
            current.file.flush()?;
            *current = DayFile::open(&self.raw, &self.instance, date)?;
        }
        writeln!(current.file, "{line}")?;
        current.file.flush()
    }

    /// Push buffered bytes of the open file to disk.
    pub fn flush(&self) -> io::Result<()> {
        self.current.lock().file.flush()
    }
}

impl Drop for LogFileWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Every record under `<log-dir>/raw`, sorted by timestamp.
///
/// Unparseable lines are skipped with a warning. A missing directory yields
/// an empty list.
pub fn read_records(log_dir: impl AsRef<Path>) -> io::Result<Vec<LogRecord>> {
    collect(log_dir.as_ref(), |_| true)
}

/// Records from files whose name starts with `date` (`YYYY-MM-DD`).
pub fn read_records_for_date(log_dir: impl AsRef<Path>, date: &str) -> io::Result<Vec<LogRecord>> {
    collect(log_dir.as_ref(), |name| name.starts_with(date))
}

fn collect(log_dir: &Path, accept: impl Fn(&str) -> bool) -> io::Result<Vec<LogRecord>> {
    let raw = log_dir.join(RAW_DIR);
    if !raw.exists() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for dir_entry in fs::read_dir(&raw)? {
        let path = dir_entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) || !accept(name) {
            continue;
        }

        let content = fs::read_to_string(&path)?;
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match LogRecord::from_line(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %path.display(), line = lineno + 1, error = %e, "Skipping malformed log line"),
            }
        }
    }

    records.sort_by(|a, b| a.ts.cmp(&b.ts));
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_raw_dir() {
        let temp = TempDir::new().unwrap();
        let writer = LogFileWriter::open(temp.path().join("logs"), "front-desk").unwrap();

        assert!(temp.path().join("logs").join("raw").is_dir());
        assert!(writer.path().exists());
        assert!(writer
            .path()
            .to_string_lossy()
            .ends_with("_front-desk.jsonl"));
    }

    #[test]
    fn test_date_change_switches_file() {
        let temp = TempDir::new().unwrap();
        let writer = LogFileWriter::open(temp.path(), "watch").unwrap();
        let first = writer.path();
        let tomorrow = today().succ_opt().unwrap();

        writer
            .append(&LogRecord::new("info", "watch", "t", "before midnight"))
            .unwrap();
        writer
            .append_on(&LogRecord::new("info", "watch", "t", "after midnight"), tomorrow)
            .unwrap();

        let second = writer.path();
        assert_ne!(first, second);
        assert!(second
            .to_string_lossy()
            .ends_with(&format!("{}_watch.jsonl", tomorrow.format("%Y-%m-%d"))));
        drop(writer);

        let day = tomorrow.format("%Y-%m-%d").to_string();
        let next_day = read_records_for_date(temp.path(), &day).unwrap();
        assert_eq!(next_day.len(), 1);
        assert_eq!(next_day[0].msg, "after midnight");
        assert_eq!(read_records(temp.path()).unwrap().len(), 2);
    }

    #[test]
    fn test_two_instances_merge_on_read() {
        let temp = TempDir::new().unwrap();
        let a = LogFileWriter::open(temp.path(), "a").unwrap();
        let b = LogFileWriter::open(temp.path(), "b").unwrap();

        a.append(&LogRecord::new("info", "a", "t", "first")).unwrap();
        b.append(&LogRecord::new("info", "b", "t", "second")).unwrap();
        drop(a);
        drop(b);

        let records = read_records(temp.path()).unwrap();
        assert_eq!(records.len(), 2);
        let mut instances: Vec<_> = records.iter().map(|r| r.instance.as_str()).collect();
        instances.sort();
        assert_eq!(instances, vec!["a", "b"]);
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let temp = TempDir::new().unwrap();
        let writer = LogFileWriter::open(temp.path(), "x").unwrap();
        writer.append(&LogRecord::new("info", "x", "t", "ok")).unwrap();
        let path = writer.path();
        drop(writer);

        let mut content = fs::read_to_string(&path).unwrap();
        content.push_str("not json\n\n");
        fs::write(&path, content).unwrap();

        let records = read_records(temp.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].msg, "ok");
    }

    #[test]
    fn test_read_by_date_and_missing_dir() {
        let temp = TempDir::new().unwrap();
        assert!(read_records(temp.path()).unwrap().is_empty());

        let writer = LogFileWriter::open(temp.path(), "x").unwrap();
        writer.append(&LogRecord::new("info", "x", "t", "today")).unwrap();
        drop(writer);

        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        assert_eq!(read_records_for_date(temp.path(), &today).unwrap().len(), 1);
        assert!(read_records_for_date(temp.path(), "1999-01-01")
            .unwrap()
            .is_empty());
    }
}
