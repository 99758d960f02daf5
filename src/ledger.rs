use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use log::{error, info, warn};
use regex::Regex;

use crate::browser::Session;
use crate::error::ScrapeError;
use crate::extractor::StatusRow;
use crate::input_loader::RegistrationNumber;

pub const LEDGER_HEADER: [&str; 5] = [
    "Registration Number",
    "Building/Tower",
    "Floor",
    "Status",
    "Completion Date",
];

static PATH_UNSAFE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[/\\:*?"<>|\s]"#).expect("static pattern"));

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Append-only CSV of status rows.
pub struct OutputLedger {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl OutputLedger {
    /// Open for appending, writing the header first if the file is new or
    /// empty. An existing header is never touched.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ScrapeError> {
        let path = path.as_ref().to_path_buf();
        let is_new = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        ensure_parent(&path)?;

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(file);

        if is_new {
            writer.write_record(LEDGER_HEADER)?;
            writer.flush()?;
            info!("Created output file {:?} with headers", path);
        } else {
            info!("Appending to existing output file {:?}", path);
        }

        Ok(OutputLedger { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, row: &StatusRow) -> Result<(), csv::Error> {
        self.writer.write_record(row.to_record())?;
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }
}

/// Plain-text list of registrations to re-run by hand.
pub struct FailureLog {
    path: PathBuf,
}

impl FailureLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FailureLog { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// One line: the bare number, or `<number> - Error: <message>`.
    pub fn record(&self, registration: &RegistrationNumber, annotation: Option<&str>) -> io::Result<()> {
        let line = match annotation {
            Some(message) => format!("{} - Error: {}", registration, message.replace(['\r', '\n'], " ")),
            None => registration.to_string(),
        };

        ensure_parent(&self.path)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)?;
        file.flush()?;
        file.sync_data()?;
        warn!("Logged failure: {}", line);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    NoTable,
    Error,
}

impl SnapshotKind {
    fn prefix(self) -> &'static str {
        match self {
            SnapshotKind::NoTable => "no_table",
            SnapshotKind::Error => "error",
        }
    }
}

/// Writes page screenshots for offline debugging. Never fails the caller.
pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        SnapshotWriter { dir: dir.as_ref().to_path_buf() }
    }

    pub fn path_for(&self, kind: SnapshotKind, registration: &RegistrationNumber) -> PathBuf {
        self.dir.join(format!("{}_{}.png", kind.prefix(), snapshot_stem(registration)))
    }

    pub fn capture<S: Session + ?Sized>(
        &self,
        session: &S,
        kind: SnapshotKind,
        registration: &RegistrationNumber,
    ) -> Option<PathBuf> {
        let path = self.path_for(kind, registration);
        let written = session
            .screenshot()
            .map_err(|e| e.to_string())
            .and_then(|png| {
                fs::create_dir_all(&self.dir)
                    .and_then(|_| fs::write(&path, png))
                    .map_err(|e| e.to_string())
            });

        match written {
            Ok(()) => {
                info!("Snapshot saved to {:?}", path);
                Some(path)
            }
            Err(e) => {
                error!("Failed to save snapshot for {}: {}", registration, e);
                None
            }
        }
    }
}

/// File-name-safe form of a registration number.
pub fn snapshot_stem(registration: &RegistrationNumber) -> String {
    PATH_UNSAFE.replace_all(registration.as_str(), "_").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_dir(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("rera_ledger_{}", name));
        let _ = fs::remove_dir_all(&p);
        fs::create_dir_all(&p).unwrap();
        p
    }

    fn row(reg: &str, cells: &[&str]) -> StatusRow {
        StatusRow::new(
            RegistrationNumber::new(reg),
            cells.iter().map(|c| c.to_string()).collect(),
        )
    }

    #[test]
    fn header_written_once_across_reopens() {
        let path = tmp_dir("header").join("construction_status.csv");
        {
            let mut ledger = OutputLedger::open(&path).unwrap();
            ledger.append(&row("PROJ/001", &["Tower A", "3", "Ongoing", "2026-01-01"])).unwrap();
        }
        {
            let mut ledger = OutputLedger::open(&path).unwrap();
            ledger.append(&row("PROJ/001", &["Tower A", "3", "Ongoing", "2026-01-01"])).unwrap();
        }

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Registration Number,Building/Tower,Floor,Status,Completion Date");
        assert_eq!(lines[1], lines[2]);
        assert_eq!(content.matches("Registration Number").count(), 1);
    }

    #[test]
    fn empty_existing_file_gets_header() {
        let path = tmp_dir("empty").join("out.csv");
        fs::write(&path, "").unwrap();
        OutputLedger::open(&path).unwrap();
        assert!(fs::read_to_string(&path).unwrap().starts_with("Registration Number,"));
    }

    #[test]
    fn rows_keep_their_width_and_minimal_quoting() {
        let path = tmp_dir("width").join("out.csv");
        let mut ledger = OutputLedger::open(&path).unwrap();
        ledger.append(&row("WBRERA/P/KOL/2023/000001", &["Block 1, East", "G+4"])).unwrap();
        ledger
            .append(&row("PROJ/002", &["T2", "7", "Completed", "2024-05-01", "extra"]))
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[1], "WBRERA/P/KOL/2023/000001,\"Block 1, East\",G+4");
        assert_eq!(lines[2], "PROJ/002,T2,7,Completed,2024-05-01,extra");
    }

    #[test]
    fn failure_lines_are_bare_or_annotated() {
        let log = FailureLog::new(tmp_dir("failures").join("failed_registrations.txt"));
        log.record(&RegistrationNumber::new("PROJ/002"), None).unwrap();
        log.record(&RegistrationNumber::new("PROJ/003"), Some("tab vanished\nmid-run")).unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        assert_eq!(content, "PROJ/002\nPROJ/003 - Error: tab vanished mid-run\n");
    }

    #[test]
    fn snapshot_names_replace_unsafe_characters() {
        let writer = SnapshotWriter::new("snaps");
        let reg = RegistrationNumber::new("WBRERA/P/NOR/2023:01 A");
        assert_eq!(snapshot_stem(&reg), "WBRERA_P_NOR_2023_01_A");
        assert_eq!(
            writer.path_for(SnapshotKind::NoTable, &reg),
            Path::new("snaps").join("no_table_WBRERA_P_NOR_2023_01_A.png")
        );
        assert!(writer
            .path_for(SnapshotKind::Error, &reg)
            .ends_with("error_WBRERA_P_NOR_2023_01_A.png"));
    }
}
