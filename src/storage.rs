//! Results persistence.
//!
//! One delimited results file per run: a `#`-commented parameter header
//! (the run's JSON-serialized configuration), the `DATA_COLUMNS` header row,
//! then one row per emitted record, flushed as it arrives so a killed run
//! leaves usable data behind.
//!
//! Series runs additionally get a plain-text index file listing the
//! constituent data filenames under a commented sweep header.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{AppResult, CalibError};
use crate::procedure::{ProcedureConfig, ResultRecord, DATA_COLUMNS};
use crate::sweep::SweepParameter;

/// Build a filename that is guaranteed not to clobber an existing file.
///
/// With `dated_folder` the file lands in a `YYYY-MM-DD` subdirectory of
/// `dir` (created as needed). The name is `{prefix}{YYYY-MM-DD}_{n}.{ext}`
/// with `n` incremented past any existing files.
pub fn unique_filename(
    dir: &Path,
    prefix: &str,
    ext: &str,
    dated_folder: bool,
) -> AppResult<PathBuf> {
    let now = chrono::Local::now();
    let date = now.format("%Y-%m-%d").to_string();
    let mut dir = dir.to_path_buf();
    if dated_folder {
        dir = dir.join(&date);
    }
    std::fs::create_dir_all(&dir)?;

    let mut index: u32 = 1;
    loop {
        let candidate = dir.join(format!("{prefix}{date}_{index}.{ext}"));
        if !candidate.exists() {
            return Ok(candidate);
        }
        index += 1;
    }
}

/// Filename prefix for one run of a series, embedding the swept setpoint
/// (e.g. `icarus_calibCheck_F001.5_`).
pub fn run_prefix(name: &str, setpoint: f64) -> String {
    format!("{name}_calibCheck_F{setpoint:05.1}_")
}

/// Writer for one run's results file.
pub struct ResultsWriter {
    path: PathBuf,
    writer: csv::Writer<File>,
    records: usize,
}

impl ResultsWriter {
    /// Create the file, write the commented parameter header and the column
    /// header row.
    pub fn create(path: &Path, config: &ProcedureConfig) -> AppResult<Self> {
        let mut file = File::create(path)?;

        let json = serde_json::to_string_pretty(config)
            .map_err(|e| CalibError::Storage(format!("serializing run parameters: {e}")))?;
        for line in json.lines() {
            writeln!(file, "# {line}")?;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer
            .write_record(DATA_COLUMNS)
            .map_err(|e| CalibError::Storage(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| CalibError::Storage(e.to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            records: 0,
        })
    }

    /// Append one record and flush it to disk.
    pub fn write_record(&mut self, record: &ResultRecord) -> AppResult<()> {
        self.writer
            .serialize(record)
            .map_err(|e| CalibError::Storage(e.to_string()))?;
        self.writer
            .flush()
            .map_err(|e| CalibError::Storage(e.to_string()))?;
        self.records += 1;
        Ok(())
    }

    /// Where the file lives.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written so far.
    pub fn records(&self) -> usize {
        self.records
    }
}

/// Index file for a multi-run series.
pub struct SeriesIndex {
    path: PathBuf,
    file: File,
}

impl SeriesIndex {
    /// Create the index file with its commented sweep header.
    pub fn create(path: &Path, swept: &SweepParameter, units: &str) -> AppResult<Self> {
        let mut file = File::create(path)?;
        writeln!(file, "# swept procedure column: field_strength")?;
        writeln!(file, "# swept series parameter: {}", swept.name)?;
        writeln!(file, "# Parameters:")?;
        writeln!(file, "#")?;
        if let (Some(first), Some(last)) = (swept.values.first(), swept.values.last()) {
            writeln!(file, "# Initial {}: {:} {units}", swept.name, first)?;
            writeln!(file, "# Final {}: {:} {units}", swept.name, last)?;
            if swept.values.len() > 1 {
                writeln!(
                    file,
                    "# {} Step: {:} {units}",
                    swept.name,
                    swept.values[1] - swept.values[0]
                )?;
            }
        }
        writeln!(file, "#")?;
        writeln!(file, "# Files in Series:")?;
        writeln!(file, "#")?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Append one constituent data filename.
    pub fn push(&mut self, data_file: &Path) -> AppResult<()> {
        let name = data_file
            .file_name()
            .ok_or_else(|| CalibError::Storage("data file has no filename".to_string()))?;
        writeln!(self.file, "{}", name.to_string_lossy())?;
        self.file.flush()?;
        Ok(())
    }

    /// Where the index lives.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procedure::ProcedureConfig;

    fn sample_record() -> ResultRecord {
        ResultRecord {
            phi: 10.0,
            theta: 11.0,
            x: 1.0,
            y: 2.0,
            act_phi: 45.0,
            act_theta: 0.0,
            xfield_avg: 0.1,
            yfield_avg: 0.1,
            zfield_avg: 0.0,
            xfield_std: 0.0,
            yfield_std: 0.0,
            zfield_std: 0.0,
            bmag: 0.1414,
            volts: 2.0,
            act_volts: 2.01,
            bmag_dev: Some(0.0414),
            bmag_dev_pct: Some(29.3),
        }
    }

    #[test]
    fn test_unique_filename_never_clobbers() {
        let dir = tempfile::tempdir().unwrap();
        let first = unique_filename(dir.path(), "run_", "csv", false).unwrap();
        std::fs::write(&first, "taken").unwrap();
        let second = unique_filename(dir.path(), "run_", "csv", false).unwrap();
        assert_ne!(first, second);
        assert!(!second.exists());
    }

    #[test]
    fn test_unique_filename_dated_folder() {
        let dir = tempfile::tempdir().unwrap();
        let path = unique_filename(dir.path(), "run_", "csv", true).unwrap();
        let parent = path.parent().unwrap();
        let date = chrono::Local::now().format("%Y-%m-%d").to_string();
        assert_eq!(parent.file_name().unwrap().to_string_lossy(), date);
    }

    #[test]
    fn test_results_file_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        let mut writer = ResultsWriter::create(&path, &ProcedureConfig::default()).unwrap();
        writer.write_record(&sample_record()).unwrap();
        writer.write_record(&sample_record()).unwrap();
        assert_eq!(writer.records(), 2);

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        // commented parameter header first
        assert!(lines.next().unwrap().starts_with("# "));
        let header = text
            .lines()
            .find(|l| !l.starts_with('#'))
            .unwrap();
        assert_eq!(header, DATA_COLUMNS.join(","));
        let data_rows = text
            .lines()
            .filter(|l| !l.starts_with('#'))
            .count();
        assert_eq!(data_rows, 3); // header + 2 records
    }

    #[test]
    fn test_voltage_mode_row_leaves_deviation_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        let mut writer = ResultsWriter::create(&path, &ProcedureConfig::default()).unwrap();
        let mut record = sample_record();
        record.bmag_dev = None;
        record.bmag_dev_pct = None;
        writer.write_record(&record).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let row = text.lines().last().unwrap();
        assert!(row.ends_with(",,"));
    }

    #[test]
    fn test_series_index_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.txt");
        let swept = SweepParameter::from_range("field", 0.0, 1.0, 0.3);
        let mut index = SeriesIndex::create(&path, &swept, "T").unwrap();
        index.push(Path::new("/tmp/whatever/run_1.csv")).unwrap();
        index.push(Path::new("/tmp/whatever/run_2.csv")).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("# swept series parameter: field"));
        assert!(text.contains("# Initial field: 0 T"));
        assert!(text.contains("# Final field: 1 T"));
        assert!(text.contains("# Files in Series:"));
        let files: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(files, vec!["run_1.csv", "run_2.csv"]);
    }
}
