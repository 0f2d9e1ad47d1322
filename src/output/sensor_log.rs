//! Delimited time-series logs written by sensors.
//!
//! One file per sensor, named `sensor[<component name>].csv`, with a
//! `sim_time` column followed by sensor-specific value columns. Rows are
//! buffered and flushed on drop or explicit finish, so a crashing sensor
//! cannot leave a partially written row behind mid-file.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, SimulationError};

/// Column separator. Kept as a constant rather than a config knob; every
/// downstream consumer of these logs expects plain comma-separated text.
const DELIMITER: char = ',';

/// A buffered CSV writer for one sensor's time series.
#[derive(Debug)]
pub struct SensorLog {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    columns: usize,
}

impl SensorLog {
    /// Path of the log file of a named sensor below a results directory.
    pub fn file_path(results_dir: &Path, log_folder: &str, sensor_name: &str) -> PathBuf {
        results_dir
            .join(log_folder)
            .join(format!("sensor[{sensor_name}].csv"))
    }

    /// Create the folder for a sensor log. Runs in the folder-creation
    /// init stage, before any file is opened.
    pub fn create_folder(results_dir: &Path, log_folder: &str) -> Result<()> {
        fs::create_dir_all(results_dir.join(log_folder))?;
        Ok(())
    }

    /// Open the log file and write its header. `value_columns` are the
    /// sensor-specific column names following `sim_time`.
    pub fn create(
        results_dir: &Path,
        log_folder: &str,
        sensor_name: &str,
        value_columns: &[&str],
    ) -> Result<Self> {
        if value_columns.is_empty() {
            return Err(SimulationError::Configuration(format!(
                "sensor log for \"{sensor_name}\" needs at least one value column"
            )));
        }
        let path = Self::file_path(results_dir, log_folder, sensor_name);
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        write!(writer, "sim_time")?;
        for column in value_columns {
            write!(writer, "{DELIMITER}{column}")?;
        }
        writeln!(writer)?;
        Ok(Self {
            path,
            writer: Some(writer),
            columns: value_columns.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row. The value count must match the header.
    pub fn write_row(&mut self, sim_time: f64, values: &[f64]) -> Result<()> {
        if values.len() != self.columns {
            return Err(SimulationError::Configuration(format!(
                "sensor log {} expects {} value columns, got {}",
                self.path.display(),
                self.columns,
                values.len()
            )));
        }
        let Some(writer) = self.writer.as_mut() else {
            return Err(SimulationError::Configuration(format!(
                "sensor log {} was already finished",
                self.path.display()
            )));
        };
        write!(writer, "{sim_time}")?;
        for value in values {
            write!(writer, "{DELIMITER}{value}")?;
        }
        writeln!(writer)?;
        Ok(())
    }

    /// Flush and close the file. Further writes fail.
    pub fn finish(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for SensorLog {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}
