//! Periodic snapshots of the particle collection.
//!
//! One CSV file per written base step, `positions.csv.<step>`, holding id,
//! position, nearest cell, and owning object of every live molecule. The
//! files feed offline visualization; nothing in the core reads them back.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::error::Result;
use crate::kernel::SimulationClock;
use crate::particles::MoleculeManager;

/// Construction parameters for a [`TraceWriter`].
#[derive(Debug, Clone)]
pub struct TraceConfig {
    /// Output folder, relative to the kernel's results directory.
    pub folder: String,
    /// Write every n-th base step; 1 writes every step.
    pub write_interval: u64,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            folder: "positions".into(),
            write_interval: 1,
        }
    }
}

/// Writes molecule snapshots on the base-step grid.
#[derive(Debug)]
pub struct TraceWriter {
    folder: PathBuf,
    write_interval: u64,
}

impl TraceWriter {
    pub fn new(config: TraceConfig) -> Self {
        Self {
            folder: PathBuf::from(config.folder),
            write_interval: config.write_interval.max(1),
        }
    }

    /// Resolve the output folder below the results dir and create it.
    pub fn create_folder(&mut self, results_dir: &std::path::Path) -> Result<()> {
        self.folder = results_dir.join(&self.folder);
        fs::create_dir_all(&self.folder)?;
        Ok(())
    }

    /// Write a snapshot if the current base step is on the interval.
    pub fn write(&self, molecules: &MoleculeManager, clock: &SimulationClock) -> Result<()> {
        if clock.elapsed_base_steps % self.write_interval != 0 {
            return Ok(());
        }
        let path = self
            .folder
            .join(format!("positions.csv.{}", clock.elapsed_base_steps));
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "id,x,y,z,cell_id,object_id")?;
        for molecule in molecules.get_all() {
            writeln!(
                writer,
                "{},{},{},{},{},{}",
                molecule.id,
                molecule.position.x,
                molecule.position.y,
                molecule.position.z,
                molecule
                    .cell_id
                    .map_or(String::from(""), |c| c.to_string()),
                molecule
                    .object_id
                    .map_or(String::from(""), |o| o.to_string()),
            )?;
        }
        writer.flush()?;
        Ok(())
    }
}
