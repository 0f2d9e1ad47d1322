//! Loading and caching of flow fields.
//!
//! The store resolves a [`FieldKey`] in three steps: an in-memory map of
//! already loaded fields, a binary cache file keyed by the case parameters,
//! and finally the raw case directory. A successful raw parse writes the
//! cache file for subsequent runs. Loaded fields are shared as
//! `Arc<VectorField>` and never mutated.
//!
//! Cache writes go through a temporary file in the cache directory followed
//! by an atomic rename, so a crash mid-write can never leave a truncated
//! cache behind and concurrent rebuilds of the same key resolve to the last
//! completed writer.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use crate::error::{Result, SimulationError};
use crate::fields::key::FieldKey;
use crate::fields::parser;
use crate::fields::vector_field::VectorField;

/// Loads, caches, and hands out immutable flow fields.
#[derive(Debug)]
pub struct FieldStore {
    cases_root: PathBuf,
    cache_dir: PathBuf,
    loaded: HashMap<String, Arc<VectorField>>,
}

impl FieldStore {
    /// A store reading cases from `cases_root` and keeping its binary cache
    /// in `<cases_root>/cache`.
    pub fn new(cases_root: impl Into<PathBuf>) -> Self {
        let cases_root = cases_root.into();
        let cache_dir = cases_root.join("cache");
        Self {
            cases_root,
            cache_dir,
            loaded: HashMap::new(),
        }
    }

    /// Override the cache directory (by default `<cases_root>/cache`).
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    pub fn cases_root(&self) -> &Path {
        &self.cases_root
    }

    /// Resolve a key to a loaded field.
    ///
    /// Fails with [`SimulationError::GeometryMismatch`] when no case
    /// directory exists for the key, and with [`SimulationError::Parse`]
    /// when the case data is malformed.
    pub fn load(&mut self, key: &FieldKey) -> Result<Arc<VectorField>> {
        let cache_key = key.cache_file_name();
        if let Some(field) = self.loaded.get(&cache_key) {
            return Ok(Arc::clone(field));
        }

        let field = match self.load_from_cache_file(key) {
            Some(field) => field,
            None => self.parse_and_cache(key)?,
        };
        let field = Arc::new(field);
        self.loaded.insert(cache_key, Arc::clone(&field));
        info!("finished loading flow field \"{key}\"");
        Ok(field)
    }

    fn cache_path(&self, key: &FieldKey) -> PathBuf {
        self.cache_dir.join(key.cache_file_name())
    }

    fn case_dir(&self, key: &FieldKey) -> PathBuf {
        self.cases_root.join(&key.family).join(&key.case)
    }

    /// Try the binary cache; any unreadable or undecodable cache file is
    /// discarded in favour of a fresh parse.
    fn load_from_cache_file(&self, key: &FieldKey) -> Option<VectorField> {
        let path = self.cache_path(key);
        let bytes = fs::read(&path).ok()?;
        match bincode::deserialize(&bytes) {
            Ok(field) => {
                info!("loaded cached flow field from {}", path.display());
                Some(field)
            }
            Err(err) => {
                warn!(
                    "cannot decode cached flow field {} ({err}); reparsing raw case",
                    path.display()
                );
                None
            }
        }
    }

    fn parse_and_cache(&self, key: &FieldKey) -> Result<VectorField> {
        let case_dir = self.case_dir(key);
        if !case_dir.is_dir() {
            return Err(SimulationError::GeometryMismatch {
                key: key.to_string(),
                reason: format!("no case directory at {}", case_dir.display()),
            });
        }
        let field = parser::parse_case(&case_dir)?;
        if let Err(err) = self.write_cache_file(key, &field) {
            // A failed cache write only costs reparse time on the next run.
            warn!("could not write field cache for \"{key}\": {err}");
        }
        Ok(field)
    }

    fn write_cache_file(&self, key: &FieldKey, field: &VectorField) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)?;
        let encoded = bincode::serialize(field).map_err(|err| SimulationError::Parse {
            path: self.cache_path(key),
            reason: format!("cache serialization failed: {err}"),
        })?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.cache_dir)?;
        tmp.write_all(&encoded)?;
        tmp.persist(self.cache_path(key))
            .map_err(|err| SimulationError::Io(err.error))?;
        info!(
            "saved flow field cache \"{}\"",
            self.cache_path(key).display()
        );
        Ok(())
    }
}
