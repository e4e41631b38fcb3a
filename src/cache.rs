// Memoization for the two loaders and the filter engine.
//
// Source tables are re-read only when the resolved file, its modification
// time or its length changes. Filter results are keyed by the full
// parameter set and are dropped whenever the customer table is reloaded.
use crate::config::Config;
use crate::error::LoadError;
use crate::filter::{filtered_indices, FilterParams};
use crate::loader::{load_customers, load_legacy, resolve_source};
use crate::types::{CustomerTable, LegacyTable};
use log::{debug, info};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Identity of a source file on disk. `path == None` means no candidate
/// existed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStamp {
    pub path: Option<PathBuf>,
    pub modified: Option<SystemTime>,
    pub len: u64,
}

impl SourceStamp {
    pub fn of(path: Option<&Path>) -> Self {
        let meta = path.and_then(|p| fs::metadata(p).ok());
        Self {
            path: path.map(Path::to_path_buf),
            modified: meta.as_ref().and_then(|m| m.modified().ok()),
            len: meta.map(|m| m.len()).unwrap_or(0),
        }
    }
}

struct Cached<T> {
    stamp: SourceStamp,
    result: Result<T, LoadError>,
}

/// Holds the loaded source tables for one process.
pub struct DataStore {
    config: Config,
    legacy: Cached<LegacyTable>,
    customers: Cached<CustomerTable>,
    generation: u64,
}

impl DataStore {
    /// Load both sources once.
    pub fn open(config: Config) -> Self {
        let legacy = Self::read_legacy(&config);
        let customers = Self::read_customers(&config);
        Self {
            config,
            legacy,
            customers,
            generation: 1,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Re-read any source whose file changed since it was loaded. Returns
    /// true when something was reloaded.
    pub fn refresh(&mut self) -> bool {
        let mut reloaded = false;

        let candidates = self.config.legacy_paths();
        let current = SourceStamp::of(resolve_source(&candidates).as_deref());
        if current != self.legacy.stamp {
            info!("legacy source changed, reloading");
            self.legacy = Self::read_legacy(&self.config);
            reloaded = true;
        }

        let path = self.config.customer_path();
        let current = SourceStamp::of(path.is_file().then_some(path.as_path()));
        if current != self.customers.stamp {
            info!("customer DB changed, reloading");
            self.customers = Self::read_customers(&self.config);
            self.generation += 1;
            reloaded = true;
        }
        reloaded
    }

    /// Drop everything and read both sources again.
    pub fn invalidate(&mut self) {
        self.legacy = Self::read_legacy(&self.config);
        self.customers = Self::read_customers(&self.config);
        self.generation += 1;
    }

    pub fn legacy(&self) -> Result<&LegacyTable, &LoadError> {
        self.legacy.result.as_ref()
    }

    pub fn customers(&self) -> Result<&CustomerTable, &LoadError> {
        self.customers.result.as_ref()
    }

    /// Bumped each time the customer table is replaced.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn read_legacy(config: &Config) -> Cached<LegacyTable> {
        let candidates = config.legacy_paths();
        let stamp = SourceStamp::of(resolve_source(&candidates).as_deref());
        Cached {
            stamp,
            result: load_legacy(&candidates),
        }
    }

    fn read_customers(config: &Config) -> Cached<CustomerTable> {
        let path = config.customer_path();
        let stamp = SourceStamp::of(path.is_file().then_some(path.as_path()));
        Cached {
            stamp,
            result: load_customers(&path),
        }
    }
}

/// Filter results keyed by the complete parameter set.
#[derive(Debug, Default)]
pub struct FilterCache {
    generation: u64,
    entries: HashMap<FilterParams, Vec<usize>>,
}

impl FilterCache {
    /// Indices of `table` rows passing `params`. `generation` identifies the
    /// table; a new generation empties the cache first.
    pub fn get_or_compute(
        &mut self,
        generation: u64,
        table: &CustomerTable,
        params: &FilterParams,
    ) -> &[usize] {
        if generation != self.generation {
            self.entries.clear();
            self.generation = generation;
        }
        match self.entries.entry(params.clone()) {
            Entry::Occupied(e) => {
                debug!("filter cache hit");
                e.into_mut()
            }
            Entry::Vacant(e) => {
                debug!("filter cache miss");
                e.insert(filtered_indices(table, params))
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}
