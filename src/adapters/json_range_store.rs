//! JSON file cache of optimizer search ranges, keyed by symbol.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::domain::error::TraderError;
use crate::domain::optimizer::search_space::ParameterRanges;
use crate::ports::range_port::RangeStore;

pub struct JsonRangeStore {
    path: PathBuf,
}

impl JsonRangeStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_all(&self) -> Result<BTreeMap<String, ParameterRanges>, TraderError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let text = fs::read_to_string(&self.path)?;
        if text.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&text)?)
    }
}

impl RangeStore for JsonRangeStore {
    fn load(&self, symbol: &str) -> Result<Option<ParameterRanges>, TraderError> {
        let mut all = self.read_all()?;
        Ok(all.remove(symbol))
    }

    fn save(&self, symbol: &str, ranges: &ParameterRanges) -> Result<(), TraderError> {
        let mut all = self.read_all()?;
        all.insert(symbol.to_string(), ranges.clone());
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&all)?)?;
        tracing::debug!(symbol, path = %self.path.display(), "saved search ranges");
        Ok(())
    }
}
