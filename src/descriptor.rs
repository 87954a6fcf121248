// API descriptor: which calls the server offers and which of their
// parameters take file paths. Fetched once (from the cache file or the
// server) and never changed for the rest of the process.

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Bootstrap call returning the descriptor as JSON.
pub const API_INFO_CALL: &str = "get_api_info";

const CACHE_FILE: &str = "api_info.json";

/// One declared parameter of an API call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ParamInfo {
    pub name: String,
    #[serde(default)]
    pub takes_file: bool,
}

/// One API call with its parameters in declaration order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CallInfo {
    pub name: String,
    #[serde(default)]
    pub args: Vec<ParamInfo>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(transparent)]
pub struct ApiDescriptor {
    calls: Vec<CallInfo>,
}

impl ApiDescriptor {
    pub fn new(calls: Vec<CallInfo>) -> Self {
        ApiDescriptor { calls }
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn call(&self, name: &str) -> Option<&CallInfo> {
        self.calls.iter().find(|c| c.name == name)
    }

    pub fn call_names(&self) -> impl Iterator<Item = &str> {
        self.calls.iter().map(|c| c.name.as_str())
    }
}

/// Location of the cached descriptor under the scratch directory.
pub fn cache_path(tmp_dir: &Path) -> PathBuf {
    tmp_dir.join(CACHE_FILE)
}

/// Read the cached descriptor. A missing file is `None`; a file that is
/// not valid JSON is fatal so the user can remove it.
pub fn load_cache(path: &Path) -> Result<Option<ApiDescriptor>> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    ApiDescriptor::from_json(&text)
        .map(Some)
        .map_err(|source| ClientError::DescriptorCache {
            path: path.to_path_buf(),
            source,
        })
}

/// Write the descriptor JSON exactly as the server sent it, so fields we
/// do not model survive in the cache.
pub fn save_cache(path: &Path, raw: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, raw)?;
    Ok(())
}
