//! Reference finance Q&A pairs loaded at startup
//!
//! The file is optional and nothing in the request path reads it.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::Path;
use tracing::{info, warn};

/// Default location, relative to the working directory
pub const DEFAULT_DATASET_PATH: &str = "finance_questions_formatted.json";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QaPair {
    #[serde(default, alias = "instruction")]
    pub question: String,
    #[serde(default, alias = "output")]
    pub answer: String,
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub pairs: Vec<QaPair>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Load the dataset if the file exists.
///
/// A missing file is logged and yields `None`. A file that exists but cannot be
/// read or parsed is an error.
pub fn load_optional(path: &Path) -> Result<Option<Dataset>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("Dataset {} not found, continuing without it", path.display());
            return Ok(None);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to open dataset {}", path.display()))
        }
    };

    let pairs: Vec<QaPair> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse dataset {}", path.display()))?;
    info!("Loaded {} Q&A pairs from {}", pairs.len(), path.display());

    Ok(Some(Dataset { pairs }))
}
