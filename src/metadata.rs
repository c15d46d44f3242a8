use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::scorer::{RankingModel, SmartNotation};
use crate::tokenizer::TokenizerConfig;

/// Everything a later `search` run needs to reconstruct the exact
/// tokenizer and ranking configuration an index was built with, persisted
/// alongside the index itself as `metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub index_output_folder: PathBuf,
    pub rsv: RankingModel,
    pub smart_notation: Option<SmartNotation>,
    pub tokenizer: TokenizerConfig,
    pub total_docs: u32,
}

/// On-disk envelope matching spec.md §6's `{"metadata": {...}}` shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MetadataEnvelope {
    metadata: IndexMetadata,
}

impl IndexMetadata {
    pub fn save(&self, path: &Path) -> Result<()> {
        let envelope = MetadataEnvelope {
            metadata: self.clone(),
        };
        let json = serde_json::to_string_pretty(&envelope)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(IndexError::MissingFile(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path)?;
        let envelope: MetadataEnvelope = serde_json::from_str(&contents)?;
        Ok(envelope.metadata)
    }
}
