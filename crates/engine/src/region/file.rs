//! Region files: one JSON document per region holding the metadata of up to
//! 16x16 chunks.
//!
//! Layout on disk is `<root>/<world>/r.<rx>.<rz>.json`, with contents
//!
//! ```text
//! {
//!   "<chunkX>,<chunkZ>": { "<localX>,<y>,<localZ>": <value>, ... },
//!   ...
//! }
//! ```
//!
//! JSON is a subset of YAML 1.2, so these files stay readable by YAML tooling.
//! A region without any chunk sections has no file at all.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::world::position::{ChunkPos, LocalBlockPos, RegionKey};

/// Values stored for the blocks of one chunk. Never kept empty.
pub type ChunkMetadata<T> = HashMap<LocalBlockPos, T>;

/// Contents of one region file, keyed by chunk. Ordered so that rewriting a
/// region keeps the sections where they were.
pub type RegionData<T> = IndexMap<ChunkPos, ChunkMetadata<T>>;

/// Region file I/O for one metadata kind.
#[derive(Debug, Clone)]
pub struct RegionFiles {
    root: PathBuf,
}

impl RegionFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, region: &RegionKey) -> PathBuf {
        self.root
            .join(region.world.as_str())
            .join(format!("r.{}.{}.json", region.pos.x, region.pos.z))
    }

    /// Read a region. Returns `None` if no file exists for it.
    pub fn read<T: DeserializeOwned>(&self, region: &RegionKey) -> Result<Option<RegionData<T>>> {
        let path = self.path(region);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("reading region file {}", path.display()))?;
        let data = serde_json::from_str(&content)
            .with_context(|| format!("parsing region file {}", path.display()))?;
        Ok(Some(data))
    }

    /// Write a region, replacing any previous file. An empty region deletes
    /// its file instead.
    pub fn write<T: Serialize>(&self, region: &RegionKey, data: &RegionData<T>) -> Result<()> {
        let path = self.path(region);

        if data.values().all(|chunk| chunk.is_empty()) {
            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("removing empty region file {}", path.display()))?;
            }
            return Ok(());
        }

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating region directory {}", dir.display()))?;
        }

        let content = serde_json::to_string_pretty(data)
            .with_context(|| format!("serializing region {}", region))?;

        // Write-then-rename so a crash never leaves a truncated region behind.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}
