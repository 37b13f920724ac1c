//! Block materials as the host names them.
//!
//! Materials are opaque upper-case names (`STONE`, `RESPAWN_ANCHOR`, ...).
//! Everything this crate knows about a material comes from configuration.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Host material name. Cloning is a refcount bump.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Material(Arc<str>);

impl Material {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name.to_ascii_uppercase()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn is_air(&self) -> bool {
        &*self.0 == AIR
    }

    pub fn air() -> Self {
        Self::new(AIR)
    }
}

impl From<&str> for Material {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Material {
    fn from(name: String) -> Self {
        Self::new(&name)
    }
}

impl From<Material> for String {
    fn from(material: Material) -> Self {
        material.0.to_string()
    }
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// -- Names the binary and tests refer to --

pub const AIR: &str = "AIR";
pub const STONE: &str = "STONE";
pub const OBSIDIAN: &str = "OBSIDIAN";
pub const DIRT: &str = "DIRT";
pub const RESPAWN_ANCHOR: &str = "RESPAWN_ANCHOR";
