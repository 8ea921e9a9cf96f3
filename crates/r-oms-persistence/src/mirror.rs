//! ---
//! oms_section: "03-persistence-logging"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Persistence abstractions and the local snapshot mirror."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::{PersistenceError, Result};

/// Current mirror envelope version.
pub const MIRROR_VERSION: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MirrorEnvelope {
    version: u16,
    written_at: DateTime<Utc>,
    hash: String,
    state: Value,
}

/// Durable mirror bound to one well-known path.
#[derive(Debug, Clone)]
pub struct SnapshotMirror {
    path: PathBuf,
}

impl SnapshotMirror {
    /// Bind the mirror to its path; nothing is touched until the first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Mirror file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the mirror with the given snapshot document.
    pub fn save(&self, state: &Value) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let envelope = MirrorEnvelope {
            version: MIRROR_VERSION,
            written_at: Utc::now(),
            hash: compute_hash(state)?,
            state: state.clone(),
        };
        let mut writer = BufWriter::new(File::create(&self.path)?);
        writer.write_all(&serde_json::to_vec_pretty(&envelope)?)?;
        writer.flush()?;
        Ok(())
    }

    /// Load the mirrored snapshot, verifying integrity. A missing file
    /// yields `None`; a corrupt one is treated the same after a warning,
    /// because resuming from nothing beats resuming from garbage.
    pub fn load(&self) -> Result<Option<Value>> {
        if !self.path.exists() {
            return Ok(None);
        }
        match self.load_verified() {
            Ok(state) => Ok(Some(state)),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "discarding unreadable mirror");
                Ok(None)
            }
        }
    }

    fn load_verified(&self) -> Result<Value> {
        let mut bytes = Vec::new();
        File::open(&self.path)?.read_to_end(&mut bytes)?;
        let envelope: MirrorEnvelope = serde_json::from_slice(&bytes)?;
        if compute_hash(&envelope.state)? != envelope.hash {
            return Err(PersistenceError::HashMismatch);
        }
        Ok(envelope.state)
    }

    /// Verify the mirror without surfacing its payload.
    pub fn verify(&self) -> bool {
        self.load_verified().is_ok()
    }
}

fn compute_hash(state: &Value) -> Result<String> {
    let serialized = serde_json::to_vec(state)?;
    let mut hasher = Sha256::new();
    hasher.update(serialized);
    Ok(hex::encode(hasher.finalize()))
}
