//! Checksum-verified persistence of the prepared claims
//!
//! The checksum covers the JSON serialization of the checkpoint with its own
//! checksum field set to zero. Producing that canonical form never touches the
//! checkpoint value itself, so a shared checkpoint can be verified or saved
//! without temporarily rewriting its fields.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use error_stack::Report;
use error_stack::ResultExt;
use serde::Deserialize;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use tracing::info;

use crate::consts::CHECKPOINT_FILE_NAME;
use crate::types::PreparedClaimsByPodUID;

const FNV32_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;

#[derive(Debug, derive_more::Display)]
pub enum CheckpointError {
    #[display("Failed to read checkpoint: {message}")]
    ReadFailed { message: String },
    #[display("Failed to write checkpoint: {message}")]
    WriteFailed { message: String },
    #[display("Failed to decode checkpoint: {message}")]
    DecodeFailed { message: String },
    #[display("Failed to encode checkpoint")]
    EncodeFailed,
    #[display("Checkpoint is corrupt: stored checksum {stored} does not match computed {computed}")]
    Corrupt { stored: u32, computed: u32 },
}

impl core::error::Error for CheckpointError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checksum: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v1: Option<CheckpointV1>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointV1 {
    #[serde(
        rename = "preparedClaimsByPodUID",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub prepared_claims_by_pod_uid: PreparedClaimsByPodUID,
}

/// Serialization view of a checkpoint with an explicit checksum value.
#[derive(Serialize)]
struct ChecksummedView<'a> {
    checksum: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    v1: Option<&'a CheckpointV1>,
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl Checkpoint {
    /// An empty, initialized checkpoint.
    pub fn new() -> Self {
        Self {
            checksum: 0,
            v1: Some(CheckpointV1::default()),
        }
    }

    pub fn from_prepared_claims(prepared_claims_by_pod_uid: PreparedClaimsByPodUID) -> Self {
        Self {
            checksum: 0,
            v1: Some(CheckpointV1 {
                prepared_claims_by_pod_uid,
            }),
        }
    }

    pub fn prepared_claims(&self) -> Option<&PreparedClaimsByPodUID> {
        self.v1.as_ref().map(|v1| &v1.prepared_claims_by_pod_uid)
    }

    pub fn into_prepared_claims(self) -> PreparedClaimsByPodUID {
        self.v1
            .map(|v1| v1.prepared_claims_by_pod_uid)
            .unwrap_or_default()
    }

    /// The checkpoint serialized with its checksum field zeroed.
    pub fn canonicalize(&self) -> Result<Vec<u8>, serde_json::Error> {
        self.serialize_with_checksum(0)
    }

    /// Bytes to persist: the canonical content stamped with its checksum.
    pub fn marshal(&self) -> Result<Vec<u8>, Report<CheckpointError>> {
        let canonical = self
            .canonicalize()
            .change_context(CheckpointError::EncodeFailed)?;
        self.serialize_with_checksum(checksum(&canonical))
            .change_context(CheckpointError::EncodeFailed)
    }

    pub fn unmarshal(data: &[u8]) -> Result<Self, Report<CheckpointError>> {
        serde_json::from_slice(data).map_err(|e| {
            Report::new(CheckpointError::DecodeFailed {
                message: e.to_string(),
            })
        })
    }

    /// Check the stored checksum against the canonical content.
    pub fn verify_checksum(&self) -> Result<(), Report<CheckpointError>> {
        let canonical = self
            .canonicalize()
            .change_context(CheckpointError::EncodeFailed)?;
        let computed = checksum(&canonical);
        if computed != self.checksum {
            return Err(Report::new(CheckpointError::Corrupt {
                stored: self.checksum,
                computed,
            }));
        }
        Ok(())
    }

    fn serialize_with_checksum(&self, checksum: u32) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&ChecksummedView {
            checksum,
            v1: self.v1.as_ref(),
        })
    }
}

/// 32-bit FNV-1a over `data`.
pub fn checksum(data: &[u8]) -> u32 {
    data.iter().fold(FNV32_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(FNV32_PRIME)
    })
}

/// File-backed checkpoint with a single writer.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Store keeping `checkpoint.json` inside `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(CHECKPOINT_FILE_NAME),
        }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and verify the checkpoint.
    ///
    /// A missing file yields an empty checkpoint. Anything unreadable,
    /// undecodable or failing verification is an error and is never
    /// downgraded to empty state.
    pub async fn load(&self) -> Result<Checkpoint, Report<CheckpointError>> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No checkpoint found, starting empty");
                return Ok(Checkpoint::new());
            }
            Err(e) => {
                return Err(Report::new(e).change_context(CheckpointError::ReadFailed {
                    message: self.path.display().to_string(),
                }))
            }
        };

        let checkpoint = Checkpoint::unmarshal(&data)
            .attach_printable_lazy(|| format!("path: {}", self.path.display()))?;
        checkpoint
            .verify_checksum()
            .attach_printable_lazy(|| format!("path: {}", self.path.display()))?;

        Ok(checkpoint)
    }

    /// Persist `checkpoint` atomically: temp file in the same directory,
    /// fsync, rename over the previous file.
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<(), Report<CheckpointError>> {
        let data = checkpoint.marshal()?;
        let write_failed = || CheckpointError::WriteFailed {
            message: self.path.display().to_string(),
        };

        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await.change_context_lazy(write_failed)?;
        }

        let tmp_path = self.tmp_path();
        let mut file = fs::File::create(&tmp_path)
            .await
            .change_context_lazy(write_failed)?;
        file.write_all(&data)
            .await
            .change_context_lazy(write_failed)?;
        file.sync_all().await.change_context_lazy(write_failed)?;
        drop(file);

        if let Err(e) = fs::rename(&tmp_path, &self.path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Report::new(e).change_context(write_failed()));
        }

        debug!(path = %self.path.display(), bytes = data.len(), "Checkpoint saved");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| CHECKPOINT_FILE_NAME.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
