use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// CNI error codes a retry cannot fix.
const NON_RETRYABLE_CODES: &[u32] = &[
    1, // incompatible CNI version
    2, // unsupported field in network configuration
    4, // invalid necessary environment variables
    6, // failed to decode content
    7, // invalid network config
];

/// Verb passed to the plugin in `CNI_COMMAND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CniCommand {
    Add,
    Del,
    Check,
}

impl fmt::Display for CniCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "ADD",
            Self::Del => "DEL",
            Self::Check => "CHECK",
        })
    }
}

/// Error document a plugin prints on stdout when it fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CniErrorDocument {
    #[serde(default)]
    pub cni_version: String,
    pub code: u32,
    pub msg: String,
    #[serde(default)]
    pub details: String,
}

impl fmt::Display for CniErrorDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.details.is_empty() {
            write!(f, "{}", self.msg)
        } else {
            write!(f, "{}; {}", self.msg, self.details)
        }
    }
}

/// Why a plugin exited non-zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginFailure {
    Reported(CniErrorDocument),
    Stderr(String),
    Silent,
}

impl PluginFailure {
    /// Prefer the structured error on stdout, then stderr.
    pub fn from_output(stdout: &[u8], stderr: &[u8]) -> Self {
        if let Ok(doc) = serde_json::from_slice::<CniErrorDocument>(stdout) {
            return Self::Reported(doc);
        }
        let stderr = String::from_utf8_lossy(stderr).trim().to_string();
        if stderr.is_empty() {
            Self::Silent
        } else {
            Self::Stderr(stderr)
        }
    }

    fn code(&self) -> Option<u32> {
        match self {
            Self::Reported(doc) => Some(doc.code),
            _ => None,
        }
    }
}

impl fmt::Display for PluginFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reported(doc) => write!(f, "{doc}"),
            Self::Stderr(stderr) => write!(f, "netplugin failed: {stderr:?}"),
            Self::Silent => f.write_str("netplugin failed with no error message"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CniError {
    #[error("invalid network configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to find plugin {plugin:?} in path {paths:?}")]
    PluginNotFound { plugin: String, paths: Vec<PathBuf> },

    #[error("{command} {plugin}: failed to execute plugin: {source}")]
    Exec {
        command: CniCommand,
        plugin: String,
        #[source]
        source: io::Error,
    },

    #[error("{command} {plugin}: {failure}")]
    Plugin {
        command: CniCommand,
        plugin: String,
        failure: PluginFailure,
    },

    #[error("{command} {plugin}: malformed result: {message}")]
    MalformedResult {
        command: CniCommand,
        plugin: String,
        message: String,
    },

    #[error("network setup cancelled")]
    Cancelled,
}

impl CniError {
    /// Whether another attempt might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Exec { .. } | Self::MalformedResult { .. } => true,
            Self::Plugin { failure, .. } => {
                !matches!(failure.code(), Some(code) if NON_RETRYABLE_CODES.contains(&code))
            }
            Self::InvalidConfig(_)
            | Self::PluginNotFound { .. }
            | Self::Cancelled => false,
        }
    }
}
