//! Per-pod, append-only file publishing prepared devices to containers
//!
//! Each line is an independent JSON object `{"<claim>/<request>": [pci, ...]}`.
//! The file is bind-mounted read-only into every container of the pod.

use std::io;
use std::path::Path;
use std::path::PathBuf;

use api_types::NetworkDeviceData;
use tokio::fs;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::consts::CONTAINER_RESULT_FILE_NAME;

#[derive(Debug, Clone)]
pub struct ResultFiles {
    host_dir: PathBuf,
    container_dir: PathBuf,
    include_network_data: bool,
}

impl ResultFiles {
    /// `include_network_data` appends IPs and MAC after the PCI address.
    pub fn new(
        host_dir: impl Into<PathBuf>,
        container_dir: impl Into<PathBuf>,
        include_network_data: bool,
    ) -> Self {
        Self {
            host_dir: host_dir.into(),
            container_dir: container_dir.into(),
            include_network_data,
        }
    }

    pub fn includes_network_data(&self) -> bool {
        self.include_network_data
    }

    pub fn host_path(&self, pod_uid: &str) -> PathBuf {
        self.host_dir.join(format!("{pod_uid}.json"))
    }

    pub fn container_path(&self) -> PathBuf {
        self.container_dir.join(CONTAINER_RESULT_FILE_NAME)
    }

    /// Create the pod's file if missing. Concurrent callers all succeed and
    /// none of them truncates what another already wrote.
    pub async fn ensure(&self, pod_uid: &str) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.host_dir).await?;
        let path = self.host_path(pod_uid);
        open_append(&path).await?;
        Ok(path)
    }

    /// Append one line for a device.
    pub async fn append(
        &self,
        pod_uid: &str,
        key: &str,
        pci_address: &str,
        network_data: Option<&NetworkDeviceData>,
    ) -> io::Result<()> {
        let mut values = vec![pci_address.to_string()];
        if self.include_network_data {
            if let Some(data) = network_data {
                values.extend(data.ips.iter().cloned());
                if !data.hardware_address.is_empty() {
                    values.push(data.hardware_address.clone());
                }
            }
        }

        let mut line = serde_json::to_vec(&serde_json::json!({ key: values }))?;
        line.push(b'\n');

        let path = self.ensure(pod_uid).await?;
        let mut file = open_append(&path).await?;
        // One write per line; O_APPEND keeps concurrent lines whole.
        file.write_all(&line).await?;
        file.flush().await
    }

    /// Remove the pod's file; a missing file is not an error.
    pub async fn remove(&self, pod_uid: &str) -> io::Result<()> {
        match fs::remove_file(self.host_path(pod_uid)).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            result => result,
        }
    }
}

async fn open_append(path: &Path) -> io::Result<fs::File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
}
