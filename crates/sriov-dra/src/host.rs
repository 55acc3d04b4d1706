//! Kernel driver binding of VFs through sysfs

use std::io;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use tokio::fs;
use tracing::debug;
use tracing::info;

#[derive(Debug, derive_more::Display)]
pub enum HostError {
    #[display("Failed to read sysfs: {message}")]
    ReadFailed { message: String },
    #[display("Failed to write sysfs: {message}")]
    WriteFailed { message: String },
}

impl core::error::Error for HostError {}

/// Host operations on a VF identified by PCI address.
#[async_trait]
pub trait DeviceHost: Send + Sync {
    /// Driver the VF is bound to, `None` when unbound.
    async fn current_driver(&self, pci_address: &str) -> Result<Option<String>, Report<HostError>>;

    /// Bind the VF to `driver`, unbinding it from its current driver first.
    async fn bind_driver(&self, pci_address: &str, driver: &str) -> Result<(), Report<HostError>>;

    /// Return the VF to `original_driver`, or leave it unbound when empty.
    async fn restore_driver(
        &self,
        pci_address: &str,
        original_driver: &str,
    ) -> Result<(), Report<HostError>>;

    /// IOMMU group of the VF, needed to expose `/dev/vfio/<group>`.
    async fn iommu_group(&self, pci_address: &str) -> Result<Option<String>, Report<HostError>>;
}

/// [`DeviceHost`] backed by a sysfs tree.
#[derive(Debug, Clone)]
pub struct SysfsHost {
    root: PathBuf,
}

impl SysfsHost {
    /// `root` is the sysfs mount point, normally `/sys`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn device_dir(&self, pci_address: &str) -> PathBuf {
        self.root.join("bus/pci/devices").join(pci_address)
    }

    async fn link_name(&self, link: PathBuf) -> Result<Option<String>, Report<HostError>> {
        match fs::read_link(&link).await {
            Ok(target) => Ok(target
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Report::new(e).change_context(HostError::ReadFailed {
                message: link.display().to_string(),
            })),
        }
    }

    async fn unbind(&self, pci_address: &str) -> Result<(), Report<HostError>> {
        if self.current_driver(pci_address).await?.is_none() {
            return Ok(());
        }
        let unbind = self.device_dir(pci_address).join("driver/unbind");
        write_sysfs(&unbind, pci_address).await
    }
}

#[async_trait]
impl DeviceHost for SysfsHost {
    async fn current_driver(&self, pci_address: &str) -> Result<Option<String>, Report<HostError>> {
        self.link_name(self.device_dir(pci_address).join("driver"))
            .await
    }

    async fn bind_driver(&self, pci_address: &str, driver: &str) -> Result<(), Report<HostError>> {
        let current = self.current_driver(pci_address).await?;
        if current.as_deref() == Some(driver) {
            debug!(pci_address, driver, "VF already bound to requested driver");
            return Ok(());
        }

        write_sysfs(&self.device_dir(pci_address).join("driver_override"), driver).await?;
        self.unbind(pci_address).await?;
        write_sysfs(&self.root.join("bus/pci/drivers_probe"), pci_address).await?;

        info!(
            pci_address,
            from = current.as_deref().unwrap_or("none"),
            to = driver,
            "VF driver rebound"
        );
        Ok(())
    }

    async fn restore_driver(
        &self,
        pci_address: &str,
        original_driver: &str,
    ) -> Result<(), Report<HostError>> {
        if original_driver.is_empty() {
            self.unbind(pci_address).await?;
        } else {
            self.bind_driver(pci_address, original_driver).await?;
        }
        // Clear the override so later driver matching picks the default again.
        write_sysfs(&self.device_dir(pci_address).join("driver_override"), "\n").await
    }

    async fn iommu_group(&self, pci_address: &str) -> Result<Option<String>, Report<HostError>> {
        self.link_name(self.device_dir(pci_address).join("iommu_group"))
            .await
    }
}

async fn write_sysfs(path: &Path, value: &str) -> Result<(), Report<HostError>> {
    fs::write(path, value)
        .await
        .change_context_lazy(|| HostError::WriteFailed {
            message: path.display().to_string(),
        })
}
