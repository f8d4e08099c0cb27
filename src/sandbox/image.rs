use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use super::error::ProvisioningError;

/// Where and how the sandbox image is built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    pub tag: String,
    pub context: PathBuf,
    pub dockerfile: String,
}

/// Local image store of a container runtime
pub trait ImageStore: Send + Sync {
    fn image_exists(&self, tag: &str) -> Result<bool, ProvisioningError>;

    fn build_image(&self, spec: &ImageSpec) -> Result<(), ProvisioningError>;
}

/// Makes sure the sandbox image is present before anything runs in it.
///
/// One provisioner lives for the whole process and is shared by every judge
/// call. Once the image has been seen or built, later calls return without
/// touching the store. The state is never torn down.
pub struct ImageProvisioner {
    store: Arc<dyn ImageStore>,
    spec: ImageSpec,
    ready: OnceLock<()>,
    build_lock: Mutex<()>,
}

impl ImageProvisioner {
    pub fn new(store: Arc<dyn ImageStore>, spec: ImageSpec) -> Self {
        Self {
            store,
            spec,
            ready: OnceLock::new(),
            build_lock: Mutex::new(()),
        }
    }

    /// Checks for the image and builds it if absent.
    ///
    /// Concurrent first callers block on the build lock; only one of them
    /// talks to the store. A failed attempt leaves the provisioner unready.
    pub fn ensure_image(&self) -> Result<(), ProvisioningError> {
        if self.ready.get().is_some() {
            return Ok(());
        }

        let _guard = self.build_lock.lock();
        if self.ready.get().is_some() {
            return Ok(());
        }

        let tag = &self.spec.tag;
        if self.store.image_exists(tag)? {
            log::info!("Sandbox image '{tag}' already exists");
        } else {
            log::info!(
                "Sandbox image '{tag}' not found, building from {}",
                self.spec.context.display()
            );
            self.store.build_image(&self.spec)?;
            log::info!("Sandbox image '{tag}' built successfully");
        }

        let _ = self.ready.set(());
        Ok(())
    }
}
