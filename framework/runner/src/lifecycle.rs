use futures::FutureExt;
use profiler_e2e_core::prelude::{InstanceHandle, InstanceSpec, Provisioner, ProvisioningError};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// The result of work done while an instance was alive.
#[derive(Debug)]
pub struct ScopedOutcome<T> {
    pub value: T,
    /// The result of deleting the instance afterwards. A failed delete does not change `value`.
    pub cleanup: Result<(), ProvisioningError>,
}

/// Creates and deletes instances for test cases.
#[derive(Clone)]
pub struct LifecycleDriver {
    provisioner: Arc<dyn Provisioner>,
}

impl LifecycleDriver {
    pub fn new(provisioner: Arc<dyn Provisioner>) -> Self {
        Self { provisioner }
    }

    pub fn provisioner(&self) -> &dyn Provisioner {
        self.provisioner.as_ref()
    }

    pub async fn start(&self, spec: &InstanceSpec) -> Result<InstanceHandle, ProvisioningError> {
        log::info!(
            "Creating instance {}/{}/{} ({})",
            spec.project,
            spec.zone,
            spec.name,
            spec.machine_type
        );
        let handle = self.provisioner.create(spec).await?;
        log::debug!("Created instance {handle}");
        Ok(handle)
    }

    pub async fn delete(&self, handle: &InstanceHandle) -> Result<(), ProvisioningError> {
        log::info!("Deleting instance {handle}");
        let result = self.provisioner.delete(handle).await;
        if let Err(e) = &result {
            log::error!("Failed to delete instance {handle}, it may need to be removed by hand: {e}");
        }
        result
    }

    /// Create an instance from `spec`, run `f` with it and delete it again.
    ///
    /// The delete is attempted exactly once after a successful create, whether `f` returns or
    /// panics. A panic is resumed once the delete has finished. Nothing is deleted if the create
    /// fails.
    pub async fn with_instance<T, F, Fut>(
        &self,
        spec: &InstanceSpec,
        f: F,
    ) -> Result<ScopedOutcome<T>, ProvisioningError>
    where
        F: FnOnce(InstanceHandle) -> Fut,
        Fut: Future<Output = T>,
    {
        let handle = self.start(spec).await?;

        let result = AssertUnwindSafe(f(handle.clone())).catch_unwind().await;
        let cleanup = self.delete(&handle).await;

        match result {
            Ok(value) => Ok(ScopedOutcome { value, cleanup }),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
