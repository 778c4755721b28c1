pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The image family to boot new instances from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFamily {
    pub project: String,
    pub family: String,
}

impl Default for ImageFamily {
    fn default() -> Self {
        Self {
            project: "debian-cloud".to_string(),
            family: "debian-11".to_string(),
        }
    }
}

/// Everything the provisioning layer needs to create one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    pub project: String,
    pub zone: String,
    pub name: String,
    pub machine_type: String,
    pub image: ImageFamily,
    /// Rendered startup script, attached to the instance as boot metadata.
    pub startup_script: String,
}

impl InstanceSpec {
    /// The handle that a successful create of this spec refers to.
    pub fn handle(&self) -> InstanceHandle {
        InstanceHandle {
            project: self.project.clone(),
            zone: self.zone.clone(),
            name: self.name.clone(),
        }
    }
}

/// Identifies a provisioned instance.
///
/// Owned by the lifecycle driver between create and delete. Everything else only borrows it to
/// look the instance up.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
#[display("{project}/{zone}/{name}")]
pub struct InstanceHandle {
    pub project: String,
    pub zone: String,
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("failed to resolve image family {family} in project {project}: {reason}")]
    ImageLookup {
        project: String,
        family: String,
        reason: String,
    },
    #[error("request for instance {instance} was rejected with status {status}: {body}")]
    Rejected {
        instance: String,
        status: u16,
        body: String,
    },
    #[error("request for instance {instance} failed")]
    Transport {
        instance: String,
        #[source]
        source: BoxError,
    },
}

/// A failed read of an instance's console output.
///
/// These are expected while an instance is booting or the network is flaky, so the poller
/// logs them and tries again on the next tick.
#[derive(Debug, thiserror::Error)]
#[error("failed to read output of instance {instance}: {message}")]
pub struct FetchError {
    pub instance: String,
    pub message: String,
}

/// The provisioning backend the harness drives.
///
/// One implementation is shared by all concurrently running cases, so implementations must be
/// safe to call from many tasks at once.
#[async_trait::async_trait]
pub trait Provisioner: Send + Sync {
    /// Request creation of an instance with the startup script attached.
    async fn create(&self, spec: &InstanceSpec) -> Result<InstanceHandle, ProvisioningError>;

    /// Request deletion of an instance.
    async fn delete(&self, handle: &InstanceHandle) -> Result<(), ProvisioningError>;

    /// Read the latest known console output of an instance.
    ///
    /// This is the full text known to the backend, not the difference since the last read.
    async fn read_latest_output(&self, handle: &InstanceHandle) -> Result<String, FetchError>;
}
