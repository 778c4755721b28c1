mod config;
mod failure;
mod instance;
mod poll;
mod profile;
mod shutdown;

pub mod prelude {
    pub use crate::config::{GitRef, RunConfig, Scenario, Sentinels, SourceFetch};
    pub use crate::failure::CaseFailure;
    pub use crate::instance::{
        BoxError, FetchError, ImageFamily, InstanceHandle, InstanceSpec, Provisioner,
        ProvisioningError,
    };
    pub use crate::poll::PollResult;
    pub use crate::profile::{ExpectedProfile, ProfileQuery, ProfileType};
    pub use crate::shutdown::{ShutdownHandle, ShutdownListener};
}
