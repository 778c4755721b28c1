mod client;
mod request;

pub mod prelude {
    pub use crate::client::{ClientBuildError, ProfilerClient, DEFAULT_PROFILER_API_URL, DEFAULT_REQUEST_TIMEOUT};
}
