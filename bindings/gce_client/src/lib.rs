mod api;
mod client;

pub mod prelude {
    pub use crate::client::{ClientBuildError, GceClient, DEFAULT_COMPUTE_API_URL, DEFAULT_REQUEST_TIMEOUT, SERIAL_PORT};
}
