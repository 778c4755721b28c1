use crate::api::{Image, Instance, SerialPortOutput};
use profiler_e2e_core::prelude::{
    FetchError, InstanceHandle, InstanceSpec, Provisioner, ProvisioningError,
};
use reqwest::StatusCode;
use std::time::Duration;
use url::Url;

pub const DEFAULT_COMPUTE_API_URL: &str = "https://compute.googleapis.com/compute/v1/";

/// The serial port the startup script output is written to.
pub const SERIAL_PORT: u8 = 2;

/// Requests taking longer than this are abandoned. Polling callers retry on their own schedule.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    #[error("invalid API URL")]
    Url(#[from] url::ParseError),
    #[error("failed to build HTTP client")]
    Http(#[from] reqwest::Error),
}

/// A [Provisioner] backed by the Compute Engine REST API.
///
/// Authenticates every request with a bearer token which is obtained outside of the harness.
#[derive(Clone)]
pub struct GceClient {
    http: reqwest::Client,
    base_url: Url,
    access_token: String,
    serial_port: u8,
}

impl GceClient {
    pub fn new(access_token: &str) -> Result<Self, ClientBuildError> {
        Self::with_base_url(Url::parse(DEFAULT_COMPUTE_API_URL)?, access_token)
    }

    /// Create a client against a different API root, for example a local emulator.
    pub fn with_base_url(base_url: Url, access_token: &str) -> Result<Self, ClientBuildError> {
        Self::with_timeout(base_url, access_token, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        mut base_url: Url,
        access_token: &str,
        timeout: Duration,
    ) -> Result<Self, ClientBuildError> {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .build()?;

        Ok(Self {
            http,
            base_url,
            access_token: access_token.to_string(),
            serial_port: SERIAL_PORT,
        })
    }

    pub fn with_serial_port(mut self, serial_port: u8) -> Self {
        self.serial_port = serial_port;
        self
    }

    fn image_url(&self, project: &str, family: &str) -> Result<Url, url::ParseError> {
        self.base_url
            .join(&format!("projects/{project}/global/images/family/{family}"))
    }

    fn instances_url(&self, project: &str, zone: &str) -> Result<Url, url::ParseError> {
        self.base_url
            .join(&format!("projects/{project}/zones/{zone}/instances"))
    }

    fn instance_url(&self, handle: &InstanceHandle) -> Result<Url, url::ParseError> {
        self.base_url.join(&format!(
            "projects/{}/zones/{}/instances/{}",
            handle.project, handle.zone, handle.name
        ))
    }

    fn serial_port_url(&self, handle: &InstanceHandle) -> Result<Url, url::ParseError> {
        let mut url = self.base_url.join(&format!(
            "projects/{}/zones/{}/instances/{}/serialPort",
            handle.project, handle.zone, handle.name
        ))?;
        url.query_pairs_mut()
            .append_pair("port", &self.serial_port.to_string());
        Ok(url)
    }

    /// Resolve the newest image of a family to its self link.
    async fn resolve_image(&self, spec: &InstanceSpec) -> Result<String, ProvisioningError> {
        let (project, family) = (spec.image.project.as_str(), spec.image.family.as_str());
        let lookup_error = |reason: String| ProvisioningError::ImageLookup {
            project: project.to_string(),
            family: family.to_string(),
            reason,
        };

        let url = self
            .image_url(project, family)
            .map_err(|e| lookup_error(e.to_string()))?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| lookup_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(lookup_error(format!("status {status}: {body}")));
        }

        let image: Image = response
            .json()
            .await
            .map_err(|e| lookup_error(e.to_string()))?;
        log::debug!("Resolved image family {project}/{family} to {}", image.self_link);
        Ok(image.self_link)
    }
}

fn transport(instance: &str, e: impl std::error::Error + Send + Sync + 'static) -> ProvisioningError {
    ProvisioningError::Transport {
        instance: instance.to_string(),
        source: Box::new(e),
    }
}

async fn rejected(instance: &str, response: reqwest::Response) -> ProvisioningError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ProvisioningError::Rejected {
        instance: instance.to_string(),
        status,
        body,
    }
}

#[async_trait::async_trait]
impl Provisioner for GceClient {
    async fn create(&self, spec: &InstanceSpec) -> Result<InstanceHandle, ProvisioningError> {
        let source_image = self.resolve_image(spec).await?;
        let body = Instance::from_spec(spec, &source_image);

        let url = self
            .instances_url(&spec.project, &spec.zone)
            .map_err(|e| transport(&spec.name, e))?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport(&spec.name, e))?;

        if !response.status().is_success() {
            return Err(rejected(&spec.name, response).await);
        }

        Ok(spec.handle())
    }

    async fn delete(&self, handle: &InstanceHandle) -> Result<(), ProvisioningError> {
        let url = self
            .instance_url(handle)
            .map_err(|e| transport(&handle.name, e))?;
        let response = self
            .http
            .delete(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| transport(&handle.name, e))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                log::warn!("Instance {handle} was already gone when deleting it");
                Ok(())
            }
            _ => Err(rejected(&handle.name, response).await),
        }
    }

    async fn read_latest_output(&self, handle: &InstanceHandle) -> Result<String, FetchError> {
        let fetch_error = |message: String| FetchError {
            instance: handle.name.clone(),
            message,
        };

        let url = self
            .serial_port_url(handle)
            .map_err(|e| fetch_error(e.to_string()))?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("status {status}")));
        }

        let output: SerialPortOutput = response
            .json()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        Ok(output.contents)
    }
}
