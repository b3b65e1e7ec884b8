use reqwest::{Client, Url};
use tracing::debug;

use crate::config::DeviceConfig;

use super::{DeviceApi, DeviceError, DeviceSnapshot, relay_path};

/// Talks to the device over unauthenticated HTTP.
#[derive(Debug, Clone)]
pub struct HttpDevice {
    client: Client,
    base: Url,
}

impl HttpDevice {
    pub fn new(config: &DeviceConfig) -> Result<Self, DeviceError> {
        let base_url = config.base_url();
        let base =
            Url::parse(&base_url).map_err(|e| DeviceError::InvalidAddress(format!("{base_url}: {e}")))?;

        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(DeviceError::Transport)?;

        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url, DeviceError> {
        self.base
            .join(path)
            .map_err(|e| DeviceError::InvalidAddress(format!("{}{path}: {e}", self.base)))
    }
}

impl DeviceApi for HttpDevice {
    async fn status(&self) -> Result<DeviceSnapshot, DeviceError> {
        debug!("GET {}", self.base);

        let res = self
            .client
            .get(self.base.clone())
            .send()
            .await
            .map_err(DeviceError::Transport)?;

        let status = res.status();
        if !status.is_success() {
            return Err(DeviceError::Status(status.as_u16()));
        }

        let body = res.bytes().await.map_err(DeviceError::Transport)?;
        serde_json::from_slice(&body).map_err(DeviceError::Parse)
    }

    async fn set_relay(&self, on: bool) -> Result<(), DeviceError> {
        let url = self.url(relay_path(on))?;
        debug!("GET {url}");

        // Any answer counts; only transport failures are reported.
        self.client
            .get(url)
            .send()
            .await
            .map_err(DeviceError::Transport)?;
        Ok(())
    }
}
