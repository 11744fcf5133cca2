use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::error::ClientError;
use crate::types::{BandPowers, Health, PowerSpectrum, SessionInfo, WindowedSamples};

/// Thin typed transport over the analysis service HTTP API.
///
/// Performs no caching, deduplication, or retries; those concerns live in the
/// layers above (`retry`, `subscription`).
pub struct ServiceClient {
    base_url: String,
    http: reqwest::blocking::Client,
}

impl ServiceClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.into(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn health(&self) -> Result<Health, ClientError> {
        self.get_json("/api/health", &[])
    }

    pub fn session_info(&self) -> Result<SessionInfo, ClientError> {
        self.get_json("/api/eeg-info", &[])
    }

    pub fn samples(&self, tmin: f64, tmax: f64) -> Result<WindowedSamples, ClientError> {
        self.get_json(
            "/api/eeg-data",
            &[("tmin", tmin.to_string()), ("tmax", tmax.to_string())],
        )
    }

    pub fn power_spectrum(&self) -> Result<PowerSpectrum, ClientError> {
        self.get_json("/api/eeg-psd", &[])
    }

    pub fn band_powers(&self) -> Result<BandPowers, ClientError> {
        self.get_json("/api/eeg-bands", &[])
    }

    /// Fetch the server-rendered topographic map at `time` as opaque image
    /// bytes. The image format is not introspected here.
    pub fn topomap(&self, time: f64) -> Result<Vec<u8>, ClientError> {
        let url = format!("{}/api/eeg-topomap/{}", self.base_url, time);
        let response = self.http.get(&url).send()?;
        let response = check_status(response)?;
        let bytes = response.bytes()?;
        Ok(bytes.to_vec())
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("GET {url}");
        let response = self.http.get(&url).query(query).send()?;
        let response = check_status(response)?;
        let body = response.text()?;
        serde_json::from_str(&body).map_err(|err| ClientError::Decode(err.to_string()))
    }
}

fn check_status(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, ClientError> {
    let status = response.status();
    if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
        return Err(ClientError::NotReady);
    }
    if !status.is_success() {
        return Err(ClientError::Transport {
            status: Some(status.as_u16()),
            message: format!("unexpected status {status}"),
        });
    }
    Ok(response)
}
