use serde::{Deserialize, Serialize};

/// Immutable metadata for the loaded recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub n_channels: usize,
    pub channel_names: Vec<String>,
    pub sampling_freq: f64,
    /// Total recording length in seconds
    pub duration: f64,
    pub n_samples: usize,
}

/// One fetched `(tmin, tmax)` window of signal data.
///
/// `data` is indexed `[channel][sample]`; `times` is the parallel time axis
/// in seconds and is the source of truth for the window length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowedSamples {
    pub labels: Vec<String>,
    pub data: Vec<Vec<f64>>,
    pub times: Vec<f64>,
    pub sfreq: f64,
}

impl WindowedSamples {
    pub fn n_channels(&self) -> usize {
        self.data.len()
    }

    pub fn n_samples(&self) -> usize {
        self.times.len()
    }
}

/// Whole-session power spectral density.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerSpectrum {
    pub frequencies: Vec<f64>,
    /// Power averaged over channels
    pub psd: Vec<f64>,
    pub channel_psds: Vec<Vec<f64>>,
    pub channel_names: Vec<String>,
}

/// Integrated power in the five conventional frequency bands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BandPowers {
    pub delta: f64,
    pub theta: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl BandPowers {
    /// `(label, frequency range, power)` rows in ascending band order.
    pub fn rows(&self) -> [(&'static str, &'static str, f64); 5] {
        [
            ("Delta", "0.5-4 Hz", self.delta),
            ("Theta", "4-8 Hz", self.theta),
            ("Alpha", "8-13 Hz", self.alpha),
            ("Beta", "13-30 Hz", self.beta),
            ("Gamma", "30-50 Hz", self.gamma),
        ]
    }
}

/// Response of the `/api/health` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    #[serde(rename = "dataLoaded", default)]
    pub data_loaded: bool,
}

impl Health {
    pub fn is_ready(&self) -> bool {
        self.status == "healthy" && self.data_loaded
    }

    pub fn is_initializing(&self) -> bool {
        self.status == "initializing"
    }
}
