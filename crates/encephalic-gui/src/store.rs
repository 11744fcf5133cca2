use egui::TextureHandle;
use encephalic_client::{
    BandPowers, ClientError, DebouncedSubscription, PlaybackClock, PowerSpectrum, ReadinessState,
    SessionInfo, SessionSubscription, Subscription, WindowedSamples, TOPOMAP_DEBOUNCE,
};

/// A user-placed marker on the session timeline. Local UI state only.
#[derive(Debug, Clone)]
pub struct EventMarker {
    pub id: u64,
    pub time: f64,
    pub label: String,
}

/// Named channel subsets selectable from the preprocessing view.
#[derive(Copy, Clone, PartialEq)]
pub enum ChannelPreset {
    All,
    Frontal,
    Central,
    Posterior,
}

impl ChannelPreset {
    pub fn label(&self) -> &'static str {
        match self {
            ChannelPreset::All => "All",
            ChannelPreset::Frontal => "Frontal",
            ChannelPreset::Central => "Central",
            ChannelPreset::Posterior => "Posterior",
        }
    }

    pub fn all() -> [ChannelPreset; 4] {
        [
            ChannelPreset::All,
            ChannelPreset::Frontal,
            ChannelPreset::Central,
            ChannelPreset::Posterior,
        ]
    }

    pub fn matches(&self, label: &str) -> bool {
        match self {
            ChannelPreset::All => true,
            ChannelPreset::Frontal => {
                label.starts_with("Fp")
                    || label.starts_with("AF")
                    || (label.starts_with('F') && !label.starts_with("FC") && !label.starts_with("FT"))
            }
            ChannelPreset::Central => {
                label.starts_with("FC")
                    || label.starts_with("CP")
                    || (label.starts_with('C') && !label.starts_with("CB"))
            }
            ChannelPreset::Posterior => {
                label.starts_with('P') || label.starts_with('O') || label.starts_with('T')
            }
        }
    }
}

/// All data-side state the panels read: the readiness state, one
/// subscription per remote resource, the playback clock, and purely local
/// view state (channel selection, markers).
///
/// Session-scoped subscriptions only exist once the readiness probe has seen
/// the service healthy; until then they are `None` and the panels show the
/// loading affordance.
pub struct Store {
    pub readiness: ReadinessState,
    pub info: Option<SessionSubscription<SessionInfo>>,
    pub samples: Option<Subscription<(f64, f64), WindowedSamples>>,
    pub spectrum: Option<SessionSubscription<PowerSpectrum>>,
    pub bands: Option<SessionSubscription<BandPowers>>,
    pub topomap: DebouncedSubscription<TextureHandle>,
    pub clock: PlaybackClock,
    selected_channels: Vec<String>,
    channels_initialized: bool,
    markers: Vec<EventMarker>,
    next_marker_id: u64,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            readiness: ReadinessState::Initializing,
            info: None,
            samples: None,
            spectrum: None,
            bands: None,
            topomap: DebouncedSubscription::new(TOPOMAP_DEBOUNCE),
            clock: PlaybackClock::new(),
            selected_channels: Vec::new(),
            channels_initialized: false,
            markers: Vec::new(),
            next_marker_id: 1,
        }
    }

    pub fn session_info(&self) -> Option<&SessionInfo> {
        self.info.as_ref().and_then(|sub| sub.data())
    }

    pub fn window(&self) -> Option<&WindowedSamples> {
        self.samples.as_ref().and_then(|sub| sub.data())
    }

    pub fn window_bounds(&self) -> (f64, f64) {
        self.samples
            .as_ref()
            .map(|sub| *sub.input())
            .unwrap_or((0.0, 10.0))
    }

    pub fn spectrum_data(&self) -> Option<&PowerSpectrum> {
        self.spectrum.as_ref().and_then(|sub| sub.data())
    }

    pub fn band_powers(&self) -> Option<&BandPowers> {
        self.bands.as_ref().and_then(|sub| sub.data())
    }

    pub fn anything_loading(&self) -> bool {
        self.info.as_ref().is_some_and(|s| s.is_loading())
            || self.samples.as_ref().is_some_and(|s| s.is_loading())
            || self.spectrum.as_ref().is_some_and(|s| s.is_loading())
            || self.bands.as_ref().is_some_and(|s| s.is_loading())
            || self.topomap.is_loading()
    }

    /// First error across subscriptions, for the status bar.
    pub fn first_error(&self) -> Option<&ClientError> {
        self.info
            .as_ref()
            .and_then(|s| s.error())
            .or_else(|| self.samples.as_ref().and_then(|s| s.error()))
            .or_else(|| self.spectrum.as_ref().and_then(|s| s.error()))
            .or_else(|| self.bands.as_ref().and_then(|s| s.error()))
            .or_else(|| self.topomap.error())
    }

    /// Seed the channel selection from the first fetched window.
    pub fn init_channels(&mut self, labels: &[String]) {
        if !self.channels_initialized && !labels.is_empty() {
            self.selected_channels = labels.to_vec();
            self.channels_initialized = true;
        }
    }

    pub fn selected_channels(&self) -> &[String] {
        &self.selected_channels
    }

    pub fn is_channel_selected(&self, label: &str) -> bool {
        self.selected_channels.iter().any(|ch| ch == label)
    }

    pub fn toggle_channel(&mut self, label: &str) {
        if let Some(idx) = self.selected_channels.iter().position(|ch| ch == label) {
            self.selected_channels.remove(idx);
        } else {
            self.selected_channels.push(label.to_string());
        }
    }

    pub fn apply_preset(&mut self, preset: ChannelPreset) {
        let Some(window) = self.window() else {
            return;
        };
        self.selected_channels = window
            .labels
            .iter()
            .filter(|label| preset.matches(label))
            .cloned()
            .collect();
    }

    pub fn markers(&self) -> &[EventMarker] {
        &self.markers
    }

    pub fn add_marker(&mut self, time: f64, label: String) {
        let id = self.next_marker_id;
        self.next_marker_id += 1;
        self.markers.push(EventMarker { id, time, label });
        self.markers
            .sort_by(|a, b| a.time.partial_cmp(&b.time).unwrap_or(std::cmp::Ordering::Equal));
    }

    pub fn remove_marker(&mut self, id: u64) {
        self.markers.retain(|marker| marker.id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_presets_partition_a_1020_montage() {
        let frontal = ChannelPreset::Frontal;
        assert!(frontal.matches("Fp1"));
        assert!(frontal.matches("F3"));
        assert!(frontal.matches("AF7"));
        assert!(!frontal.matches("FC5"));
        assert!(!frontal.matches("Cz"));

        let central = ChannelPreset::Central;
        assert!(central.matches("Cz"));
        assert!(central.matches("FC1"));
        assert!(central.matches("CP2"));
        assert!(!central.matches("P3"));

        let posterior = ChannelPreset::Posterior;
        assert!(posterior.matches("Pz"));
        assert!(posterior.matches("O1"));
        assert!(posterior.matches("T7"));
        assert!(!posterior.matches("Fz"));
    }

    #[test]
    fn channel_selection_initialises_once() {
        let mut store = Store::new();
        store.init_channels(&["Fp1".into(), "Cz".into()]);
        assert_eq!(store.selected_channels().len(), 2);

        store.toggle_channel("Cz");
        assert!(!store.is_channel_selected("Cz"));

        // A later window fetch must not clobber the user's selection.
        store.init_channels(&["Fp1".into(), "Cz".into(), "Pz".into()]);
        assert_eq!(store.selected_channels().len(), 1);
    }

    #[test]
    fn markers_stay_sorted_by_time() {
        let mut store = Store::new();
        store.add_marker(5.0, "blink".into());
        store.add_marker(1.0, "stim".into());
        store.add_marker(3.0, "artifact".into());
        let times: Vec<f64> = store.markers().iter().map(|m| m.time).collect();
        assert_eq!(times, vec![1.0, 3.0, 5.0]);

        let id = store.markers()[1].id;
        store.remove_marker(id);
        assert_eq!(store.markers().len(), 2);
    }
}
