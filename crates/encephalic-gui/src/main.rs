use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use eframe::{egui, egui::ViewportBuilder};
use egui_plot::{Line, Plot, VLine};
use encephalic_client::{base_url_from_env, ReadinessState, ServiceClient, WindowedSamples};
use env_logger::Env;

mod router;
mod store;

use router::SyncRouter;
use store::{ChannelPreset, Store};

#[derive(Parser, Debug)]
#[command(name = "encephalic", about = "Interactive dashboard for a pre-loaded EEG recording")]
struct Args {
    /// Analysis service base URL (overrides API_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Log filter, e.g. info or encephalic=debug
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(args.log_level.as_str())).init();

    let base_url = args.base_url.unwrap_or_else(base_url_from_env);
    log::info!("using analysis service at {base_url}");
    let client = Arc::new(ServiceClient::new(base_url)?);

    let native_options = eframe::NativeOptions {
        viewport: ViewportBuilder::default().with_inner_size([1280.0, 800.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Encephalic",
        native_options,
        Box::new(move |_cc| Ok(Box::new(EncephalicApp::new(client)))),
    )
    .map_err(|err| anyhow::anyhow!("eframe exited with error: {err}"))
}

#[derive(Copy, Clone, PartialEq)]
enum FeatureView {
    Signals,
    Frequency,
    Topomap,
    Preprocessing,
    Epochs,
    Ica,
    Source,
    Connectivity,
    Export,
}

impl FeatureView {
    fn title(&self) -> &'static str {
        match self {
            FeatureView::Signals => "Raw Signals",
            FeatureView::Frequency => "Frequency Analysis",
            FeatureView::Topomap => "Topographic Maps",
            FeatureView::Preprocessing => "Preprocessing",
            FeatureView::Epochs => "Epochs",
            FeatureView::Ica => "ICA",
            FeatureView::Source => "Source Analysis",
            FeatureView::Connectivity => "Connectivity",
            FeatureView::Export => "Export",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            FeatureView::Signals => "Time-series visualization",
            FeatureView::Frequency => "PSD & band powers",
            FeatureView::Topomap => "Spatial distribution",
            FeatureView::Preprocessing => "Filters & channels",
            FeatureView::Epochs => "Event-related segments",
            FeatureView::Ica => "Independent components",
            FeatureView::Source => "Source localization",
            FeatureView::Connectivity => "Functional connectivity",
            FeatureView::Export => "Save & export data",
        }
    }

    fn all() -> [FeatureView; 9] {
        [
            FeatureView::Signals,
            FeatureView::Frequency,
            FeatureView::Topomap,
            FeatureView::Preprocessing,
            FeatureView::Epochs,
            FeatureView::Ica,
            FeatureView::Source,
            FeatureView::Connectivity,
            FeatureView::Export,
        ]
    }
}

const MAX_PLOT_POINTS: usize = 2048;

struct EncephalicApp {
    router: SyncRouter,
    active_view: FeatureView,
    marker_label: String,
    window_tmin: f64,
    window_tmax: f64,
}

impl EncephalicApp {
    fn new(client: Arc<ServiceClient>) -> Self {
        Self {
            router: SyncRouter::new(Store::new(), client),
            active_view: FeatureView::Signals,
            marker_label: "stimulus".into(),
            window_tmin: 0.0,
            window_tmax: 10.0,
        }
    }

    fn show_header(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("Encephalic");
                ui.separator();
                if let Some(info) = self.router.session_info() {
                    ui.label(format!(
                        "{} channels \u{2022} {:.1}s \u{2022} {:.0} Hz",
                        info.n_channels, info.duration, info.sampling_freq
                    ));
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    match &self.router.readiness {
                        ReadinessState::Initializing => {
                            ui.spinner();
                            ui.label("connecting");
                        }
                        ReadinessState::Healthy => {
                            ui.colored_label(egui::Color32::LIGHT_GREEN, "\u{25CF} ready");
                        }
                        ReadinessState::Unavailable(_) => {
                            ui.colored_label(egui::Color32::LIGHT_RED, "\u{25CF} unavailable");
                        }
                    }
                });
            });
        });
    }

    fn show_sidebar(&mut self, ctx: &egui::Context) {
        egui::SidePanel::left("features").default_width(190.0).show(ctx, |ui| {
            ui.heading("Features");
            ui.separator();
            for view in FeatureView::all() {
                let selected = self.active_view == view;
                let response = ui.selectable_label(selected, view.title());
                if response.clicked() {
                    // Switching views is a user action: pause before the
                    // clock can fight whatever the user looks at next.
                    self.router.clock.pause();
                    self.active_view = view;
                }
                ui.label(
                    egui::RichText::new(view.description())
                        .small()
                        .color(egui::Color32::GRAY),
                );
                ui.add_space(4.0);
            }
        });
    }

    fn show_status_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                match &self.router.readiness {
                    ReadinessState::Initializing => {
                        ui.label("Waiting for the analysis service to load the recording...");
                    }
                    ReadinessState::Unavailable(message) => {
                        ui.colored_label(
                            egui::Color32::LIGHT_RED,
                            format!("Service unavailable: {message}"),
                        );
                        if ui.button("Reconnect").clicked() {
                            self.router.reconnect();
                        }
                    }
                    ReadinessState::Healthy => {
                        if self.router.anything_loading() {
                            ui.spinner();
                            ui.label("Fetching...");
                        } else {
                            ui.label("Ready");
                        }
                        let error = self
                            .router
                            .first_error()
                            .map(|err| err.to_string());
                        if let Some(message) = error {
                            ui.separator();
                            ui.colored_label(egui::Color32::LIGHT_RED, message);
                            if ui.button("Retry").clicked() {
                                self.router.retry_failed();
                            }
                        }
                    }
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.label(format!("t = {:.2}s", self.router.clock.cursor()));
                    if self.router.clock.is_playing() {
                        ui.label("playing");
                    }
                });
            });
        });
    }

    fn playback_controls(&mut self, ui: &mut egui::Ui) {
        let duration = self.router.clock.duration();
        ui.horizontal(|ui| {
            let playing = self.router.clock.is_playing();
            let label = if playing { "\u{23F8} Pause" } else { "\u{25B6} Play" };
            let enabled = duration.is_some();
            if ui.add_enabled(enabled, egui::Button::new(label)).clicked() {
                self.router.toggle_playback(Instant::now());
            }

            if let Some(duration) = duration {
                let mut cursor = self.router.clock.cursor();
                let slider = egui::Slider::new(&mut cursor, 0.01..=duration)
                    .text("time (s)")
                    .fixed_decimals(2);
                if ui.add(slider).changed() {
                    self.router.seek(cursor);
                }
            } else {
                ui.label("Timeline available once session metadata loads");
            }
        });
    }

    fn show_signals_view(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label("Window:");
                ui.add(
                    egui::DragValue::new(&mut self.window_tmin)
                        .range(0.0..=f64::MAX)
                        .speed(0.5)
                        .suffix(" s"),
                );
                ui.label("to");
                ui.add(
                    egui::DragValue::new(&mut self.window_tmax)
                        .range(0.0..=f64::MAX)
                        .speed(0.5)
                        .suffix(" s"),
                );
                if ui.button("Fetch window").clicked() {
                    self.router.set_window(self.window_tmin, self.window_tmax);
                }
                if self.router.samples.as_ref().is_some_and(|s| s.is_loading()) {
                    ui.spinner();
                }
            });
            ui.separator();

            let Some(window) = self.router.window() else {
                ui.centered_and_justified(|ui| {
                    if matches!(self.router.readiness, ReadinessState::Healthy) {
                        ui.label("Loading signal window...");
                    } else {
                        ui.label("Waiting for the analysis service...");
                    }
                });
                return;
            };

            // Build the traces up front so the plot closure does not hold a
            // borrow of the router.
            let traces = stacked_traces(window, |label| self.router.is_channel_selected(label));
            let markers: Vec<f64> = self.router.markers().iter().map(|m| m.time).collect();
            let cursor = self.router.clock.cursor();

            let mut clicked_time = None;
            Plot::new("signals_plot")
                .height(ui.available_height() - 48.0)
                .show(ui, |plot_ui| {
                    for (name, points) in &traces {
                        plot_ui.line(Line::new(points.clone()).name(name.clone()));
                    }
                    for time in &markers {
                        plot_ui.vline(
                            VLine::new(*time)
                                .stroke(egui::Stroke::new(1.0, egui::Color32::LIGHT_BLUE)),
                        );
                    }
                    plot_ui.vline(
                        VLine::new(cursor).stroke(egui::Stroke::new(1.5, egui::Color32::RED)),
                    );
                    if plot_ui.response().clicked() {
                        if let Some(coord) = plot_ui.pointer_coordinate() {
                            clicked_time = Some(coord.x);
                        }
                    }
                });
            if let Some(time) = clicked_time {
                // Clicking a timestamp seeks and pauses.
                self.router.seek(time);
            }

            ui.separator();
            self.playback_controls(ui);
        });
    }

    fn show_frequency_view(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("bands_panel").default_width(240.0).show(ctx, |ui| {
            ui.heading("Band Powers");
            ui.separator();
            match self.router.band_powers() {
                Some(bands) => {
                    let rows = bands.rows();
                    let max = rows
                        .iter()
                        .map(|(_, _, value)| *value)
                        .fold(f64::MIN_POSITIVE, f64::max);
                    for (name, range, value) in rows {
                        ui.label(format!("{name} ({range})"));
                        ui.add(
                            egui::ProgressBar::new((value / max) as f32)
                                .text(format!("{value:.3}")),
                        );
                        ui.add_space(4.0);
                    }
                }
                None => {
                    if self.router.bands.as_ref().is_some_and(|s| s.is_loading()) {
                        ui.spinner();
                    }
                    ui.label("No band powers yet");
                }
            }
            if let Some(err) = self.router.bands.as_ref().and_then(|s| s.error()) {
                ui.colored_label(egui::Color32::LIGHT_RED, err.to_string());
            }
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Power Spectral Density");
            let Some(spectrum) = self.router.spectrum_data() else {
                ui.centered_and_justified(|ui| {
                    ui.label("Loading power spectrum...");
                });
                return;
            };
            let points: Vec<[f64; 2]> = spectrum
                .frequencies
                .iter()
                .zip(spectrum.psd.iter())
                .map(|(&f, &p)| [f, p])
                .collect();
            let channels = spectrum.channel_names.len();
            Plot::new("psd_plot")
                .height(ui.available_height() - 24.0)
                .show(ui, |plot_ui| {
                    plot_ui.line(Line::new(points).name("mean PSD"));
                });
            ui.label(format!("Averaged over {channels} channels"));
        });
    }

    fn show_topomap_view(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Topographic Map");
            ui.label(format!("t = {:.2}s", self.router.clock.cursor()));
            ui.add_space(6.0);

            match self.router.topomap.handle() {
                Some(texture) => {
                    let size = texture.size_vec2();
                    let scale = (ui.available_width() / size.x).min(1.5);
                    ui.image((texture.id(), size * scale.max(0.1)));
                }
                None => {
                    ui.centered_and_justified(|ui| {
                        if self.router.topomap.is_loading() {
                            ui.spinner();
                        } else {
                            ui.label("No topographic map yet");
                        }
                    });
                    return;
                }
            }
            if self.router.topomap.is_loading() {
                ui.spinner();
            }
            if let Some(err) = self.router.topomap.error() {
                ui.colored_label(egui::Color32::LIGHT_RED, err.to_string());
            }

            ui.separator();
            self.playback_controls(ui);
        });
    }

    fn show_preprocessing_view(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("channel_panel").default_width(230.0).show(ctx, |ui| {
            ui.heading("Channels");
            ui.horizontal_wrapped(|ui| {
                for preset in ChannelPreset::all() {
                    if ui.button(preset.label()).clicked() {
                        self.router.apply_preset(preset);
                    }
                }
            });
            ui.separator();
            let labels: Vec<String> = self
                .router
                .window()
                .map(|window| window.labels.clone())
                .unwrap_or_default();
            if labels.is_empty() {
                ui.label("Channel list follows the first fetched window");
            }
            egui::ScrollArea::vertical().show(ui, |ui| {
                for label in labels {
                    let mut selected = self.router.is_channel_selected(&label);
                    if ui.checkbox(&mut selected, &label).changed() {
                        self.router.toggle_channel(&label);
                    }
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Filter Controls");
            ui.label("Filtering runs on the analysis service; these settings are illustrative.");
            ui.add_space(8.0);
            ui.group(|ui| {
                ui.label("Band-pass");
                ui.horizontal(|ui| {
                    ui.label("High-pass 0.5 Hz");
                    ui.separator();
                    ui.label("Low-pass 50 Hz");
                    ui.separator();
                    ui.label("Notch 60 Hz");
                });
            });
            ui.add_space(8.0);
            ui.group(|ui| {
                ui.label("Artifact handling");
                ui.label("\u{2022} Eye-blink and muscle artifacts are flagged server-side");
                ui.label("\u{2022} Use the ICA view to inspect component-based cleanup");
            });
        });
    }

    fn show_epochs_view(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Event Marking");
            ui.horizontal(|ui| {
                ui.label("Label:");
                ui.text_edit_singleline(&mut self.marker_label);
                if ui.button("Mark at cursor").clicked() {
                    let time = self.router.clock.cursor();
                    let label = self.marker_label.trim();
                    let label = if label.is_empty() { "event" } else { label };
                    self.router.add_marker(time, label.to_string());
                }
            });
            ui.separator();

            let rows: Vec<(u64, f64, String)> = self
                .router
                .markers()
                .iter()
                .map(|m| (m.id, m.time, m.label.clone()))
                .collect();
            if rows.is_empty() {
                ui.label("No events marked yet. Markers appear on the signals plot.");
            }
            let mut remove = None;
            for (id, time, label) in rows {
                ui.horizontal(|ui| {
                    ui.monospace(format!("{time:8.2}s"));
                    ui.label(label);
                    if ui.small_button("delete").clicked() {
                        remove = Some(id);
                    }
                });
            }
            if let Some(id) = remove {
                self.router.remove_marker(id);
            }

            ui.separator();
            ui.heading("Epoch Analysis");
            ui.label("Event-related segmentation runs on the analysis service:");
            ui.label("\u{2022} Epochs around marked events");
            ui.label("\u{2022} Baseline correction and averaging");
            ui.label("\u{2022} Bad-epoch rejection");
        });
    }

    fn show_static_view(&mut self, ctx: &egui::Context, title: &str, lines: &[&str]) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading(title);
            ui.add_space(6.0);
            for line in lines {
                ui.label(*line);
            }
        });
    }

    fn show_export_view(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("session_stats").default_width(240.0).show(ctx, |ui| {
            ui.heading("Session");
            ui.separator();
            match self.router.session_info() {
                Some(info) => {
                    ui.label(format!("Channels: {}", info.n_channels));
                    ui.label(format!("Sampling: {:.0} Hz", info.sampling_freq));
                    ui.label(format!("Duration: {:.1} s", info.duration));
                    ui.label(format!("Samples: {}", info.n_samples));
                }
                None => {
                    ui.label("Session metadata not loaded");
                }
            }
        });
        self.show_static_view(
            ctx,
            "Export",
            &[
                "Export runs on the analysis service:",
                "\u{2022} FIF / EDF / CSV signal export",
                "\u{2022} PSD and band-power tables",
                "\u{2022} Topographic map image series",
            ],
        );
    }
}

impl eframe::App for EncephalicApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();
        self.router.pump(ctx, now);

        self.show_header(ctx);
        self.show_sidebar(ctx);
        self.show_status_bar(ctx);

        match self.active_view {
            FeatureView::Signals => self.show_signals_view(ctx),
            FeatureView::Frequency => self.show_frequency_view(ctx),
            FeatureView::Topomap => self.show_topomap_view(ctx),
            FeatureView::Preprocessing => self.show_preprocessing_view(ctx),
            FeatureView::Epochs => self.show_epochs_view(ctx),
            FeatureView::Ica => self.show_static_view(
                ctx,
                "Independent Component Analysis",
                &[
                    "Separate neural signals from artifacts:",
                    "\u{2022} FastICA, Infomax, SOBI decompositions",
                    "\u{2022} Automatic component classification",
                    "\u{2022} EOG/ECG artifact detection",
                    "\u{2022} Apply component exclusion server-side",
                ],
            ),
            FeatureView::Source => self.show_static_view(
                ctx,
                "Source Localization",
                &[
                    "Estimate cortical sources from sensor data:",
                    "\u{2022} BEM/FEM head models and source spaces",
                    "\u{2022} Minimum-norm estimates, dSPM, sLORETA",
                    "\u{2022} LCMV/DICS beamformers",
                ],
            ),
            FeatureView::Connectivity => self.show_static_view(
                ctx,
                "Functional Connectivity",
                &[
                    "Channel-to-channel coupling measures:",
                    "\u{2022} Correlation and coherence",
                    "\u{2022} Phase lag index (PLI, wPLI)",
                    "\u{2022} Granger causality",
                ],
            ),
            FeatureView::Export => self.show_export_view(ctx),
        }

        // Wake up for the next playback tick or debounce deadline; poll
        // faster while requests are outstanding so completions drain.
        if let Some(wakeup) = self.router.next_wakeup() {
            ctx.request_repaint_after(wakeup.saturating_duration_since(now));
        }
        if self.router.anything_loading()
            || self.router.readiness == ReadinessState::Initializing
        {
            ctx.request_repaint_after(Duration::from_millis(50));
        }
    }
}

/// Vertical spacing between stacked channel traces, derived from the
/// largest peak-to-peak swing in the window.
fn trace_spread(data: &[Vec<f64>]) -> f64 {
    let mut spread = 0.0f64;
    for channel in data {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &value in channel {
            min = min.min(value);
            max = max.max(value);
        }
        if max > min {
            spread = spread.max(max - min);
        }
    }
    if spread > 0.0 {
        spread * 1.1
    } else {
        1.0
    }
}

/// Selected channels as vertically offset plot traces. Labels are paired
/// with sample rows positionally, so a response carrying fewer rows than
/// labels simply yields fewer traces.
fn stacked_traces(
    window: &WindowedSamples,
    is_selected: impl Fn(&str) -> bool,
) -> Vec<(String, Vec<[f64; 2]>)> {
    let spread = trace_spread(&window.data);
    let mut traces = Vec::new();
    for (label, row) in window.labels.iter().zip(&window.data) {
        if !is_selected(label) {
            continue;
        }
        let offset = traces.len() as f64 * spread;
        let points: Vec<[f64; 2]> = window
            .times
            .iter()
            .zip(row.iter())
            .map(|(&t, &v)| [t, v + offset])
            .collect();
        traces.push((label.clone(), decimate(points, MAX_PLOT_POINTS)));
    }
    traces
}

fn decimate(points: Vec<[f64; 2]>, max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points;
    }
    let stride = points.len().div_ceil(max_points);
    points.into_iter().step_by(stride).collect()
}
