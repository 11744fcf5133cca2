use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};
use egui::TextureOptions;
use encephalic_client::{
    fetch_with_retry, session_subscription, BandPowers, ClientError, FetchTicket, PowerSpectrum,
    ProbeConfig, ReadinessProbe, ReadinessState, RetryPolicy, Seq, ServiceClient, SessionInfo,
    Subscription, WindowedSamples,
};

use crate::store::Store;

pub enum FetchCommand {
    Info { seq: Seq },
    Samples { seq: Seq, tmin: f64, tmax: f64 },
    Spectrum { seq: Seq },
    Bands { seq: Seq },
    Topomap { seq: Seq, time: f64 },
    Shutdown,
}

enum FetchUpdate {
    Info(Seq, Result<SessionInfo, ClientError>),
    Samples(Seq, Result<WindowedSamples, ClientError>),
    Spectrum(Seq, Result<PowerSpectrum, ClientError>),
    Bands(Seq, Result<BandPowers, ClientError>),
    Topomap(Seq, Result<Vec<u8>, ClientError>),
}

/// Routes data between the analysis service and the panel-facing [`Store`].
///
/// A single worker thread owns the blocking HTTP client and executes fetch
/// commands through the retry policy; completions flow back over a channel
/// and are applied on the UI thread, which stays the sole mutator of
/// subscription state. Stale completions are dropped by sequence number
/// inside the subscriptions themselves.
pub struct SyncRouter {
    store: Store,
    command_tx: Sender<FetchCommand>,
    update_rx: Receiver<FetchUpdate>,
    worker: Option<JoinHandle<()>>,
    client: Arc<ServiceClient>,
    probe: Option<ReadinessProbe>,
    session_started: bool,
}

impl SyncRouter {
    pub fn new(store: Store, client: Arc<ServiceClient>) -> Self {
        let (command_tx, command_rx) = bounded(32);
        let (update_tx, update_rx) = bounded(32);
        let worker_client = client.clone();
        let worker = std::thread::spawn(move || {
            FetchWorker::new(worker_client, command_rx, update_tx).run();
        });
        let probe = ReadinessProbe::spawn(client.clone(), ProbeConfig::default());
        Self {
            store,
            command_tx,
            update_rx,
            worker: Some(worker),
            client,
            probe: Some(probe),
            session_started: false,
        }
    }

    /// Per-frame drive: readiness transitions, fetch completions, playback
    /// ticks, and the debounced topomap input.
    pub fn pump(&mut self, ctx: &egui::Context, now: Instant) {
        self.check_readiness();
        self.route_pending_updates(ctx, now);

        self.store.clock.advance(now);
        if self.session_started && self.store.clock.duration().is_some() {
            let cursor = self.store.clock.cursor();
            self.store.topomap.set_input(cursor, now);
        }
        if let Some(ticket) = self.store.topomap.poll(now) {
            self.send(FetchCommand::Topomap {
                seq: ticket.seq,
                time: ticket.input,
            });
        }
    }

    /// Earliest pending wakeup (playback tick or debounce deadline).
    pub fn next_wakeup(&self) -> Option<Instant> {
        match (self.store.clock.next_tick(), self.store.topomap.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    pub fn seek(&mut self, time: f64) {
        self.store.clock.seek(time);
    }

    pub fn toggle_playback(&mut self, now: Instant) {
        self.store.clock.toggle(now);
    }

    pub fn set_window(&mut self, tmin: f64, tmax: f64) {
        if tmax <= tmin {
            return;
        }
        if let Some(sub) = self.store.samples.as_mut() {
            if let Some(ticket) = sub.set_input((tmin, tmax)) {
                let (tmin, tmax) = ticket.input;
                self.send(FetchCommand::Samples {
                    seq: ticket.seq,
                    tmin,
                    tmax,
                });
            }
        }
    }

    pub fn retry_failed(&mut self) {
        let mut commands = Vec::new();
        if let Some(sub) = self.store.info.as_mut() {
            if sub.error().is_some() {
                commands.push(FetchCommand::Info {
                    seq: sub.refetch().seq,
                });
            }
        }
        if let Some(sub) = self.store.samples.as_mut() {
            if sub.error().is_some() {
                let ticket = sub.refetch();
                let (tmin, tmax) = ticket.input;
                commands.push(FetchCommand::Samples {
                    seq: ticket.seq,
                    tmin,
                    tmax,
                });
            }
        }
        if let Some(sub) = self.store.spectrum.as_mut() {
            if sub.error().is_some() {
                commands.push(FetchCommand::Spectrum {
                    seq: sub.refetch().seq,
                });
            }
        }
        if let Some(sub) = self.store.bands.as_mut() {
            if sub.error().is_some() {
                commands.push(FetchCommand::Bands {
                    seq: sub.refetch().seq,
                });
            }
        }
        for command in commands {
            self.send(command);
        }
    }

    /// Restart the readiness probe after the service was reported
    /// unavailable.
    pub fn reconnect(&mut self) {
        if self.probe.is_none() && !self.session_started {
            log::info!("restarting readiness probe against {}", self.client.base_url());
            self.store.readiness = ReadinessState::Initializing;
            self.probe = Some(ReadinessProbe::spawn(self.client.clone(), ProbeConfig::default()));
        }
    }

    fn check_readiness(&mut self) {
        let Some(probe) = self.probe.as_ref() else {
            return;
        };
        if let Some(state) = probe.try_state() {
            self.store.readiness = state.clone();
            self.probe = None;
            if state == ReadinessState::Healthy {
                self.start_session_fetches();
            }
        }
    }

    /// Issue the one-shot session fetches. Runs exactly once, after the
    /// probe has seen the service healthy with data loaded.
    fn start_session_fetches(&mut self) {
        if self.session_started {
            return;
        }
        self.session_started = true;

        let (info, ticket) = session_subscription::<SessionInfo>();
        self.store.info = Some(info);
        self.send(FetchCommand::Info { seq: ticket.seq });

        let (samples, ticket) = Subscription::new((0.0, 10.0));
        self.store.samples = Some(samples);
        let FetchTicket { seq, input } = ticket;
        self.send(FetchCommand::Samples {
            seq,
            tmin: input.0,
            tmax: input.1,
        });

        let (spectrum, ticket) = session_subscription::<PowerSpectrum>();
        self.store.spectrum = Some(spectrum);
        self.send(FetchCommand::Spectrum { seq: ticket.seq });

        let (bands, ticket) = session_subscription::<BandPowers>();
        self.store.bands = Some(bands);
        self.send(FetchCommand::Bands { seq: ticket.seq });
    }

    fn route_pending_updates(&mut self, ctx: &egui::Context, now: Instant) {
        while let Ok(update) = self.update_rx.try_recv() {
            match update {
                FetchUpdate::Info(seq, result) => {
                    if let Some(sub) = self.store.info.as_mut() {
                        if sub.complete(seq, result) {
                            if let Some(info) = sub.data() {
                                let duration = info.duration;
                                self.store.clock.set_duration(duration);
                                // Prime the first topomap fetch from the cursor.
                                let cursor = self.store.clock.cursor();
                                self.store.topomap.set_input(cursor, now);
                            }
                        }
                    }
                }
                FetchUpdate::Samples(seq, result) => {
                    let mut labels = None;
                    if let Some(sub) = self.store.samples.as_mut() {
                        if sub.complete(seq, result) {
                            labels = sub.data().map(|window| window.labels.clone());
                        }
                    }
                    if let Some(labels) = labels {
                        self.store.init_channels(&labels);
                    }
                }
                FetchUpdate::Spectrum(seq, result) => {
                    if let Some(sub) = self.store.spectrum.as_mut() {
                        sub.complete(seq, result);
                    }
                }
                FetchUpdate::Bands(seq, result) => {
                    if let Some(sub) = self.store.bands.as_mut() {
                        sub.complete(seq, result);
                    }
                }
                FetchUpdate::Topomap(seq, result) => {
                    let decoded = result.and_then(|bytes| {
                        decode_color_image(&bytes).map_err(ClientError::Decode)
                    });
                    self.store.topomap.complete_with(seq, decoded, |img| {
                        ctx.load_texture(format!("eeg-topomap-{seq}"), img, TextureOptions::LINEAR)
                    });
                }
            }
        }
    }

    fn send(&self, command: FetchCommand) {
        if self.command_tx.send(command).is_err() {
            log::error!("fetch worker is gone; dropping command");
        }
    }
}

impl Deref for SyncRouter {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

impl DerefMut for SyncRouter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.store
    }
}

impl Drop for SyncRouter {
    fn drop(&mut self) {
        self.probe = None;
        self.store.topomap.teardown();
        let _ = self.command_tx.send(FetchCommand::Shutdown);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

struct FetchWorker {
    client: Arc<ServiceClient>,
    policy: RetryPolicy,
    command_rx: Receiver<FetchCommand>,
    update_tx: Sender<FetchUpdate>,
}

impl FetchWorker {
    fn new(
        client: Arc<ServiceClient>,
        command_rx: Receiver<FetchCommand>,
        update_tx: Sender<FetchUpdate>,
    ) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
            command_rx,
            update_tx,
        }
    }

    fn run(self) {
        while let Ok(command) = self.command_rx.recv() {
            let update = match command {
                FetchCommand::Info { seq } => FetchUpdate::Info(
                    seq,
                    fetch_with_retry(&self.policy, || self.client.session_info()),
                ),
                FetchCommand::Samples { seq, tmin, tmax } => FetchUpdate::Samples(
                    seq,
                    fetch_with_retry(&self.policy, || self.client.samples(tmin, tmax)),
                ),
                FetchCommand::Spectrum { seq } => FetchUpdate::Spectrum(
                    seq,
                    fetch_with_retry(&self.policy, || self.client.power_spectrum()),
                ),
                FetchCommand::Bands { seq } => FetchUpdate::Bands(
                    seq,
                    fetch_with_retry(&self.policy, || self.client.band_powers()),
                ),
                FetchCommand::Topomap { seq, time } => FetchUpdate::Topomap(
                    seq,
                    fetch_with_retry(&self.policy, || self.client.topomap(time)),
                ),
                FetchCommand::Shutdown => break,
            };
            if self.update_tx.send(update).is_err() {
                break;
            }
        }
    }
}

fn decode_color_image(bytes: &[u8]) -> Result<egui::ColorImage, String> {
    let img = image::load_from_memory(bytes)
        .map_err(|err| err.to_string())?
        .to_rgba8();
    let size = [img.width() as usize, img.height() as usize];
    Ok(egui::ColorImage::from_rgba_unmultiplied(size, img.as_raw()))
}
