use std::time::{Duration, Instant};

use crate::error::ClientError;

pub type Seq = u64;

/// Default trailing-edge debounce for the topomap time input.
pub const TOPOMAP_DEBOUNCE: Duration = Duration::from_millis(200);

/// A request the owner of a subscription must dispatch to the fetch layer.
///
/// Completions are handed back together with the ticket's sequence number;
/// the subscription discards any completion whose sequence is no longer the
/// latest (last-writer-wins by input identity).
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTicket<I> {
    pub seq: Seq,
    pub input: I,
}

/// Observable `{data, loading, error}` triple for one remote resource,
/// parameterised by its input.
///
/// The subscription itself is passive: `set_input` returns the ticket to
/// dispatch and `complete` applies the result, so the state machine stays
/// independent of the transport and of any thread plumbing.
#[derive(Debug)]
pub struct Subscription<I, T> {
    input: I,
    seq: Seq,
    data: Option<T>,
    error: Option<ClientError>,
    loading: bool,
}

impl<I: PartialEq + Clone, T> Subscription<I, T> {
    /// Create the subscription and issue the initial fetch for `input`.
    pub fn new(input: I) -> (Self, FetchTicket<I>) {
        let sub = Self {
            input: input.clone(),
            seq: 1,
            data: None,
            error: None,
            loading: true,
        };
        let ticket = FetchTicket { seq: 1, input };
        (sub, ticket)
    }

    /// Change the input. Returns the fetch ticket for the new input, or
    /// `None` if the input is unchanged. Any in-flight request for the old
    /// input is logically abandoned: its completion will carry a stale
    /// sequence number and be discarded.
    pub fn set_input(&mut self, input: I) -> Option<FetchTicket<I>> {
        if input == self.input {
            return None;
        }
        self.input = input.clone();
        self.seq += 1;
        self.loading = true;
        self.error = None;
        Some(FetchTicket {
            seq: self.seq,
            input,
        })
    }

    /// Re-issue the current input (e.g. a user-driven retry after an error).
    pub fn refetch(&mut self) -> FetchTicket<I> {
        self.seq += 1;
        self.loading = true;
        self.error = None;
        FetchTicket {
            seq: self.seq,
            input: self.input.clone(),
        }
    }

    /// Apply a completion. Returns `true` if it was current and published;
    /// stale completions are dropped without touching any state.
    pub fn complete(&mut self, seq: Seq, result: Result<T, ClientError>) -> bool {
        if seq != self.seq {
            return false;
        }
        self.loading = false;
        match result {
            Ok(value) => {
                self.data = Some(value);
                self.error = None;
            }
            // Keep stale data visible alongside the error.
            Err(err) => self.error = Some(err),
        }
        true
    }

    pub fn input(&self) -> &I {
        &self.input
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&ClientError> {
        self.error.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }
}

/// Session-scoped subscription: no input, fetched once per lifetime.
pub type SessionSubscription<T> = Subscription<(), T>;

pub fn session_subscription<T>() -> (SessionSubscription<T>, FetchTicket<()>) {
    Subscription::new(())
}

/// Debounced subscription for the topographic image, keyed on the time
/// cursor.
///
/// Each input change re-arms a trailing deadline of the debounce interval;
/// the fetch is issued only when the deadline fires with no further change.
/// The displayed resource is an externally-held handle `H` built from the
/// response blob by a caller-supplied factory; the handle is released (via
/// `Drop`) before its replacement is published, and on teardown. Superseded
/// responses are never materialised into a handle at all.
#[derive(Debug)]
pub struct DebouncedSubscription<H> {
    debounce: Duration,
    seq: Seq,
    target: Option<f64>,
    deadline: Option<Instant>,
    loading: bool,
    error: Option<ClientError>,
    handle: Option<H>,
}

impl<H> DebouncedSubscription<H> {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            seq: 0,
            target: None,
            deadline: None,
            loading: false,
            error: None,
            handle: None,
        }
    }

    /// Register a new time input, re-arming the debounce deadline. A repeat
    /// of the current target is a no-op. Bumping the sequence here abandons
    /// any in-flight request immediately, before the new fetch even fires.
    pub fn set_input(&mut self, time: f64, now: Instant) {
        if self.target == Some(time) {
            return;
        }
        self.target = Some(time);
        self.seq += 1;
        self.error = None;
        self.deadline = Some(now + self.debounce);
    }

    /// Issue the pending fetch if the debounce window has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<FetchTicket<f64>> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }
        self.deadline = None;
        let input = self.target?;
        self.loading = true;
        Some(FetchTicket {
            seq: self.seq,
            input,
        })
    }

    /// When the armed deadline will fire, for scheduling a wakeup.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Apply a completion, materialising the blob into a displayable handle
    /// only if the response is still current. The superseded handle is
    /// dropped before the new one is published.
    pub fn complete_with<B>(
        &mut self,
        seq: Seq,
        result: Result<B, ClientError>,
        make: impl FnOnce(B) -> H,
    ) -> bool {
        if seq != self.seq {
            return false;
        }
        self.loading = false;
        match result {
            Ok(blob) => {
                drop(self.handle.take());
                self.handle = Some(make(blob));
                self.error = None;
            }
            Err(err) => self.error = Some(err),
        }
        true
    }

    pub fn handle(&self) -> Option<&H> {
        self.handle.as_ref()
    }

    pub fn error(&self) -> Option<&ClientError> {
        self.error.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn target(&self) -> Option<f64> {
        self.target
    }

    /// Release the live handle and cancel any pending deadline. Dropping the
    /// subscription has the same effect.
    pub fn teardown(&mut self) {
        self.deadline = None;
        self.loading = false;
        drop(self.handle.take());
    }
}
