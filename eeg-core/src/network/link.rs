//! State, policy and event plumbing shared by both reconnecting clients.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use super::{ClientEvent, EVENT_CAPACITY, Endpoint};
use crate::error::EegError;
use crate::state::{ClientState, ReconnectPolicy};

pub(crate) struct Link {
    name: &'static str,
    state: Mutex<ClientState>,
    policy: Mutex<ReconnectPolicy>,
    events: broadcast::Sender<ClientEvent>,
}

impl Link {
    pub(crate) fn new(name: &'static str, policy: ReconnectPolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            name,
            state: Mutex::new(ClientState::Disconnected),
            policy: Mutex::new(policy),
            events,
        }
    }

    pub(crate) fn emit(&self, event: ClientEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub(crate) fn log(&self, msg: String) {
        info!("{}: {msg}", self.name);
        self.emit(ClientEvent::Log(msg));
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub(crate) fn state(&self) -> ClientState {
        self.state.lock().clone()
    }

    pub(crate) fn policy(&self) -> ReconnectPolicy {
        *self.policy.lock()
    }

    pub(crate) fn set_policy(&self, policy: ReconnectPolicy) {
        *self.policy.lock() = policy;
    }

    pub(crate) fn begin_connect(&self) -> Result<(), EegError> {
        self.state.lock().begin_connect()
    }

    pub(crate) fn connected(&self, endpoint: &Endpoint) {
        if let Err(e) = self.state.lock().complete_connect() {
            debug!("{}: {e}", self.name);
        }
        self.log(format!("connected to {endpoint}"));
        self.emit(ClientEvent::Connected(endpoint.clone()));
    }

    pub(crate) fn attempt_failed(&self, endpoint: &Endpoint, err: &EegError) {
        self.log(format!("connection to {endpoint} failed: {err}"));
        self.emit(ClientEvent::Error(err.to_string()));
    }

    pub(crate) fn connection_lost(&self, endpoint: &Endpoint, reason: Option<String>) {
        match reason {
            Some(reason) => {
                self.log(format!("connection to {endpoint} lost: {reason}"));
                self.emit(ClientEvent::Error(reason));
            }
            None => self.log(format!("{endpoint} closed the connection")),
        }
        self.emit(ClientEvent::Disconnected);
    }

    /// Decide what happens after a failed attempt or a dropped connection.
    ///
    /// Returns the pause before retry number `*attempt`, or `None` when the
    /// supervisor must exit (auto-reconnect off, or attempts exhausted).
    pub(crate) fn next_retry(
        &self,
        endpoint: &Endpoint,
        attempt: &mut u32,
        was_connected: bool,
    ) -> Option<Duration> {
        let policy = self.policy();
        if !policy.enabled {
            self.state.lock().force_disconnect();
            if !was_connected {
                self.emit(ClientEvent::Disconnected);
            }
            return None;
        }

        *attempt += 1;
        if *attempt > policy.max_attempts {
            let err = EegError::ReconnectExhausted {
                attempts: policy.max_attempts,
            };
            error!("{}: {endpoint}: {err}", self.name);
            if let Err(e) = self.state.lock().fail() {
                debug!("{}: {e}", self.name);
            }
            self.emit(ClientEvent::Error(err.to_string()));
            self.emit(ClientEvent::Disconnected);
            return None;
        }

        if let Err(e) = self.state.lock().begin_reconnect(*attempt) {
            debug!("{}: {e}", self.name);
        }
        self.log(format!(
            "reconnecting to {endpoint} ({}/{})",
            attempt, policy.max_attempts
        ));
        self.emit(ClientEvent::ReconnectAttempt {
            attempt: *attempt,
            max: policy.max_attempts,
        });
        Some(policy.interval)
    }

    /// Force the state back to `Disconnected`. Returns whether anything
    /// was active, and announces the disconnect if so.
    pub(crate) fn reset(&self) -> bool {
        let was_active = {
            let mut state = self.state.lock();
            let active = !state.is_idle();
            state.force_disconnect();
            active
        };
        if was_active {
            self.emit(ClientEvent::Disconnected);
        }
        was_active
    }
}
