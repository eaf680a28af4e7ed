//! Lazily initialized, process-wide broker channel handle.
//!
//! The manager moves through three states:
//!
//! - `Disconnected`: no handle; the next [`ChannelManager::acquire_channel`]
//!   connects.
//! - `Connecting`: one caller is establishing the handle; others wait on
//!   the same lock and then reuse the result.
//! - `Ready`: a cached handle is handed out to every caller.
//!
//! A fault (reported explicitly, or observed as a closed handle on acquire)
//! drops back to `Disconnected`. Nothing reconnects in the background.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::{BrokerChannel, BrokerConnector};
use crate::Result;

/// Observable lifecycle of the cached channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No handle cached.
    Disconnected,
    /// A connect is in flight.
    Connecting,
    /// A handle is cached and open.
    Ready,
}

/// Owns the shared channel and recreates it on demand after a fault.
pub struct ChannelManager {
    connector: Arc<dyn BrokerConnector>,
    /// Held across connection establishment so concurrent acquirers
    /// single-flight behind one connect.
    slot: Mutex<Option<Arc<dyn BrokerChannel>>>,
    state: StdMutex<ConnectionState>,
}

impl ChannelManager {
    /// Create a manager in the `Disconnected` state.
    #[must_use]
    pub fn new(connector: Arc<dyn BrokerConnector>) -> Self {
        Self {
            connector,
            slot: Mutex::new(None),
            state: StdMutex::new(ConnectionState::Disconnected),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: ConnectionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Return the cached channel, connecting first if there is none or the
    /// cached one has closed.
    ///
    /// # Errors
    ///
    /// Propagates the connector's error; the manager stays `Disconnected` so
    /// a later call retries.
    pub async fn acquire_channel(&self) -> Result<Arc<dyn BrokerChannel>> {
        let mut slot = self.slot.lock().await;

        if let Some(channel) = slot.as_ref() {
            if channel.is_open() {
                return Ok(Arc::clone(channel));
            }
            warn!("cached broker channel is closed; reconnecting");
            *slot = None;
        }

        self.set_state(ConnectionState::Connecting);
        info!("establishing broker channel");

        match self.connector.connect().await {
            Ok(channel) => {
                *slot = Some(Arc::clone(&channel));
                self.set_state(ConnectionState::Ready);
                info!("broker channel ready");
                Ok(channel)
            }
            Err(err) => {
                self.set_state(ConnectionState::Disconnected);
                error!(%err, "failed to establish broker channel");
                Err(err)
            }
        }
    }

    /// Drop the cached channel after a connection- or channel-level fault.
    ///
    /// A handle that still reports open (a consumer cancelled by the broker,
    /// say) is closed best-effort so its connection is not leaked.
    pub async fn report_fault(&self, reason: &str) {
        let mut slot = self.slot.lock().await;
        if let Some(channel) = slot.take() {
            warn!(reason, "broker channel invalidated");
            if channel.is_open() {
                if let Err(err) = channel.close().await {
                    warn!(%err, "error while closing invalidated broker channel");
                }
            }
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Invalidate `channel` if it is still the cached handle and has closed.
    ///
    /// Called after a failed broker operation to tell a fault apart from a
    /// rejected request on a healthy channel.
    pub async fn observe(&self, channel: &Arc<dyn BrokerChannel>) {
        if channel.is_open() {
            return;
        }
        let mut slot = self.slot.lock().await;
        if slot
            .as_ref()
            .is_some_and(|cached| Arc::ptr_eq(cached, channel))
        {
            *slot = None;
            self.set_state(ConnectionState::Disconnected);
            warn!("broker channel closed after failed operation; invalidated");
        }
    }

    /// Best-effort close of the channel and its connection.
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(channel) = slot.take() {
            info!("closing broker channel");
            if let Err(err) = channel.close().await {
                warn!(%err, "error while closing broker channel");
            }
        }
        self.set_state(ConnectionState::Disconnected);
    }
}
