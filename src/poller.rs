use std::future::Future;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::model::ClientMessage;
use crate::source::ArtifactSource;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);

const CLIENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

pub struct UpdatePoller<S> {
    source: S,
    last_known_version: Option<String>,
    clients: broadcast::Sender<ClientMessage>,
}

impl<S: ArtifactSource> UpdatePoller<S> {
    pub fn new(source: S) -> Self {
        let (clients, _) = broadcast::channel(CLIENT_CHANNEL_CAPACITY);
        Self {
            source,
            last_known_version: None,
            clients,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientMessage> {
        self.clients.subscribe()
    }

    pub fn last_known_version(&self) -> Option<&str> {
        self.last_known_version.as_deref()
    }

    pub async fn check_for_updates(&mut self) -> Option<String> {
        let manifest = match self.source.fetch_manifest().await {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed to check for updates");
                return None;
            }
        };

        let Some(known) = self.last_known_version.as_deref() else {
            info!(version = %manifest.version, "recorded baseline app version");
            self.last_known_version = Some(manifest.version);
            return None;
        };

        if manifest.version == known {
            debug!(version = %known, "app version unchanged");
            return None;
        }

        info!(previous = %known, version = %manifest.version, "new app version available");
        let delivered = self
            .clients
            .send(ClientMessage::UpdateAvailable {
                version: manifest.version.clone(),
            })
            .unwrap_or(0);
        debug!(clients = delivered, "broadcast update notification");

        self.last_known_version = Some(manifest.version.clone());
        Some(manifest.version)
    }

    pub async fn run(
        &mut self,
        config: &PollerConfig,
        mut requests: mpsc::Receiver<ClientMessage>,
        shutdown: impl Future<Output = ()>,
    ) {
        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut requests_open = true;
        info!(interval_secs = config.interval.as_secs(), "update poller started");

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("update poller stopping");
                    break;
                }
                request = requests.recv(), if requests_open => match request {
                    Some(ClientMessage::CheckUpdate) => {
                        debug!("immediate update check requested");
                        self.check_for_updates().await;
                    }
                    Some(other) => debug!(message = ?other, "ignoring message addressed to pages"),
                    None => requests_open = false,
                },
                _ = ticker.tick() => {
                    self.check_for_updates().await;
                }
            }
        }
    }
}
