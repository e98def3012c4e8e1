use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::model::{
    Changelog, ClientMessage, FALLBACK_VERSION, Release, VersionInfo, VersionSnapshot,
};
use crate::source::ArtifactSource;
use crate::storage::{CHANGELOG_DISABLED_KEY, KeyValueStore, LAST_SEEN_VERSION_KEY};


pub const DEFAULT_DIALOG_DELAY: Duration = Duration::from_millis(1000);

const DISABLED_FLAG_VALUE: &str = "true";

#[derive(Debug, Clone)]
pub struct VersionStateConfig {
    pub app_version: String,
    pub dialog_delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageAction {
    Continue,
    Reload,
}

pub struct VersionState<S, K> {
    source: S,
    store: K,
    config: VersionStateConfig,
    current_version: String,
    last_seen_version: Option<String>,
    changelog: Changelog,
    changelog_disabled: bool,
    build_time: Option<String>,
    show_dialog: bool,
    dialog_opens_at: Option<Instant>,
    reload_required: bool,
    initialized: bool,
}

impl<S: ArtifactSource, K: KeyValueStore> VersionState<S, K> {
    pub fn new(source: S, store: K, mut config: VersionStateConfig) -> Self {
        if config.app_version.trim().is_empty() {
            config.app_version = FALLBACK_VERSION.to_string();
        }
        let current_version = config.app_version.clone();

        Self {
            source,
            store,
            config,
            current_version,
            last_seen_version: None,
            changelog: Changelog::default(),
            changelog_disabled: false,
            build_time: None,
            show_dialog: false,
            dialog_opens_at: None,
            reload_required: false,
            initialized: false,
        }
    }

    pub async fn initialize(&mut self) -> PageAction {
        if self.initialized {
            return PageAction::Continue;
        }
        self.initialized = true;

        self.load_persisted();
        self.load_changelog().await;

        if self.check_build().await == PageAction::Reload {
            return PageAction::Reload;
        }

        if self.should_show_changelog() {
            self.dialog_opens_at = Some(Instant::now() + self.config.dialog_delay);
            info!(
                last_seen = self.last_seen_version.as_deref().unwrap_or_default(),
                current = %self.current_version,
                delay_ms = self.config.dialog_delay.as_millis() as u64,
                "scheduled changelog for new version"
            );
        }

        PageAction::Continue
    }

    pub fn dialog_pending(&self) -> bool {
        self.dialog_opens_at.is_some() && !self.show_dialog()
    }

    pub async fn open_pending_dialog(&mut self) {
        let Some(opens_at) = self.dialog_opens_at.take() else {
            return;
        };
        tokio::time::sleep_until(opens_at).await;
        self.show_dialog = true;
    }

    fn load_persisted(&mut self) {
        match self.store.get(LAST_SEEN_VERSION_KEY) {
            Ok(value) => self.last_seen_version = value,
            Err(err) => warn!(error = %format!("{err:#}"), "failed to load last seen version"),
        }

        match self.store.get(CHANGELOG_DISABLED_KEY) {
            Ok(value) => self.changelog_disabled = value.as_deref() == Some(DISABLED_FLAG_VALUE),
            Err(err) => warn!(error = %format!("{err:#}"), "failed to load changelog preference"),
        }
    }

    async fn load_changelog(&mut self) {
        match self.source.fetch_changelog().await {
            Ok(changelog) => {
                if let Some(latest) = changelog.latest_release() {
                    self.current_version = latest.version.clone();
                }
                debug!(releases = changelog.releases.len(), "loaded changelog");
                self.changelog = changelog;
            }
            Err(err) => warn!(error = %format!("{err:#}"), "failed to load changelog"),
        }
    }

    pub async fn check_build(&mut self) -> PageAction {
        let manifest = match self.source.fetch_manifest().await {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed to load version manifest");
                return PageAction::Continue;
            }
        };

        let previous = self.build_time.replace(manifest.build_time);
        match (previous, self.build_time.as_deref()) {
            (Some(previous), Some(current)) if previous != current => {
                info!(previous = %previous, current = %current, "build changed, reload required");
                self.reload_required = true;
                PageAction::Reload
            }
            _ => PageAction::Continue,
        }
    }

    pub async fn handle_message(&mut self, message: &ClientMessage) -> PageAction {
        match message {
            ClientMessage::UpdateAvailable { version } => {
                info!(version = %version, "update notification received");
                self.check_build().await
            }
            ClientMessage::CheckUpdate => PageAction::Continue,
        }
    }

    pub fn has_new_version(&self) -> bool {
        self.last_seen_version
            .as_deref()
            .is_some_and(|last_seen| last_seen != self.current_version)
    }

    pub fn should_show_changelog(&self) -> bool {
        self.has_new_version() && !self.changelog_disabled && !self.changelog.is_empty()
    }

    pub fn mark_version_as_seen(&mut self, suppress_future: bool) {
        if let Err(err) = self.store.set(LAST_SEEN_VERSION_KEY, &self.current_version) {
            warn!(error = %format!("{err:#}"), "failed to persist last seen version");
        }
        self.last_seen_version = Some(self.current_version.clone());

        if suppress_future {
            if let Err(err) = self.store.set(CHANGELOG_DISABLED_KEY, DISABLED_FLAG_VALUE) {
                warn!(error = %format!("{err:#}"), "failed to persist changelog preference");
            }
            self.changelog_disabled = true;
        }

        self.close_dialog();
    }

    pub fn dismiss_changelog(&mut self) {
        self.close_dialog();
    }

    fn close_dialog(&mut self) {
        self.show_dialog = false;
        self.dialog_opens_at = None;
    }

    pub fn enable_changelog(&mut self) {
        if let Err(err) = self.store.remove(CHANGELOG_DISABLED_KEY) {
            warn!(error = %format!("{err:#}"), "failed to clear changelog preference");
        }
        self.changelog_disabled = false;
    }

    pub fn show_changelog(&mut self) {
        self.show_dialog = true;
        self.dialog_opens_at = None;
    }

    pub fn version_info(&self) -> VersionInfo {
        VersionInfo {
            app: self.config.app_version.clone(),
            backend: self.current_version.clone(),
            has_update: self.has_new_version(),
        }
    }

    pub fn latest_release(&self) -> Option<&Release> {
        self.changelog.latest_release()
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    pub fn show_dialog(&self) -> bool {
        self.show_dialog
            || self
                .dialog_opens_at
                .is_some_and(|opens_at| Instant::now() >= opens_at)
    }

    pub fn snapshot(&self) -> VersionSnapshot {
        VersionSnapshot {
            current_version: self.current_version.clone(),
            last_seen_version: self.last_seen_version.clone(),
            changelog_disabled: self.changelog_disabled,
            build_time: self.build_time.clone(),
            show_dialog: self.show_dialog(),
            should_show_changelog: self.should_show_changelog(),
            reload_required: self.reload_required,
            latest_release: self.latest_release().cloned(),
        }
    }
}
