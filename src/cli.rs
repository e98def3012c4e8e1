use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "vogelring-updates",
    version,
    about = "Changelog extraction, version manifests and update notifications for the Vogelring web app"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse the Markdown changelog into changelog.json.
    Changelog(ChangelogArgs),
    /// Write version.json for the current build.
    Manifest(ManifestArgs),
    /// Poll version.json and print UPDATE_AVAILABLE notifications.
    Poll(PollArgs),
    /// Run the in-page version state against served artifacts.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ChangelogArgs {
    #[arg(long, default_value = "CHANGELOG.md")]
    pub source: PathBuf,

    #[arg(long, default_value = "public/changelog.json")]
    pub output: PathBuf,

    #[arg(long, default_value = crate::changelog::DEFAULT_LINK_HOST)]
    pub link_host: String,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ManifestArgs {
    #[arg(long, default_value = "public/version.json")]
    pub output: PathBuf,

    #[arg(long, default_value = crate::model::FALLBACK_VERSION)]
    pub base_version: String,

    #[arg(long, default_value = ".")]
    pub repo_dir: PathBuf,

    /// Changelog document whose latest release becomes backendVersion.
    #[arg(long)]
    pub changelog: Option<PathBuf>,

    #[arg(long, default_value = crate::changelog::DEFAULT_LINK_HOST)]
    pub link_host: String,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PollArgs {
    #[arg(long, conflicts_with = "public_dir")]
    pub base_url: Option<String>,

    #[arg(long)]
    pub public_dir: Option<PathBuf>,

    #[arg(long, default_value_t = crate::poller::DEFAULT_POLL_INTERVAL.as_secs())]
    pub interval_secs: u64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ClientAction {
    Status,
    MarkSeen,
    Dismiss,
    Enable,
    Show,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    #[arg(long, conflicts_with = "public_dir")]
    pub base_url: Option<String>,

    #[arg(long)]
    pub public_dir: Option<PathBuf>,

    #[arg(long, default_value = ".cache/vogelring/preferences.sqlite")]
    pub store_path: PathBuf,

    #[arg(long, default_value = crate::model::FALLBACK_VERSION)]
    pub app_version: String,

    #[arg(long, value_enum, default_value_t = ClientAction::Status)]
    pub action: ClientAction,

    #[arg(long, default_value_t = false)]
    pub suppress_future: bool,

    #[arg(long, default_value_t = crate::version_state::DEFAULT_DIALOG_DELAY.as_millis() as u64)]
    pub dialog_delay_ms: u64,

    #[arg(long, default_value_t = false)]
    pub version_info: bool,

    /// Keep running an in-process poller and react to its notifications.
    #[arg(long, default_value_t = false)]
    pub watch: bool,

    #[arg(long, default_value_t = crate::poller::DEFAULT_POLL_INTERVAL.as_secs())]
    pub interval_secs: u64,
}
