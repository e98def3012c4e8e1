use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cli::{ClientAction, ClientArgs};
use crate::commands::poll::shutdown_signal;
use crate::model::ClientMessage;
use crate::poller::{PollerConfig, UpdatePoller};
use crate::source::{ArtifactEndpoint, ArtifactSource};
use crate::storage::{KeyValueStore, MemoryStore, SqliteStore};
use crate::util::print_json_line;
use crate::version_state::{PageAction, VersionState, VersionStateConfig};

pub fn run(args: ClientArgs) -> Result<()> {
    let source = resolve_source(&args)?;
    let store = open_store(&args);
    let config = VersionStateConfig {
        app_version: args.app_version.clone(),
        dialog_delay: Duration::from_millis(args.dialog_delay_ms),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;

    runtime.block_on(async move {
        let mut state = VersionState::new(source, store, config);

        let mut action = state.initialize().await;
        info!(
            current = state.current_version(),
            show_dialog = state.show_dialog(),
            dialog_pending = state.dialog_pending(),
            "version state initialized"
        );

        match args.action {
            ClientAction::Status => state.open_pending_dialog().await,
            ClientAction::MarkSeen => state.mark_version_as_seen(args.suppress_future),
            ClientAction::Dismiss => state.dismiss_changelog(),
            ClientAction::Enable => state.enable_changelog(),
            ClientAction::Show => state.show_changelog(),
        }

        if args.watch && action == PageAction::Continue {
            print_json_line(&state.snapshot())?;
            action = watch_for_updates(&mut state, &args).await?;
        }

        if action == PageAction::Reload {
            info!("served build changed, page reload required");
        }

        if args.version_info {
            print_json_line(&state.version_info())
        } else {
            print_json_line(&state.snapshot())
        }
    })
}

fn resolve_source(args: &ClientArgs) -> Result<ArtifactEndpoint> {
    ArtifactEndpoint::resolve(args.base_url.as_deref(), args.public_dir.as_deref())
}

fn open_store(args: &ClientArgs) -> Box<dyn KeyValueStore> {
    match SqliteStore::open(&args.store_path) {
        Ok(store) => Box::new(store),
        Err(err) => {
            warn!(
                path = %args.store_path.display(),
                error = %format!("{err:#}"),
                "durable store unavailable, preferences will not persist"
            );
            Box::new(MemoryStore::default())
        }
    }
}

async fn watch_for_updates<S, K>(
    state: &mut VersionState<S, K>,
    args: &ClientArgs,
) -> Result<PageAction>
where
    S: ArtifactSource,
    K: KeyValueStore,
{
    let mut poller = UpdatePoller::new(resolve_source(args)?);
    let updates = poller.subscribe();
    let (_request_tx, request_rx) = mpsc::channel::<ClientMessage>(1);
    let config = PollerConfig {
        interval: Duration::from_secs(args.interval_secs.max(1)),
    };

    tokio::select! {
        _ = poller.run(&config, request_rx, shutdown_signal()) => Ok(PageAction::Continue),
        action = follow_notifications(state, updates) => action,
    }
}

async fn follow_notifications<S, K>(
    state: &mut VersionState<S, K>,
    mut updates: broadcast::Receiver<ClientMessage>,
) -> Result<PageAction>
where
    S: ArtifactSource,
    K: KeyValueStore,
{
    loop {
        match updates.recv().await {
            Ok(message) => {
                print_json_line(&message)?;
                if state.handle_message(&message).await == PageAction::Reload {
                    return Ok(PageAction::Reload);
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "missed update notifications"),
            Err(RecvError::Closed) => return Ok(PageAction::Continue),
        }
    }
}
