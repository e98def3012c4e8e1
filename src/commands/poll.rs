use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::cli::PollArgs;
use crate::model::ClientMessage;
use crate::poller::{PollerConfig, UpdatePoller};
use crate::source::ArtifactEndpoint;
use crate::util::print_json_line;

const REQUEST_QUEUE_CAPACITY: usize = 8;

pub fn run(args: PollArgs) -> Result<()> {
    let source = ArtifactEndpoint::resolve(args.base_url.as_deref(), args.public_dir.as_deref())?;
    let config = PollerConfig {
        interval: Duration::from_secs(args.interval_secs.max(1)),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;

    runtime.block_on(async move {
        info!(manifest = %source.describe(), "watching for app updates");

        let mut poller = UpdatePoller::new(source);
        let listener = tokio::spawn(print_notifications(poller.subscribe()));

        let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
        let requests = tokio::spawn(forward_stdin_requests(request_tx));

        poller.run(&config, request_rx, shutdown_signal()).await;

        requests.abort();
        info!(
            version = poller.last_known_version().unwrap_or("-"),
            "update poller stopped"
        );
        drop(poller);
        if let Err(err) = listener.await {
            warn!(error = %err, "notification listener ended abnormally");
        }
    });

    runtime.shutdown_background();

    Ok(())
}

async fn print_notifications(mut updates: broadcast::Receiver<ClientMessage>) {
    loop {
        match updates.recv().await {
            Ok(message) => {
                if let Err(err) = print_json_line(&message) {
                    warn!(error = %format!("{err:#}"), "failed to emit notification");
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "notification listener fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn forward_stdin_requests(requests: mpsc::Sender<ClientMessage>) {
    forward_requests(tokio::io::stdin(), requests).await;
}

async fn forward_requests<R>(input: R, requests: mpsc::Sender<ClientMessage>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(input).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "failed to read update requests");
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<ClientMessage>(trimmed) {
            Ok(message) => {
                if requests.send(message).await.is_err() {
                    break;
                }
            }
            Err(err) => warn!(error = %err, line = trimmed, "ignoring malformed request"),
        }
    }
}

pub(crate) async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c, running until killed");
        std::future::pending::<()>().await;
    }
}
