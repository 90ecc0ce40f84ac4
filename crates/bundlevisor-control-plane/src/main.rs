use bundlevisor_control_plane::config::EVENT_CHANNEL_CAPACITY;
use bundlevisor_control_plane::features::transport::controller::read_events;
use bundlevisor_control_plane::features::transport::repo::cursor::CursorStore;
use bundlevisor_control_plane::features::transport::repo::JsonLinesNotifier;
use bundlevisor_control_plane::{ControlLoop, ControlPlaneConfig};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries outbound notifications, so logs go to stderr
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("bundlevisor_control_plane=info,bundlevisor_supervisor=info,info")
            }),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ControlPlaneConfig::from_env()?;
    info!(
        operator_id = config.operator_id,
        data_dir = %config.data_dir().display(),
        "Starting Bundlevisor"
    );

    let cursor = CursorStore::new(config.cursor_path());
    let resume_from = cursor.load().await;
    info!(resume_from, "Loaded resume cursor");

    let notifier = Arc::new(JsonLinesNotifier::stdout());
    let control_loop = ControlLoop::new(config, notifier).await?.with_cursor(cursor);

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let reader = tokio::spawn(async move {
        match read_events(BufReader::new(tokio::io::stdin()), tx, resume_from).await {
            Ok(forwarded) => info!(forwarded, "Inbound stream ended"),
            Err(e) => error!(error = %e, "Inbound reader failed"),
        }
    });

    let run = control_loop.run(rx);
    tokio::pin!(run);

    let mut control_loop = tokio::select! {
        control_loop = &mut run => control_loop,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            reader.abort();
            run.await
        }
    };

    let stopped = control_loop.supervisor_mut().kill_all().await;
    info!(stopped = stopped.len(), "Bundlevisor shut down");
    Ok(())
}
