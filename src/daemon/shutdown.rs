use anyhow::Result;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::tracker::Tracker;

/// Reacts to signals sent to the process until shutdown. Ctrl-c and `SIGTERM` end the daemon,
/// `SIGUSR1` stops tracking and `SIGUSR2` starts it again.
///
/// On Windows detached processes can't detect signals sent to them, so only ctrl-c works there.
pub async fn handle_signals(tracker: &Tracker, cancelation: CancellationToken) -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        let mut pause = signal(SignalKind::user_defined1())?;
        let mut resume = signal(SignalKind::user_defined2())?;
        loop {
            select! {
                _ = cancelation.cancelled() => break,
                _ = tokio::signal::ctrl_c() => {
                    info!("Received ctrl-c, shutting down");
                    cancelation.cancel();
                    break;
                },
                _ = terminate.recv() => {
                    info!("Received SIGTERM, shutting down");
                    cancelation.cancel();
                    break;
                },
                _ = pause.recv() => {
                    tracker.stop();
                },
                _ = resume.recv() => {
                    tracker.start();
                },
            };
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tracker;
        select! {
            _ = cancelation.cancelled() => (),
            _ = tokio::signal::ctrl_c() => {
                info!("Received ctrl-c, shutting down");
                cancelation.cancel();
            },
        };
    }
    Ok(())
}
