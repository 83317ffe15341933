//! Graceful shutdown plumbing (C13, `spec.md` §4.13).

pub use meltdown::TaggedService;

/// Resolves once SIGINT or SIGTERM is observed, or the meltdown token
/// fires first because some other registered service already triggered
/// shutdown. Registered under the `meltdown::Service` blanket impl for
/// `async fn(Token) -> Result<(), E>`, mirroring the teacher's
/// `utils::meltdown::wait_for_shutdown_signals`. Shares `App`'s error
/// type since both are registered on the same [`meltdown::Meltdown`].
pub async fn wait_for_shutdown_signals(
    token: meltdown::Token,
) -> Result<(), crate::app::ServeError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            biased;
            () = token => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            biased;
            () = token => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received ctrl-c");
            }
        }
    }
    Ok(())
}
