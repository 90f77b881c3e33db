use tokio_util::sync::CancellationToken;

/// Resolves once `SIGINT`/ctrl-c is received, or immediately if `token` is already cancelled.
/// Controllers select against this alongside the work queue's shutdown signal so that graceful
/// shutdown and external cancellation share one code path.
pub async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = token.cancelled() => {},
    }
}
