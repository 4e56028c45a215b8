//! HTTP accept loop with connection idle timeout

use anyhow::Result;
use axum::Router;
use axum::extract::Request;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::Service;
use tracing::{debug, info, warn};

fn connection_builder(idle_timeout: Duration) -> http1::Builder {
    let mut builder = http1::Builder::new();
    // Covers both a slow first request head and a kept-alive connection
    // waiting for its next request.
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(idle_timeout);
    builder
}

/// Serve `app` until `shutdown` resolves, then drain open connections
pub async fn serve<F>(
    listener: TcpListener,
    app: Router,
    idle_timeout: Duration,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send,
{
    let (signal_tx, signal_rx) = watch::channel(());
    let (close_tx, close_rx) = watch::channel(());
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            },
            _ = &mut shutdown => break,
        };

        let service = app.clone();
        let mut signal_rx = signal_rx.clone();
        let close_rx = close_rx.clone();

        tokio::spawn(async move {
            let hyper_service = hyper::service::service_fn(move |request: Request<Incoming>| {
                service.clone().call(request)
            });
            let builder = connection_builder(idle_timeout);
            let conn = builder
                .serve_connection(TokioIo::new(stream), hyper_service)
                .with_upgrades();
            tokio::pin!(conn);

            let mut draining = false;
            loop {
                tokio::select! {
                    result = conn.as_mut() => {
                        if let Err(e) = result {
                            debug!("Connection from {} closed: {}", peer, e);
                        }
                        break;
                    }
                    _ = signal_rx.changed(), if !draining => {
                        draining = true;
                        conn.as_mut().graceful_shutdown();
                    }
                }
            }

            drop(close_rx);
        });
    }

    drop(listener);
    info!("Draining open connections");
    let _ = signal_tx.send(());
    drop(close_rx);
    close_tx.closed().await;

    Ok(())
}
