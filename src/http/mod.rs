//! Debug HTTP server surfaced only in debug feature builds.
//!
//! Spawns a lightweight Axum server exposing session health, telemetry
//! metrics, and SSE streams of analysis results and emergencies.

#[cfg(all(feature = "debug_http", debug_assertions))]
mod routes;
#[cfg(all(feature = "debug_http", debug_assertions))]
mod sse;

use std::sync::Arc;

use crate::session::StreamingSession;

#[cfg(all(feature = "debug_http", debug_assertions))]
use routes::{run_http_server, DebugHttpState};

#[cfg(all(feature = "debug_http", debug_assertions))]
use log::{error, info, warn};
#[cfg(all(feature = "debug_http", debug_assertions))]
use std::net::SocketAddr;
#[cfg(all(feature = "debug_http", debug_assertions))]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(all(feature = "debug_http", debug_assertions))]
use std::thread;

#[cfg(all(feature = "debug_http", debug_assertions))]
static SERVER_STARTED: AtomicBool = AtomicBool::new(false);

/// Spawn the debug HTTP server only when the feature flag and debug builds are enabled.
#[cfg(all(feature = "debug_http", debug_assertions))]
pub fn spawn_if_enabled(session: Arc<StreamingSession>) {
    if SERVER_STARTED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        warn!("[DebugHttp] Server already running");
        return;
    }

    let addr: SocketAddr = std::env::var("GUARDIAN_DEBUG_HTTP_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8788".to_string())
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8788)));

    let token = std::env::var("GUARDIAN_DEBUG_TOKEN")
        .unwrap_or_else(|_| "guardian-debug".to_string());
    let preview = token.chars().take(4).collect::<String>();

    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                error!("[DebugHttp] Failed to build runtime: {}", err);
                SERVER_STARTED.store(false, Ordering::SeqCst);
                return;
            }
        };

        info!(
            "[DebugHttp] Binding {} (token prefix {}***)",
            addr, preview
        );

        runtime.block_on(async move {
            let state = DebugHttpState::new(session, token);
            if let Err(err) = run_http_server(state, addr).await {
                error!("[DebugHttp] Server stopped: {}", err);
            }
        });
    });
}

/// Debug HTTP server disabled in this build.
#[cfg(not(all(feature = "debug_http", debug_assertions)))]
pub fn spawn_if_enabled(_session: Arc<StreamingSession>) {}

#[cfg(all(test, not(all(feature = "debug_http", debug_assertions))))]
mod tests {
    use super::*;
    use crate::capture::SyntheticCamera;
    use crate::config::AppConfig;
    use crate::testing::ScriptedTransport;

    #[test]
    fn disabled_build_leaves_session_untouched() {
        let session = Arc::new(
            StreamingSession::new(
                AppConfig::default(),
                Arc::new(ScriptedTransport::new()),
                Arc::new(SyntheticCamera::new("synthetic")),
            )
            .unwrap(),
        );
        spawn_if_enabled(Arc::clone(&session));
        assert_eq!(Arc::strong_count(&session), 1);
        assert!(session.is_live());
    }
}
