//! # Health Check Module
//!
//! Minimal HTTP responder for the hosting platform's port check. Every
//! request on the port gets `200 OK` with a fixed body. It runs on its own
//! OS thread with its own runtime, so a slow portal never delays it.

use std::io;
use std::net::SocketAddr;
use std::thread::JoinHandle;

use axum::http::StatusCode;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Body returned to every health check
pub const HEALTH_BODY: &str = "Admit card bot is running";

/// Handle to the running health check server
pub struct HealthServer {
    local_addr: SocketAddr,
    _thread: JoinHandle<()>,
}

impl HealthServer {
    /// Bind `addr` and start answering on a dedicated thread.
    ///
    /// Binding happens on the calling thread, so a taken port is reported here.
    pub fn start(addr: SocketAddr) -> io::Result<Self> {
        let listener = std::net::TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let thread = std::thread::Builder::new()
            .name("health-check".to_string())
            .spawn(move || serve(listener))?;

        info!(addr = %local_addr, "Health check server started");
        Ok(Self {
            local_addr,
            _thread: thread,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Any path, any method
pub fn router() -> Router {
    Router::new().fallback(healthz)
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, HEALTH_BODY)
}

fn serve(listener: std::net::TcpListener) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to build health check runtime");
            return;
        }
    };

    runtime.block_on(async move {
        let listener = match TcpListener::from_std(listener) {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, "Failed to register health check listener");
                return;
            }
        };

        if let Err(e) = axum::serve(listener, router()).await {
            error!(error = %e, "Health check server stopped");
        }
    });
}
