use std::io::ErrorKind;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;

use crate::{config::ServeConfig, routes::routes::routes, state::AppState};

/// Bind `cfg` and serve public and signed downloads until the process exits.
pub async fn run(state: AppState, cfg: &ServeConfig) -> Result<()> {
    let app: Router = routes().with_state(state);

    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
