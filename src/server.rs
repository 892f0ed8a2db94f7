//! Display surface: aggregate stats and user commands over HTTP

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::session::Command;
use crate::stats::Stats;

/// Handles shared with the session loop
#[derive(Clone)]
pub struct AppState {
    pub commands: mpsc::Sender<Command>,
    pub stats: watch::Receiver<Stats>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/stats", get(stats))
        .route("/hud", get(hud))
        .route("/mode/toggle", post(toggle_mode))
        .route("/fire/{id}", post(fire))
        .route("/cascade", post(cascade_router))
        .route("/cascade/{region}", post(cascade))
        .with_state(state)
}

/// Bind and serve until the process exits
pub async fn serve(port: u16, state: AppState) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "display surface listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn stats(State(state): State<AppState>) -> Json<Stats> {
    Json(state.stats.borrow().clone())
}

/// The stats as plain HUD text
async fn hud(State(state): State<AppState>) -> String {
    state.stats.borrow().to_string()
}

async fn toggle_mode(State(state): State<AppState>) -> StatusCode {
    submit(&state, Command::ToggleMode).await
}

async fn fire(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    submit(&state, Command::Fire(id)).await
}

async fn cascade(State(state): State<AppState>, Path(region): Path<String>) -> StatusCode {
    submit(&state, Command::Cascade(Some(region))).await
}

async fn cascade_router(State(state): State<AppState>) -> StatusCode {
    submit(&state, Command::Cascade(None)).await
}

async fn submit(state: &AppState, command: Command) -> StatusCode {
    debug!(?command, "display command");
    match state.commands.send(command).await {
        Ok(()) => StatusCode::ACCEPTED,
        // Session loop has shut down
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::session::Session;
    use crate::synthetic;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn state() -> (AppState, mpsc::Receiver<Command>, watch::Sender<Stats>) {
        let mut config = Config::default();
        config.seed = Some(3);
        config.live.start_live = false;
        let loaded = synthetic::generate(&mut StdRng::seed_from_u64(3), 2.7);
        let session = Session::new(config, loaded, false);

        let (commands, rx) = mpsc::channel(8);
        let (stats_tx, stats) = watch::channel(session.stats());
        (AppState { commands, stats }, rx, stats_tx)
    }

    #[tokio::test]
    async fn stats_reads_the_latest_published_value() {
        let (state, _rx, stats_tx) = state();
        let Json(first) = stats(State(state.clone())).await;
        assert_eq!(first.nodes, 48);
        assert_eq!(first.regions, 12);

        stats_tx.send_modify(|s| s.total_fires = 9);
        let Json(second) = stats(State(state)).await;
        assert_eq!(second.total_fires, 9);
    }

    #[tokio::test]
    async fn hud_renders_the_latest_stats_as_text() {
        let (state, _rx, stats_tx) = state();
        let text = hud(State(state.clone())).await;
        assert!(text.contains("graph: 48 nodes"), "{text}");

        stats_tx.send_modify(|s| s.total_fires = 9);
        assert!(hud(State(state)).await.contains("9 total"));
    }

    #[tokio::test]
    async fn commands_are_forwarded_to_the_session() {
        let (state, mut rx, _stats) = state();

        assert_eq!(toggle_mode(State(state.clone())).await, StatusCode::ACCEPTED);
        assert_eq!(
            fire(State(state.clone()), Path("hippocampus_2".to_string())).await,
            StatusCode::ACCEPTED
        );
        cascade(State(state.clone()), Path("amygdala".to_string())).await;
        cascade_router(State(state)).await;

        assert_eq!(rx.recv().await, Some(Command::ToggleMode));
        assert_eq!(rx.recv().await, Some(Command::Fire("hippocampus_2".into())));
        assert_eq!(rx.recv().await, Some(Command::Cascade(Some("amygdala".into()))));
        assert_eq!(rx.recv().await, Some(Command::Cascade(None)));
    }

    #[tokio::test]
    async fn closed_session_is_unavailable() {
        let (state, rx, _stats) = state();
        drop(rx);
        assert_eq!(toggle_mode(State(state)).await, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn router_builds_with_state() {
        let (state, _rx, _stats) = state();
        let _ = router(state);
    }
}
