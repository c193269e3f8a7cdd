use std::{net::SocketAddr, sync::Arc};

use {
    axum::{Json, Router, extract::State, http::StatusCode, routing::post},
    tracing::{debug, info},
};

use {
    consult_channels::{ChannelTransport, InboundMessage},
    consult_router::MessageRouter,
};

/// Shared handles for the inbound endpoint.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<MessageRouter>,
    pub transport: Arc<dyn ChannelTransport>,
}

/// Build the relay's HTTP application.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/inbound", post(inbound))
        .with_state(state)
}

/// Bind and serve until the listener fails or the task is cancelled.
pub async fn serve(bind: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, "webhook listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Accept one inbound event. The event is acknowledged with 202 right away
/// and routed on a background task; the bridge retries on its own schedule
/// and must never be held open across a backend round-trip.
async fn inbound(
    State(state): State<AppState>,
    Json(message): Json<InboundMessage>,
) -> StatusCode {
    debug!(from = %message.from, has_media = message.media.is_some(), "inbound event");
    tokio::spawn(async move {
        state.router.handle(state.transport.as_ref(), &message).await;
    });
    StatusCode::ACCEPTED
}
