//! Axum routes and handlers for job submission.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use tokio::sync::mpsc::Sender;
use uuid::Uuid;

use super::models::{
    LengthRequest, LengthResponse, PrintRequest, PrintResponse, StopResponse,
};
use super::plotter_channel::PlotterRequest;

pub type AppState = Sender<PlotterRequest>;

/// Creates the router with all the API endpoints.
pub fn create_router(plotter_tx: AppState) -> Router {
    Router::new()
        .route("/api/v1/print", post(submit_print))
        .route("/api/v1/stop", post(stop))
        .route("/api/v1/config", get(get_config))
        .route("/api/v1/length", post(path_length))
        .with_state(plotter_tx)
}

/// Appends a path to the print queue and starts a drain if none runs.
async fn submit_print(
    State(plotter_tx): State<AppState>,
    Json(payload): Json<PrintRequest>,
) -> Result<Json<PrintResponse>, StatusCode> {
    let job = Uuid::new_v4();
    let (resp_tx, resp_rx) = tokio::sync::oneshot::channel();
    if plotter_tx
        .send(PlotterRequest::SubmitPath {
            points: payload.path,
            respond_to: resp_tx,
        })
        .await
        .is_err()
    {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    match resp_rx.await {
        Ok(queued) => {
            tracing::info!(%job, queued, "print job accepted");
            Ok(Json(PrintResponse {
                job: job.to_string(),
                queued,
            }))
        }
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Empties the pending queue. The in-flight point still completes.
async fn stop(State(plotter_tx): State<AppState>) -> Result<Json<StopResponse>, StatusCode> {
    let (resp_tx, resp_rx) = tokio::sync::oneshot::channel();
    if plotter_tx
        .send(PlotterRequest::Stop { respond_to: resp_tx })
        .await
        .is_err()
    {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    match resp_rx.await {
        Ok(dropped) => Ok(Json(StopResponse { dropped })),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Read-only view of the plotter profile.
async fn get_config(
    State(plotter_tx): State<AppState>,
) -> Result<Json<crate::config::PlotterConfig>, StatusCode> {
    let (resp_tx, resp_rx) = tokio::sync::oneshot::channel();
    if plotter_tx
        .send(PlotterRequest::GetConfig { respond_to: resp_tx })
        .await
        .is_err()
    {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    match resp_rx.await {
        Ok(config) => Ok(Json(config)),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Pen-down travel length of a path, in millimeters. Pure computation;
/// no plotter round-trip.
async fn path_length(Json(payload): Json<LengthRequest>) -> Json<LengthResponse> {
    let mut length = 0.0;
    for pair in payload.path.windows(2) {
        if pair[1].pen {
            let dx = pair[1].x - pair[0].x;
            let dy = pair[1].y - pair[0].y;
            length += (dx * dx + dy * dy).sqrt();
        }
    }
    Json(LengthResponse { length })
}
