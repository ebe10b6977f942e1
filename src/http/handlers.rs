//! Request Handlers

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query as QueryParams, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use super::{AppState, MSEED_CONTENT_TYPE};
use crate::error::{Result, SeisError};
use crate::merge::{PreparedQuery, Query, StreamSummary};

/// Size of the pipe between the merge stream and the response body
const PIPE_CAPACITY: usize = 64 * 1024;

pub(super) async fn query_get(
    State(state): State<Arc<AppState>>,
    QueryParams(params): QueryParams<Vec<(String, String)>>,
) -> Response {
    let parsed = Query::from_params(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    match parsed {
        Ok(query) => serve(state, query).await,
        Err(e) => error_response(&e),
    }
}

pub(super) async fn query_post(State(state): State<Arc<AppState>>, body: String) -> Response {
    match Query::parse_post(&body) {
        Ok(query) => serve(state, query).await,
        Err(e) => error_response(&e),
    }
}

pub(super) async fn health(State(state): State<Arc<AppState>>) -> Response {
    let identities = state.engine.nrt().identities().len();
    let idle = state.engine.fetcher().idle_workers();
    format!("ok\nnrt_identities={}\nidle_workers={}\n", identities, idle).into_response()
}

/// HTTP status for an error raised before the response is committed
pub fn status_for(error: &SeisError) -> StatusCode {
    match error.root() {
        SeisError::BadRequest(_) | SeisError::InvalidPattern { .. } => StatusCode::BAD_REQUEST,
        SeisError::CapacityExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        SeisError::NoData | SeisError::NotFound(_) => StatusCode::NO_CONTENT,
        SeisError::Cancelled => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: &SeisError) -> Response {
    let status = status_for(error);
    if status == StatusCode::NO_CONTENT {
        return status.into_response();
    }
    if status.is_server_error() {
        tracing::error!(error = %error, "request failed");
    } else {
        tracing::debug!(error = %error, %status, "request rejected");
    }
    (status, format!("Error {}: {}\n", status.as_u16(), error)).into_response()
}

async fn serve(state: Arc<AppState>, query: Query) -> Response {
    // Step 1: pre-flight, every failure here still picks its own status
    let prepared = match state.engine.prepare(&query).await {
        Ok(prepared) => prepared,
        Err(e) => return error_response(&e),
    };

    // Step 2: deadline
    let cancel = CancellationToken::new();
    spawn_deadline(cancel.clone(), state.request_timeout);

    // Step 3: stream into the pipe from its own task
    let (reader, done) = spawn_stream(Arc::clone(&state), prepared, cancel);
    let mut body = ReaderStream::new(reader);

    // Step 4: commit the status only once there is something to send
    match body.next().await {
        Some(Ok(first)) => {
            let rest = futures::stream::once(async move { Ok::<Bytes, std::io::Error>(first) })
                .chain(body);
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, MSEED_CONTENT_TYPE)],
                Body::from_stream(rest),
            )
                .into_response()
        }
        Some(Err(e)) => error_response(&SeisError::Io(e)),
        None => match done.await {
            Ok(Err(e)) => error_response(&e),
            _ => StatusCode::NO_CONTENT.into_response(),
        },
    }
}

fn spawn_deadline(cancel: CancellationToken, timeout: std::time::Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(?timeout, "request deadline reached");
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    });
}

fn spawn_stream(
    state: Arc<AppState>,
    prepared: PreparedQuery,
    cancel: CancellationToken,
) -> (tokio::io::DuplexStream, oneshot::Receiver<Result<StreamSummary>>) {
    let (mut writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(async move {
        let result = prepared
            .stream(&state.engine, &mut writer, cancel.clone())
            .await;
        match &result {
            Ok(summary) => tracing::info!(
                bytes = summary.bytes,
                records = summary.records,
                duplicates = summary.duplicates_skipped,
                failed_files = summary.files_failed,
                "query served"
            ),
            Err(e) => tracing::error!(error = %e, "stream ended early, response truncated"),
        }
        // Ends the deadline task too
        cancel.cancel();
        let _ = writer.shutdown().await;
        drop(writer);
        let _ = done_tx.send(result);
    });

    (reader, done_rx)
}
