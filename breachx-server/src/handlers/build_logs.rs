//! Build log streaming over a push socket or an event stream.

use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{
        Response, Sse,
        sse::{Event, KeepAlive},
    },
};
use breachx_core::streaming::{
    EventStreamTransport, LogTransport, SocketTransport, SseFrame,
    StreamOutcome,
};
use breachx_model::{BuildId, LogRecord, SocketCommand};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildLogQuery {
    #[serde(default)]
    pub build_id: Option<String>,
}

fn parse_build_id(raw: Option<&str>) -> Option<BuildId> {
    raw.and_then(|raw| BuildId::new(raw.trim()).ok())
}

fn spawn_build_stream(
    state: &AppState,
    build_id: BuildId,
    transport: Arc<dyn LogTransport>,
) -> JoinHandle<StreamOutcome> {
    let producer = Arc::clone(&state.build_logs);
    tokio::spawn(async move { producer.stream(&build_id, transport).await })
}

pub async fn build_logs_socket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<BuildLogQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_build_log_socket(socket, state, query.build_id))
}

/// Stream immediately when the build was named in the query, otherwise
/// wait for a `subscribe-to-build` message.
async fn handle_build_log_socket(
    socket: WebSocket,
    state: AppState,
    requested: Option<String>,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (transport, mut rx) = SocketTransport::new();
    let transport = Arc::new(transport);
    let closed = transport.closed();

    let writer_closed = closed.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                text = rx.recv() => match text {
                    Some(text) => {
                        if ws_sender.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                _ = writer_closed.cancelled() => {
                    while let Ok(text) = rx.try_recv() {
                        if ws_sender.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    break;
                }
            }
        }
        let _ = ws_sender.send(Message::Close(None)).await;
    });

    let mut streaming = requested
        .as_deref()
        .and_then(|raw| parse_build_id(Some(raw)))
        .map(|build_id| spawn_build_stream(&state, build_id, transport.clone()));

    loop {
        let message = tokio::select! {
            _ = closed.cancelled() => break,
            message = ws_receiver.next() => message,
        };
        match message {
            Some(Ok(Message::Text(text))) => {
                match serde_json::from_str::<SocketCommand>(text.as_str()) {
                    Ok(SocketCommand::SubscribeToBuild { build_id }) => {
                        if streaming.is_some() {
                            debug!("ignoring subscribe on an active build stream");
                            continue;
                        }
                        match parse_build_id(build_id.as_deref()) {
                            Some(build_id) => {
                                streaming = Some(spawn_build_stream(
                                    &state,
                                    build_id,
                                    transport.clone(),
                                ));
                            }
                            None => {
                                transport.send_record(LogRecord::error(
                                    "No buildId provided",
                                ));
                                transport.close();
                            }
                        }
                    }
                    Err(err) => debug!("ignoring socket message: {err}"),
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(err)) => {
                debug!("build log socket error: {err}");
                break;
            }
            Some(Ok(_)) => {}
        }
    }

    // Client gone or stream finished; either way stop the producer.
    closed.cancel();
    if let Some(task) = streaming {
        match task.await {
            Ok(outcome) => info!(?outcome, "build log socket finished"),
            Err(err) => debug!("build log task failed: {err}"),
        }
    }
    let _ = writer.await;
}

pub async fn build_logs_sse_handler(
    State(state): State<AppState>,
    Query(query): Query<BuildLogQuery>,
) -> AppResult<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>> {
    let build_id = parse_build_id(query.build_id.as_deref())
        .ok_or_else(|| AppError::bad_request("No buildId provided"))?;

    let (transport, rx) = EventStreamTransport::new();
    let guard = transport.closed().drop_guard();
    spawn_build_stream(&state, build_id, Arc::new(transport));

    Ok(Sse::new(frame_stream(rx, guard)).keep_alive(default_keep_alive()))
}

/// Forward transport frames until every sender is gone. Dropping the
/// stream cancels the transport through `guard`.
pub(crate) fn frame_stream(
    mut rx: tokio::sync::mpsc::UnboundedReceiver<SseFrame>,
    guard: tokio_util::sync::DropGuard,
) -> impl tokio_stream::Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let _guard = guard;
        while let Some(frame) = rx.recv().await {
            yield Ok::<Event, Infallible>(to_event(frame));
        }
    }
}

fn to_event(frame: SseFrame) -> Event {
    let event = Event::default().data(frame.data);
    match frame.event {
        Some(name) => event.event(name),
        None => event,
    }
}

pub(crate) fn default_keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(15))
        .text("keep-alive")
}
