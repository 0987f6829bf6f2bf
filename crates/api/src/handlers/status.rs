//! Live node status as Server-Sent Events.
//!
//! Each SSE event is named after the status channel (for example
//! `http-request-execution`) and carries the JSON-encoded `StatusEvent`.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use super::AppState;
use nodes::StatusEvent;

/// `GET /api/v1/status/stream`
pub async fn stream(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.status.subscribe();
    Sse::new(events(rx)).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

/// Adapt a broadcast receiver into SSE frames. A lagging subscriber skips
/// what it missed; the stream ends when the publisher is dropped.
fn events(rx: broadcast::Receiver<StatusEvent>) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let frame = match Event::default().event(event.channel.name()).json_data(&event) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(error = %e, "could not encode status event");
                            continue;
                        }
                    };
                    return Some((Ok(frame), rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "status stream subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}
