//! SSE egress (spec §4.5): `event: <name>\ndata: <payload>\n\n`.

use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use super::StreamEvent;

fn to_sse_event(event: StreamEvent) -> Event {
    match event {
        StreamEvent::Sources { sources } => Event::default()
            .event("sources")
            .data(serde_json::to_string(&sources).unwrap_or_default()),
        StreamEvent::Cached { matched_question, similarity } => Event::default().event("cached").data(
            serde_json::json!({ "cached": true, "matched_question": matched_question, "similarity": similarity })
                .to_string(),
        ),
        StreamEvent::Content { content } => Event::default().event("content").data(content),
        StreamEvent::Error { error } => Event::default().event("error").data(error),
        StreamEvent::Done => Event::default().event("done").data(""),
    }
}

/// Wrap a broker receiver as an axum SSE response. One-shot streams (the
/// `/api/stream/*` endpoints) get no heartbeat, per spec §4.5.
pub fn into_response(
    rx: mpsc::Receiver<StreamEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = ReceiverStream::new(rx).map(|event| Ok(to_sse_event(event)));
    Sse::new(stream)
}

/// Same as [`into_response`] but with a keep-alive heartbeat, for long-lived
/// channels such as the MCP SSE back-channel (spec §4.5, §4.6).
pub fn into_response_with_heartbeat(
    rx: mpsc::Receiver<StreamEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = ReceiverStream::new(rx).map(|event| Ok(to_sse_event(event)));
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text(format!(": heartbeat {}\n", chrono::Utc::now().timestamp())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_event_builds_without_panicking() {
        let _event = to_sse_event(StreamEvent::Sources { sources: vec![] });
        let _event = to_sse_event(StreamEvent::Done);
    }
}
