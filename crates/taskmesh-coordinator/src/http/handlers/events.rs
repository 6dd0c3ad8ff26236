//! Server-Sent Events stream of coordination events.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
};
use chrono::Utc;
use futures_util::stream::{self, Stream, StreamExt};
use tracing::{debug, warn};

use taskmesh_core::{Event, EventId, EventType};

use crate::events::Subscription;
use crate::state::AppState;

/// `GET /api/v1/events/stream`
///
/// Sends a `connected` sentinel first, then every published event as
/// `event: <type>` / `data: <json>`. The subscription lives exactly as long
/// as the response stream; the stream ends when the server shuts down.
pub async fn event_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let subscription = state.events.subscribe();
    let subscriber_id = subscription.id();
    debug!(subscriber = subscriber_id, "Event stream opened");

    let mut connected = Event::new(EventType::Connected)
        .with_data(serde_json::json!({ "subscriber_id": subscriber_id }));
    connected.id = Some(EventId::generate());
    connected.timestamp = Some(Utc::now());

    let initial = stream::once(async move { Ok::<_, Infallible>(to_sse(&connected)) });
    let events = stream::unfold(subscription, |mut sub: Subscription| async move {
        let event = sub.recv().await?;
        Some((Ok(to_sse(&event)), sub))
    });

    let stream = initial
        .chain(events)
        .take_until(state.shutdown.clone().cancelled_owned());

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_sse(event: &Event) -> SseEvent {
    let sse = SseEvent::default().event(event.event_type.as_str());
    let sse = match &event.id {
        Some(id) => sse.id(id.as_str()),
        None => sse,
    };
    sse.json_data(event).unwrap_or_else(|e| {
        warn!(event_type = %event.event_type, error = %e, "Failed to encode event");
        SseEvent::default().comment("encode error")
    })
}
