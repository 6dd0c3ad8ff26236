//! Message routing handlers.
//!
//! Messages are relayed as `message.routed` events only. Nothing is stored,
//! so the listing endpoint always answers with an empty list.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use tracing::info;

use taskmesh_core::api::{Message, MessageRequest, MessageResponse};
use taskmesh_core::{CoreError, Event, EventId, EventType};

use crate::http::responses::{ok, ApiError, ApiResult};
use crate::state::AppState;

/// `GET /api/v1/messages`. Always empty; delivered messages live only in the
/// event stream.
pub async fn list_messages() -> ApiResult<Vec<Message>> {
    ok(Vec::new())
}

pub async fn route_message(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<MessageRequest>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    let Json(msg) = payload?;
    for (field, value) in [("from", &msg.from), ("to", &msg.to), ("body", &msg.body)] {
        if value.trim().is_empty() {
            return Err(CoreError::MissingField(field).into());
        }
    }

    let id = EventId::generate();
    let message = Message::new(id.as_str(), msg);
    let data = serde_json::to_value(&message).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let mut event = Event::new(EventType::MessageRouted)
        .with_agent(message.to.clone())
        .with_data(data);
    event.id = Some(id.clone());
    if let Some(repo) = message.repo.clone() {
        event = event.with_repo(repo);
    }

    let delivered = state.events.publish(event);
    info!(message_id = %id, from = %message.from, to = %message.to, delivered, "Message routed");
    ok(MessageResponse {
        id: id.into_inner(),
        routed: true,
    })
}
