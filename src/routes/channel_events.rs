use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures::Stream;

use crate::auth::CurrentUser;
use crate::response::AppError;
use crate::services::channel_hub::ChannelEvent;
use crate::state::AppState;
use crate::validation::is_valid_channel_name;

pub fn router() -> Router<AppState> {
    Router::new().route("/:channel/events", get(channel_events))
}

/// Leaves the channel when the viewer's stream is dropped.
struct MembershipGuard {
    state: AppState,
    channel: String,
    member_id: u64,
}

impl Drop for MembershipGuard {
    fn drop(&mut self) {
        self.state.hub().leave(&self.channel, self.member_id);
    }
}

fn hub_event(name: &str, data: serde_json::Value) -> Option<Event> {
    serde_json::to_string(&data)
        .ok()
        .map(|json| Event::default().event(name).data(json))
}

/// Viewer connection to a channel. The stream ends when the viewer is kicked
/// or the server shuts down.
pub async fn channel_events(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(channel): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    if !is_valid_channel_name(&channel) {
        return Err(AppError::not_found("Channel does not exist"));
    }

    let registered = state.store().find_channel(&channel)?.is_some();
    let member = user
        .map(|u| u.name)
        .unwrap_or_else(|| "anonymous".to_string());
    let membership = state.hub().join(&channel, &member, registered);
    let registered = state
        .hub()
        .snapshot(&membership.channel)
        .map_or(registered, |s| s.registered);
    let mut shutdown_rx = state.shutdown_rx();

    let mut events = membership.events;
    let channel = membership.channel;
    // 流在首次轮询前被丢弃时也要退出频道
    let guard = MembershipGuard {
        state: state.clone(),
        channel: channel.clone(),
        member_id: membership.id,
    };

    let stream = async_stream::stream! {
        let _guard = guard;

        if let Some(event) = hub_event(
            "joined",
            serde_json::json!({ "channel": channel, "registered": registered }),
        ) {
            yield Ok(event);
        }

        loop {
            tokio::select! {
                received = events.recv() => {
                    match received {
                        Some(ChannelEvent::Kicked { reason }) => {
                            if let Some(event) = hub_event("kicked", serde_json::json!({ "reason": reason })) {
                                yield Ok(event);
                            }
                            break;
                        }
                        None => break,
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    ))
}
