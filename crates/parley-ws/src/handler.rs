use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use parley_core::chat;
use parley_core::error::ChatError;
use parley_core::AppState;
use parley_models::gateway::*;
use parley_models::ListingKind;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::OnceLock;
use tokio::time::Duration;

use crate::session::Session;

const WS_MAX_GLOBAL_CONNECTIONS_DEFAULT: usize = 2_000;
const WS_MAX_MESSAGES_PER_MINUTE_DEFAULT: u32 = 240;
const WS_MAX_READS_PER_MINUTE_DEFAULT: u32 = 120;

static ACTIVE_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

#[derive(Clone, Copy)]
struct WsLimits {
    max_global_connections: usize,
    max_messages_per_minute: u32,
    max_reads_per_minute: u32,
}

static WS_LIMITS: OnceLock<WsLimits> = OnceLock::new();

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn ws_limits() -> WsLimits {
    *WS_LIMITS.get_or_init(|| WsLimits {
        max_global_connections: env_usize(
            "PARLEY_WS_MAX_CONNECTIONS",
            WS_MAX_GLOBAL_CONNECTIONS_DEFAULT,
        ),
        max_messages_per_minute: env_u32(
            "PARLEY_WS_MAX_MESSAGES_PER_MINUTE",
            WS_MAX_MESSAGES_PER_MINUTE_DEFAULT,
        ),
        max_reads_per_minute: env_u32(
            "PARLEY_WS_MAX_READS_PER_MINUTE",
            WS_MAX_READS_PER_MINUTE_DEFAULT,
        ),
    })
}

/// User-level rate limiters shared across all connections for the same user,
/// so limits cannot be bypassed by opening multiple tabs.
struct UserRateLimits {
    messages: DefaultKeyedRateLimiter<i64>,
    reads: DefaultKeyedRateLimiter<i64>,
}

static USER_RATE_LIMITS: OnceLock<UserRateLimits> = OnceLock::new();

fn user_rate_limits() -> &'static UserRateLimits {
    USER_RATE_LIMITS.get_or_init(|| {
        let limits = ws_limits();
        let rate_limits = UserRateLimits {
            messages: RateLimiter::keyed(Quota::per_minute(
                NonZeroU32::new(limits.max_messages_per_minute).unwrap(),
            )),
            reads: RateLimiter::keyed(Quota::per_minute(
                NonZeroU32::new(limits.max_reads_per_minute).unwrap(),
            )),
        };

        // Periodic cleanup of stale rate limiter entries to bound memory.
        tokio::spawn(async {
            let mut interval = tokio::time::interval(Duration::from_secs(300));
            interval.tick().await; // skip immediate first tick
            loop {
                interval.tick().await;
                let rl = user_rate_limits();
                rl.messages.retain_recent();
                rl.reads.retain_recent();
                rl.messages.shrink_to_fit();
                rl.reads.shrink_to_fit();
                tracing::trace!("rate limiter cleanup: pruned stale entries");
            }
        });

        rate_limits
    })
}

impl UserRateLimits {
    /// `Ok(())` if allowed, `Err(retry_after_ms)` otherwise.
    fn check(&self, limiter: &DefaultKeyedRateLimiter<i64>, user_id: i64) -> Result<(), u64> {
        match limiter.check_key(&user_id) {
            Ok(()) => Ok(()),
            Err(not_until) => {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                Err(wait.as_millis().max(1) as u64)
            }
        }
    }
}

struct ConnectionGuard {
    global_acquired: bool,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.global_acquired {
            ACTIVE_CONNECTIONS.fetch_sub(1, AtomicOrdering::SeqCst);
        }
    }
}

fn try_acquire_global_connection_slot() -> bool {
    let limits = ws_limits();
    let mut current = ACTIVE_CONNECTIONS.load(AtomicOrdering::SeqCst);
    loop {
        if current >= limits.max_global_connections {
            return false;
        }
        match ACTIVE_CONNECTIONS.compare_exchange(
            current,
            current + 1,
            AtomicOrdering::SeqCst,
            AtomicOrdering::SeqCst,
        ) {
            Ok(_) => return true,
            Err(observed) => current = observed,
        }
    }
}

async fn send_event(
    sender: &mut (impl SinkExt<Message> + Unpin),
    event: &str,
    data: Value,
) -> Result<(), ()> {
    let frame = GatewayMessage::new(event, data);
    let payload = match serde_json::to_string(&frame) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::error!("failed to serialize gateway frame: {err}");
            return Ok(());
        }
    };
    sender
        .send(Message::Text(payload.into()))
        .await
        .map_err(|_| ())
}

/// Errors are reported only to the originating connection and never close it.
async fn send_error(
    sender: &mut (impl SinkExt<Message> + Unpin),
    message: &str,
) -> Result<(), ()> {
    send_event(sender, EVENT_ERROR, json!({ "message": message })).await
}

async fn send_close(
    sender: &mut (impl SinkExt<Message> + Unpin),
    code: u16,
    reason: &str,
) -> Result<(), ()> {
    sender
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await
        .map_err(|_| ())
}

pub async fn handle_connection(socket: WebSocket, state: AppState) {
    let mut connection_guard = ConnectionGuard {
        global_acquired: false,
    };
    if !try_acquire_global_connection_slot() {
        let (mut sender, _) = socket.split();
        let _ = send_close(&mut sender, 1013, "Gateway is at connection capacity").await;
        return;
    }
    connection_guard.global_acquired = true;

    let (mut sender, mut receiver) = socket.split();
    let mut session = Session::new();
    let mut event_rx = state.event_bus.subscribe();
    let mut ws_ping_interval = tokio::time::interval(Duration::from_secs(20));
    ws_ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let disconnect_reason = loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let frame = match serde_json::from_str::<GatewayMessage>(&text) {
                            Ok(frame) => frame,
                            Err(err) => {
                                tracing::debug!(
                                    connection_id = %session.connection_id,
                                    "unparseable gateway frame: {err}"
                                );
                                if send_error(&mut sender, "Malformed event frame").await.is_err() {
                                    break "websocket send error".to_string();
                                }
                                continue;
                            }
                        };
                        if handle_client_message(frame, &mut sender, &mut session, &state)
                            .await
                            .is_err()
                        {
                            break "websocket send error".to_string();
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break if let Some(frame) = frame {
                            format!("client close frame (code={}, reason={})", frame.code, frame.reason)
                        } else {
                            "client close frame (no code/reason)".to_string()
                        };
                    }
                    Some(Err(err)) => {
                        break format!("websocket receive error: {err}");
                    }
                    None => {
                        break "websocket stream ended".to_string();
                    }
                    _ => {}
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        if !session.should_receive_event(&event) {
                            continue;
                        }
                        if send_event(&mut sender, &event.event_type, event.payload)
                            .await
                            .is_err()
                        {
                            break "websocket send error".to_string();
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            connection_id = %session.connection_id,
                            user_id = ?session.user_id,
                            skipped,
                            "gateway event stream lagged; forcing reconnect"
                        );
                        let _ = send_close(&mut sender, 1013, "Gateway fell behind; reconnect required").await;
                        break format!("event stream lagged by {skipped} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        break "event stream closed".to_string();
                    }
                }
            }
            _ = ws_ping_interval.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break "websocket ping send error".to_string();
                }
            }
        }
    };

    // Disconnect cleanup: drop this connection's presence entry, which
    // broadcasts "offline" when it was the user's last one.
    if let Some(user_id) = session.user_id {
        state
            .presence
            .unregister(user_id, &session.connection_id)
            .await;
    }

    tracing::info!(
        connection_id = %session.connection_id,
        user_id = ?session.user_id,
        "connection closed: {disconnect_reason}"
    );
}

/// Dispatch one inbound event. Returns `Err(())` only on a dead socket;
/// domain failures are turned into `error` events and the connection lives on.
async fn handle_client_message(
    frame: GatewayMessage,
    sender: &mut (impl SinkExt<Message> + Unpin),
    session: &mut Session,
    state: &AppState,
) -> Result<(), ()> {
    match frame.event.as_str() {
        EVENT_REGISTER => handle_register(frame.data, sender, session, state).await,
        EVENT_JOIN_ROOM => handle_join_room(frame.data, sender, session, state).await,
        EVENT_CHAT_MESSAGE => handle_chat_message(frame.data, sender, session, state).await,
        EVENT_MARK_AS_READ => handle_mark_as_read(frame.data, sender, session, state).await,
        other => {
            tracing::debug!(
                connection_id = %session.connection_id,
                event = other,
                "ignoring unknown gateway event"
            );
            Ok(())
        }
    }
}

async fn handle_register(
    data: Value,
    sender: &mut (impl SinkExt<Message> + Unpin),
    session: &mut Session,
    state: &AppState,
) -> Result<(), ()> {
    let payload: RegisterPayload = match serde_json::from_value(data) {
        Ok(payload) => payload,
        Err(_) => return send_error(sender, "Malformed register payload").await,
    };

    // A register without a userId is a silent no-op: the connection simply
    // stays anonymous.
    let Some(raw) = payload.user_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(());
    };
    let user_id = match raw.parse::<i64>() {
        Ok(id) => id,
        Err(_) => return send_error(sender, "Invalid userId").await,
    };

    // Re-registering under a different identity moves this connection's
    // presence entry over.
    if let Some(previous) = session.user_id {
        if previous == user_id {
            return Ok(());
        }
        state
            .presence
            .unregister(previous, &session.connection_id)
            .await;
    }

    state.presence.register(user_id, &session.connection_id).await;
    session.user_id = Some(user_id);
    tracing::debug!(
        connection_id = %session.connection_id,
        user_id,
        "connection registered"
    );
    Ok(())
}

async fn handle_join_room(
    data: Value,
    sender: &mut (impl SinkExt<Message> + Unpin),
    session: &mut Session,
    state: &AppState,
) -> Result<(), ()> {
    let resolved = match join_room(data, state).await {
        Ok(resolved) => resolved,
        Err(err) => return send_error(sender, &err.to_string()).await,
    };

    session.join_room(resolved.room.id);
    send_event(
        sender,
        EVENT_ROOM_JOINED,
        json!({
            "roomId": resolved.room.id.to_string(),
            "participants": resolved
                .room
                .participant_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>(),
            "alreadyExists": resolved.already_exists,
        }),
    )
    .await
}

async fn join_room(data: Value, state: &AppState) -> Result<parley_core::rooms::ResolvedRoom, ChatError> {
    let payload: JoinRoomPayload = serde_json::from_value(data)
        .map_err(|_| ChatError::InvalidInput("Malformed joinRoom payload".to_string()))?;

    let room_id = payload
        .room_id
        .as_deref()
        .map(parse_id)
        .transpose()?;
    let participant_ids = payload
        .participants
        .as_deref()
        .map(|ids| ids.iter().map(|id| parse_id(id)).collect::<Result<Vec<_>, _>>())
        .transpose()?;

    let state_clone = state.clone();
    parley_core::rooms::resolve(&state.db, room_id, participant_ids.as_deref(), move || {
        state_clone.next_id()
    })
    .await
}

async fn handle_chat_message(
    data: Value,
    sender: &mut (impl SinkExt<Message> + Unpin),
    session: &mut Session,
    state: &AppState,
) -> Result<(), ()> {
    let payload: ChatMessagePayload = match serde_json::from_value(data) {
        Ok(payload) => payload,
        Err(_) => return send_error(sender, "Malformed chatMessage payload").await,
    };

    // Sending requires a completed registration whose identity matches the
    // claimed sender.
    let Some(registered_id) = session.user_id else {
        return send_error(sender, "Please register first").await;
    };
    let sender_id = match payload.user_id.as_deref().map(parse_id) {
        Some(Ok(id)) => id,
        Some(Err(err)) => return send_error(sender, &err.to_string()).await,
        None => return send_error(sender, "Please register first").await,
    };
    if !session.is_registered_as(sender_id) {
        tracing::debug!(
            connection_id = %session.connection_id,
            registered_id,
            claimed_id = sender_id,
            "sender identity mismatch"
        );
        return send_error(sender, "Sender does not match registered user").await;
    }

    if let Err(retry_after_ms) =
        user_rate_limits().check(&user_rate_limits().messages, sender_id)
    {
        return send_error(
            sender,
            &format!("Too many messages, retry in {retry_after_ms}ms"),
        )
        .await;
    }

    match (&payload.room_id, &payload.listing_id) {
        (Some(room_id), _) => {
            let room_id = match parse_id(room_id) {
                Ok(id) => id,
                Err(err) => return send_error(sender, &err.to_string()).await,
            };
            let text = payload.message.as_deref().unwrap_or_default();
            if let Err(err) = chat::send_to_existing_room(
                state,
                &session.connection_id,
                room_id,
                sender_id,
                text,
            )
            .await
            {
                return send_error(sender, &err.to_string()).await;
            }
            Ok(())
        }
        (None, Some(listing_id)) => {
            let listing_id = match parse_id(listing_id) {
                Ok(id) => id,
                Err(err) => return send_error(sender, &err.to_string()).await,
            };
            let Some(kind) = payload.listing_type.as_deref().and_then(ListingKind::parse) else {
                return send_error(sender, "Invalid listing type").await;
            };

            match chat::create_room_and_send(
                state,
                &session.connection_id,
                listing_id,
                kind,
                sender_id,
                payload.message.as_deref(),
            )
            .await
            {
                Ok(outcome) => {
                    // Subscribe the caller before its next receive so the
                    // fanout queued by the pipeline is actually delivered.
                    session.join_room(outcome.room.id);
                    send_event(
                        sender,
                        EVENT_ROOM_JOINED,
                        json!({
                            "roomId": outcome.room.id.to_string(),
                            "participants": outcome
                                .room
                                .participant_ids
                                .iter()
                                .map(|id| id.to_string())
                                .collect::<Vec<_>>(),
                            "alreadyExists": outcome.already_exists,
                        }),
                    )
                    .await
                }
                Err(err) => send_error(sender, &err.to_string()).await,
            }
        }
        (None, None) => send_error(sender, "roomId or listingId required").await,
    }
}

async fn handle_mark_as_read(
    data: Value,
    sender: &mut (impl SinkExt<Message> + Unpin),
    session: &mut Session,
    state: &AppState,
) -> Result<(), ()> {
    let payload: MarkAsReadPayload = match serde_json::from_value(data) {
        Ok(payload) => payload,
        Err(_) => return send_error(sender, "Malformed markAsRead payload").await,
    };
    let (room_id, reader_id) = match (parse_id(&payload.room_id), parse_id(&payload.user_id)) {
        (Ok(room_id), Ok(reader_id)) => (room_id, reader_id),
        _ => return send_error(sender, "Invalid roomId or userId").await,
    };

    if user_rate_limits()
        .check(&user_rate_limits().reads, reader_id)
        .is_err()
    {
        // Read receipts are high-frequency; drop silently when throttled.
        tracing::debug!(reader_id, "markAsRead rate limited (silent drop)");
        return Ok(());
    }

    // Receipt failures degrade silently: the update is idempotent and the
    // client retries with another markAsRead.
    if let Err(err) = chat::mark_read(state, &session.connection_id, room_id, reader_id).await {
        tracing::warn!(room_id, reader_id, "markAsRead failed: {err}");
    }
    Ok(())
}

fn parse_id(raw: &str) -> Result<i64, ChatError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ChatError::InvalidInput(format!("invalid id '{raw}'")))
}
