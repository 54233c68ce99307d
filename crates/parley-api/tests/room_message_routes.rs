use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use parley_core::{events::EventBus, presence::PresenceRegistry, AppConfig, AppState};
use serde_json::Value;
use tokio::sync::Notify;
use tower::ServiceExt;

async fn test_app() -> anyhow::Result<(Router, AppState)> {
    let db = parley_db::create_pool("sqlite::memory:", 1).await?;
    parley_db::run_migrations(&db).await?;

    let event_bus = EventBus::default();
    let state = AppState {
        db,
        event_bus: event_bus.clone(),
        presence: PresenceRegistry::new(event_bus),
        config: AppConfig {
            database_url: "sqlite::memory:".to_string(),
            worker_id: 1,
            public_url: None,
        },
        shutdown: Arc::new(Notify::new()),
    };

    let app = parley_api::build_router().with_state(state.clone());
    Ok((app, state))
}

async fn get_json(
    app: &Router,
    uri: &str,
    user_id: Option<&str>,
) -> anyhow::Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(user_id) = user_id {
        builder = builder.header("x-user-id", user_id);
    }
    let response = app.clone().oneshot(builder.body(Body::empty())?).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    Ok((status, body))
}

async fn seed_room_with_messages(state: &AppState) -> anyhow::Result<i64> {
    parley_db::rooms::create_room(&state.db, 500, Some("Loft 12"), &[1, 2], Some(77), Some(1))
        .await?;
    for (id, text) in [(510, "first"), (511, "second"), (512, "third")] {
        parley_db::messages::create_message(&state.db, id, 500, 1, text, "sent").await?;
    }
    Ok(500)
}

#[tokio::test]
async fn health_reports_ok() -> anyhow::Result<()> {
    let (app, _state) = test_app().await?;
    let (status, body) = get_json(&app, "/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn room_listing_requires_identity() -> anyhow::Result<()> {
    let (app, _state) = test_app().await?;

    let (status, _) = get_json(&app, "/api/v1/rooms", None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get_json(&app, "/api/v1/rooms", Some("not-a-number")).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn room_listing_returns_only_the_callers_rooms() -> anyhow::Result<()> {
    let (app, state) = test_app().await?;
    seed_room_with_messages(&state).await?;
    parley_db::rooms::create_room(&state.db, 501, None, &[3, 4], None, None).await?;

    let (status, body) = get_json(&app, "/api/v1/rooms", Some("1")).await?;
    assert_eq!(status, StatusCode::OK);
    let rooms = body.as_array().unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0]["id"], "500");
    assert_eq!(rooms[0]["name"], "Loft 12");
    assert_eq!(rooms[0]["listingId"], "77");
    assert_eq!(rooms[0]["participants"], serde_json::json!(["1", "2"]));

    let (status, body) = get_json(&app, "/api/v1/rooms", Some("9")).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn history_is_newest_first_and_pages_backwards() -> anyhow::Result<()> {
    let (app, state) = test_app().await?;
    let room_id = seed_room_with_messages(&state).await?;

    let (status, body) =
        get_json(&app, &format!("/api/v1/rooms/{room_id}/messages"), Some("2")).await?;
    assert_eq!(status, StatusCode::OK);
    let messages = body.as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0]["id"], "512");
    assert_eq!(messages[0]["message"], "third");
    assert_eq!(messages[2]["id"], "510");

    let (status, body) = get_json(
        &app,
        &format!("/api/v1/rooms/{room_id}/messages?before=512&limit=1"),
        Some("2"),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let page = body.as_array().unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0]["id"], "511");
    Ok(())
}

#[tokio::test]
async fn history_is_denied_to_non_participants() -> anyhow::Result<()> {
    let (app, state) = test_app().await?;
    let room_id = seed_room_with_messages(&state).await?;

    let (status, _) =
        get_json(&app, &format!("/api/v1/rooms/{room_id}/messages"), Some("9")).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = get_json(&app, "/api/v1/rooms/999/messages", Some("1")).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn malformed_cursors_are_rejected() -> anyhow::Result<()> {
    let (app, state) = test_app().await?;
    let room_id = seed_room_with_messages(&state).await?;

    let (status, _) = get_json(
        &app,
        &format!("/api/v1/rooms/{room_id}/messages?before=abc"),
        Some("1"),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get_json(&app, "/api/v1/rooms/abc/messages", Some("1")).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}
