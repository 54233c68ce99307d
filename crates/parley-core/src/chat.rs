use crate::error::ChatError;
use crate::masking;
use crate::AppState;
use parley_db::{listings, messages as db_messages, rooms as db_rooms, users as db_users};
use parley_models::gateway::{EVENT_CHAT_MESSAGE, EVENT_MESSAGES_READ, EVENT_MESSAGE_DELIVERED};
use parley_models::room::canonical_participants;
use parley_models::{DeliveryStatus, ListingKind, Message, Room, UserProfile, UserType};
use serde_json::{json, Value};

/// Fallback body for a listing contact initiated without text.
pub const DEFAULT_GREETING: &str = "Hello! I am interested in this listing.";

/// Result of the listing-contact flow: the room (new or pre-existing), the
/// persisted message, and the sender snapshot that went out with it.
#[derive(Debug, Clone)]
pub struct ContactOutcome {
    pub room: Room,
    pub message: Message,
    pub sender: UserProfile,
    pub already_exists: bool,
}

/// Send a message into a room that already exists. Persists first, then
/// resolves the delivery status against the presence registry, and only
/// after both writes succeed fans out to room subscribers and acks the
/// sending connection.
pub async fn send_to_existing_room(
    state: &AppState,
    connection_id: &str,
    room_id: i64,
    sender_id: i64,
    text: &str,
) -> Result<Message, ChatError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ChatError::EmptyMessage);
    }

    let row = db_messages::create_message(
        &state.db,
        state.next_id(),
        room_id,
        sender_id,
        trimmed,
        DeliveryStatus::Sent.as_str(),
    )
    .await?;

    let sender = load_sender_profile(state, sender_id).await?;

    let room_row = db_rooms::get_room(&state.db, room_id)
        .await?
        .ok_or(ChatError::NotFound)?;
    let participant_ids = db_rooms::get_room_participant_ids(&state.db, room_row.id).await?;

    let mut status = DeliveryStatus::Sent;
    if state
        .presence
        .any_online_except(&participant_ids, sender_id)
        .await
        && db_messages::mark_message_delivered(&state.db, row.id).await?
    {
        status = DeliveryStatus::Delivered;
    }

    let message = Message {
        id: row.id,
        room_id: row.room_id,
        sender_id: row.sender_id,
        content: row.content,
        status,
        created_at: row.created_at,
    };

    state.event_bus.dispatch(
        EVENT_CHAT_MESSAGE,
        message_event_payload(&message, &sender),
        Some(room_id),
    );
    state.event_bus.dispatch_to_connections(
        EVENT_MESSAGE_DELIVERED,
        json!({
            "roomId": room_id.to_string(),
            "messageId": message.id.to_string(),
        }),
        vec![connection_id.to_string()],
    );

    Ok(message)
}

/// Listing-initiated contact: find-or-create the room for this listing and
/// sender, run the moderation gate over the text, and persist the opening
/// message. A concurrent duplicate creation is recovered by re-fetching the
/// existing room, never surfaced to the caller.
pub async fn create_room_and_send(
    state: &AppState,
    connection_id: &str,
    listing_id: i64,
    listing_kind: ListingKind,
    sender_id: i64,
    text: Option<&str>,
) -> Result<ContactOutcome, ChatError> {
    let listing = listings::get_listing(&state.db, listing_id, listing_kind.as_str())
        .await?
        .ok_or(ChatError::NotFound)?;

    let sender_row = db_users::get_user(&state.db, sender_id)
        .await?
        .ok_or(ChatError::NotFound)?;
    let sender_type = UserType::parse(&sender_row.user_type);
    let sender = UserProfile::assemble(
        sender_row.id,
        sender_row.name.clone(),
        sender_row.photo.clone(),
        Some(sender_type),
    );

    let deal = parley_db::commissions::get_commission_for_listing_and_broker(
        &state.db,
        listing_id,
        listing.broker_id,
    )
    .await?;

    // Client-assignment guard: a broker's deal cannot be hijacked by a
    // second client contacting the same listing.
    if sender_type == UserType::Client {
        if let Some(deal) = &deal {
            if deal.client_id.is_some_and(|client| client != sender_id) {
                return Err(ChatError::Forbidden(
                    "deal already assigned to another client".to_string(),
                ));
            }
        }
    }

    // Duplicate-room guard (client only): contacting the same listing twice
    // returns the original room.
    let mut already_exists = false;
    let mut room_row = None;
    if sender_type == UserType::Client {
        if let Some(existing) = db_rooms::find_listing_room(&state.db, listing_id, sender_id).await?
        {
            already_exists = true;
            room_row = Some(existing);
        }
    }

    let room_row = match room_row {
        Some(row) => row,
        None => {
            // Participants are whoever holds a role on the listing plus the
            // sender; unset roles are simply omitted.
            let mut participants = Vec::new();
            if let Some(broker_id) = listing.broker_id {
                participants.push(broker_id);
            }
            participants.push(listing.owner_id);
            participants.push(sender_id);
            let participants = canonical_participants(&participants);

            match db_rooms::create_room(
                &state.db,
                state.next_id(),
                Some(&listing.title),
                &participants,
                Some(listing_id),
                Some(sender_id),
            )
            .await
            {
                Ok(row) => row,
                Err(err) if err.is_unique_violation() => {
                    // Concurrent contact for the same (listing, sender) won
                    // the race; treat their room as ours.
                    tracing::debug!(listing_id, sender_id, "listing room race lost, re-fetching");
                    already_exists = true;
                    db_rooms::find_listing_room(&state.db, listing_id, sender_id)
                        .await?
                        .ok_or(ChatError::NotFound)?
                }
                Err(err) => return Err(err.into()),
            }
        }
    };

    let participant_ids = db_rooms::get_room_participant_ids(&state.db, room_row.id).await?;
    let status = if state
        .presence
        .any_online_except(&participant_ids, sender_id)
        .await
    {
        DeliveryStatus::Delivered
    } else {
        DeliveryStatus::Sent
    };

    let body = text
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_GREETING);
    let body = if masking::should_mask(&state.db, Some(listing_id)).await {
        masking::mask_sensitive_data(body)
    } else {
        body.to_string()
    };

    let row = db_messages::create_message(
        &state.db,
        state.next_id(),
        room_row.id,
        sender_id,
        &body,
        status.as_str(),
    )
    .await?;

    let message = Message {
        id: row.id,
        room_id: row.room_id,
        sender_id: row.sender_id,
        content: row.content,
        status,
        created_at: row.created_at,
    };

    state.event_bus.dispatch(
        EVENT_CHAT_MESSAGE,
        message_event_payload(&message, &sender),
        Some(room_row.id),
    );
    state.event_bus.dispatch_to_connections(
        EVENT_MESSAGE_DELIVERED,
        json!({
            "roomId": room_row.id.to_string(),
            "messageId": message.id.to_string(),
        }),
        vec![connection_id.to_string()],
    );

    let room = crate::rooms::assemble_room(&state.db, room_row).await?;
    Ok(ContactOutcome {
        room,
        message,
        sender,
        already_exists,
    })
}

/// Bulk-transition every message in the room not sent by the reader to
/// "read", then notify room subscribers plus the calling connection (so the
/// reader's other sessions also observe the change). Returns the number of
/// messages that changed.
pub async fn mark_read(
    state: &AppState,
    connection_id: &str,
    room_id: i64,
    reader_id: i64,
) -> Result<u64, ChatError> {
    let changed = db_messages::mark_room_messages_read(&state.db, room_id, reader_id).await?;

    state.event_bus.dispatch_with_echo(
        EVENT_MESSAGES_READ,
        json!({
            "roomId": room_id.to_string(),
            "readerId": reader_id.to_string(),
        }),
        room_id,
        connection_id,
    );

    Ok(changed)
}

/// Public profile projection for a sender; a missing user record yields the
/// full fallback snapshot instead of an error.
async fn load_sender_profile(state: &AppState, sender_id: i64) -> Result<UserProfile, ChatError> {
    let profile = match db_users::get_user(&state.db, sender_id).await? {
        Some(row) => {
            let user_type = UserType::parse(&row.user_type);
            UserProfile::assemble(row.id, row.name, row.photo, Some(user_type))
        }
        None => UserProfile::fallback(sender_id),
    };
    Ok(profile)
}

fn message_event_payload(message: &Message, sender: &UserProfile) -> Value {
    json!({
        "id": message.id.to_string(),
        "roomId": message.room_id.to_string(),
        "senderId": message.sender_id.to_string(),
        "sender": {
            "id": sender.id.to_string(),
            "name": sender.name,
            "photo": sender.photo,
            "userType": sender.user_type.as_str(),
        },
        "message": message.content,
        "status": message.status.as_str(),
        "createdAt": message.created_at.to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::presence::PresenceRegistry;
    use crate::{AppConfig, AppState};
    use parley_db::{commissions, create_pool, run_migrations};
    use std::sync::Arc;
    use tokio::sync::Notify;

    async fn test_state() -> AppState {
        let db = create_pool("sqlite::memory:", 1).await.unwrap();
        run_migrations(&db).await.unwrap();
        let event_bus = EventBus::default();
        AppState {
            db,
            presence: PresenceRegistry::new(event_bus.clone()),
            event_bus,
            config: AppConfig {
                database_url: "sqlite::memory:".to_string(),
                worker_id: 1,
                public_url: None,
            },
            shutdown: Arc::new(Notify::new()),
        }
    }

    async fn seed_users(state: &AppState) {
        for (id, name, user_type) in [
            (1, "Amal", "client"),
            (2, "Bassel", "broker"),
            (3, "Omar", "owner"),
            (4, "Chadi", "client"),
        ] {
            db_users::create_user(&state.db, id, Some(name), None, user_type)
                .await
                .unwrap();
        }
    }

    async fn seed_listing(state: &AppState, broker: Option<i64>) -> i64 {
        listings::create_listing(&state.db, 50, "property", "Flat in Hamra", 3, broker)
            .await
            .unwrap();
        50
    }

    #[tokio::test]
    async fn online_recipient_upgrades_status_and_both_sides_are_notified() {
        let state = test_state().await;
        seed_users(&state).await;
        db_rooms::create_room(&state.db, 100, None, &[1, 2], None, Some(1))
            .await
            .unwrap();
        state.presence.register(1, "conn-a").await;
        state.presence.register(2, "conn-b").await;

        let mut rx = state.event_bus.subscribe();
        let message = send_to_existing_room(&state, "conn-a", 100, 1, "Hello")
            .await
            .unwrap();
        assert_eq!(message.status, DeliveryStatus::Delivered);

        let fanout = rx.recv().await.unwrap();
        assert_eq!(fanout.event_type, EVENT_CHAT_MESSAGE);
        assert_eq!(fanout.room_id, Some(100));
        assert_eq!(fanout.payload["message"], "Hello");
        assert_eq!(fanout.payload["status"], "delivered");
        assert_eq!(fanout.payload["sender"]["name"], "Amal");

        let ack = rx.recv().await.unwrap();
        assert_eq!(ack.event_type, EVENT_MESSAGE_DELIVERED);
        assert_eq!(
            ack.target_connection_ids.as_deref(),
            Some(&["conn-a".to_string()][..])
        );
        assert_eq!(ack.payload["messageId"], message.id.to_string());

        let stored = db_messages::get_message(&state.db, message.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, "delivered");
    }

    #[tokio::test]
    async fn offline_recipients_leave_the_message_sent() {
        let state = test_state().await;
        seed_users(&state).await;
        db_rooms::create_room(&state.db, 101, None, &[1, 2], None, Some(1))
            .await
            .unwrap();
        state.presence.register(1, "conn-a").await;

        let message = send_to_existing_room(&state, "conn-a", 101, 1, "anyone there?")
            .await
            .unwrap();
        assert_eq!(message.status, DeliveryStatus::Sent);
    }

    #[tokio::test]
    async fn empty_text_is_rejected_before_persisting() {
        let state = test_state().await;
        seed_users(&state).await;
        db_rooms::create_room(&state.db, 102, None, &[1, 2], None, Some(1))
            .await
            .unwrap();

        let err = send_to_existing_room(&state, "conn-a", 102, 1, "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::EmptyMessage));

        let history = db_messages::get_room_messages(&state.db, 102, None, 10)
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn vanished_room_is_not_found() {
        let state = test_state().await;
        seed_users(&state).await;
        let err = send_to_existing_room(&state, "conn-a", 999, 1, "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::NotFound));
    }

    #[tokio::test]
    async fn unknown_sender_gets_the_fallback_profile() {
        let state = test_state().await;
        db_rooms::create_room(&state.db, 103, None, &[7, 8], None, Some(7))
            .await
            .unwrap();

        let mut rx = state.event_bus.subscribe();
        send_to_existing_room(&state, "conn-x", 103, 7, "hi")
            .await
            .unwrap();

        let fanout = rx.recv().await.unwrap();
        assert_eq!(fanout.payload["sender"]["name"], "Unknown");
        assert_eq!(fanout.payload["sender"]["userType"], "user");
    }

    #[tokio::test]
    async fn contact_flow_builds_the_room_and_is_idempotent() {
        let state = test_state().await;
        seed_users(&state).await;
        let listing_id = seed_listing(&state, Some(2)).await;

        let first = create_room_and_send(
            &state,
            "conn-a",
            listing_id,
            ListingKind::Property,
            1,
            Some("Is this available?"),
        )
        .await
        .unwrap();
        assert!(!first.already_exists);
        assert_eq!(first.room.participant_ids, vec![1, 2, 3]);
        assert_eq!(first.room.name.as_deref(), Some("Flat in Hamra"));
        assert_eq!(first.room.listing_id, Some(listing_id));

        let second = create_room_and_send(
            &state,
            "conn-a",
            listing_id,
            ListingKind::Property,
            1,
            Some("Is this available?"),
        )
        .await
        .unwrap();
        assert!(second.already_exists);
        assert_eq!(second.room.id, first.room.id);
    }

    #[tokio::test]
    async fn second_client_is_rejected_when_the_deal_is_assigned() {
        let state = test_state().await;
        seed_users(&state).await;
        let listing_id = seed_listing(&state, Some(2)).await;
        commissions::create_commission(
            &state.db, 1, listing_id, Some(2), Some(1), "pending", "pending", "pending",
        )
        .await
        .unwrap();

        // The assigned client may still contact.
        create_room_and_send(&state, "conn-a", listing_id, ListingKind::Property, 1, None)
            .await
            .unwrap();

        // A different client may not.
        let err =
            create_room_and_send(&state, "conn-c", listing_id, ListingKind::Property, 4, None)
                .await
                .unwrap_err();
        assert!(matches!(err, ChatError::Forbidden(_)));
    }

    #[tokio::test]
    async fn unpaid_deal_masks_contact_info_in_the_opening_message() {
        let state = test_state().await;
        seed_users(&state).await;
        let listing_id = seed_listing(&state, Some(2)).await;

        let outcome = create_room_and_send(
            &state,
            "conn-a",
            listing_id,
            ListingKind::Property,
            1,
            Some("Call me at +96171234567"),
        )
        .await
        .unwrap();
        assert!(!outcome.message.content.contains("961"));
        assert!(outcome.message.content.contains(masking::REDACTION_MARKER));
    }

    #[tokio::test]
    async fn paid_deal_sends_text_unmasked() {
        let state = test_state().await;
        seed_users(&state).await;
        let listing_id = seed_listing(&state, Some(2)).await;
        commissions::create_commission(
            &state.db, 1, listing_id, Some(2), Some(1), "paid", "paid", "paid",
        )
        .await
        .unwrap();

        let outcome = create_room_and_send(
            &state,
            "conn-a",
            listing_id,
            ListingKind::Property,
            1,
            Some("Call me at +96171234567"),
        )
        .await
        .unwrap();
        assert_eq!(outcome.message.content, "Call me at +96171234567");
    }

    #[tokio::test]
    async fn missing_text_falls_back_to_the_greeting() {
        let state = test_state().await;
        seed_users(&state).await;
        let listing_id = seed_listing(&state, Some(2)).await;

        let outcome =
            create_room_and_send(&state, "conn-a", listing_id, ListingKind::Property, 1, None)
                .await
                .unwrap();
        assert_eq!(outcome.message.content, DEFAULT_GREETING);
    }

    #[tokio::test]
    async fn broker_less_listings_produce_two_participant_rooms() {
        let state = test_state().await;
        seed_users(&state).await;
        let listing_id = seed_listing(&state, None).await;

        let outcome =
            create_room_and_send(&state, "conn-a", listing_id, ListingKind::Property, 1, None)
                .await
                .unwrap();
        assert_eq!(outcome.room.participant_ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn unknown_listing_or_wrong_kind_is_not_found() {
        let state = test_state().await;
        seed_users(&state).await;
        seed_listing(&state, Some(2)).await;

        let err = create_room_and_send(&state, "conn-a", 50, ListingKind::Vehicle, 1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::NotFound));
    }

    #[tokio::test]
    async fn mark_read_transitions_in_bulk_and_echoes_the_caller() {
        let state = test_state().await;
        seed_users(&state).await;
        db_rooms::create_room(&state.db, 110, None, &[1, 2], None, Some(1))
            .await
            .unwrap();
        for id in [500, 501, 502] {
            db_messages::create_message(&state.db, id, 110, 1, "m", "delivered")
                .await
                .unwrap();
        }

        let mut rx = state.event_bus.subscribe();
        let changed = mark_read(&state, "conn-b", 110, 2).await.unwrap();
        assert_eq!(changed, 3);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, EVENT_MESSAGES_READ);
        assert_eq!(event.room_id, Some(110));
        assert_eq!(event.echo_connection_id.as_deref(), Some("conn-b"));
        assert_eq!(event.payload["readerId"], "2");

        // Idempotent on retry; the broadcast still goes out.
        let changed = mark_read(&state, "conn-b", 110, 2).await.unwrap();
        assert_eq!(changed, 0);
    }
}
