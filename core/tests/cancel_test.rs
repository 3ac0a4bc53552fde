//! Cancellation workflow: precondition ordering, atomic capacity release,
//! and best-effort notification dispatch.

#![allow(clippy::unwrap_used)] // Test code

use chrono::{Duration, Utc};
use turnstile_core::{
    cancel_ticket, CancelError, EventSummary, InMemoryTicketStore, MockDispatcher,
    NotificationKind, OrderStatus, OrderSummary, Ticket, TicketContext, TicketId, TicketStatus,
};
use uuid::Uuid;

struct Fixture {
    store: InMemoryTicketStore,
    dispatcher: MockDispatcher,
    ticket_id: TicketId,
    price_tier_id: Uuid,
}

fn fixture(status: TicketStatus, order_status: OrderStatus, hours_until_event: i64) -> Fixture {
    let mut ticket = Ticket::issue(Uuid::new_v4(), Utc::now());
    ticket.status = status;
    if status == TicketStatus::Used {
        ticket.used_at = Some(Utc::now() - Duration::hours(1));
    }
    let price_tier_id = Uuid::new_v4();
    let context = TicketContext {
        ticket,
        order: OrderSummary {
            user_id: "user-1".to_string(),
            status: order_status,
            customer_email: "holder@example.com".to_string(),
        },
        event: EventSummary {
            title: "Summer Jam".to_string(),
            starts_at: Utc::now() + Duration::hours(hours_until_event),
            organizer_email: "organizer@example.com".to_string(),
        },
        price_tier_id,
    };
    let ticket_id = context.ticket.id;

    let store = InMemoryTicketStore::new();
    store.set_sold(price_tier_id, 10);
    store.insert(context);

    Fixture {
        store,
        dispatcher: MockDispatcher::new(),
        ticket_id,
        price_tier_id,
    }
}

#[tokio::test]
async fn valid_paid_ticket_cancels_and_releases_capacity() {
    let f = fixture(TicketStatus::Valid, OrderStatus::Paid, 48);

    let summary = cancel_ticket(&f.store, &f.dispatcher, f.ticket_id, "user-1")
        .await
        .unwrap();

    assert_eq!(summary.status, TicketStatus::Cancelled);

    let stored = f.store.get(f.ticket_id).unwrap();
    assert_eq!(stored.ticket.status, TicketStatus::Cancelled);
    assert!(stored.ticket.cancelled_at.is_some());
    assert_eq!(f.store.sold(f.price_tier_id), 9, "sold drops from 10 to 9");
}

#[tokio::test]
async fn cancellation_notifies_holder_and_organizer() {
    let f = fixture(TicketStatus::Issued, OrderStatus::Paid, 48);

    cancel_ticket(&f.store, &f.dispatcher, f.ticket_id, "user-1")
        .await
        .unwrap();

    let sent = f.dispatcher.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].kind, NotificationKind::TicketCancellation);
    assert_eq!(sent[0].to_email, "holder@example.com");
    assert_eq!(sent[1].kind, NotificationKind::OrganizerCancellation);
    assert_eq!(sent[1].to_email, "organizer@example.com");
}

#[tokio::test]
async fn dispatch_failure_does_not_undo_the_cancellation() {
    let f = fixture(TicketStatus::Valid, OrderStatus::Paid, 48);
    f.dispatcher.set_failing(true);

    let summary = cancel_ticket(&f.store, &f.dispatcher, f.ticket_id, "user-1")
        .await
        .unwrap();

    // The state mutation is authoritative; notification is advisory.
    assert_eq!(summary.status, TicketStatus::Cancelled);
    assert_eq!(
        f.store.get(f.ticket_id).unwrap().ticket.status,
        TicketStatus::Cancelled
    );
    assert_eq!(f.store.sold(f.price_tier_id), 9);
    assert!(f.dispatcher.sent().is_empty());
}

#[tokio::test]
async fn unknown_ticket_is_not_found() {
    let f = fixture(TicketStatus::Valid, OrderStatus::Paid, 48);

    let err = cancel_ticket(&f.store, &f.dispatcher, TicketId::new(), "user-1")
        .await
        .unwrap_err();

    assert_eq!(err, CancelError::NotFound);
}

#[tokio::test]
async fn foreign_ticket_is_not_owned() {
    let f = fixture(TicketStatus::Valid, OrderStatus::Paid, 48);

    let err = cancel_ticket(&f.store, &f.dispatcher, f.ticket_id, "someone-else")
        .await
        .unwrap_err();

    assert_eq!(err, CancelError::NotOwned);
    assert_eq!(f.store.sold(f.price_tier_id), 10);
}

#[tokio::test]
async fn used_ticket_is_not_cancellable() {
    let f = fixture(TicketStatus::Used, OrderStatus::Paid, 48);

    let err = cancel_ticket(&f.store, &f.dispatcher, f.ticket_id, "user-1")
        .await
        .unwrap_err();

    assert_eq!(
        err,
        CancelError::NotCancellable {
            status: TicketStatus::Used
        }
    );
}

#[tokio::test]
async fn unpaid_order_blocks_cancellation() {
    let f = fixture(TicketStatus::Issued, OrderStatus::Pending, 48);

    let err = cancel_ticket(&f.store, &f.dispatcher, f.ticket_id, "user-1")
        .await
        .unwrap_err();

    assert_eq!(err, CancelError::OrderUnpaid);
}

#[tokio::test]
async fn window_closed_inside_24_hours() {
    let f = fixture(TicketStatus::Valid, OrderStatus::Paid, 23);

    let err = cancel_ticket(&f.store, &f.dispatcher, f.ticket_id, "user-1")
        .await
        .unwrap_err();

    assert_eq!(err, CancelError::WindowClosed);

    // Nothing was mutated.
    let stored = f.store.get(f.ticket_id).unwrap();
    assert_eq!(stored.ticket.status, TicketStatus::Valid);
    assert!(stored.ticket.cancelled_at.is_none());
    assert_eq!(f.store.sold(f.price_tier_id), 10);
    assert!(f.dispatcher.sent().is_empty());
}

#[tokio::test]
async fn sold_counter_never_goes_negative() {
    let f = fixture(TicketStatus::Valid, OrderStatus::Paid, 48);
    f.store.set_sold(f.price_tier_id, 0);

    cancel_ticket(&f.store, &f.dispatcher, f.ticket_id, "user-1")
        .await
        .unwrap();

    assert_eq!(f.store.sold(f.price_tier_id), 0, "floored at zero");
}

#[tokio::test]
async fn double_cancellation_fails_the_second_time() {
    let f = fixture(TicketStatus::Valid, OrderStatus::Paid, 48);

    cancel_ticket(&f.store, &f.dispatcher, f.ticket_id, "user-1")
        .await
        .unwrap();
    let err = cancel_ticket(&f.store, &f.dispatcher, f.ticket_id, "user-1")
        .await
        .unwrap_err();

    assert_eq!(
        err,
        CancelError::NotCancellable {
            status: TicketStatus::Cancelled
        }
    );
    // Capacity released exactly once.
    assert_eq!(f.store.sold(f.price_tier_id), 9);
}
