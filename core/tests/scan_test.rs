//! Scan evaluator behavior: decision order, audit logging, idempotency and
//! the concurrent-scan race.

#![allow(clippy::unwrap_used, clippy::panic)] // Test code

use chrono::{Duration, Utc};
use turnstile_core::{
    scan_ticket, EventSummary, InMemoryTicketStore, OrderStatus, OrderSummary, ScanOutcome,
    ScanRequest, Ticket, TicketContext, TicketStatus,
};
use uuid::Uuid;

fn fixture(status: TicketStatus, order_status: OrderStatus) -> TicketContext {
    let mut ticket = Ticket::issue(Uuid::new_v4(), Utc::now());
    ticket.status = status;
    if status == TicketStatus::Used {
        ticket.used_at = Some(Utc::now() - Duration::hours(1));
    }
    if status == TicketStatus::Cancelled {
        ticket.cancelled_at = Some(Utc::now() - Duration::hours(1));
    }
    TicketContext {
        ticket,
        order: OrderSummary {
            user_id: "user-1".to_string(),
            status: order_status,
            customer_email: "holder@example.com".to_string(),
        },
        event: EventSummary {
            title: "Summer Jam".to_string(),
            starts_at: Utc::now() + Duration::hours(48),
            organizer_email: "organizer@example.com".to_string(),
        },
        price_tier_id: Uuid::new_v4(),
    }
}

fn request(code: &str) -> ScanRequest {
    ScanRequest {
        ticket_code: code.to_string(),
        gate_id: "G1".to_string(),
        signature: None,
    }
}

#[tokio::test]
async fn unknown_code_is_invalid_and_logged_without_ticket() {
    let store = InMemoryTicketStore::new();

    let response = scan_ticket(&store, &request("ABC")).await.unwrap();

    assert_eq!(response.status, ScanOutcome::Invalid);
    assert_eq!(response.used_at, None);

    let logs = store.scan_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].ticket_id, None);
    assert_eq!(logs[0].gate_id, "G1");
    assert_eq!(logs[0].outcome, "Invalid");
}

#[tokio::test]
async fn valid_paid_ticket_admits_and_marks_used() {
    let store = InMemoryTicketStore::new();
    let context = fixture(TicketStatus::Valid, OrderStatus::Paid);
    let code = context.ticket.code.clone();
    let id = context.ticket.id;
    store.insert(context);

    let response = scan_ticket(&store, &request(&code)).await.unwrap();

    assert_eq!(response.status, ScanOutcome::Valid);
    assert!(response.used_at.is_some());

    let stored = store.get(id).unwrap();
    assert_eq!(stored.ticket.status, TicketStatus::Used);
    assert_eq!(stored.ticket.used_at, response.used_at);
}

#[tokio::test]
async fn second_scan_reports_already_used_with_original_timestamp() {
    let store = InMemoryTicketStore::new();
    let context = fixture(TicketStatus::Valid, OrderStatus::Paid);
    let code = context.ticket.code.clone();
    store.insert(context);

    let first = scan_ticket(&store, &request(&code)).await.unwrap();
    let second = scan_ticket(&store, &request(&code)).await.unwrap();
    let third = scan_ticket(&store, &request(&code)).await.unwrap();

    assert_eq!(first.status, ScanOutcome::Valid);
    assert_eq!(second.status, ScanOutcome::AlreadyUsed);
    assert_eq!(second.used_at, first.used_at);
    assert_eq!(third.status, ScanOutcome::AlreadyUsed);
    assert_eq!(third.used_at, first.used_at);

    // One audit row per attempt.
    assert_eq!(store.scan_logs().len(), 3);
}

#[tokio::test]
async fn unpaid_order_is_rejected_without_mutation() {
    let store = InMemoryTicketStore::new();
    let context = fixture(TicketStatus::Valid, OrderStatus::Pending);
    let code = context.ticket.code.clone();
    let id = context.ticket.id;
    store.insert(context);

    let response = scan_ticket(&store, &request(&code)).await.unwrap();

    assert_eq!(response.status, ScanOutcome::Unpaid);
    assert_eq!(response.used_at, None);
    assert_eq!(store.get(id).unwrap().ticket.status, TicketStatus::Valid);

    let logs = store.scan_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].outcome, "Unpaid");
}

#[tokio::test]
async fn cancelled_ticket_scans_as_revoked() {
    let store = InMemoryTicketStore::new();
    let context = fixture(TicketStatus::Cancelled, OrderStatus::Paid);
    let code = context.ticket.code.clone();
    let id = context.ticket.id;
    store.insert(context);

    let response = scan_ticket(&store, &request(&code)).await.unwrap();

    assert_eq!(response.status, ScanOutcome::Revoked);
    assert_eq!(response.used_at, None);
    assert_eq!(store.get(id).unwrap().ticket.status, TicketStatus::Cancelled);
}

#[tokio::test]
async fn refunded_ticket_scans_as_revoked() {
    let store = InMemoryTicketStore::new();
    let context = fixture(TicketStatus::Refunded, OrderStatus::Refunded);
    let code = context.ticket.code.clone();
    store.insert(context);

    let response = scan_ticket(&store, &request(&code)).await.unwrap();

    assert_eq!(response.status, ScanOutcome::Revoked);
}

#[tokio::test]
async fn issued_ticket_with_paid_order_admits() {
    let store = InMemoryTicketStore::new();
    let context = fixture(TicketStatus::Issued, OrderStatus::Paid);
    let code = context.ticket.code.clone();
    store.insert(context);

    let response = scan_ticket(&store, &request(&code)).await.unwrap();

    assert_eq!(response.status, ScanOutcome::Valid);
}

#[tokio::test]
async fn concurrent_scans_yield_exactly_one_valid() {
    let store = InMemoryTicketStore::new();
    let context = fixture(TicketStatus::Valid, OrderStatus::Paid);
    let code = context.ticket.code.clone();
    store.insert(context);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let code = code.clone();
        handles.push(tokio::spawn(async move {
            scan_ticket(&store, &request(&code)).await.unwrap()
        }));
    }

    let mut valid = 0;
    let mut already_used = 0;
    let mut winner_used_at = None;
    let mut loser_used_ats = Vec::new();
    for handle in handles {
        let response = handle.await.unwrap();
        match response.status {
            ScanOutcome::Valid => {
                valid += 1;
                winner_used_at = response.used_at;
            }
            ScanOutcome::AlreadyUsed => {
                already_used += 1;
                loser_used_ats.push(response.used_at);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(valid, 1, "exactly one scan may win");
    assert_eq!(already_used, 7);
    for used_at in loser_used_ats {
        assert_eq!(used_at, winner_used_at);
    }
    assert_eq!(store.scan_logs().len(), 8);
}
