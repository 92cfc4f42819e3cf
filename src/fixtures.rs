use crate::order::{cents, Order, STATUS_COMPLETED, STATUS_PENDING, STATUS_SHIPPED};
use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

static LAST_CREATED_ID: AtomicI64 = AtomicI64::new(0);

/// The collection served by `/orders`, always the same three entries in the same order.
pub fn all() -> Vec<Order> {
    vec![
        Order::new(1, "ORD-001", cents(15000), STATUS_PENDING),
        Order::new(2, "ORD-002", cents(29999), STATUS_COMPLETED),
        Order::new(3, "ORD-003", cents(7550), STATUS_SHIPPED),
    ]
}

/// Single order derived from a path id. Total and status are fixed.
pub fn synthesize(id: i64) -> Order {
    Order::new(id, format!("ORD-{:03}", id), cents(9999), STATUS_PENDING)
}

/// Echoes a posted order back with a freshly assigned id and order number.
pub fn create(mut payload: Order) -> Order {
    let id = next_order_id();
    payload.set_id(id);
    payload.set_order_number(format!("ORD-{}", id));
    payload
}

// Millisecond wall clock, bumped past the last issued value so concurrent
// creates inside the same millisecond never collide.
fn next_order_id() -> i64 {
    let now = Utc::now().timestamp_millis();
    let prev = LAST_CREATED_ID
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or_else(|last| last);
    now.max(prev + 1)
}
