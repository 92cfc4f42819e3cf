use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const STATUS_PENDING: &str = "PENDING";
pub const STATUS_COMPLETED: &str = "COMPLETED";
pub const STATUS_SHIPPED: &str = "SHIPPED";

/// An order as it goes over the wire.
///
/// Built per response and dropped after serialization. Status is an open set of
/// tags; only the `STATUS_*` constants appear in fixtures, anything else is
/// accepted from a request body as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    // JSON number carrying the decimal's own scale: `150.00`, not `150.0` or `"150.00"`.
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub total: Decimal,
    pub status: String,
}

impl Order {
    pub fn new(
        id: i64,
        order_number: impl Into<String>,
        total: Decimal,
        status: impl Into<String>,
    ) -> Self {
        Self {
            id,
            order_number: order_number.into(),
            total,
            status: status.into(),
        }
    }

    pub fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    pub fn set_order_number(&mut self, order_number: impl Into<String>) {
        self.order_number = order_number.into();
    }
}

/// Amount with two fractional digits, e.g. `cents(7550)` is `75.50`.
pub fn cents(amount: i64) -> Decimal {
    Decimal::new(amount, 2)
}
