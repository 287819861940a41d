//! Gift catalog model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A purchasable catalog entry scoped to one wedding.
///
/// # Database Table
///
/// Maps to the `gift_items` table. Prices are stored in minor currency
/// units (centavos). Quantities only move on confirmed payment: one unit
/// goes from `quantity_available` to `quantity_sold` per confirmed
/// transaction, so their sum is conserved.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct GiftItem {
    pub id: Uuid,
    pub wedding_id: Uuid,
    pub name: String,
    pub description: Option<String>,

    /// Sticker price in minor units
    pub price: i64,

    pub quantity_available: i32,
    pub quantity_sold: i32,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GiftItem {
    /// Whether a guest may start a purchase of this item right now.
    ///
    /// This is a cheap pre-check only. Two guests can both pass it for the
    /// last unit; the decrement at confirmation time is what holds the line.
    pub fn is_available(&self) -> bool {
        self.is_enabled && self.quantity_available > 0
    }
}
