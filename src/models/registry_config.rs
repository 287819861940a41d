//! Per-wedding gift registry configuration.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ParseEnumError;

/// Who absorbs the payment processor fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeModality {
    /// Guest pays the sticker price, the fee comes out of the couple's share.
    CouplePays,
    /// Guest pays a markup so the couple receives the full sticker price.
    GuestPays,
}

impl FeeModality {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeModality::CouplePays => "couple_pays",
            FeeModality::GuestPays => "guest_pays",
        }
    }
}

impl fmt::Display for FeeModality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeeModality {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "couple_pays" => Ok(FeeModality::CouplePays),
            "guest_pays" => Ok(FeeModality::GuestPays),
            other => Err(ParseEnumError::new("fee modality", other)),
        }
    }
}

impl TryFrom<String> for FeeModality {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Fee settings for one wedding's registry.
///
/// # Database Table
///
/// Maps to `gift_registry_configs`. The percentage is kept as basis points
/// (500 = 5%) so fee arithmetic never touches floating point.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct GiftRegistryConfig {
    pub wedding_id: Uuid,

    #[sqlx(try_from = "String")]
    pub fee_modality: FeeModality,

    pub fee_basis_points: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
