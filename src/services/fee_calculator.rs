//! Fee calculation for gift purchases.
//!
//! All amounts are integer minor units and the fee rate is integer basis
//! points, so persisted amounts never carry floating-point drift.
//!
//! # Modalities
//!
//! - `couple_pays`: guest pays the sticker price, fee is taken from it
//!   (rounded down).
//! - `guest_pays`: guest pays `ceil(price / (1 - rate))` so the couple nets
//!   the full sticker price.

use serde::Serialize;

use crate::models::registry_config::FeeModality;

/// Basis points in 100%.
const BASIS_POINTS_SCALE: i128 = 10_000;

/// Highest configurable fee rate (50%).
///
/// `guest_pays` grows without bound as the rate approaches 100%.
pub const MAX_FEE_BASIS_POINTS: i32 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeeError {
    #[error("fee percentage must be between 0 and {max} basis points, got {0}", max = MAX_FEE_BASIS_POINTS)]
    PercentageOutOfRange(i32),

    #[error("unit price must be positive, got {0}")]
    NonPositivePrice(i64),

    #[error("fee amounts overflow for unit price {0}")]
    Overflow(i64),
}

/// A validated fee rate in basis points (500 = 5%).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeRate(i32);

impl FeeRate {
    pub fn from_basis_points(basis_points: i32) -> Result<Self, FeeError> {
        if !(0..=MAX_FEE_BASIS_POINTS).contains(&basis_points) {
            return Err(FeeError::PercentageOutOfRange(basis_points));
        }
        Ok(Self(basis_points))
    }

    pub fn basis_points(&self) -> i32 {
        self.0
    }
}

/// Amounts charged and split for one unit.
///
/// `gross_amount == net_amount_couple + platform_amount` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeBreakdown {
    pub gross_amount: i64,
    pub fee_amount: i64,
    pub net_amount_couple: i64,
    pub platform_amount: i64,
}

/// Compute gross, fee and net amounts for one unit of a gift.
pub fn calculate(
    unit_price: i64,
    rate: FeeRate,
    modality: FeeModality,
) -> Result<FeeBreakdown, FeeError> {
    if unit_price <= 0 {
        return Err(FeeError::NonPositivePrice(unit_price));
    }

    let price = i128::from(unit_price);
    let bps = i128::from(rate.basis_points());
    let to_i64 = |v: i128| i64::try_from(v).map_err(|_| FeeError::Overflow(unit_price));

    match modality {
        FeeModality::CouplePays => {
            let gross = price;
            // Integer division of non-negatives floors.
            let fee = gross * bps / BASIS_POINTS_SCALE;
            Ok(FeeBreakdown {
                gross_amount: to_i64(gross)?,
                fee_amount: to_i64(fee)?,
                net_amount_couple: to_i64(gross - fee)?,
                platform_amount: to_i64(fee)?,
            })
        }
        FeeModality::GuestPays => {
            let divisor = BASIS_POINTS_SCALE - bps;
            let gross = (price * BASIS_POINTS_SCALE + divisor - 1) / divisor;
            let platform = gross - price;
            Ok(FeeBreakdown {
                gross_amount: to_i64(gross)?,
                fee_amount: to_i64(platform)?,
                net_amount_couple: to_i64(price)?,
                platform_amount: to_i64(platform)?,
            })
        }
    }
}
