//! Retention / marketing / construction allocations.
//!
//! Each share is `value * percentage / 100` in exact decimal arithmetic.
//! The result depends on `value` alone, so it can be recomputed at any time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const ONE_HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Percentages applied to a project value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Percentages {
    pub retention: Decimal,
    pub marketing: Decimal,
    pub construction: Decimal,
}

impl Percentages {
    pub fn total(&self) -> Decimal {
        self.retention + self.marketing + self.construction
    }
}

/// Process-wide allocation percentages: retention 5%, marketing 3%,
/// construction 2%.
pub const DEFAULT_PERCENTAGES: Percentages = Percentages {
    retention: Decimal::from_parts(5, 0, 0, false, 0),
    marketing: Decimal::from_parts(3, 0, 0, false, 0),
    construction: Decimal::from_parts(2, 0, 0, false, 0),
};

/// Largest accepted project value (10^20). Any value up to this bound can be
/// multiplied by a percentage up to 100 without overflowing `Decimal`.
pub const MAX_VALUE: Decimal = Decimal::from_parts(0x6310_0000, 0x6BC7_5E2D, 5, false, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub retention: Decimal,
    pub marketing: Decimal,
    pub construction: Decimal,
}

impl Allocation {
    pub fn total(&self) -> Decimal {
        self.retention + self.marketing + self.construction
    }
}

/// Allocate `value` using [`DEFAULT_PERCENTAGES`].
pub fn allocate(value: Decimal) -> Allocation {
    allocate_with(value, &DEFAULT_PERCENTAGES)
}

pub fn allocate_with(value: Decimal, percentages: &Percentages) -> Allocation {
    let share = |pct: Decimal| (value * pct / ONE_HUNDRED).normalize();
    Allocation {
        retention: share(percentages.retention),
        marketing: share(percentages.marketing),
        construction: share(percentages.construction),
    }
}
