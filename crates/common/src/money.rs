//! Money and discount value objects.

use serde::{Deserialize, Serialize};

/// Money amount represented in cents to avoid floating point issues.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money {
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub const fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the whole currency units.
    pub fn units(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the cents portion (remainder after whole units).
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            cents: self.cents * i64::from(quantity),
        }
    }

    /// Applies a percentage discount, rounding half up to the nearest cent.
    ///
    /// `price * (1 - discount / 100)` is computed exactly on cents and basis
    /// points, so `0.05` at 50% becomes `0.03` and `19.99` at 15% becomes
    /// `16.99`. Negative amounts round half away from zero.
    pub fn discounted(&self, discount: Discount) -> Money {
        let remaining = i128::from(Discount::FULL_BPS - discount.basis_points());
        let scaled = i128::from(self.cents) * remaining;
        let half = i128::from(Discount::FULL_BPS / 2);
        let divisor = i128::from(Discount::FULL_BPS);
        let rounded = if scaled >= 0 {
            (scaled + half) / divisor
        } else {
            (scaled - half) / divisor
        };
        // `remaining` is at most 10_000 / 10_000, so the result never exceeds `self`.
        Money {
            cents: rounded as i64,
        }
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-{}.{:02}", self.units().abs(), self.cents_part())
        } else {
            write!(f, "{}.{:02}", self.units(), self.cents_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents + rhs.cents,
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.cents += rhs.cents;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// A discount percentage with two decimals, stored as basis points.
///
/// `Discount::from_basis_points(1550)` is 15.50%.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "u32", into = "u32")]
pub struct Discount(u32);

/// Error returned when a discount lies outside 0%..=100%.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidDiscount(pub u32);

impl std::fmt::Display for InvalidDiscount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "discount of {} basis points is outside 0..={}",
            self.0,
            Discount::FULL_BPS
        )
    }
}

impl std::error::Error for InvalidDiscount {}

impl Discount {
    const FULL_BPS: u32 = 10_000;

    /// No discount.
    pub const NONE: Discount = Discount(0);

    /// Creates a discount from basis points (hundredths of a percent).
    pub fn from_basis_points(bps: u32) -> Result<Self, InvalidDiscount> {
        if bps > Self::FULL_BPS {
            return Err(InvalidDiscount(bps));
        }
        Ok(Self(bps))
    }

    /// Creates a discount from a whole percentage.
    pub fn from_percent(percent: u32) -> Result<Self, InvalidDiscount> {
        Self::from_basis_points(percent.saturating_mul(100))
    }

    /// Returns the discount in basis points.
    pub fn basis_points(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for Discount {
    type Error = InvalidDiscount;

    fn try_from(bps: u32) -> Result<Self, Self::Error> {
        Self::from_basis_points(bps)
    }
}

impl From<Discount> for u32 {
    fn from(discount: Discount) -> Self {
        discount.0
    }
}

impl std::fmt::Display for Discount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}
