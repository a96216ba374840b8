//! # Exact Ratios
//!
//! Share math never touches floating point. A [`Proportion`] keeps its
//! numerator and denominator as integers and only divides once, after the
//! `u128` product, so `floor(pool * shares / supply)` is exact for every
//! `u64` input. Every division floors, except the explicitly named `*_ceil`
//! variants.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FixedPointError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("fixed-point overflow")]
    Overflow,
}

/// `numerator / denominator` held unreduced, with a non-zero denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proportion {
    numerator: u64,
    denominator: u64,
}

impl Proportion {
    pub fn new(numerator: u64, denominator: u64) -> Result<Self, FixedPointError> {
        if denominator == 0 {
            return Err(FixedPointError::DivisionByZero);
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    pub fn numerator(self) -> u64 {
        self.numerator
    }

    pub fn denominator(self) -> u64 {
        self.denominator
    }

    /// `floor(value * self)`.
    pub fn of_floor(self, value: u64) -> Result<u64, FixedPointError> {
        let out = mul_div_floor(
            value as u128,
            self.numerator as u128,
            self.denominator as u128,
        )?;
        u64::try_from(out).map_err(|_| FixedPointError::Overflow)
    }

    /// `ceil(value * self)`.
    pub fn of_ceil(self, value: u64) -> Result<u64, FixedPointError> {
        let out = mul_div_ceil(
            value as u128,
            self.numerator as u128,
            self.denominator as u128,
        )?;
        u64::try_from(out).map_err(|_| FixedPointError::Overflow)
    }
}

impl fmt::Display for Proportion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// `floor(a * b / d)` in `u128`.
pub fn mul_div_floor(a: u128, b: u128, d: u128) -> Result<u128, FixedPointError> {
    if d == 0 {
        return Err(FixedPointError::DivisionByZero);
    }
    a.checked_mul(b)
        .map(|p| p / d)
        .ok_or(FixedPointError::Overflow)
}

/// `ceil(a * b / d)` in `u128`.
pub fn mul_div_ceil(a: u128, b: u128, d: u128) -> Result<u128, FixedPointError> {
    if d == 0 {
        return Err(FixedPointError::DivisionByZero);
    }
    let p = a.checked_mul(b).ok_or(FixedPointError::Overflow)?;
    Ok(p / d + u128::from(p % d != 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_proportion_is_identity() {
        let whole = Proportion::new(7, 7).unwrap();
        assert_eq!(whole.of_floor(12_345).unwrap(), 12_345);
        assert_eq!(Proportion::new(0, 9).unwrap().of_ceil(u64::MAX).unwrap(), 0);
    }

    #[test]
    fn zero_denominator_rejected() {
        assert_eq!(Proportion::new(1, 0), Err(FixedPointError::DivisionByZero));
    }

    #[test]
    fn proportion_times_supply_rounds_back() {
        let supplies = [3u64, 7, 1_000, 999_999_937, 10u64.pow(16) + 9, 9 * 10u64.pow(18) + 503];
        for &supply in &supplies {
            for shares in [1, supply / 3, supply - 1, supply] {
                if shares == 0 {
                    continue;
                }
                let p = Proportion::new(shares, supply).unwrap();
                assert_eq!(p.of_floor(supply).unwrap(), shares, "{p}");
                assert_eq!(p.of_ceil(supply).unwrap(), shares, "{p}");
            }
        }
    }

    #[test]
    fn small_slices_of_huge_pools_are_exact() {
        let supply = 9 * 10u64.pow(18) + 3;
        let p = Proportion::new(3, supply).unwrap();
        assert_eq!(p.of_floor(supply).unwrap(), 3);
        // Just under one unit still floors to zero.
        assert_eq!(p.of_floor(supply - 1).unwrap(), 2);
        assert_eq!(Proportion::new(1, supply).unwrap().of_floor(supply - 1).unwrap(), 0);
    }

    #[test]
    fn of_floor_truncates() {
        let third = Proportion::new(1, 3).unwrap();
        assert_eq!(third.of_floor(100).unwrap(), 33);
        assert_eq!(third.of_ceil(100).unwrap(), 34);
        assert_eq!(third.to_string(), "1/3");
    }

    #[test]
    fn wide_intermediates_do_not_overflow() {
        assert_eq!(
            mul_div_floor(u64::MAX as u128, u64::MAX as u128, u64::MAX as u128).unwrap(),
            u64::MAX as u128
        );
        let whole = Proportion::new(u64::MAX, u64::MAX).unwrap();
        assert_eq!(whole.of_floor(u64::MAX).unwrap(), u64::MAX);
        assert_eq!(mul_div_floor(u128::MAX, 2, 1), Err(FixedPointError::Overflow));
        let double = Proportion::new(2, 1).unwrap();
        assert_eq!(double.of_floor(u64::MAX), Err(FixedPointError::Overflow));
    }

    #[test]
    fn ceil_only_rounds_remainders() {
        assert_eq!(mul_div_ceil(10, 3, 5).unwrap(), 6);
        assert_eq!(mul_div_ceil(10, 3, 4).unwrap(), 8);
    }
}
