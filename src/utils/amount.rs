//! Monetary amount conversion.
//!
//! Wallet RPC amounts are integer atomic units (1 XMR = 10^12). Every
//! agent converts through this module; there is no other conversion path,
//! so overflow and sign handling live in exactly one place.

/// Atomic units per whole coin.
pub const ATOMIC_UNITS_PER_XMR: u64 = 1_000_000_000_000;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive, got {0}")]
    NonPositive(f64),

    #[error("Amount {0} is not a finite number")]
    NotFinite(f64),

    #[error("Amount {0} overflows the atomic-unit representation")]
    Overflow(f64),
}

/// Convert a human-denominated amount to atomic units.
///
/// Rejects zero, negatives, NaN/infinity, and anything that would not fit
/// in a `u64` after scaling.
pub fn xmr_to_atomic(amount: f64) -> Result<u64, AmountError> {
    if !amount.is_finite() {
        return Err(AmountError::NotFinite(amount));
    }
    if amount <= 0.0 {
        return Err(AmountError::NonPositive(amount));
    }

    let scaled = amount * ATOMIC_UNITS_PER_XMR as f64;
    if scaled >= u64::MAX as f64 {
        return Err(AmountError::Overflow(amount));
    }

    let atomic = scaled.round() as u64;
    if atomic == 0 {
        // Sub-atomic dust rounds to nothing; treat as non-positive.
        return Err(AmountError::NonPositive(amount));
    }
    Ok(atomic)
}

/// Render atomic units as a human-readable coin amount for logs.
pub fn atomic_to_xmr(atomic: u64) -> f64 {
    atomic as f64 / ATOMIC_UNITS_PER_XMR as f64
}
