//! Fee & balance preflight
//!
//! Decides, before any cost-incurring call, whether the payer's balance
//! covers the fees an operation will be charged:
//! - Network fee (per transaction)
//! - Flat protocol fee
//! - Percentage fee on the operation amount

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Base units per whole native token
pub const BASE_UNITS_PER_NATIVE: u64 = 1_000_000_000;

/// Decimal places of the native token
pub const NATIVE_DECIMALS: usize = 9;

/// Denominator for `percent_fee_bps` (1 bps = 0.01%)
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Default network fee per transaction (base units)
pub const DEFAULT_NETWORK_FEE: u64 = 5_000;

/// Native token symbol used in messages
pub const NATIVE_SYMBOL: &str = "SOL";

// =============================================================================
// Fee Schedule
// =============================================================================

/// Fees charged for one operation, in base units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    /// Ledger fee for the transaction itself
    pub network_fee: u64,
    /// Fixed protocol fee
    pub flat_fee: u64,
    /// Protocol fee proportional to the amount, in basis points
    pub percent_fee_bps: u64,
}

impl FeeSchedule {
    pub fn new(network_fee: u64, flat_fee: u64, percent_fee_bps: u64) -> Self {
        Self {
            network_fee,
            flat_fee,
            percent_fee_bps,
        }
    }

    /// Only the network fee, no protocol fees
    pub fn network_only(network_fee: u64) -> Self {
        Self::new(network_fee, 0, 0)
    }

    /// Percentage part for `amount`, rounded up
    pub fn percent_fee_for(&self, amount: u64) -> u64 {
        let numerator = amount as u128 * self.percent_fee_bps as u128;
        let fee = numerator.div_ceil(BPS_DENOMINATOR as u128);
        u64::try_from(fee).unwrap_or(u64::MAX)
    }

    /// Total balance required to run an operation moving `amount`
    pub fn required_balance(&self, amount: u64) -> u64 {
        self.network_fee
            .saturating_add(self.flat_fee)
            .saturating_add(self.percent_fee_for(amount))
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::network_only(DEFAULT_NETWORK_FEE)
    }
}

// =============================================================================
// Preflight
// =============================================================================

/// Denied preflight: the balance does not cover the fees
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct InsufficientBalance {
    pub available: u64,
    pub required: u64,
}

impl fmt::Display for InsufficientBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Not enough balance ({} {}) to pay for the transaction fees ({} {}). Please fund your account and try again.",
            format_native(self.available),
            NATIVE_SYMBOL,
            format_native(self.required),
            NATIVE_SYMBOL
        )
    }
}

impl InsufficientBalance {
    pub fn shortfall(&self) -> u64 {
        self.required - self.available
    }
}

/// Check that `balance` covers the fees for an operation moving `amount`.
///
/// The boundary is inclusive: a balance exactly equal to the requirement
/// is allowed.
pub fn check_balance(
    balance: u64,
    fees: &FeeSchedule,
    amount: u64,
) -> Result<(), InsufficientBalance> {
    let required = fees.required_balance(amount);
    if balance >= required {
        Ok(())
    } else {
        Err(InsufficientBalance {
            available: balance,
            required,
        })
    }
}

/// Format base units as a native amount without trailing zeros
pub fn format_native(base_units: u64) -> String {
    let whole = base_units / BASE_UNITS_PER_NATIVE;
    let frac = base_units % BASE_UNITS_PER_NATIVE;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0width$}", frac, width = NATIVE_DECIMALS);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

// =============================================================================
// Tests
// =============================================================================
