//! Reference Gas Price Statistics
//!
//! Pure functions over the active validator set. Each statistic either
//! succeeds over every validator or fails on the first unparsable entry;
//! nothing is ever defaulted to zero except the result for an empty set.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::system_state::{SystemStateError, Validator};

/// Total voting power, in basis points
pub const TOTAL_VOTING_POWER: u64 = 10_000;

/// Two-thirds supermajority of [`TOTAL_VOTING_POWER`]
pub const QUORUM_THRESHOLD: u64 = 6_667;

/// Gas price statistic errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GasPriceError {
    #[error(transparent)]
    Validator(#[from] SystemStateError),

    #[error("total stake of {validators} validators is zero")]
    ZeroTotalStake { validators: usize },
}

/// Which gas price quote to read from each validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GasPriceField {
    /// Quote in force for the current epoch
    Current,

    /// Quote submitted for the next epoch
    #[default]
    NextEpoch,
}

impl GasPriceField {
    fn read(&self, validator: &Validator) -> Result<u64, SystemStateError> {
        match self {
            GasPriceField::Current => validator.gas_price(),
            GasPriceField::NextEpoch => validator.next_epoch_gas_price(),
        }
    }
}

/// The six reference gas price statistics of one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct GasPriceStatistics {
    pub min: u64,
    pub max: u64,
    pub mean: u64,
    pub median: u64,
    pub stake_weighted_mean: u64,
    pub estimated_next: u64,
}

/// Compute every statistic over `validators`
pub fn compute_statistics(
    validators: &[Validator],
    field: GasPriceField,
) -> Result<GasPriceStatistics, GasPriceError> {
    Ok(GasPriceStatistics {
        min: min_gas_price(validators, field)?,
        max: max_gas_price(validators, field)?,
        mean: mean_gas_price(validators, field)?,
        median: median_gas_price(validators, field)?,
        stake_weighted_mean: stake_weighted_mean_gas_price(validators, field)?,
        estimated_next: estimated_next_gas_price(validators, field)?,
    })
}

fn prices(validators: &[Validator], field: GasPriceField) -> Result<Vec<u64>, GasPriceError> {
    validators
        .iter()
        .map(|v| field.read(v).map_err(GasPriceError::from))
        .collect()
}

/// Lowest quote, 0 for an empty set
pub fn min_gas_price(validators: &[Validator], field: GasPriceField) -> Result<u64, GasPriceError> {
    Ok(prices(validators, field)?.into_iter().min().unwrap_or(0))
}

/// Highest quote, 0 for an empty set
pub fn max_gas_price(validators: &[Validator], field: GasPriceField) -> Result<u64, GasPriceError> {
    Ok(prices(validators, field)?.into_iter().max().unwrap_or(0))
}

/// Floor of the arithmetic mean, 0 for an empty set
pub fn mean_gas_price(validators: &[Validator], field: GasPriceField) -> Result<u64, GasPriceError> {
    let prices = prices(validators, field)?;
    if prices.is_empty() {
        return Ok(0);
    }

    let sum: u128 = prices.iter().map(|p| *p as u128).sum();
    Ok((sum / prices.len() as u128) as u64)
}

/// Median quote; even sets take the floor of the two central quotes' mean
pub fn median_gas_price(validators: &[Validator], field: GasPriceField) -> Result<u64, GasPriceError> {
    let mut prices = prices(validators, field)?;
    if prices.is_empty() {
        return Ok(0);
    }

    prices.sort_unstable();
    let mid = prices.len() / 2;

    if prices.len() % 2 == 0 {
        Ok(((prices[mid - 1] as u128 + prices[mid] as u128) / 2) as u64)
    } else {
        Ok(prices[mid])
    }
}

/// `Σ(price · stake) / Σstake`, accumulated in 256-bit integers
pub fn stake_weighted_mean_gas_price(
    validators: &[Validator],
    field: GasPriceField,
) -> Result<u64, GasPriceError> {
    if validators.is_empty() {
        return Ok(0);
    }

    let mut weighted = U256::ZERO;
    let mut total_stake = U256::ZERO;

    for validator in validators {
        let price = U256::from(field.read(validator)?);
        let stake = U256::from(validator.stake()?);

        weighted += price * stake;
        total_stake += stake;
    }

    if total_stake.is_zero() {
        return Err(GasPriceError::ZeroTotalStake {
            validators: validators.len(),
        });
    }

    // The weighted mean lies between min and max price, so it fits in u64
    Ok((weighted / total_stake).saturating_to::<u64>())
}

/// Estimate the next reference gas price
///
/// Walk the validators in ascending price order (stable, so ties keep their
/// original order) accumulating voting power; the quote of the validator
/// whose power brings the total to [`QUORUM_THRESHOLD`] is the estimate. A set
/// that never reaches quorum yields its highest quote.
pub fn estimated_next_gas_price(
    validators: &[Validator],
    field: GasPriceField,
) -> Result<u64, GasPriceError> {
    let mut quotes = validators
        .iter()
        .map(|v| Ok((field.read(v)?, v.voting_power()?)))
        .collect::<Result<Vec<(u64, u64)>, SystemStateError>>()?;

    quotes.sort_by_key(|(price, _)| *price);

    let mut cumulative_power = 0u64;
    let mut estimate = 0u64;

    for (price, power) in quotes {
        estimate = price;
        cumulative_power = cumulative_power.saturating_add(power);
        if cumulative_power >= QUORUM_THRESHOLD {
            break;
        }
    }

    Ok(estimate)
}

/// Share of the slashing quorum reached by the reporters of a validator
///
/// Uses the same [`QUORUM_THRESHOLD`] as the gas price estimate, capped at 100.
pub fn report_slashing_percentage(reporters_voting_power: u64) -> u64 {
    (reporters_voting_power.saturating_mul(100) / QUORUM_THRESHOLD).min(100)
}
