//! System State Snapshot
//!
//! Point-in-time capture of the active validator set plus epoch and stake
//! bookkeeping, as returned by the reference RPC host. Numeric fields arrive
//! as decimal strings because they may exceed the 53-bit range of JSON
//! numbers; they are parsed on demand and a malformed field is always an
//! error naming the field, never a silent zero.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::gas::report_slashing_percentage;

/// Snapshot parsing / derivation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SystemStateError {
    #[error("invalid {field} '{raw}' for validator {validator}")]
    InvalidField {
        validator: String,
        field: &'static str,
        raw: String,
    },

    #[error("invalid {field} '{raw}' in system state")]
    InvalidState { field: &'static str, raw: String },

    #[error("epoch ended at {end} which is before {now}")]
    EpochElapsed { end: DateTime<Utc>, now: DateTime<Utc> },
}

// =============================================================================
// VALIDATOR
// =============================================================================

/// One active validator entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Validator {
    pub sui_address: String,
    pub name: String,
    pub voting_power: String,
    pub gas_price: String,
    pub next_epoch_gas_price: String,
    pub staking_pool_sui_balance: String,
    pub next_epoch_stake: String,
    pub commission_rate: String,
    pub next_epoch_commission_rate: String,
    pub net_address: String,
    pub p2p_address: String,
    pub primary_address: String,
}

impl Validator {
    /// Current epoch gas price quote
    pub fn gas_price(&self) -> Result<u64, SystemStateError> {
        self.parse_field("gasPrice", &self.gas_price)
    }

    /// Gas price quote for the next epoch
    pub fn next_epoch_gas_price(&self) -> Result<u64, SystemStateError> {
        self.parse_field("nextEpochGasPrice", &self.next_epoch_gas_price)
    }

    /// Voting power in basis points of the total
    pub fn voting_power(&self) -> Result<u64, SystemStateError> {
        self.parse_field("votingPower", &self.voting_power)
    }

    /// Stake currently in the validator's pool
    pub fn stake(&self) -> Result<u128, SystemStateError> {
        self.parse_field("stakingPoolSuiBalance", &self.staking_pool_sui_balance)
    }

    fn parse_field<T: std::str::FromStr>(&self, field: &'static str, raw: &str) -> Result<T, SystemStateError> {
        raw.trim().parse::<T>().map_err(|_| SystemStateError::InvalidField {
            validator: self.display_name().to_string(),
            field,
            raw: raw.to_string(),
        })
    }

    /// Name if set, otherwise the address
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.sui_address
        } else {
            &self.name
        }
    }
}

// =============================================================================
// SYSTEM STATE
// =============================================================================

/// Latest system state summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemState {
    pub epoch: String,
    pub protocol_version: String,
    pub reference_gas_price: String,
    pub total_stake: String,
    pub storage_fund_total_object_storage_rebates: String,
    pub storage_fund_non_refundable_balance: String,
    pub stake_subsidy_balance: String,
    pub epoch_start_timestamp_ms: String,
    pub epoch_duration_ms: String,
    pub active_validators: Vec<Validator>,

    /// `(address, epochs at risk)`; the count is a number on some nodes, a string on others
    pub at_risk_validators: Vec<(String, serde_json::Value)>,

    /// `(reported address, reporter addresses)`
    pub validator_report_records: Vec<(String, Vec<String>)>,

    /// Filled from a separate APY call, keyed by validator address
    #[serde(skip_deserializing)]
    pub validators_apy: HashMap<String, f64>,
}

/// Epoch timing derived from a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpochInfo {
    pub epoch: u64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    #[serde(with = "duration_secs")]
    pub time_to_next_epoch: Duration,
}

/// Helper module for serializing durations as whole seconds
mod duration_secs {
    use chrono::Duration;
    use serde::{Serialize, Serializer};

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.num_seconds().serialize(serializer)
    }
}

/// Aggregated reports against one validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatorReport {
    pub address: String,
    pub name: String,
    pub reporters: Vec<String>,
    pub reporters_voting_power: u64,
    pub slashing_percentage: u64,
}

/// Response of the validators APY call
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ValidatorsApy {
    pub apys: Vec<ValidatorApy>,
    pub epoch: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ValidatorApy {
    pub address: String,
    pub apy: f64,
}

impl SystemState {
    /// Current epoch number
    pub fn epoch_number(&self) -> Result<u64, SystemStateError> {
        parse_state_field("epoch", &self.epoch)
    }

    /// Reference gas price in force for the current epoch
    pub fn current_reference_gas_price(&self) -> Result<u64, SystemStateError> {
        parse_state_field("referenceGasPrice", &self.reference_gas_price)
    }

    /// Derive epoch start/end and time remaining relative to `now`
    pub fn epoch_info(&self, now: DateTime<Utc>) -> Result<EpochInfo, SystemStateError> {
        let start_ms: i64 = parse_state_field("epochStartTimestampMs", &self.epoch_start_timestamp_ms)?;
        let duration_ms: i64 = parse_state_field("epochDurationMs", &self.epoch_duration_ms)?;

        let start = DateTime::<Utc>::from_timestamp_millis(start_ms).ok_or_else(|| {
            SystemStateError::InvalidState {
                field: "epochStartTimestampMs",
                raw: self.epoch_start_timestamp_ms.clone(),
            }
        })?;
        let duration = Duration::milliseconds(duration_ms);
        let end = start + duration;

        if end < now {
            return Err(SystemStateError::EpochElapsed { end, now });
        }

        Ok(EpochInfo {
            epoch: self.epoch_number()?,
            start,
            end,
            duration,
            time_to_next_epoch: end - now,
        })
    }

    /// Merge an APY response into the snapshot
    pub fn set_apys(&mut self, apys: ValidatorsApy) {
        self.validators_apy = apys.apys.into_iter().map(|a| (a.address, a.apy)).collect();
    }

    /// Reports grouped per validator with the resulting slashing percentage
    ///
    /// Reporters that are not in the active set contribute no voting power.
    pub fn validator_reports(&self) -> Result<Vec<ValidatorReport>, SystemStateError> {
        let mut power_by_address = HashMap::with_capacity(self.active_validators.len());
        for validator in &self.active_validators {
            power_by_address.insert(validator.sui_address.as_str(), validator.voting_power()?);
        }

        let reports = self
            .validator_report_records
            .iter()
            .map(|(address, reporters)| {
                let reporters_voting_power = reporters
                    .iter()
                    .filter_map(|r| power_by_address.get(r.as_str()))
                    .sum::<u64>();

                let name = self
                    .active_validators
                    .iter()
                    .find(|v| &v.sui_address == address)
                    .map(|v| v.name.clone())
                    .unwrap_or_default();

                ValidatorReport {
                    address: address.clone(),
                    name,
                    reporters: reporters.clone(),
                    reporters_voting_power,
                    slashing_percentage: report_slashing_percentage(reporters_voting_power),
                }
            })
            .collect();

        Ok(reports)
    }
}

fn parse_state_field<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<T, SystemStateError> {
    raw.trim().parse::<T>().map_err(|_| SystemStateError::InvalidState {
        field,
        raw: raw.to_string(),
    })
}
