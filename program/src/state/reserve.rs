use borsh::{BorshDeserialize, BorshSerialize};
use derive_more::Display;
use num_enum::IntoPrimitive;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use serde_with::DisplayFromStr;
use solana_program::pubkey::Pubkey;
use tracing::debug;

use crate::error::LendingError;
use crate::state::{MAX_PERCENT, WAD};
use crate::LendingResult;

// Important note about values representation in this module.
// All rates, ratios and shares are whole percents stored as u8 (value 5 means 5%). The only
// exception is `borrow_fee_wad` which is a fixed point fraction with 18 digits after the
// delimiter i.e. WAD (10^18) means 100% and 10^16 means 1%.
// There is no floating point anywhere: invariant checks compare integers exactly, the same way
// the lending program compares them.

/// Numbered rules a ReserveConfig must satisfy. `validate` checks them in ascending order and
/// reports the first one broken, so the number is stable for given input.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
#[repr(u8)]
pub enum ConfigInvariant {
    #[display(fmt = "min_borrow_rate <= optimal_borrow_rate <= max_borrow_rate")]
    BorrowRateOrder = 1,

    #[display(fmt = "loan_to_value_ratio < liquidation_threshold <= 100")]
    LiquidationThreshold = 2,

    #[display(fmt = "optimal_utilization_rate must be in range [0, 100] %")]
    OptimalUtilizationRate = 3,

    #[display(fmt = "host_fee_percentage must be in range [0, 100] %")]
    HostFeePercentage = 4,

    // 5 is the non-negative liquidity amount. It holds by construction for u64 and textual
    // input is rejected by `parse_amount` with LendingError::InvalidAmount.
    #[display(fmt = "liquidation_bonus must be in range [0, 100] %")]
    LiquidationBonus = 6,

    #[display(fmt = "borrow_fee_wad must be less than WAD (100%)")]
    BorrowFee = 7,

    #[display(fmt = "max_borrow_rate must be in range [0, 255] %")]
    BorrowRateRange = 8,
}

impl ConfigInvariant {
    pub fn index(self) -> u8 {
        self.into()
    }
}

/// Reserve configuration. Interest rate curve, collateral ratios and fees.
#[derive(
    BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
)]
pub struct ReserveConfig {
    /// Utilization rate at which the borrow rate curve switches from optimal to max slope
    pub optimal_utilization_rate: u8,
    /// Share of collateral value which can be borrowed
    pub loan_to_value_ratio: u8,
    /// Bonus a liquidator gets when repaying part of an unhealthy obligation
    pub liquidation_bonus: u8,
    /// Loan to value ratio at which an obligation can be liquidated
    pub liquidation_threshold: u8,
    /// Min borrow APY
    pub min_borrow_rate: u8,
    /// Optimal (utilization) borrow APY
    pub optimal_borrow_rate: u8,
    /// Max borrow APY
    pub max_borrow_rate: u8,
    /// Program owner fees assessed, separate from gains due to interest accrual
    pub fees: ReserveFees,
}

impl Default for ReserveConfig {
    fn default() -> Self {
        Self {
            optimal_utilization_rate: 80,
            loan_to_value_ratio: 50,
            liquidation_bonus: 5,
            liquidation_threshold: 55,
            min_borrow_rate: 0,
            optimal_borrow_rate: 4,
            max_borrow_rate: 30,
            fees: ReserveFees::default(),
        }
    }
}

impl ReserveConfig {
    /// Validate the reserve config before it is packed in to InitReserve request.
    pub fn validate(&self) -> LendingResult<()> {
        ReserveConfigInput::from(*self).validate()
    }
}

/// [ReserveConfig] as typed by the user. Percentages are not narrowed to u8 yet so a value like
/// 300 is reported as the invariant it breaks rather than as a parse failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReserveConfigInput {
    pub optimal_utilization_rate: u64,
    pub loan_to_value_ratio: u64,
    pub liquidation_bonus: u64,
    pub liquidation_threshold: u64,
    pub min_borrow_rate: u64,
    pub optimal_borrow_rate: u64,
    pub max_borrow_rate: u64,
    pub borrow_fee_wad: u64,
    pub host_fee_percentage: u64,
}

impl From<ReserveConfig> for ReserveConfigInput {
    fn from(config: ReserveConfig) -> Self {
        Self {
            optimal_utilization_rate: config.optimal_utilization_rate.into(),
            loan_to_value_ratio: config.loan_to_value_ratio.into(),
            liquidation_bonus: config.liquidation_bonus.into(),
            liquidation_threshold: config.liquidation_threshold.into(),
            min_borrow_rate: config.min_borrow_rate.into(),
            optimal_borrow_rate: config.optimal_borrow_rate.into(),
            max_borrow_rate: config.max_borrow_rate.into(),
            borrow_fee_wad: config.fees.borrow_fee_wad,
            host_fee_percentage: config.fees.host_fee_percentage.into(),
        }
    }
}

impl TryFrom<ReserveConfigInput> for ReserveConfig {
    type Error = LendingError;

    fn try_from(input: ReserveConfigInput) -> LendingResult<Self> {
        input.validate()?;

        // All fields fit in u8 once invariants hold
        Ok(Self {
            optimal_utilization_rate: input.optimal_utilization_rate as u8,
            loan_to_value_ratio: input.loan_to_value_ratio as u8,
            liquidation_bonus: input.liquidation_bonus as u8,
            liquidation_threshold: input.liquidation_threshold as u8,
            min_borrow_rate: input.min_borrow_rate as u8,
            optimal_borrow_rate: input.optimal_borrow_rate as u8,
            max_borrow_rate: input.max_borrow_rate as u8,
            fees: ReserveFees {
                borrow_fee_wad: input.borrow_fee_wad,
                host_fee_percentage: input.host_fee_percentage as u8,
            },
        })
    }
}

impl ReserveConfigInput {
    pub fn validate(&self) -> LendingResult<()> {
        self.first_violation()
            .map_or(Ok(()), |invariant| Err(LendingError::InvalidConfig(invariant)))
    }

    fn first_violation(&self) -> Option<ConfigInvariant> {
        let max_percent = u64::from(MAX_PERCENT);

        if self.optimal_borrow_rate < self.min_borrow_rate
            || self.optimal_borrow_rate > self.max_borrow_rate
        {
            debug!(
                "borrow rates {} / {} / {} are not ordered",
                self.min_borrow_rate, self.optimal_borrow_rate, self.max_borrow_rate
            );
            return Some(ConfigInvariant::BorrowRateOrder);
        }

        if self.liquidation_threshold <= self.loan_to_value_ratio
            || self.liquidation_threshold > max_percent
        {
            debug!(
                "liquidation_threshold {} must be in range (loan_to_value_ratio, 100] i.e. ({}, 100] %",
                self.liquidation_threshold, self.loan_to_value_ratio
            );
            return Some(ConfigInvariant::LiquidationThreshold);
        }

        if self.optimal_utilization_rate > max_percent {
            debug!(
                "optimal_utilization_rate {} must be in range [0, 100] %",
                self.optimal_utilization_rate
            );
            return Some(ConfigInvariant::OptimalUtilizationRate);
        }

        if self.host_fee_percentage > max_percent {
            debug!(
                "host_fee_percentage {} must be in range [0, 100] %",
                self.host_fee_percentage
            );
            return Some(ConfigInvariant::HostFeePercentage);
        }

        if self.liquidation_bonus > max_percent {
            debug!(
                "liquidation_bonus {} must be in range [0, 100] %",
                self.liquidation_bonus
            );
            return Some(ConfigInvariant::LiquidationBonus);
        }

        if self.borrow_fee_wad >= WAD {
            debug!("borrow_fee_wad {} can't reach WAD", self.borrow_fee_wad);
            return Some(ConfigInvariant::BorrowFee);
        }

        // Rates are ordered at this point, so the max bounds all three
        if self.max_borrow_rate > u64::from(u8::MAX) {
            debug!(
                "max_borrow_rate {} must be in range [0, 255] %",
                self.max_borrow_rate
            );
            return Some(ConfigInvariant::BorrowRateRange);
        }

        None
    }
}

#[derive(
    BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
)]
pub struct ReserveFees {
    /// Fee assessed on borrow, expressed as a WAD. Must be between 0 and 10^18, such that 10^18 = 1.
    /// E.g. 0.01% (1 basis point) = 100_000_000_000_000 and 1% = 10_000_000_000_000_000.
    pub borrow_fee_wad: u64,
    /// Part of the borrow fee which goes to the host (the one who maintains the market UI)
    pub host_fee_percentage: u8,
}

impl Default for ReserveFees {
    fn default() -> Self {
        Self {
            borrow_fee_wad: 1_000_000_000_000_000, // 0.1%
            host_fee_percentage: 20,
        }
    }
}

/// Reserve is one currency of the lending market together with its rate and risk settings and
/// the liquidity it is seeded with.
#[serde_as]
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reserve {
    /// Lending market the reserve is added to. Existence of the market is checked by the
    /// lending program only.
    #[serde_as(as = "DisplayFromStr")]
    pub market: Pubkey,
    /// Token account initial liquidity is transferred from
    #[serde_as(as = "DisplayFromStr")]
    pub liquidity_source: Pubkey,
    /// Initial liquidity in smallest token units
    pub liquidity_amount: u64,
    /// Price feed. None when the reserve has no external price source.
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub oracle: Option<Pubkey>,
    pub config: ReserveConfig,
}

impl Reserve {
    pub fn new(
        market: Pubkey,
        liquidity_source: Pubkey,
        liquidity_amount: u64,
        oracle: Option<Pubkey>,
        config: ReserveConfig,
    ) -> LendingResult<Self> {
        config.validate()?;

        Ok(Self {
            market,
            liquidity_source,
            liquidity_amount,
            oracle,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn invariant(config: &ReserveConfig) -> Option<u8> {
        match config.validate() {
            Ok(()) => None,
            Err(LendingError::InvalidConfig(invariant)) => Some(invariant.index()),
            Err(err) => panic!("unexpected error {}", err),
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert_eq!(ReserveConfig::default().validate(), Ok(()));
    }

    #[test]
    fn borrow_rates_must_be_ordered() {
        let mut config = ReserveConfig::default();

        config.min_borrow_rate = 5;
        config.optimal_borrow_rate = 4;
        assert_eq!(invariant(&config), Some(1));

        config.min_borrow_rate = 0;
        config.optimal_borrow_rate = 31;
        assert_eq!(invariant(&config), Some(1));

        // Equal rates are allowed
        config.min_borrow_rate = 30;
        config.optimal_borrow_rate = 30;
        config.max_borrow_rate = 30;
        assert_eq!(invariant(&config), None);

        // Borrow APY above 100% is not a violation
        config.max_borrow_rate = 250;
        assert_eq!(invariant(&config), None);
    }

    #[test]
    fn liquidation_threshold_bounds() {
        let mut config = ReserveConfig::default();

        config.liquidation_threshold = config.loan_to_value_ratio;
        assert_eq!(invariant(&config), Some(2));

        config.liquidation_threshold = config.loan_to_value_ratio - 1;
        assert_eq!(invariant(&config), Some(2));

        config.liquidation_threshold = 101;
        assert_eq!(invariant(&config), Some(2));

        config.loan_to_value_ratio = 99;
        config.liquidation_threshold = 100;
        assert_eq!(invariant(&config), None);

        config.loan_to_value_ratio = 100;
        assert_eq!(invariant(&config), Some(2));
    }

    #[test]
    fn percentage_bounds() {
        let mut config = ReserveConfig::default();
        config.optimal_utilization_rate = 101;
        assert_eq!(invariant(&config), Some(3));
        config.optimal_utilization_rate = 100;
        assert_eq!(invariant(&config), None);

        config.fees.host_fee_percentage = 101;
        assert_eq!(invariant(&config), Some(4));
        config.fees.host_fee_percentage = 100;
        assert_eq!(invariant(&config), None);

        config.liquidation_bonus = 101;
        assert_eq!(invariant(&config), Some(6));
        config.liquidation_bonus = 100;
        assert_eq!(invariant(&config), None);
    }

    #[test]
    fn borrow_fee_below_one() {
        let mut config = ReserveConfig::default();
        config.fees.borrow_fee_wad = WAD;
        assert_eq!(invariant(&config), Some(7));

        config.fees.borrow_fee_wad = WAD - 1;
        assert_eq!(invariant(&config), None);

        config.fees.borrow_fee_wad = 0;
        assert_eq!(invariant(&config), None);
    }

    #[test]
    fn first_violation_wins() {
        // Every rule is broken at once
        let config = ReserveConfig {
            optimal_utilization_rate: 200,
            loan_to_value_ratio: 90,
            liquidation_bonus: 200,
            liquidation_threshold: 80,
            min_borrow_rate: 10,
            optimal_borrow_rate: 5,
            max_borrow_rate: 1,
            fees: ReserveFees {
                borrow_fee_wad: u64::MAX,
                host_fee_percentage: 200,
            },
        };
        assert_eq!(invariant(&config), Some(1));

        let config = ReserveConfig {
            min_borrow_rate: 0,
            optimal_borrow_rate: 4,
            max_borrow_rate: 30,
            ..config
        };
        assert_eq!(invariant(&config), Some(2));

        let config = ReserveConfig {
            liquidation_threshold: 95,
            ..config
        };
        assert_eq!(invariant(&config), Some(3));

        let config = ReserveConfig {
            optimal_utilization_rate: 80,
            ..config
        };
        assert_eq!(invariant(&config), Some(4));

        let config = ReserveConfig {
            fees: ReserveFees {
                host_fee_percentage: 20,
                ..config.fees
            },
            ..config
        };
        assert_eq!(invariant(&config), Some(6));

        let config = ReserveConfig {
            liquidation_bonus: 5,
            ..config
        };
        assert_eq!(invariant(&config), Some(7));
    }

    #[test]
    fn wide_input_reports_invariant_instead_of_overflow() {
        let defaults = ReserveConfigInput::from(ReserveConfig::default());
        assert_eq!(
            ReserveConfig::try_from(defaults),
            Ok(ReserveConfig::default())
        );

        let input = ReserveConfigInput {
            optimal_utilization_rate: 300,
            ..defaults
        };
        assert_eq!(
            ReserveConfig::try_from(input),
            Err(LendingError::InvalidConfig(
                ConfigInvariant::OptimalUtilizationRate
            ))
        );

        // Broken rate order is reported before the oversized host fee
        let input = ReserveConfigInput {
            min_borrow_rate: 10,
            host_fee_percentage: 256,
            ..defaults
        };
        assert_eq!(
            ReserveConfig::try_from(input),
            Err(LendingError::InvalidConfig(ConfigInvariant::BorrowRateOrder))
        );

        let input = ReserveConfigInput {
            liquidation_bonus: 1000,
            ..defaults
        };
        assert_eq!(
            ReserveConfig::try_from(input),
            Err(LendingError::InvalidConfig(ConfigInvariant::LiquidationBonus))
        );
    }

    #[test]
    fn borrow_rates_must_fit_in_u8() {
        let input = ReserveConfigInput {
            max_borrow_rate: 256,
            ..ReserveConfigInput::from(ReserveConfig::default())
        };
        assert_eq!(
            input.validate(),
            Err(LendingError::InvalidConfig(ConfigInvariant::BorrowRateRange))
        );

        let input = ReserveConfigInput {
            max_borrow_rate: 255,
            ..input
        };
        let config = ReserveConfig::try_from(input).expect("valid config");
        assert_eq!(config.max_borrow_rate, 255);
    }

    #[test]
    fn invalid_config_is_not_turned_in_to_reserve() {
        let config = ReserveConfig {
            min_borrow_rate: 50,
            ..Default::default()
        };

        assert_matches!(
            Reserve::new(
                Pubkey::new_unique(),
                Pubkey::new_unique(),
                1000,
                None,
                config
            ),
            Err(LendingError::InvalidConfig(ConfigInvariant::BorrowRateOrder))
        );
    }

    #[test]
    fn error_message_names_invariant() {
        let err = LendingError::InvalidConfig(ConfigInvariant::LiquidationThreshold);
        assert_eq!(
            err.to_string(),
            "invalid config: invariant 2 violated, loan_to_value_ratio < liquidation_threshold <= 100"
        );
    }
}
