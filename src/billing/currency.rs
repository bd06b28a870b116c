//! Conversion between the portal's base currency and the provider's currency.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::config::PortalConfig;
use crate::error::{PortalError, PortalResult};

/// Amount ready to send to the payment provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderAmount {
    /// Provider currency, two decimal places.
    pub amount: Decimal,
    /// `amount` in the provider's minor units (cents).
    pub minor_units: i64,
    /// The converted amount was below the provider minimum and was raised to it.
    pub raised_to_minimum: bool,
}

/// What to do when a converted amount falls below the provider minimum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BelowMinimum {
    Raise,
    Reject,
}

/// `round_half_up(base / rate, 2)`
pub fn convert(base: Decimal, exchange_rate: Decimal) -> PortalResult<Decimal> {
    if exchange_rate <= Decimal::ZERO {
        return Err(PortalError::validation("exchange_rate", "must be greater than 0"));
    }
    let converted = base
        .checked_div(exchange_rate)
        .ok_or_else(|| PortalError::validation("pay_amount", "amount out of range"))?;
    let mut rounded = converted.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    Ok(rounded)
}

pub fn to_provider_amount(
    base: Decimal,
    config: &PortalConfig,
    below_minimum: BelowMinimum,
) -> PortalResult<ProviderAmount> {
    let mut amount = convert(base, config.exchange_rate)?;
    let mut raised_to_minimum = false;

    if amount < config.provider_minimum {
        match below_minimum {
            BelowMinimum::Raise => {
                amount = config.provider_minimum;
                raised_to_minimum = true;
            }
            BelowMinimum::Reject => {
                let floor_in_base = config.provider_minimum * config.exchange_rate;
                return Err(PortalError::validation(
                    "pay_amount",
                    format!(
                        "Amount too small for online payment. Minimum is about {}",
                        format_whole(&config.currency_label, floor_in_base)
                    ),
                ));
            }
        }
    }

    let minor_units = (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .ok_or_else(|| PortalError::validation("pay_amount", "amount out of range"))?;

    Ok(ProviderAmount {
        amount,
        minor_units,
        raised_to_minimum,
    })
}

/// Whole-unit council style: `LE 10,000`. Fractions are truncated.
pub fn format_whole(label: &str, amount: Decimal) -> String {
    let whole = amount.trunc().abs().to_u128().unwrap_or_default().to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if amount.trunc().is_sign_negative() && !amount.trunc().is_zero() {
        "-"
    } else {
        ""
    };
    format!("{} {}{}", label, sign, grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_convert_rounds_half_up() {
        assert_eq!(convert(dec!(10000), dec!(25000)).unwrap(), dec!(0.40));
        assert_eq!(convert(dec!(15000), dec!(25000)).unwrap(), dec!(0.60));
        // 125 / 25000 = 0.005
        assert_eq!(convert(dec!(125), dec!(25000)).unwrap(), dec!(0.01));
        assert!(convert(dec!(1), Decimal::ZERO).is_err());
    }

    #[test]
    fn test_fixed_amount_raised_to_floor() {
        let config = PortalConfig::default();
        let amount = to_provider_amount(dec!(10000), &config, BelowMinimum::Raise).unwrap();
        assert_eq!(amount.amount, dec!(0.50));
        assert_eq!(amount.minor_units, 50);
        assert!(amount.raised_to_minimum);
    }

    #[test]
    fn test_variable_amount_below_floor_rejected() {
        let config = PortalConfig::default();
        let err = to_provider_amount(dec!(10000), &config, BelowMinimum::Reject).unwrap_err();
        assert!(err.to_string().contains("pay_amount"));
        assert!(err.to_string().contains("LE 12,500"));

        let ok = to_provider_amount(dec!(15000), &config, BelowMinimum::Reject).unwrap();
        assert_eq!(ok.minor_units, 60);
        assert!(!ok.raised_to_minimum);
    }

    #[test]
    fn test_format_whole() {
        assert_eq!(format_whole("LE", dec!(10000)), "LE 10,000");
        assert_eq!(format_whole("LE", dec!(1234567.89)), "LE 1,234,567");
        assert_eq!(format_whole("LE", dec!(999)), "LE 999");
        assert_eq!(format_whole("LE", Decimal::ZERO), "LE 0");
    }
}
