//! Fiat fee to native payment conversion
//!
//! Conversion into smallest units is exact integer arithmetic on the
//! [`Decimal`] mantissas, widened to [`U256`]. Rounding happens once, at the
//! final division, and always rounds up so the attached payment never falls
//! short of the fee because of rounding.

use alloy::primitives::U256;
use rust_decimal::Decimal;

use crate::consts::NATIVE_DECIMALS;
use crate::errors::{SettlementError, SettlementResult};
use crate::oracle::Quote;

/// Converts between fiat amounts, whole native units and smallest native units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeConverter {
    decimals: u32,
}

impl Default for FeeConverter {
    fn default() -> Self {
        Self::new(NATIVE_DECIMALS)
    }
}

impl FeeConverter {
    pub fn new(decimals: u32) -> Self {
        Self { decimals }
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    fn pow10(exp: u32) -> Option<U256> {
        U256::from(10u8).checked_pow(U256::from(exp))
    }

    fn overflow(what: &str, value: Decimal) -> SettlementError {
        SettlementError::InvalidFee(format!("{} {} overflows", what, value))
    }

    /// Native payment, in smallest units, covering `fiat_fee` at `quote`
    pub fn to_native(&self, fiat_fee: Decimal, quote: &Quote) -> SettlementResult<U256> {
        if fiat_fee <= Decimal::ZERO {
            return Err(SettlementError::InvalidFee(format!(
                "fee must be positive, got {}",
                fiat_fee
            )));
        }
        if quote.rate <= Decimal::ZERO {
            return Err(SettlementError::InvalidFee(format!(
                "quote rate must be positive, got {}",
                quote.rate
            )));
        }

        // fee * 10^decimals / rate over mantissas:
        // (m_fee * 10^(decimals + s_rate)) / (m_rate * 10^s_fee)
        let numerator = self
            .decimals
            .checked_add(quote.rate.scale())
            .and_then(Self::pow10)
            .and_then(|p| p.checked_mul(U256::from(fiat_fee.mantissa().unsigned_abs())))
            .ok_or_else(|| Self::overflow("fee", fiat_fee))?;
        let denominator = Self::pow10(fiat_fee.scale())
            .and_then(|p| p.checked_mul(U256::from(quote.rate.mantissa().unsigned_abs())))
            .ok_or_else(|| Self::overflow("rate", quote.rate))?;

        let units = numerator / denominator;
        if (numerator % denominator).is_zero() {
            Ok(units)
        } else {
            Ok(units + U256::from(1u8))
        }
    }

    /// Smallest units for an amount given in whole native units (parseEther)
    pub fn parse_native(&self, amount: Decimal) -> SettlementResult<U256> {
        if amount.is_sign_negative() {
            return Err(SettlementError::InvalidFee(format!(
                "amount must not be negative, got {}",
                amount
            )));
        }

        let amount = amount.normalize();
        if amount.scale() > self.decimals {
            return Err(SettlementError::InvalidFee(format!(
                "amount {} has more than {} decimals",
                amount, self.decimals
            )));
        }

        Self::pow10(self.decimals - amount.scale())
            .and_then(|p| p.checked_mul(U256::from(amount.mantissa().unsigned_abs())))
            .ok_or_else(|| Self::overflow("amount", amount))
    }

    /// Whole native units for a smallest-unit amount (formatEther).
    /// `None` when the amount exceeds fixed-point range.
    pub fn format_native(&self, units: U256) -> Option<Decimal> {
        let raw = u128::try_from(units).ok()?;
        Decimal::try_from_i128_with_scale(i128::try_from(raw).ok()?, self.decimals)
            .ok()
            .map(|d| d.normalize())
    }

    /// Fiat value of a smallest-unit amount at `quote`, to cents
    pub fn to_fiat(&self, units: U256, quote: &Quote) -> Option<Decimal> {
        self.format_native(units)?
            .checked_mul(quote.rate)
            .map(|v| v.round_dp(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote(rate: Decimal) -> Quote {
        Quote::new(rate)
    }

    #[test]
    fn test_nineteen_dollars_at_2500() {
        let converter = FeeConverter::default();
        let wei = converter.to_native(dec!(19), &quote(dec!(2500))).unwrap();
        // 19 / 2500 = 0.0076 ETH
        assert_eq!(wei, U256::from(7_600_000_000_000_000u64));
    }

    #[test]
    fn test_rounds_up_once_at_the_end() {
        let converter = FeeConverter::default();
        // 1e18 / 3 = 333333333333333333.33..
        let wei = converter.to_native(dec!(1), &quote(dec!(3))).unwrap();
        assert_eq!(wei, U256::from(333_333_333_333_333_334u64));

        // exact results are not bumped
        let wei = converter.to_native(dec!(5), &quote(dec!(2))).unwrap();
        assert_eq!(wei, U256::from(2_500_000_000_000_000_000u64));
    }

    #[test]
    fn test_tiny_fee_is_still_positive() {
        let converter = FeeConverter::default();
        let wei = converter
            .to_native(dec!(0.000000000001), &quote(dec!(1000000)))
            .unwrap();
        assert_eq!(wei, U256::from(1u64));
    }

    #[test]
    fn test_positive_and_monotonic_in_fee() {
        let converter = FeeConverter::default();
        for rate in [dec!(0.37), dec!(3), dec!(2500), dec!(3187.42), dec!(98000)] {
            let q = quote(rate);
            let mut previous = U256::ZERO;
            for cents in 1..=2_000u32 {
                let fee = Decimal::new(cents as i64, 2);
                let wei = converter.to_native(fee, &q).unwrap();
                assert!(wei > U256::ZERO, "fee {} at {} not positive", fee, rate);
                assert!(wei >= previous, "fee {} at {} decreased", fee, rate);
                previous = wei;
            }
        }
    }

    #[test]
    fn test_invalid_inputs() {
        let converter = FeeConverter::default();
        let good = quote(dec!(2500));

        for fee in [dec!(0), dec!(-19)] {
            assert!(matches!(
                converter.to_native(fee, &good),
                Err(SettlementError::InvalidFee(_))
            ));
        }
        for rate in [dec!(0), dec!(-1)] {
            assert!(matches!(
                converter.to_native(dec!(19), &quote(rate)),
                Err(SettlementError::InvalidFee(_))
            ));
        }
    }

    #[test]
    fn test_large_fees_round_exactly() {
        let converter = FeeConverter::default();
        // 79e9 * 1e18 / 3 = 26333333333333333333333333333.33..
        let wei = converter
            .to_native(dec!(79000000000), &quote(dec!(3)))
            .unwrap();
        assert_eq!(
            wei,
            U256::from(26_333_333_333_333_333_333_333_333_334u128)
        );

        // 28 significant digits on both sides
        let wei = converter
            .to_native(Decimal::MAX, &quote(dec!(0.0000000000000000000000000001)))
            .unwrap();
        assert_eq!(
            wei,
            U256::from(Decimal::MAX.mantissa() as u128) * U256::from(10u8).pow(U256::from(46u8))
        );
    }

    #[test]
    fn test_overflow_is_invalid_fee() {
        let converter = FeeConverter::new(80);
        assert!(matches!(
            converter.to_native(dec!(1), &quote(dec!(1))),
            Err(SettlementError::InvalidFee(_))
        ));
    }

    #[test]
    fn test_parse_native() {
        let converter = FeeConverter::default();
        assert_eq!(
            converter.parse_native(dec!(0.01)).unwrap(),
            U256::from(10_000_000_000_000_000u64)
        );
        assert_eq!(converter.parse_native(dec!(0)).unwrap(), U256::ZERO);
        assert!(converter.parse_native(dec!(-1)).is_err());
        assert!(converter
            .parse_native(dec!(0.0000000000000000001))
            .is_err());
    }

    #[test]
    fn test_format_native_and_fiat() {
        let converter = FeeConverter::default();
        let wei = U256::from(7_600_000_000_000_000u64);
        assert_eq!(converter.format_native(wei), Some(dec!(0.0076)));
        assert_eq!(converter.to_fiat(wei, &quote(dec!(2500))), Some(dec!(19.00)));
        assert_eq!(converter.format_native(U256::MAX), None);
    }

    #[test]
    fn test_custom_decimals() {
        let converter = FeeConverter::new(6);
        let units = converter.to_native(dec!(19), &quote(dec!(2500))).unwrap();
        assert_eq!(units, U256::from(7_600u64));
        assert!(converter.parse_native(dec!(0.0000001)).is_err());
        assert_eq!(converter.parse_native(dec!(1.500000)).unwrap(), U256::from(1_500_000u64));
    }
}
