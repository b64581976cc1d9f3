//! Jewelry price calculation.
//!
//! Real jewelry is priced as `weight * rate + making + gemstones + diamonds`, plus GST. The rate
//! depends on the metal and gold purity named in the product's free-text material, or on a fixed
//! per-gram rate for products billed that way. Imitation jewelry has no metal value: it always
//! produces an all-zero breakdown and is sold at its flat catalog price, without GST.
//!
//! Intermediate arithmetic keeps full precision; every monetary field is rounded to two decimals
//! (half away from zero) only where it is exposed. Inputs that would overflow `Decimal` yield
//! [`PricingError::Overflow`] instead of a price.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::config::PricingConfig;
use crate::rates::{Metal, MetalRates};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JewelryType {
    #[default]
    Real,
    Imitation,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillingMode {
    /// Priced from the most recent market rate
    #[default]
    LiveRate,
    /// Priced from the product's own per-gram rate
    FixedRate,
}

/// Gold fineness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purity {
    K24,
    K22,
    K18,
}

impl Purity {
    /// Read the purity out of a material description such as "22K Gold" or "18 k rose gold".
    /// Matching ignores case and whitespace; anything unrecognized is treated as 22k.
    pub fn from_material(material: &str) -> Self {
        let normalized: String = material.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_lowercase();

        if normalized.contains("24k") {
            Purity::K24
        } else if normalized.contains("22k") {
            Purity::K22
        } else if normalized.contains("18k") {
            Purity::K18
        } else {
            Purity::K22
        }
    }

    pub fn rate(self, rates: &MetalRates) -> Decimal {
        match self {
            Purity::K24 => rates.gold_24k,
            Purity::K22 => rates.gold_22k,
            Purity::K18 => rates.gold_18k,
        }
    }
}

pub fn metal_from_material(material: &str) -> Metal {
    if material.to_lowercase().contains("silver") {
        Metal::Silver
    } else {
        Metal::Gold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("Price is too large to compute")]
    Overflow,
}

/// Largest amount a `NUMERIC(14, 2)` money column holds.
pub fn max_amount() -> Decimal {
    Decimal::new(99_999_999_999_999, 2)
}

/// Sum amounts, failing instead of overflowing.
pub fn checked_sum(amounts: impl IntoIterator<Item = Decimal>) -> Result<Decimal, PricingError> {
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, Decimal::checked_add)
        .ok_or(PricingError::Overflow)
}

fn checked_mul(a: Decimal, b: Decimal) -> Result<Decimal, PricingError> {
    a.checked_mul(b).ok_or(PricingError::Overflow)
}

/// Round a monetary amount to two decimals, half away from zero.
pub fn money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Everything needed to price one unit of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PricingInput {
    /// Weight in grams
    pub weight: Decimal,
    /// Free-text material, e.g. "22K Gold" or "Sterling Silver"
    pub material: String,
    #[serde(default)]
    pub jewelry_type: JewelryType,
    #[serde(default)]
    pub billing_mode: BillingMode,
    #[serde(default)]
    pub fixed_rate_per_gram: Option<Decimal>,
    #[serde(default)]
    pub making_charges: Decimal,
    #[serde(default)]
    pub gemstones_cost: Decimal,
    #[serde(default)]
    pub diamonds_cost: Decimal,
}

/// Itemized price of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PricingBreakdown {
    pub weight: Decimal,
    pub rate_per_gram: Decimal,
    pub metal_cost: Decimal,
    pub making_charges: Decimal,
    pub gemstones_cost: Decimal,
    pub diamonds_cost: Decimal,
    pub subtotal: Decimal,
    pub gst_amount: Decimal,
    pub final_price: Decimal,
}

impl PricingBreakdown {
    pub fn zero() -> Self {
        Self {
            weight: Decimal::ZERO,
            rate_per_gram: Decimal::ZERO,
            metal_cost: Decimal::ZERO,
            making_charges: Decimal::ZERO,
            gemstones_cost: Decimal::ZERO,
            diamonds_cost: Decimal::ZERO,
            subtotal: Decimal::ZERO,
            gst_amount: Decimal::ZERO,
            final_price: Decimal::ZERO,
        }
    }

    /// Breakdown for `quantity` units. The per-gram rate is unchanged.
    pub fn scale(&self, quantity: i32) -> Result<Self, PricingError> {
        let q = Decimal::from(quantity);
        Ok(Self {
            weight: checked_mul(self.weight, q)?,
            rate_per_gram: self.rate_per_gram,
            metal_cost: checked_mul(self.metal_cost, q)?,
            making_charges: checked_mul(self.making_charges, q)?,
            gemstones_cost: checked_mul(self.gemstones_cost, q)?,
            diamonds_cost: checked_mul(self.diamonds_cost, q)?,
            subtotal: checked_mul(self.subtotal, q)?,
            gst_amount: checked_mul(self.gst_amount, q)?,
            final_price: checked_mul(self.final_price, q)?,
        })
    }
}

/// Price of one cart or order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineQuote {
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub gst_amount: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Copy)]
pub struct PriceCalculator {
    gst_rate: Decimal,
}

impl Default for PriceCalculator {
    fn default() -> Self {
        Self::new(&PricingConfig::default())
    }
}

impl PriceCalculator {
    pub fn new(config: &PricingConfig) -> Self {
        Self { gst_rate: config.gst_rate }
    }

    /// Per-gram rate applied to a product. Zero for imitation jewelry.
    pub fn rate_per_gram(&self, input: &PricingInput, rates: &MetalRates) -> Decimal {
        if input.jewelry_type == JewelryType::Imitation {
            return Decimal::ZERO;
        }

        if input.billing_mode == BillingMode::FixedRate
            && let Some(fixed) = input.fixed_rate_per_gram
        {
            return fixed;
        }

        match metal_from_material(&input.material) {
            Metal::Silver => rates.silver,
            Metal::Gold => Purity::from_material(&input.material).rate(rates),
        }
    }

    pub fn breakdown(&self, input: &PricingInput, rates: &MetalRates) -> Result<PricingBreakdown, PricingError> {
        if input.jewelry_type == JewelryType::Imitation {
            return Ok(PricingBreakdown::zero());
        }

        let rate = self.rate_per_gram(input, rates);
        let metal_cost = checked_mul(input.weight, rate)?;
        let subtotal = checked_sum([metal_cost, input.making_charges, input.gemstones_cost, input.diamonds_cost])?;
        let gst_amount = checked_mul(subtotal, self.gst_rate)?;
        let final_price = checked_mul(subtotal, Decimal::ONE.checked_add(self.gst_rate).ok_or(PricingError::Overflow)?)?;

        Ok(PricingBreakdown {
            weight: input.weight,
            rate_per_gram: money(rate),
            metal_cost: money(metal_cost),
            making_charges: money(input.making_charges),
            gemstones_cost: money(input.gemstones_cost),
            diamonds_cost: money(input.diamonds_cost),
            subtotal: money(subtotal),
            gst_amount: money(gst_amount),
            final_price: money(final_price),
        })
    }

    /// Price `quantity` units of a product. Imitation items use their flat catalog price with no
    /// GST; a missing flat price counts as zero.
    pub fn quote_line(
        &self,
        input: &PricingInput,
        flat_price: Option<Decimal>,
        quantity: i32,
        rates: &MetalRates,
    ) -> Result<LineQuote, PricingError> {
        let q = Decimal::from(quantity);

        if input.jewelry_type == JewelryType::Imitation {
            let unit_price = money(flat_price.unwrap_or_default());
            let total = checked_mul(unit_price, q)?;
            return Ok(LineQuote {
                unit_price,
                subtotal: total,
                gst_amount: Decimal::ZERO,
                total,
            });
        }

        let line = self.breakdown(input, rates)?.scale(quantity)?;
        let unit_price = line.final_price.checked_div(q).ok_or(PricingError::Overflow)?;
        Ok(LineQuote {
            unit_price: money(unit_price),
            subtotal: line.subtotal,
            gst_amount: line.gst_amount,
            total: line.final_price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates() -> MetalRates {
        MetalRates {
            gold_24k: Decimal::from(7200),
            gold_22k: Decimal::from(6600),
            gold_18k: Decimal::from(5400),
            silver: Decimal::from(90),
        }
    }

    fn gold(weight: Decimal, material: &str) -> PricingInput {
        PricingInput {
            weight,
            material: material.to_string(),
            jewelry_type: JewelryType::Real,
            billing_mode: BillingMode::LiveRate,
            fixed_rate_per_gram: None,
            making_charges: Decimal::ZERO,
            gemstones_cost: Decimal::ZERO,
            diamonds_cost: Decimal::ZERO,
        }
    }

    #[test]
    fn test_purity_parsing() {
        assert_eq!(Purity::from_material("22K Gold"), Purity::K22);
        assert_eq!(Purity::from_material("gold 22 k"), Purity::K22);
        assert_eq!(Purity::from_material("24k Pure Gold"), Purity::K24);
        assert_eq!(Purity::from_material("18 K Rose Gold"), Purity::K18);
        assert_eq!(Purity::from_material("Gold"), Purity::K22);
        assert_eq!(Purity::from_material("platinum"), Purity::K22);
        assert_eq!(Purity::from_material(""), Purity::K22);
    }

    #[test]
    fn test_metal_from_material() {
        assert_eq!(metal_from_material("Sterling SILVER"), Metal::Silver);
        assert_eq!(metal_from_material("22K Gold"), Metal::Gold);
    }

    #[test]
    fn test_real_gold_breakdown() {
        let calc = PriceCalculator::default();
        let input = PricingInput {
            making_charges: Decimal::from(1500),
            gemstones_cost: Decimal::from(2000),
            diamonds_cost: Decimal::from(500),
            ..gold(Decimal::new(10, 0), "22K Gold")
        };

        let b = calc.breakdown(&input, &rates()).unwrap();
        assert_eq!(b.rate_per_gram, Decimal::from(6600));
        assert_eq!(b.metal_cost, Decimal::from(66000));
        assert_eq!(b.subtotal, Decimal::from(70000));
        assert_eq!(b.gst_amount, Decimal::from(2100));
        assert_eq!(b.final_price, Decimal::from(72100));
    }

    #[test]
    fn test_final_price_rounds_from_unrounded_subtotal() {
        let calc = PriceCalculator::default();
        // 3.333 g * 7200 = 23997.6, making 0.005 -> subtotal 23997.605
        let input = PricingInput {
            making_charges: Decimal::new(5, 3),
            ..gold(Decimal::new(3333, 3), "24k")
        };

        let b = calc.breakdown(&input, &rates()).unwrap();
        assert_eq!(b.subtotal, Decimal::new(2399761, 2));
        // 23997.605 * 1.03 = 24717.53315
        assert_eq!(b.final_price, Decimal::new(2471753, 2));
        // 23997.605 * 0.03 = 719.92815
        assert_eq!(b.gst_amount, Decimal::new(71993, 2));
    }

    #[test]
    fn test_final_price_matches_formula_across_inputs() {
        let calc = PriceCalculator::default();
        for (weight, material, making) in [
            (Decimal::new(1234, 3), "18k", Decimal::new(99999, 2)),
            (Decimal::new(50, 0), "24 K gold", Decimal::ZERO),
            (Decimal::new(7, 1), "silver anklet", Decimal::new(1, 2)),
            (Decimal::new(19995, 3), "unknown alloy", Decimal::new(12345, 1)),
        ] {
            let input = PricingInput {
                making_charges: making,
                gemstones_cost: Decimal::new(333, 1),
                diamonds_cost: Decimal::new(4, 0),
                ..gold(weight, material)
            };
            let rate = calc.rate_per_gram(&input, &rates());
            let expected = money((weight * rate + making + Decimal::new(333, 1) + Decimal::new(4, 0)) * Decimal::new(103, 2));
            assert_eq!(calc.breakdown(&input, &rates()).unwrap().final_price, expected, "material {material}");
        }
    }

    #[test]
    fn test_imitation_is_all_zero() {
        let calc = PriceCalculator::default();
        let input = PricingInput {
            jewelry_type: JewelryType::Imitation,
            making_charges: Decimal::from(100),
            ..gold(Decimal::from(25), "24K Gold")
        };

        assert_eq!(calc.breakdown(&input, &rates()).unwrap(), PricingBreakdown::zero());
        assert_eq!(calc.rate_per_gram(&input, &rates()), Decimal::ZERO);
    }

    #[test]
    fn test_silver_rates() {
        let calc = PriceCalculator::default();
        let live = gold(Decimal::from(10), "925 Sterling Silver");
        assert_eq!(calc.rate_per_gram(&live, &rates()), Decimal::from(90));

        let fixed = PricingInput {
            billing_mode: BillingMode::FixedRate,
            fixed_rate_per_gram: Some(Decimal::from(120)),
            ..live.clone()
        };
        assert_eq!(calc.rate_per_gram(&fixed, &rates()), Decimal::from(120));

        // Fixed billing without a configured rate falls back to the live rate
        let unset = PricingInput {
            billing_mode: BillingMode::FixedRate,
            ..live
        };
        assert_eq!(calc.rate_per_gram(&unset, &rates()), Decimal::from(90));
    }

    #[test]
    fn test_gold_fixed_rate() {
        let calc = PriceCalculator::default();
        let input = PricingInput {
            billing_mode: BillingMode::FixedRate,
            fixed_rate_per_gram: Some(Decimal::from(6000)),
            ..gold(Decimal::from(2), "22K Gold")
        };
        let b = calc.breakdown(&input, &rates()).unwrap();
        assert_eq!(b.metal_cost, Decimal::from(12000));
        assert_eq!(b.final_price, Decimal::from(12360));
    }

    #[test]
    fn test_scale_multiplies_components() {
        let calc = PriceCalculator::default();
        let input = PricingInput {
            making_charges: Decimal::from(500),
            ..gold(Decimal::from(1), "18k")
        };
        let one = calc.breakdown(&input, &rates()).unwrap();
        let three = one.scale(3).unwrap();

        assert_eq!(three.weight, Decimal::from(3));
        assert_eq!(three.rate_per_gram, one.rate_per_gram);
        assert_eq!(three.metal_cost, Decimal::from(16200));
        assert_eq!(three.subtotal, Decimal::from(17700));
        assert_eq!(three.final_price, one.final_price * Decimal::from(3));
    }

    #[test]
    fn test_quote_line() {
        let calc = PriceCalculator::default();
        let real = gold(Decimal::from(1), "22k");
        let quote = calc.quote_line(&real, None, 2, &rates()).unwrap();
        assert_eq!(quote.unit_price, Decimal::from(6798));
        assert_eq!(quote.subtotal, Decimal::from(13200));
        assert_eq!(quote.gst_amount, Decimal::from(396));
        assert_eq!(quote.total, Decimal::from(13596));

        let imitation = PricingInput {
            jewelry_type: JewelryType::Imitation,
            ..real
        };
        let quote = calc.quote_line(&imitation, Some(Decimal::new(49950, 2)), 3, &rates()).unwrap();
        assert_eq!(quote.unit_price, Decimal::new(49950, 2));
        assert_eq!(quote.gst_amount, Decimal::ZERO);
        assert_eq!(quote.total, Decimal::new(149850, 2));

        let quote = calc.quote_line(&imitation, None, 1, &rates()).unwrap();
        assert_eq!(quote.total, Decimal::ZERO);
    }

    #[test]
    fn test_custom_gst_rate() {
        let calc = PriceCalculator::new(&PricingConfig { gst_rate: Decimal::ZERO });
        let b = calc.breakdown(&gold(Decimal::from(1), "24k"), &rates()).unwrap();
        assert_eq!(b.gst_amount, Decimal::ZERO);
        assert_eq!(b.final_price, b.subtotal);
    }

    #[test]
    fn test_oversized_inputs_report_overflow() {
        let calc = PriceCalculator::default();
        let heavy = gold(Decimal::MAX, "22k gold");
        assert_eq!(calc.breakdown(&heavy, &rates()), Err(PricingError::Overflow));

        let near_max = gold(Decimal::MAX / Decimal::from(6600), "22k");
        assert_eq!(calc.breakdown(&near_max, &rates()), Err(PricingError::Overflow));

        let costly = PricingInput {
            making_charges: Decimal::MAX,
            diamonds_cost: Decimal::MAX,
            ..gold(Decimal::ONE, "24k")
        };
        assert_eq!(calc.breakdown(&costly, &rates()), Err(PricingError::Overflow));

        let ring = gold(Decimal::from(1_000_000_000_000_000_000_i64), "24k");
        assert!(calc.breakdown(&ring, &rates()).is_ok());
        assert_eq!(calc.quote_line(&ring, None, i32::MAX, &rates()), Err(PricingError::Overflow));

        let imitation = PricingInput {
            jewelry_type: JewelryType::Imitation,
            ..gold(Decimal::ONE, "brass")
        };
        assert_eq!(
            calc.quote_line(&imitation, Some(Decimal::MAX), 2, &rates()),
            Err(PricingError::Overflow)
        );
    }

    #[test]
    fn test_checked_sum() {
        assert_eq!(checked_sum([Decimal::ONE, Decimal::from(2)]), Ok(Decimal::from(3)));
        assert_eq!(checked_sum(Vec::<Decimal>::new()), Ok(Decimal::ZERO));
        assert_eq!(checked_sum([Decimal::MAX, Decimal::ONE]), Err(PricingError::Overflow));
    }
}
