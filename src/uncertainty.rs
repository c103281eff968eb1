//! Measurement uncertainty of parsed values.
//!
//! Every numeric column with a unit gets a sigma. Configured tolerances win;
//! otherwise the sigma is the quantization step of the instrument in the
//! range active for that row.

use crate::error::{ExtractError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of ADC steps across a measurement range
pub const ADC_STEPS: f64 = 65536.0;

/// Potential span assumed when the header does not provide one (V)
pub const DEFAULT_E_RANGE: f64 = 20.0;

/// Time base of the potentiostat clock (s)
pub const TIME_RESOLUTION: f64 = 1e-6;

/// Relative precision of values printed in text exports
pub const TEXT_PRECISION: f64 = 1e-6;

/// Absolute and relative tolerance; unset fields fall back to the global default
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atol: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtol: Option<f64>,
}

impl Tolerance {
    pub fn new(atol: f64, rtol: f64) -> Self {
        Self {
            atol: Some(atol),
            rtol: Some(rtol),
        }
    }

    pub fn absolute(atol: f64) -> Self {
        Self {
            atol: Some(atol),
            rtol: None,
        }
    }

    pub fn relative(rtol: f64) -> Self {
        Self {
            atol: None,
            rtol: Some(rtol),
        }
    }

    /// `max(atol, rtol * |value|)`
    pub fn sigma(&self, value: f64, fallback: &Tolerance) -> f64 {
        let atol = self.atol.or(fallback.atol).unwrap_or(0.0);
        let rtol = self.rtol.or(fallback.rtol).unwrap_or(0.0);
        atol.max(rtol * value.abs())
    }

    pub fn validate(&self, column: &str) -> Result<()> {
        for (name, value) in [("atol", self.atol), ("rtol", self.rtol)] {
            if let Some(v) = value {
                if !(v >= 0.0) {
                    return Err(ExtractError::configuration(format!(
                        "{} for '{}' must be non-negative, got {}",
                        name, column, v
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Instrument ranges in effect for one data row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeContext {
    /// Width of the potential range (V)
    pub e_range: f64,
    /// Full-scale current (A), `None` when the instrument ranges automatically
    pub i_range: Option<f64>,
}

impl Default for RangeContext {
    fn default() -> Self {
        Self {
            e_range: DEFAULT_E_RANGE,
            i_range: None,
        }
    }
}

/// Smallest decade range covering the magnitude of a current (A)
fn auto_current_range(amps: f64) -> f64 {
    let magnitude = amps.abs();
    let mut range = 1e-12;
    while range < magnitude && range < 100.0 {
        range *= 10.0;
    }
    range
}

/// Quantization step of a value in the active instrument range
pub fn instrument_resolution(value: f64, unit: &str, ctx: &RangeContext) -> f64 {
    let e_range = if ctx.e_range.is_finite() && ctx.e_range > 0.0 {
        ctx.e_range
    } else {
        DEFAULT_E_RANGE
    };

    let current_step = |to_unit: f64| {
        let amps = value / to_unit;
        let full_scale = ctx.i_range.unwrap_or_else(|| auto_current_range(amps));
        2.0 * full_scale / ADC_STEPS * to_unit
    };

    match unit {
        "V" => e_range / ADC_STEPS,
        "mV" => e_range / ADC_STEPS * 1e3,
        "A" => current_step(1.0),
        "mA" => current_step(1e3),
        "µA" => current_step(1e6),
        "s" => TIME_RESOLUTION,
        _ => value.abs() * TEXT_PRECISION,
    }
}

/// Per-column sigma policy for one extraction
#[derive(Debug, Clone, Default)]
pub struct UncertaintyModel {
    columns: BTreeMap<String, Tolerance>,
    default: Tolerance,
}

impl UncertaintyModel {
    pub fn new(columns: BTreeMap<String, Tolerance>, default: Tolerance) -> Result<Self> {
        default.validate("default")?;
        for (column, tolerance) in &columns {
            tolerance.validate(column)?;
        }
        Ok(Self { columns, default })
    }

    pub fn has_override(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// Sigma of a value; `ctx` enables the instrument resolution table
    pub fn sigma(&self, column: &str, value: f64, unit: &str, ctx: Option<&RangeContext>) -> f64 {
        if let Some(tolerance) = self.columns.get(column) {
            return tolerance.sigma(value, &self.default);
        }
        match ctx {
            Some(ctx) => instrument_resolution(value, unit, ctx),
            None => self.default.sigma(value, &Tolerance::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tolerance_sigma() {
        let none = Tolerance::default();
        assert_eq!(Tolerance::relative(0.1).sigma(15.0, &none), 1.5);
        assert_eq!(Tolerance::absolute(0.05).sigma(351.2, &none), 0.05);
        assert_eq!(Tolerance::new(0.5, 0.01).sigma(-100.0, &none), 1.0);
        assert_eq!(none.sigma(42.0, &none), 0.0);
    }

    #[test]
    fn test_tolerance_falls_back_per_field() {
        let global = Tolerance::new(0.1, 0.0);
        assert_eq!(Tolerance::relative(0.001).sigma(15.0, &global), 0.1);
        assert_eq!(Tolerance::relative(0.1).sigma(15.0, &global), 1.5);
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        let mut columns = BTreeMap::new();
        columns.insert("T".to_string(), Tolerance::absolute(-1.0));
        assert!(UncertaintyModel::new(columns, Tolerance::default()).is_err());
    }

    #[test]
    fn test_potential_resolution_in_ten_volt_range() {
        let ctx = RangeContext {
            e_range: 10.0,
            i_range: None,
        };
        let sigma = instrument_resolution(1.0, "V", &ctx);
        assert!(sigma > 0.0 && sigma < 0.01);
        assert_eq!(sigma, 10.0 / ADC_STEPS);
    }

    #[test]
    fn test_current_resolution_uses_active_range() {
        let ctx = RangeContext {
            e_range: 10.0,
            i_range: Some(0.01),
        };
        let sigma_ma = instrument_resolution(1.5, "mA", &ctx);
        assert!((sigma_ma - 2.0 * 0.01 / ADC_STEPS * 1e3).abs() < 1e-15);

        let auto = RangeContext {
            e_range: 10.0,
            i_range: None,
        };
        let sigma_auto = instrument_resolution(1.5, "mA", &auto);
        assert!(sigma_auto > 0.0);
        assert!(sigma_auto <= sigma_ma);
    }

    #[test]
    fn test_unbounded_range_falls_back_to_default() {
        let ctx = RangeContext {
            e_range: f64::INFINITY,
            i_range: None,
        };
        assert_eq!(
            instrument_resolution(0.3, "V", &ctx),
            DEFAULT_E_RANGE / ADC_STEPS
        );
    }

    #[test]
    fn test_model_prefers_column_override() {
        let mut columns = BTreeMap::new();
        columns.insert("Ewe".to_string(), Tolerance::absolute(0.002));
        let model = UncertaintyModel::new(columns, Tolerance::default()).unwrap();
        let ctx = RangeContext::default();

        assert_eq!(model.sigma("Ewe", 1.0, "V", Some(&ctx)), 0.002);
        assert_eq!(model.sigma("Ece", 1.0, "V", Some(&ctx)), DEFAULT_E_RANGE / ADC_STEPS);
        assert_eq!(model.sigma("flow", 15.0, "ml/min", None), 0.0);
    }

    #[test]
    fn test_sigma_never_negative() {
        let model = UncertaintyModel::default();
        let ctx = RangeContext::default();
        for value in [-5.0, 0.0, 1e-9, 3.2e4, f64::NAN] {
            for unit in ["V", "mA", "A", "s", "Ω", ""] {
                let sigma = model.sigma("x", value, unit, Some(&ctx));
                assert!(sigma >= 0.0 || sigma.is_nan() && value.is_nan());
            }
        }
    }
}
