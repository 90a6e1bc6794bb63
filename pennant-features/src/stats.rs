//! Experiment statistics
//!
//! Two-proportion z-test, per-arm sample size planning and Wald confidence
//! intervals. Everything here is pure and fails loudly on bad input.

use crate::error::{FeatureError, FeatureResult};
use serde::{Deserialize, Serialize};
use std::f64::consts::SQRT_2;

/// Default significance threshold for the z-test
pub const DEFAULT_SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Two-sided 95% critical value used when critical values are fixed
pub const FIXED_Z_ALPHA: f64 = 1.96;

/// 80% power critical value used when critical values are fixed
pub const FIXED_Z_POWER: f64 = 0.84;

/// How `required_sample_size` picks its z-critical values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalValues {
    /// Derived from the supplied alpha and power
    #[default]
    Derived,
    /// Always 1.96 and 0.84, whatever alpha and power say
    Fixed,
}

/// Outcome of a two-proportion test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalAnalysis {
    pub p_value: f64,
    /// `1 - p_value`
    pub confidence_level: f64,
    /// Total subjects across both arms
    pub sample_size: u64,
    /// Absolute difference `treatment_rate - control_rate`
    pub effect_size: f64,
    /// Per-arm sample size needed to detect the configured minimum effect
    pub required_sample_size: u64,
    pub is_significant: bool,
    pub z_score: f64,
    pub control_rate: f64,
    pub treatment_rate: f64,
    /// Effect relative to the control rate; `None` when the control rate is 0
    pub relative_lift: Option<f64>,
}

impl StatisticalAnalysis {
    pub fn treatment_winning(&self) -> bool {
        self.effect_size > 0.0
    }
}

/// Wald interval for a single proportion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    pub level: f64,
}

impl ConfidenceInterval {
    pub fn contains(&self, value: f64) -> bool {
        (self.lower..=self.upper).contains(&value)
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Statistics engine configured with the planning parameters used by
/// `analyze`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentStatistics {
    pub significance_level: f64,
    pub power: f64,
    pub minimum_detectable_effect: f64,
    pub critical_values: CriticalValues,
}

impl Default for ExperimentStatistics {
    fn default() -> Self {
        Self {
            significance_level: DEFAULT_SIGNIFICANCE_LEVEL,
            power: 0.8,
            minimum_detectable_effect: 0.02,
            critical_values: CriticalValues::Derived,
        }
    }
}

impl ExperimentStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_significance_level(mut self, alpha: f64) -> Self {
        self.significance_level = alpha;
        self
    }

    pub fn with_power(mut self, power: f64) -> Self {
        self.power = power;
        self
    }

    pub fn with_minimum_detectable_effect(mut self, effect: f64) -> Self {
        self.minimum_detectable_effect = effect;
        self
    }

    pub fn with_critical_values(mut self, critical_values: CriticalValues) -> Self {
        self.critical_values = critical_values;
        self
    }

    /// Two-proportion z-test of treatment against control.
    ///
    /// A pooled rate of exactly 0 or 1 leaves nothing to test and yields
    /// `z = 0`, `p = 1`.
    pub fn analyze(
        &self,
        control_conversions: u64,
        control_n: u64,
        treatment_conversions: u64,
        treatment_n: u64,
    ) -> FeatureResult<StatisticalAnalysis> {
        check_arm("control", control_conversions, control_n)?;
        check_arm("treatment", treatment_conversions, treatment_n)?;
        let sample_size = control_n.checked_add(treatment_n).ok_or_else(|| {
            FeatureError::invalid_sample(format!(
                "combined sample size {} + {} does not fit in u64",
                control_n, treatment_n
            ))
        })?;

        let cn = control_n as f64;
        let tn = treatment_n as f64;
        let control_rate = control_conversions as f64 / cn;
        let treatment_rate = treatment_conversions as f64 / tn;
        let pooled = (control_conversions as f64 + treatment_conversions as f64) / (cn + tn);

        let se = (pooled * (1.0 - pooled) * (1.0 / cn + 1.0 / tn)).sqrt();
        let (z_score, p_value) = if se == 0.0 {
            (0.0, 1.0)
        } else {
            let z = (treatment_rate - control_rate) / se;
            (z, two_sided_p_value(z))
        };

        let effect_size = treatment_rate - control_rate;
        let relative_lift = (control_rate > 0.0).then(|| effect_size / control_rate);
        let required_sample_size = self.required_sample_size(
            control_rate,
            self.minimum_detectable_effect,
            self.significance_level,
            self.power,
        )?;

        Ok(StatisticalAnalysis {
            p_value,
            confidence_level: 1.0 - p_value,
            sample_size,
            effect_size,
            required_sample_size,
            is_significant: p_value < self.significance_level,
            z_score,
            control_rate,
            treatment_rate,
            relative_lift,
        })
    }

    /// Per-arm sample size with this engine's critical value mode.
    pub fn required_sample_size(
        &self,
        baseline_rate: f64,
        minimum_detectable_effect: f64,
        alpha: f64,
        power: f64,
    ) -> FeatureResult<u64> {
        required_sample_size_with(
            baseline_rate,
            minimum_detectable_effect,
            alpha,
            power,
            self.critical_values,
        )
    }
}

fn check_arm(arm: &str, conversions: u64, n: u64) -> FeatureResult<()> {
    if n == 0 {
        return Err(FeatureError::invalid_sample(format!(
            "{} sample size must be positive",
            arm
        )));
    }
    if conversions > n {
        return Err(FeatureError::invalid_sample(format!(
            "{} conversions ({}) exceed its sample size ({})",
            arm, conversions, n
        )));
    }
    Ok(())
}

fn check_probability(name: &str, value: f64) -> FeatureResult<()> {
    if value.is_finite() && value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(FeatureError::invalid_parameter(format!(
            "{} must lie strictly between 0 and 1, got {}",
            name, value
        )))
    }
}

/// Per-arm sample size for a two-proportion test, with z-critical values
/// derived from `alpha` (two-sided) and `power`.
///
/// Unlike planners that hard-code 1.96 and 0.84, the result changes when
/// `alpha` or `power` change. Use [`required_sample_size_with`] and
/// [`CriticalValues::Fixed`] to reproduce the fixed-constant numbers.
pub fn required_sample_size(
    baseline_rate: f64,
    minimum_detectable_effect: f64,
    alpha: f64,
    power: f64,
) -> FeatureResult<u64> {
    required_sample_size_with(
        baseline_rate,
        minimum_detectable_effect,
        alpha,
        power,
        CriticalValues::Derived,
    )
}

/// Per-arm sample size using the given critical value mode.
///
/// The treatment rate is `baseline + effect`, or `baseline - effect` when
/// that would exceed 1.
pub fn required_sample_size_with(
    baseline_rate: f64,
    minimum_detectable_effect: f64,
    alpha: f64,
    power: f64,
    critical_values: CriticalValues,
) -> FeatureResult<u64> {
    if !baseline_rate.is_finite() || !(0.0..=1.0).contains(&baseline_rate) {
        return Err(FeatureError::invalid_parameter(format!(
            "baseline rate must lie in [0, 1], got {}",
            baseline_rate
        )));
    }
    check_probability("minimum detectable effect", minimum_detectable_effect)?;
    check_probability("alpha", alpha)?;
    check_probability("power", power)?;

    let p1 = baseline_rate;
    let p2 = if p1 + minimum_detectable_effect <= 1.0 {
        p1 + minimum_detectable_effect
    } else {
        p1 - minimum_detectable_effect
    };
    if !(0.0..=1.0).contains(&p2) {
        return Err(FeatureError::invalid_parameter(format!(
            "effect {} cannot be detected from baseline {}",
            minimum_detectable_effect, baseline_rate
        )));
    }

    let (z_alpha, z_power) = match critical_values {
        CriticalValues::Derived => (normal_quantile(1.0 - alpha / 2.0)?, normal_quantile(power)?),
        CriticalValues::Fixed => (FIXED_Z_ALPHA, FIXED_Z_POWER),
    };

    let p_bar = (p1 + p2) / 2.0;
    let numerator = z_alpha * (2.0 * p_bar * (1.0 - p_bar)).sqrt()
        + z_power * (p1 * (1.0 - p1) + p2 * (1.0 - p2)).sqrt();
    let n = numerator.powi(2) / (p2 - p1).powi(2);

    Ok(n.ceil() as u64)
}

/// Wald confidence interval `rate ± z * sqrt(rate * (1 - rate) / n)`,
/// clamped to `[0, 1]`.
pub fn confidence_interval(conversions: u64, n: u64, level: f64) -> FeatureResult<ConfidenceInterval> {
    check_arm("interval", conversions, n)?;
    check_probability("confidence level", level)?;

    let rate = conversions as f64 / n as f64;
    let z = normal_quantile(1.0 - (1.0 - level) / 2.0)?;
    let margin = z * (rate * (1.0 - rate) / n as f64).sqrt();

    Ok(ConfidenceInterval {
        lower: (rate - margin).clamp(0.0, 1.0),
        upper: (rate + margin).clamp(0.0, 1.0),
        level,
    })
}

/// Two-sided p-value for a z statistic.
///
/// Computed from the complementary error function directly so large `|z|`
/// does not collapse to `1 - 1`.
pub fn two_sided_p_value(z: f64) -> f64 {
    erfc(z.abs() / SQRT_2).clamp(0.0, 1.0)
}

/// Standard normal CDF.
pub fn normal_cdf(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 - 0.5 * erfc(x / SQRT_2)
    } else {
        0.5 * erfc(-x / SQRT_2)
    }
}

/// Complementary error function for `x >= 0` (Abramowitz & Stegun 7.1.26).
fn erfc(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let t = 1.0 / (1.0 + p * x);
    (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp()
}

/// Inverse of the standard normal CDF (Acklam's rational approximation).
pub fn normal_quantile(p: f64) -> FeatureResult<f64> {
    check_probability("quantile probability", p)?;

    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    let x = if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    };

    Ok(x)
}
