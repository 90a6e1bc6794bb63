//! Configuration validation

use crate::{ConfigError, Result};

/// Trait for validating configuration
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Reusable validation rules for engine settings
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate that a value is not empty
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::invalid(field, "cannot be empty"));
        }
        Ok(())
    }

    /// Validate that a number is within an inclusive range
    pub fn in_range<T>(value: T, min: T, max: T, field: &str) -> Result<()>
    where
        T: PartialOrd + std::fmt::Display,
    {
        if value < min || value > max {
            return Err(ConfigError::invalid(
                field,
                format!("must be between {} and {} (got {})", min, max, value),
            ));
        }
        Ok(())
    }

    /// Validate a probability strictly inside (0, 1), e.g. alpha or power
    pub fn open_probability(value: f64, field: &str) -> Result<()> {
        if !(value > 0.0 && value < 1.0) {
            return Err(ConfigError::invalid(
                field,
                format!("must be strictly between 0 and 1 (got {})", value),
            ));
        }
        Ok(())
    }

    /// Validate a percentage in 0..=100
    pub fn percentage(value: f64, field: &str) -> Result<()> {
        if !(0.0..=100.0).contains(&value) {
            return Err(ConfigError::invalid(
                field,
                format!("must be a percentage between 0 and 100 (got {})", value),
            ));
        }
        Ok(())
    }

    /// Validate that a count or duration is non-zero
    pub fn positive(value: u64, field: &str) -> Result<()> {
        if value == 0 {
            return Err(ConfigError::invalid(field, "must be greater than zero"));
        }
        Ok(())
    }

    /// Validate that a value is in a list of allowed values
    pub fn one_of<T: PartialEq + std::fmt::Debug>(value: &T, allowed: &[T], field: &str) -> Result<()> {
        if !allowed.contains(value) {
            return Err(ConfigError::invalid(
                field,
                format!("must be one of {:?} (got {:?})", allowed, value),
            ));
        }
        Ok(())
    }
}
