//! Configuration values consumed by the matrix and kinetics engines
use std::sync::LazyLock;

use indexmap::IndexMap;
use thiserror::Error;

use crate::mass_model::stoichiometry::{Dtype, MatrixType};

/// Process-wide default configuration, new models start from a clone of this value
pub static DEFAULT_CONFIGURATION: LazyLock<Configuration> = LazyLock::new(Configuration::default);

/// Settings carried by a [`Model`](crate::mass_model::model::Model)
#[derive(Clone, Debug, PartialEq)]
pub struct Configuration {
    /// Equilibrium constant used for irreversible reactions without an explicit Keq
    pub irreversible_keq: f64,
    /// Reverse rate constant used for irreversible reactions without an explicit kr
    pub irreversible_kr: f64,
    /// Elemental compositions left out of rate laws (water and free hydrogen by default)
    pub exclude_from_rates: Vec<IndexMap<String, u32>>,
    /// Compartment used when none is given, as (short id, name)
    pub default_compartment: (String, String),
    /// Compartment of external species of exchange reactions, as (short id, name)
    pub boundary_compartment: (String, String),
    /// Number of decimals computed values are rounded to, `None` disables rounding
    pub decimal_precision: Option<i32>,
    /// Rate constant assigned by PERC to reactions carrying zero flux
    pub at_equilibrium_default: f64,
    /// Representation used for the stoichiometric matrix when not given per call
    pub matrix_type: MatrixType,
    /// Numeric type of the stoichiometric matrix when not given per call
    pub dtype: Dtype,
}

impl Default for Configuration {
    fn default() -> Self {
        let water = IndexMap::from([("H".to_string(), 2), ("O".to_string(), 1)]);
        let hydrogen = IndexMap::from([("H".to_string(), 1)]);
        Configuration {
            irreversible_keq: f64::INFINITY,
            irreversible_kr: 0.,
            exclude_from_rates: vec![water, hydrogen],
            default_compartment: ("compartment".to_string(), "default_compartment".to_string()),
            boundary_compartment: ("b".to_string(), "boundary".to_string()),
            decimal_precision: None,
            at_equilibrium_default: 100000.,
            matrix_type: MatrixType::Dense,
            dtype: Dtype::Float64,
        }
    }
}

impl Configuration {
    /// Set the default irreversible equilibrium constant, must be non-negative
    pub fn set_irreversible_keq(&mut self, value: f64) -> Result<(), ConfigurationError> {
        self.irreversible_keq = non_negative("irreversible_keq", value)?;
        Ok(())
    }

    /// Set the default irreversible reverse rate constant, must be non-negative
    pub fn set_irreversible_kr(&mut self, value: f64) -> Result<(), ConfigurationError> {
        self.irreversible_kr = non_negative("irreversible_kr", value)?;
        Ok(())
    }

    /// Set the PERC sentinel for reactions at equilibrium, must be non-negative
    pub fn set_at_equilibrium_default(&mut self, value: f64) -> Result<(), ConfigurationError> {
        self.at_equilibrium_default = non_negative("at_equilibrium_default", value)?;
        Ok(())
    }

    /// Set the boundary compartment, the short id may not be empty
    pub fn set_boundary_compartment(
        &mut self,
        id: &str,
        name: &str,
    ) -> Result<(), ConfigurationError> {
        if id.is_empty() {
            return Err(ConfigurationError::InvalidValue(
                "boundary compartment id cannot be empty".to_string(),
            ));
        }
        self.boundary_compartment = (id.to_string(), name.to_string());
        Ok(())
    }

    /// Whether an elemental composition matches one of the rate law exclusion filters
    pub fn is_excluded_from_rates(&self, elements: &IndexMap<String, u32>) -> bool {
        !elements.is_empty()
            && self.exclude_from_rates.iter().any(|filter| {
                filter.len() == elements.len()
                    && filter.iter().all(|(el, count)| elements.get(el) == Some(count))
            })
    }
}

fn non_negative(field: &str, value: f64) -> Result<f64, ConfigurationError> {
    if value.is_nan() || value < 0. {
        return Err(ConfigurationError::InvalidValue(format!(
            "{field} must be a non-negative number, got {value}"
        )));
    }
    Ok(value)
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
