//! This module provides a struct for representing reactions
use derive_builder::Builder;
use indexmap::{IndexMap, IndexSet};

use crate::configuration::Configuration;
use crate::mass_model::model::ModelError;
use crate::mass_model::registry::Entity;

/// Represents a reaction in the kinetic model
#[derive(Builder, Debug, Clone, PartialEq)]
pub struct Reaction {
    /// Used to identify the reaction
    pub id: String,
    /// Metabolite stoichiometry of the reaction
    ///
    /// Negative coefficients are reactants, positive coefficients are products
    #[builder(default = "IndexMap::new()")]
    pub metabolites: IndexMap<String, f64>,
    /// Human-readable reaction name
    #[builder(default = "None")]
    pub name: Option<String>,
    /// Reaction subsystem
    #[builder(default = "None")]
    pub subsystem: Option<String>,
    /// Whether the reaction can run in reverse
    #[builder(default = "true")]
    pub reversible: bool,
    /// Forward rate constant
    #[builder(default = "None")]
    pub(crate) kf: Option<f64>,
    /// Reverse rate constant
    #[builder(default = "None")]
    pub(crate) kr: Option<f64>,
    /// Equilibrium constant
    #[builder(default = "None")]
    pub(crate) keq: Option<f64>,
    /// Flux through the reaction at steady state
    #[builder(default = "None")]
    pub steady_state_flux: Option<f64>,
    /// Whether this reaction exchanges a species with the boundary
    #[builder(default = "false")]
    pub exchange: bool,
    /// Id of the boundary species used on the empty side of an exchange reaction
    #[builder(default = "None")]
    pub external_metabolite: Option<String>,
    /// Ids of genes associated with the reaction
    #[builder(default = "IndexSet::new()")]
    pub genes: IndexSet<String>,
}

impl Reaction {
    /// Create a reversible reaction from an id and a stoichiometry
    pub fn new(id: &str, metabolites: IndexMap<String, f64>) -> Reaction {
        Reaction {
            id: id.to_string(),
            metabolites,
            name: None,
            subsystem: None,
            reversible: true,
            kf: None,
            kr: None,
            keq: None,
            steady_state_flux: None,
            exchange: false,
            external_metabolite: None,
            genes: IndexSet::new(),
        }
    }

    // region Stoichiometry

    /// Metabolites consumed by the reaction, with their (negative) coefficients
    pub fn reactants(&self) -> impl Iterator<Item = (&str, f64)> {
        self.metabolites
            .iter()
            .filter(|(_, coef)| **coef < 0.)
            .map(|(id, coef)| (id.as_str(), *coef))
    }

    /// Metabolites produced by the reaction, with their (positive) coefficients
    pub fn products(&self) -> impl Iterator<Item = (&str, f64)> {
        self.metabolites
            .iter()
            .filter(|(_, coef)| **coef > 0.)
            .map(|(id, coef)| (id.as_str(), *coef))
    }

    pub fn get_coefficient(&self, metabolite_id: &str) -> Option<f64> {
        self.metabolites.get(metabolite_id).copied()
    }

    /// Add metabolites to the reaction, summing with any existing coefficient
    ///
    /// Coefficients which end up at zero are removed, since a zero coefficient is never stored.
    /// When added to a model, use [`Model::repair`](crate::mass_model::model::Model::repair)
    /// afterward to refresh back-references.
    pub fn add_metabolites(&mut self, metabolites: &IndexMap<String, f64>) {
        for (id, coef) in metabolites {
            let entry = self.metabolites.entry(id.clone()).or_insert(0.);
            *entry += coef;
        }
        self.metabolites.retain(|_, coef| *coef != 0.);
    }

    /// Whether the reaction exchanges material with the boundary
    ///
    /// A reaction is an exchange when flagged as such, or when every species sits on one side.
    pub fn is_exchange(&self) -> bool {
        self.exchange || self.is_boundary()
    }

    /// Whether one side of the reaction has no explicit species
    pub fn is_boundary(&self) -> bool {
        !self.metabolites.is_empty()
            && (self.reactants().next().is_none() || self.products().next().is_none())
    }

    /// Id of the boundary species standing in for the empty side of an exchange reaction
    ///
    /// Returns the explicitly set external metabolite if there is one, otherwise
    /// `{species id}_{boundary compartment}`. `None` for reactions with species on both sides.
    pub fn external_metabolite_id(&self, config: &Configuration) -> Option<String> {
        if !self.is_exchange() || !self.is_boundary() {
            return None;
        }
        if let Some(ref external) = self.external_metabolite {
            return Some(external.clone());
        }
        let (species, _) = self.metabolites.first()?;
        Some(format!("{}_{}", species, config.boundary_compartment.0))
    }

    // endregion Stoichiometry

    // region Parameters

    /// Symbol of the forward rate constant, `kf_{id}`
    pub fn kf_str(&self) -> String {
        format!("kf_{}", self.id)
    }

    /// Symbol of the reverse rate constant, `kr_{id}`
    pub fn kr_str(&self) -> String {
        format!("kr_{}", self.id)
    }

    /// Symbol of the equilibrium constant, `Keq_{id}`
    pub fn keq_str(&self) -> String {
        format!("Keq_{}", self.id)
    }

    /// Symbol of the steady state flux, `v_{id}`
    pub fn flux_symbol_str(&self) -> String {
        format!("v_{}", self.id)
    }

    pub fn kf(&self) -> Option<f64> {
        self.kf
    }

    /// Reverse rate constant, falling back to the configured default for irreversible reactions
    pub fn kr(&self, config: &Configuration) -> Option<f64> {
        match (self.kr, self.reversible) {
            (Some(kr), _) => Some(kr),
            (None, false) => Some(config.irreversible_kr),
            (None, true) => None,
        }
    }

    /// Equilibrium constant, falling back to the configured default for irreversible reactions
    pub fn keq(&self, config: &Configuration) -> Option<f64> {
        match (self.keq, self.reversible) {
            (Some(keq), _) => Some(keq),
            (None, false) => Some(config.irreversible_keq),
            (None, true) => None,
        }
    }

    pub fn set_kf(&mut self, value: Option<f64>) -> Result<(), ModelError> {
        self.kf = validate_rate_constant(&self.kf_str(), value)?;
        Ok(())
    }

    pub fn set_kr(&mut self, value: Option<f64>) -> Result<(), ModelError> {
        self.kr = validate_rate_constant(&self.kr_str(), value)?;
        Ok(())
    }

    pub fn set_keq(&mut self, value: Option<f64>) -> Result<(), ModelError> {
        self.keq = validate_rate_constant(&self.keq_str(), value)?;
        Ok(())
    }

    /// Map of the known parameter symbols of this reaction to their values
    ///
    /// Irreversible reactions always report Keq and kr, using the configured defaults when unset.
    pub fn parameter_values(&self, config: &Configuration) -> IndexMap<String, f64> {
        let mut values = IndexMap::new();
        if let Some(kf) = self.kf {
            values.insert(self.kf_str(), kf);
        }
        if let Some(keq) = self.keq(config) {
            values.insert(self.keq_str(), keq);
        }
        if let Some(kr) = self.kr(config) {
            values.insert(self.kr_str(), kr);
        }
        values
    }

    // endregion Parameters
}

fn validate_rate_constant(symbol: &str, value: Option<f64>) -> Result<Option<f64>, ModelError> {
    match value {
        Some(v) if v.is_nan() || v < 0. => Err(ModelError::InvalidValue(format!(
            "{symbol} must be a non-negative number, got {v}"
        ))),
        _ => Ok(value),
    }
}

impl Entity for Reaction {
    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod reaction_tests {
    use super::*;

    fn simple_reaction() -> Reaction {
        ReactionBuilder::default()
            .id("v1".to_string())
            .metabolites(IndexMap::from([
                ("A".to_string(), -1.),
                ("B".to_string(), 1.),
            ]))
            .kf(Some(2.))
            .keq(Some(4.))
            .build()
            .unwrap()
    }

    #[test]
    fn reactants_and_products() {
        let rxn = simple_reaction();
        assert_eq!(rxn.reactants().collect::<Vec<_>>(), vec![("A", -1.)]);
        assert_eq!(rxn.products().collect::<Vec<_>>(), vec![("B", 1.)]);
        assert!(!rxn.is_exchange());
        assert!(rxn.external_metabolite_id(&Configuration::default()).is_none());
    }

    #[test]
    fn parameter_symbols_and_values() {
        let mut rxn = simple_reaction();
        let config = Configuration::default();
        assert_eq!(rxn.kf_str(), "kf_v1");
        assert_eq!(rxn.keq_str(), "Keq_v1");
        assert_eq!(rxn.kr_str(), "kr_v1");
        let values = rxn.parameter_values(&config);
        assert_eq!(values.get("kf_v1"), Some(&2.));
        assert_eq!(values.get("Keq_v1"), Some(&4.));
        assert!(values.get("kr_v1").is_none());

        rxn.reversible = false;
        rxn.set_keq(None).unwrap();
        assert!(rxn.keq(&config).unwrap().is_infinite());
        assert_eq!(rxn.kr(&config), Some(0.));
    }

    #[test]
    fn negative_constants_rejected() {
        let mut rxn = simple_reaction();
        assert!(matches!(
            rxn.set_keq(Some(-1.)),
            Err(ModelError::InvalidValue(_))
        ));
        assert_eq!(rxn.keq(&Configuration::default()), Some(4.));
    }

    #[test]
    fn exchange_external_id() {
        let config = Configuration::default();
        let mut rxn = Reaction::new("EX_A", IndexMap::from([("A".to_string(), -1.)]));
        assert!(rxn.is_exchange());
        assert_eq!(rxn.external_metabolite_id(&config).unwrap(), "A_b");
        rxn.external_metabolite = Some("A_ext".to_string());
        assert_eq!(rxn.external_metabolite_id(&config).unwrap(), "A_ext");
    }

    #[test]
    fn adding_metabolites_drops_zero_coefficients() {
        let mut rxn = simple_reaction();
        rxn.add_metabolites(&IndexMap::from([
            ("B".to_string(), -1.),
            ("C".to_string(), 2.),
        ]));
        assert!(rxn.get_coefficient("B").is_none());
        assert_eq!(rxn.get_coefficient("C"), Some(2.));
    }
}
