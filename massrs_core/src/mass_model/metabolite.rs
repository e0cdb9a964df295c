//! This module provides the metabolite struct representing a metabolite

use std::hash::Hash;

use derive_builder::Builder;
use indexmap::{IndexMap, IndexSet};

use crate::mass_model::registry::Entity;
use crate::utils::formula::{parse_formula, FormulaError};

/// Represents a metabolite
#[derive(Builder, Debug, Clone, PartialEq)]
pub struct Metabolite {
    /// Used to identify the metabolite (must be unique)
    pub id: String,
    /// Human Readable name of the metabolite
    #[builder(default = "None")]
    pub name: Option<String>,
    /// Which compartment the metabolite is in
    #[builder(default = "None")]
    pub compartment: Option<String>,
    /// Electrical charge of the Metabolite
    #[builder(default = "0")]
    pub charge: i32,
    /// Chemical Formula of the metabolite
    #[builder(default = "None")]
    pub formula: Option<String>,
    /// Concentration of the metabolite at the start of a simulation
    #[builder(default = "None")]
    pub initial_condition: Option<f64>,
    /// Notes about the metabolite
    #[builder(default = "None")]
    pub notes: Option<String>,
    /// Metabolite annotations
    #[builder(default = "None")]
    pub annotation: Option<String>,
    /// Ids of the reactions this metabolite participates in, maintained by the model
    #[builder(setter(skip))]
    pub(crate) reactions: IndexSet<String>,
}

impl Metabolite {
    /// Create a metabolite with only an id
    pub fn new(id: &str) -> Metabolite {
        Metabolite {
            id: id.to_string(),
            name: None,
            compartment: None,
            charge: 0,
            formula: None,
            initial_condition: None,
            notes: None,
            annotation: None,
            reactions: IndexSet::new(),
        }
    }

    /// Element counts of the metabolite's formula, empty if it has no formula
    pub fn elements(&self) -> Result<IndexMap<String, u32>, FormulaError> {
        match self.formula {
            Some(ref formula) => parse_formula(formula),
            None => Ok(IndexMap::new()),
        }
    }

    /// Ids of the reactions this metabolite takes part in
    pub fn reactions(&self) -> &IndexSet<String> {
        &self.reactions
    }

    /// Time dependent concentration symbol of this metabolite, `{id}(t)`
    pub fn concentration_symbol(&self) -> String {
        format!("{}(t)", self.id)
    }
}

impl Entity for Metabolite {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Hash for Metabolite {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        if let Some(ref compartment) = self.compartment {
            compartment.hash(state)
        };
    }
}

#[cfg(test)]
mod metabolite_tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let met = MetaboliteBuilder::default()
            .id("atp_c".to_string())
            .formula(Some("C10H12N5O13P3".to_string()))
            .charge(-4)
            .build()
            .unwrap();
        assert_eq!(met.charge, -4);
        assert!(met.initial_condition.is_none());
        assert!(met.reactions().is_empty());
        let elements = met.elements().unwrap();
        assert_eq!(elements["P"], 3);
        assert_eq!(met.concentration_symbol(), "atp_c(t)");
    }

    #[test]
    fn no_formula_has_no_elements() {
        assert!(Metabolite::new("x").elements().unwrap().is_empty());
    }
}
