//! Classification of the symbols appearing in the ODEs and rates of a model
use indexmap::{IndexMap, IndexSet};

use crate::kinetics::expr::Expr;
use crate::kinetics::rate_law::RateType;
use crate::mass_model::model::Model;

const RATE_CONSTANT_PREFIXES: [&str; 3] = ["kf_", "kr_", "Keq_"];

/// Symbols of a model's ODEs and rates, each in exactly one class
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SymbolClasses {
    /// Free metabolite concentrations, including unfixed boundary species
    pub concentrations: IndexSet<String>,
    /// Forward, reverse and equilibrium constants
    pub rate_constants: IndexSet<String>,
    /// Fixed concentrations, substituted by their value
    pub fixed: IndexSet<String>,
    pub custom_parameters: IndexSet<String>,
}

/// ODEs and rates with fixed concentrations substituted, along with their symbol classes
#[derive(Clone, Debug)]
pub struct SortedSymbols {
    pub odes: IndexMap<String, Expr>,
    pub rates: IndexMap<String, Expr>,
    pub classes: SymbolClasses,
}

fn is_rate_constant(name: &str) -> bool {
    RATE_CONSTANT_PREFIXES
        .iter()
        .any(|prefix| name.strip_prefix(prefix).is_some_and(|rest| !rest.is_empty()))
}

impl Model {
    /// Substitute fixed concentrations into the ODEs and rates and classify their symbols
    ///
    /// Classes are checked in the order fixed, custom parameter, rate constant, concentration.
    /// Boundary species without a fixed value count as concentrations, any other unknown symbol
    /// is a custom parameter.
    ///
    /// # Parameters
    /// - `rate_type`: rate law type, defaults to the model's
    pub fn sort_symbols(&self, rate_type: Option<RateType>) -> SortedSymbols {
        let rates = self.rates_of_type(rate_type.unwrap_or(self.rate_type));
        let external = self.external_metabolites();
        let mut classes = SymbolClasses::default();

        for expr in rates.values() {
            for id in expr.concentrations() {
                if self.fixed_concentrations.contains_key(&id) {
                    classes.fixed.insert(id);
                } else {
                    classes.concentrations.insert(id);
                }
            }
            for name in expr.symbols() {
                if self.fixed_concentrations.contains_key(&name) {
                    classes.fixed.insert(name);
                } else if self.custom_parameters.contains_key(&name) {
                    classes.custom_parameters.insert(name);
                } else if is_rate_constant(&name) {
                    classes.rate_constants.insert(name);
                } else if external.contains(&name) {
                    classes.concentrations.insert(name);
                } else {
                    classes.custom_parameters.insert(name);
                }
            }
        }

        let fixed = &self.fixed_concentrations;
        let rates: IndexMap<String, Expr> = rates
            .into_iter()
            .map(|(id, rate)| {
                let rate = rate.substitute(&|e| match e {
                    Expr::Symbol(name) | Expr::Concentration(name) => {
                        fixed.get(name).map(|v| Expr::Num(*v))
                    }
                    _ => None,
                });
                (id, rate)
            })
            .collect();
        let odes = self.odes_from_rates(&rates);
        SortedSymbols {
            odes,
            rates,
            classes,
        }
    }
}

#[cfg(test)]
mod symbols_tests {
    use super::*;
    use crate::mass_model::model::ExchangeType;
    use crate::mass_model::reaction::Reaction;

    fn setup_model() -> Model {
        // S_A: -> A, v1: A <=> B, v2: B -> C, DM_C: C ->
        let mut model = Model::new("symbols");
        model.add_reactions(vec![
            Reaction::new(
                "v1",
                IndexMap::from([("A".to_string(), -1.), ("B".to_string(), 1.)]),
            ),
            Reaction::new(
                "v2",
                IndexMap::from([("B".to_string(), -1.), ("C".to_string(), 1.)]),
            ),
        ]);
        model.add_exchange("A", ExchangeType::Source, None).unwrap();
        model.add_exchange("C", ExchangeType::Demand, None).unwrap();
        model
            .add_custom_rate("v2", "Vmax*B(t)/(Km + B(t))", &IndexMap::from([("Vmax".to_string(), 1.)]))
            .unwrap();
        model
    }

    #[test]
    fn every_symbol_in_one_class() {
        let model = setup_model();
        let sorted = model.sort_symbols(None);
        let classes = &sorted.classes;
        assert_eq!(
            classes.concentrations.iter().collect::<Vec<_>>(),
            vec!["A", "B", "A_b", "C"]
        );
        assert!(classes.rate_constants.contains("kf_v1"));
        assert!(classes.rate_constants.contains("Keq_v1"));
        assert!(!classes.rate_constants.contains("kf_v2"));
        assert_eq!(
            classes.custom_parameters.iter().collect::<Vec<_>>(),
            vec!["Vmax", "Km"]
        );
        assert!(classes.fixed.is_empty());
        let all = classes.concentrations.len()
            + classes.rate_constants.len()
            + classes.fixed.len()
            + classes.custom_parameters.len();
        let mut union = classes.concentrations.clone();
        union.extend(classes.rate_constants.iter().cloned());
        union.extend(classes.fixed.iter().cloned());
        union.extend(classes.custom_parameters.iter().cloned());
        assert_eq!(union.len(), all);
    }

    #[test]
    fn fixed_concentrations_are_substituted() {
        let mut model = setup_model();
        model
            .add_fixed_concentrations(&IndexMap::from([
                ("A_b".to_string(), 2.),
                ("B".to_string(), 0.5),
            ]))
            .unwrap();
        let sorted = model.sort_symbols(Some(RateType::Two));
        assert_eq!(
            sorted.classes.fixed.iter().collect::<Vec<_>>(),
            vec!["B", "A_b"]
        );
        assert!(!sorted.classes.concentrations.contains("B"));
        assert_eq!(sorted.rates["S_A"].to_string(), "kf_S_A*2");
        assert_eq!(sorted.rates["v2"].to_string(), "Vmax*0.5/(Km + 0.5)");
        assert!(!sorted.odes.contains_key("B"));
        for ode in sorted.odes.values() {
            assert!(!ode.contains("B"));
            assert!(!ode.contains("A_b"));
        }
    }
}
