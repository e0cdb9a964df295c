//! Assembly of the ordinary differential equations of metabolite concentrations
use indexmap::IndexMap;

use crate::kinetics::expr::Expr;
use crate::kinetics::rate_law::RateType;
use crate::mass_model::metabolite::Metabolite;
use crate::mass_model::model::{Model, ModelError};

/// Sum the signed rates of the reactions a metabolite takes part in
///
/// Rates of reactions consuming the metabolite are subtracted, rates of reactions producing
/// it are added. Returns `None` when the metabolite is in no reaction with a rate.
fn assemble_ode(
    metabolite: &Metabolite,
    model: &Model,
    rates: &IndexMap<String, Expr>,
) -> Option<Expr> {
    let mut ode: Option<Expr> = None;
    for rxn_id in metabolite.reactions() {
        let (Some(rxn), Some(rate)) = (model.reactions.get(rxn_id), rates.get(rxn_id)) else {
            continue;
        };
        let consumed = match rxn.get_coefficient(&metabolite.id) {
            Some(coef) => coef < 0.,
            None => continue,
        };
        let rate = rate.clone();
        ode = Some(match (ode, consumed) {
            (None, true) => -rate,
            (None, false) => rate,
            (Some(acc), true) => acc - rate,
            (Some(acc), false) => acc + rate,
        });
    }
    ode
}

impl Model {
    /// ODE of a single metabolite using the model's rate type
    ///
    /// # Returns
    /// - `Ok(Some(ode))` for a metabolite taking part in at least one reaction
    /// - `Ok(None)` for a metabolite in no reaction or with a fixed concentration
    /// - `Err(ModelError::NotFound)` for an unknown metabolite
    pub fn generate_ode(&self, metabolite_id: &str) -> Result<Option<Expr>, ModelError> {
        let met = self
            .metabolites
            .get(metabolite_id)
            .ok_or_else(|| ModelError::NotFound(format!("Metabolite {metabolite_id}")))?;
        if self.fixed_concentrations.contains_key(metabolite_id) {
            return Ok(None);
        }
        Ok(assemble_ode(met, self, &self.rates()))
    }

    /// ODEs of every metabolite using the model's rate type
    pub fn odes(&self) -> IndexMap<String, Expr> {
        self.odes_of_type(self.rate_type)
    }

    /// ODEs of every metabolite which is not fixed and takes part in a reaction
    ///
    /// Custom rates take the place of generated rate laws.
    pub fn odes_of_type(&self, rate_type: RateType) -> IndexMap<String, Expr> {
        self.odes_from_rates(&self.rates_of_type(rate_type))
    }

    pub(crate) fn odes_from_rates(&self, rates: &IndexMap<String, Expr>) -> IndexMap<String, Expr> {
        self.metabolites
            .iter()
            .filter(|met| !self.fixed_concentrations.contains_key(&met.id))
            .filter_map(|met| assemble_ode(met, self, rates).map(|ode| (met.id.clone(), ode)))
            .collect()
    }
}

#[cfg(test)]
mod ode_tests {
    use super::*;
    use crate::mass_model::metabolite::Metabolite;
    use crate::mass_model::reaction::Reaction;

    fn setup_model() -> Model {
        // v1: A <=> B, v2: B --> C
        let mut model = Model::new("odes");
        let mut v2 = Reaction::new(
            "v2",
            IndexMap::from([("B".to_string(), -1.), ("C".to_string(), 1.)]),
        );
        v2.reversible = false;
        model.add_reactions(vec![
            Reaction::new(
                "v1",
                IndexMap::from([("A".to_string(), -1.), ("B".to_string(), 1.)]),
            ),
            v2,
        ]);
        model.add_metabolites(vec![Metabolite::new("lonely")]);
        model
    }

    #[test]
    fn signed_sums_of_rates() {
        let model = setup_model();
        let odes = model.odes();
        assert_eq!(odes["A"].to_string(), "-kf_v1*(A(t) - B(t)/Keq_v1)");
        assert_eq!(
            odes["B"].to_string(),
            "kf_v1*(A(t) - B(t)/Keq_v1) - kf_v2*B(t)"
        );
        assert_eq!(odes["C"].to_string(), "kf_v2*B(t)");
        assert!(!odes.contains_key("lonely"));
    }

    #[test]
    fn metabolite_without_reactions_has_no_ode() {
        let model = setup_model();
        assert!(model.generate_ode("lonely").unwrap().is_none());
        assert!(model.generate_ode("B").unwrap().is_some());
        assert!(matches!(
            model.generate_ode("missing"),
            Err(ModelError::NotFound(_))
        ));
    }

    #[test]
    fn fixed_metabolites_have_no_ode() {
        let mut model = setup_model();
        model
            .add_fixed_concentrations(&IndexMap::from([("A".to_string(), 1.)]))
            .unwrap();
        let odes = model.odes_of_type(RateType::Two);
        assert!(!odes.contains_key("A"));
        assert_eq!(odes["B"].to_string(), "kf_v1*A(t) - kr_v1*B(t) - kf_v2*B(t)");
        assert!(model.generate_ode("A").unwrap().is_none());
        assert!(model.generate_ode("B").unwrap().is_some());
    }

    #[test]
    fn custom_rates_replace_rate_laws() {
        let mut model = setup_model();
        model
            .add_custom_rate("v2", "Vmax*B(t)", &IndexMap::from([("Vmax".to_string(), 2.)]))
            .unwrap();
        assert_eq!(model.odes()["C"].to_string(), "Vmax*B(t)");
    }

    #[test]
    fn assembly_is_idempotent() {
        let model = setup_model();
        let first: Vec<String> = model.odes().values().map(|e| e.to_string()).collect();
        let second: Vec<String> = model.odes().values().map(|e| e.to_string()).collect();
        assert_eq!(first, second);
    }
}
