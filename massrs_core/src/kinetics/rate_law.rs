//! Mass action rate laws, mass action ratios and disequilibrium ratios
//!
//! For a reaction `A <=> B` the three rate law types are
//! - type 1: `kf*(A(t) - B(t)/Keq)`
//! - type 2: `kf*A(t) - kr*B(t)`
//! - type 3: `kr*(Keq*A(t) - B(t))`
//!
//! Irreversible reactions only get the forward term. The string form of a rate law is the
//! [`Display`] of its [`Expr`], so both forms always agree.
use std::fmt::{Display, Formatter};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::configuration::Configuration;
use crate::kinetics::expr::Expr;
use crate::mass_model::metabolite::Metabolite;
use crate::mass_model::model::{Model, ModelError};
use crate::mass_model::reaction::Reaction;
use crate::mass_model::registry::Registry;

/// Parameterization of the generated rate laws
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RateType {
    /// Forward rate constant and equilibrium constant
    #[default]
    One,
    /// Forward and reverse rate constants
    Two,
    /// Reverse rate constant and equilibrium constant
    Three,
}

impl TryFrom<u8> for RateType {
    type Error = ModelError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(RateType::One),
            2 => Ok(RateType::Two),
            3 => Ok(RateType::Three),
            _ => Err(ModelError::InvalidValue(format!(
                "rate type must be 1, 2 or 3, got {value}"
            ))),
        }
    }
}

impl From<RateType> for u8 {
    fn from(value: RateType) -> Self {
        match value {
            RateType::One => 1,
            RateType::Two => 2,
            RateType::Three => 3,
        }
    }
}

impl Display for RateType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// Mass action terms of both sides of a reaction, `None` for a side without species
struct MassAction {
    reactants: Option<Expr>,
    products: Option<Expr>,
}

impl MassAction {
    fn of(reaction: &Reaction, metabolites: &Registry<Metabolite>, config: &Configuration) -> Self {
        // Exchanges of excluded species keep them
        let exchange = reaction.is_exchange();
        let keep = |id: &str| exchange || !is_excluded(id, metabolites, config);
        let mut reactants = product_of(reaction.reactants().filter(|(id, _)| keep(id)));
        let mut products = product_of(reaction.products().filter(|(id, _)| keep(id)));
        if let Some(external) = reaction.external_metabolite_id(config) {
            if reaction.reactants().next().is_none() {
                reactants = Some(Expr::Symbol(external));
            } else if reaction.products().next().is_none() {
                products = Some(Expr::Symbol(external));
            }
        }
        MassAction {
            reactants,
            products,
        }
    }
}

fn is_excluded(id: &str, metabolites: &Registry<Metabolite>, config: &Configuration) -> bool {
    metabolites
        .get(id)
        .and_then(|met| met.elements().ok())
        .is_some_and(|elements| config.is_excluded_from_rates(&elements))
}

/// Product of concentrations raised to the absolute value of their coefficients
fn product_of<'a, I>(species: I) -> Option<Expr>
where
    I: Iterator<Item = (&'a str, f64)>,
{
    species
        .map(|(id, coef)| Expr::conc(id).pow(coef.abs()))
        .reduce(|acc, term| acc * term)
}

/// `coefficient * term`, or just `coefficient` when there is no term
fn times(coefficient: Expr, term: Option<Expr>) -> Expr {
    match term {
        Some(term) => coefficient * term,
        None => coefficient,
    }
}

/// Generate the rate law of a reaction
///
/// # Parameters
/// - `reaction`: reaction to generate the rate law for
/// - `metabolites`: metabolites used to look up formulas for the exclusion filter
/// - `rate_type`: see [`RateType`]
/// - `config`: provides the exclusion filter and boundary compartment
///
/// # Returns
/// `None` for a reaction without metabolites, otherwise the rate law with rate constants as
/// the symbols `kf_{id}`, `kr_{id}` and `Keq_{id}`
pub fn generate_rate_law(
    reaction: &Reaction,
    metabolites: &Registry<Metabolite>,
    rate_type: RateType,
    config: &Configuration,
) -> Option<Expr> {
    if reaction.metabolites.is_empty() {
        return None;
    }
    let MassAction {
        reactants,
        products,
    } = MassAction::of(reaction, metabolites, config);
    let kf = Expr::Symbol(reaction.kf_str());
    let kr = Expr::Symbol(reaction.kr_str());
    let keq = Expr::Symbol(reaction.keq_str());
    let one = || Expr::Num(1.);
    let rate = match (rate_type, reaction.reversible) {
        (RateType::One, false) | (RateType::Two, false) => times(kf, reactants),
        (RateType::Three, false) => times(kr * keq, reactants),
        (RateType::One, true) => {
            kf * (reactants.unwrap_or_else(one) - products.unwrap_or_else(one) / keq)
        }
        (RateType::Two, true) => times(kf, reactants) - times(kr, products),
        (RateType::Three, true) => kr * (times(keq, reactants) - products.unwrap_or_else(one)),
    };
    Some(rate)
}

/// Rate law as a string, optionally with the reaction's known parameter values substituted
pub fn rate_law_string(
    reaction: &Reaction,
    metabolites: &Registry<Metabolite>,
    rate_type: RateType,
    config: &Configuration,
    substitute_values: bool,
) -> Option<String> {
    let rate = generate_rate_law(reaction, metabolites, rate_type, config)?;
    if substitute_values {
        Some(rate.subs_symbols(&reaction.parameter_values(config)).to_string())
    } else {
        Some(rate.to_string())
    }
}

/// Mass action ratio of a reaction, products over reactants
pub fn mass_action_ratio(
    reaction: &Reaction,
    metabolites: &Registry<Metabolite>,
    config: &Configuration,
) -> Expr {
    let MassAction {
        reactants,
        products,
    } = MassAction::of(reaction, metabolites, config);
    (products.unwrap_or(Expr::Num(1.)) / reactants.unwrap_or(Expr::Num(1.))).simplify()
}

/// Disequilibrium ratio of a reaction, its mass action ratio over `Keq_{id}`
pub fn disequilibrium_ratio(
    reaction: &Reaction,
    metabolites: &Registry<Metabolite>,
    config: &Configuration,
) -> Expr {
    mass_action_ratio(reaction, metabolites, config) / Expr::Symbol(reaction.keq_str())
}

// region Model rate functions
impl Model {
    /// Generated rate law of one reaction, ignoring custom rates
    pub fn rate_law(&self, reaction_id: &str, rate_type: RateType) -> Result<Expr, ModelError> {
        let rxn = self
            .reactions
            .get(reaction_id)
            .ok_or_else(|| ModelError::NotFound(format!("Reaction {reaction_id}")))?;
        generate_rate_law(rxn, &self.metabolites, rate_type, &self.config)
            .ok_or_else(|| ModelError::InvalidValue(format!("Reaction {reaction_id} has no metabolites")))
    }

    /// Rate expressions of every reaction using the model's rate type
    ///
    /// Reactions with a custom rate use it in place of the generated rate law.
    pub fn rates(&self) -> IndexMap<String, Expr> {
        self.rates_of_type(self.rate_type)
    }

    /// Rate expressions of every reaction using a specific rate type, custom rates take
    /// precedence. Reactions without metabolites and without a custom rate are left out.
    pub fn rates_of_type(&self, rate_type: RateType) -> IndexMap<String, Expr> {
        self.reactions
            .iter()
            .filter_map(|rxn| {
                let rate = match self.custom_rates.get(&rxn.id) {
                    Some(custom) => Some(custom.clone()),
                    None => generate_rate_law(rxn, &self.metabolites, rate_type, &self.config),
                };
                rate.map(|r| (rxn.id.clone(), r))
            })
            .collect()
    }

    /// Human readable rate laws of every reaction
    ///
    /// # Parameters
    /// - `rate_type`: rate law type, defaults to the model's
    /// - `substitute_values`: replace known rate constants and custom parameters with values
    pub fn rate_law_strings(
        &self,
        rate_type: Option<RateType>,
        substitute_values: bool,
    ) -> IndexMap<String, String> {
        let rates = self.rates_of_type(rate_type.unwrap_or(self.rate_type));
        let values = if substitute_values {
            self.parameters()
        } else {
            IndexMap::new()
        };
        rates
            .into_iter()
            .map(|(id, rate)| (id, rate.subs_symbols(&values).to_string()))
            .collect()
    }

    /// Mass action ratios of the given reactions (all reactions when `None`)
    pub fn mass_action_ratios(&self, reaction_ids: Option<&[&str]>) -> IndexMap<String, Expr> {
        self.selected_reactions(reaction_ids)
            .map(|rxn| {
                (
                    rxn.id.clone(),
                    mass_action_ratio(rxn, &self.metabolites, &self.config),
                )
            })
            .collect()
    }

    /// Disequilibrium ratios of the given reactions (all reactions when `None`)
    pub fn disequilibrium_ratios(&self, reaction_ids: Option<&[&str]>) -> IndexMap<String, Expr> {
        self.selected_reactions(reaction_ids)
            .map(|rxn| {
                (
                    rxn.id.clone(),
                    disequilibrium_ratio(rxn, &self.metabolites, &self.config),
                )
            })
            .collect()
    }

    fn selected_reactions<'a>(
        &'a self,
        reaction_ids: Option<&'a [&'a str]>,
    ) -> impl Iterator<Item = &'a Reaction> + 'a {
        self.reactions.iter().filter(move |rxn| {
            reaction_ids.map_or(true, |ids| ids.contains(&rxn.id.as_str()))
        })
    }
}
// endregion Model rate functions
