//! Kinetic description of a model: rate laws, ODEs, custom rates and steady state solving
use std::fmt::{Display, Formatter};

use indexmap::IndexMap;

use crate::kinetics::expr::Expr;
use crate::mass_model::model::Model;

pub mod custom_rate;
pub mod expr;
pub mod ode;
pub mod perc;
pub mod rate_law;
pub mod symbols;

/// Key of a profile, the time course of a metabolite, a reaction or any named quantity
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ProfileKey {
    Metabolite(String),
    Reaction(String),
    Id(String),
}

impl Display for ProfileKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileKey::Metabolite(id) | ProfileKey::Reaction(id) | ProfileKey::Id(id) => {
                write!(f, "{id}")
            }
        }
    }
}

impl Model {
    /// Definitions of the profiles of a model
    ///
    /// Metabolites are defined by their ODE and reactions by their rate.
    pub fn profile_definitions(&self) -> IndexMap<ProfileKey, Expr> {
        let mut definitions: IndexMap<ProfileKey, Expr> = self
            .odes()
            .into_iter()
            .map(|(id, ode)| (ProfileKey::Metabolite(id), ode))
            .collect();
        definitions.extend(
            self.rates()
                .into_iter()
                .map(|(id, rate)| (ProfileKey::Reaction(id), rate)),
        );
        definitions
    }
}
