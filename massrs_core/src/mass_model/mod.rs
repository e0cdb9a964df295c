//! Module providing the Model struct for representing a kinetic model of a reaction network.

pub mod gene;
pub mod metabolite;
pub mod model;
pub mod reaction;
pub mod registry;
pub mod stoichiometry;
pub mod transaction;
