//! Core rust implementation of kinetic models of biochemical reaction networks, providing
//! the metabolite/reaction registries, the stoichiometric matrix engine, symbolic rate laws
//! and ODEs, and the PERC steady-state parameter solver.
pub mod configuration;
pub mod io;
pub mod kinetics;
pub mod mass_model;
pub mod utils;
