//! Module for reading and writing Models
pub mod json;
pub mod reaction_parse;
