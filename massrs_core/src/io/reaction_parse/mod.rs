//! Module for parsing reaction strings such as `v1: 2 s[A, formula=C3H4O3][c] <=> B`
use log::debug;
use thiserror::Error;

use crate::io::reaction_parse::lexer::LexerError;
use crate::io::reaction_parse::parser::{ParseError, ParsedReaction};
use crate::mass_model::metabolite::Metabolite;
use crate::mass_model::model::{Model, ModelError};
use crate::mass_model::reaction::Reaction;

mod lexer;
pub mod parser;
mod token;

/// Parse a reaction string
///
/// # Parameters
/// - `input`: reaction string, `id: reactants ARROW products`. The arrow is one of `<=>`
///   (reversible), `-->` (forward) or `<--` (backward). A side may be `nothing`. Species are
///   written as a bare id or as `s[id, name=.., formula=.., charge=..][compartment]`.
///
/// # Returns
/// Parse result which is
/// - `Ok`: the reaction id, reversibility, coefficients and species attributes
/// - `Err`: the ReactionParseError describing the problem with the string
///
/// # Examples
/// ```rust
/// use massrs_core::io::reaction_parse::parse_reaction_string;
/// let rxn = parse_reaction_string("v1: 2 A <=> s[B, charge=1][c]").unwrap();
/// assert_eq!(rxn.metabolites["A"], -2.);
/// assert!(rxn.reversible);
/// ```
pub fn parse_reaction_string(input: &str) -> Result<ParsedReaction, ReactionParseError> {
    let tokens = lexer::Lexer::new(input).scan_tokens()?;
    let parsed = parser::ReactionParser::new(tokens).parse()?;
    Ok(parsed)
}

/// Enum representing possible lex and parse errors
#[derive(Debug, Error, PartialEq, Clone)]
pub enum ReactionParseError {
    #[error("Error occurred during lexing (conversion of reaction string to tokens): {0}")]
    LexingError(#[from] LexerError),
    #[error("Error occurred during parsing (conversion of tokens to a reaction): {0}")]
    ParsingError(#[from] ParseError),
}

impl Model {
    /// Add a reaction described by a reaction string, see [`parse_reaction_string`]
    ///
    /// Species already in the model are reused, with the attributes given in the string
    /// applied to them. Unknown species are created.
    ///
    /// # Returns
    /// The id of the new reaction
    pub fn add_reaction_from_string(&mut self, input: &str) -> Result<String, ModelError> {
        let parsed = parse_reaction_string(input)?;
        if self.reactions.contains(&parsed.id) {
            return Err(ModelError::DuplicateEntity(parsed.id));
        }
        self.record_structure();
        let mut new_metabolites = Vec::new();
        for species in parsed.species {
            let met = match self.metabolites.get_mut(&species.id) {
                Some(met) => met,
                None => {
                    new_metabolites.push(Metabolite::new(&species.id));
                    match new_metabolites.last_mut() {
                        Some(met) => met,
                        None => continue,
                    }
                }
            };
            if species.name.is_some() {
                met.name = species.name;
            }
            if species.formula.is_some() {
                met.formula = species.formula;
            }
            if let Some(charge) = species.charge {
                met.charge = charge;
            }
            if species.compartment.is_some() {
                met.compartment = species.compartment;
            }
        }
        debug!(
            "Reaction {} creates {} metabolites",
            parsed.id,
            new_metabolites.len()
        );
        self.add_metabolites(new_metabolites);
        let mut rxn = Reaction::new(&parsed.id, parsed.metabolites);
        rxn.reversible = parsed.reversible;
        self.add_reactions(vec![rxn]);
        Ok(parsed.id)
    }
}

#[cfg(test)]
mod reaction_parse_tests {
    use super::*;
    use crate::mass_model::metabolite::MetaboliteBuilder;

    #[test]
    fn test_parse_reaction_string() {
        let rxn = parse_reaction_string("v1: s[x1, name=xOne, charge=2] <=> s[x2, formula=X]").unwrap();
        assert_eq!(rxn.id, "v1");
        assert_eq!(rxn.species[0].name.as_deref(), Some("xOne"));
        assert!(matches!(
            parse_reaction_string("v1: A => B"),
            Err(ReactionParseError::LexingError(_))
        ));
        assert!(matches!(
            parse_reaction_string("v1 A <=> B"),
            Err(ReactionParseError::ParsingError(_))
        ));
    }

    #[test]
    fn test_add_reaction_from_string() {
        let mut model = Model::new("strings");
        model.add_metabolites(vec![MetaboliteBuilder::default()
            .id("A".to_string())
            .name(Some("old name".to_string()))
            .build()
            .unwrap()]);
        let id = model
            .add_reaction_from_string("v1: s[A, formula=C3H4O3][c] --> 2 s[B, charge=-1][c]")
            .unwrap();
        assert_eq!(id, "v1");
        let rxn = model.reactions.get("v1").unwrap();
        assert!(!rxn.reversible);
        assert_eq!(rxn.get_coefficient("B"), Some(2.));
        let a = model.metabolites.get("A").unwrap();
        assert_eq!(a.name.as_deref(), Some("old name"));
        assert_eq!(a.formula.as_deref(), Some("C3H4O3"));
        assert!(a.reactions().contains("v1"));
        let b = model.metabolites.get("B").unwrap();
        assert_eq!(b.charge, -1);
        assert_eq!(b.compartment.as_deref(), Some("c"));

        assert!(matches!(
            model.add_reaction_from_string("v1: A <=> B"),
            Err(ModelError::DuplicateEntity(_))
        ));
        assert!(matches!(
            model.add_reaction_from_string("v2 A <=> B"),
            Err(ModelError::ReactionParseError(_))
        ));
    }

    #[test]
    fn test_string_reactions_are_reverted() {
        let mut model = Model::new("strings");
        model
            .with_context(|m| m.add_reaction_from_string("v1: A <=> B").map(|_| ()))
            .unwrap();
        assert!(model.reactions.is_empty());
        assert!(model.metabolites.is_empty());
    }
}
