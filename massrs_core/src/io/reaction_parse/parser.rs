use indexmap::IndexMap;
use thiserror::Error;

use crate::io::reaction_parse::token::Token;

/*
Reaction Grammar:
reaction -> IDENT ":" side ARROW side ;
side     -> "nothing" | term ( "+" term )* ;
term     -> NUMBER? species ;
species  -> "s" "[" IDENT ( "," IDENT "=" value )* "]" ( "[" IDENT "]" )? | IDENT ;
value    -> IDENT | NUMBER | STRING ;

e.g. v1: 2 s[x1, name=xOne, charge=2][c] <=> s[x2, formula=X]
 */

/// A species written in a reaction string, with the attributes given for it
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpeciesSpec {
    pub id: String,
    pub name: Option<String>,
    pub formula: Option<String>,
    pub charge: Option<i32>,
    pub compartment: Option<String>,
}

/// Reaction described by a reaction string
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReaction {
    pub id: String,
    pub reversible: bool,
    /// Coefficients by species id, negative for reactants
    pub metabolites: IndexMap<String, f64>,
    /// Every species in order of appearance
    pub species: Vec<SpeciesSpec>,
}

/// Reaction string parser
pub struct ReactionParser {
    /// Vector of tokens from the reaction string
    tokens: Vec<Token>,
    /// Current token being processed
    current: usize,
    species: Vec<SpeciesSpec>,
}

impl ReactionParser {
    pub fn new(tokens: Vec<Token>) -> ReactionParser {
        ReactionParser {
            tokens,
            current: 0,
            species: Vec::new(),
        }
    }

    // region Parsing Functions

    /// Parse the token vector into a [`ParsedReaction`]
    pub fn parse(mut self) -> Result<ParsedReaction, ParseError> {
        let id = self
            .match_identifier()
            .ok_or(ParseError::ExpectedReactionId)?;
        self.consume(Token::Colon, "Expect ':' after reaction id.")?;
        let left = self.side()?;
        let arrow = self.advance();
        let right = self.side()?;
        if !self.is_at_end() {
            return Err(ParseError::EarlyTermination);
        }
        let (reactants, products, reversible) = match arrow {
            Token::ReversibleArrow => (left, right, true),
            Token::ForwardArrow => (left, right, false),
            Token::BackwardArrow => (right, left, false),
            _ => return Err(ParseError::ExpectedArrow),
        };
        let mut metabolites: IndexMap<String, f64> = IndexMap::new();
        for (species, coefficient) in reactants {
            *metabolites.entry(species).or_insert(0.) -= coefficient;
        }
        for (species, coefficient) in products {
            *metabolites.entry(species).or_insert(0.) += coefficient;
        }
        Ok(ParsedReaction {
            id,
            reversible,
            metabolites,
            species: self.species,
        })
    }

    fn side(&mut self) -> Result<Vec<(String, f64)>, ParseError> {
        let mut terms = Vec::new();
        if self.is_arrow() || self.is_at_end() {
            return Ok(terms);
        }
        if let Token::Identifier(word) = self.peek() {
            if word.eq_ignore_ascii_case("nothing") {
                self.advance();
                return Ok(terms);
            }
        }
        terms.push(self.term()?);
        while self.match_token(&Token::Plus) {
            terms.push(self.term()?);
        }
        Ok(terms)
    }

    fn term(&mut self) -> Result<(String, f64), ParseError> {
        let coefficient = match self.peek() {
            Token::Number(value) => {
                self.advance();
                value
            }
            _ => 1.,
        };
        Ok((self.species()?, coefficient))
    }

    fn species(&mut self) -> Result<String, ParseError> {
        let id = self.match_identifier().ok_or(ParseError::ExpectedSpecies)?;
        if !(id == "s" && self.match_token(&Token::LeftBracket)) {
            self.add_species(SpeciesSpec {
                id: id.clone(),
                ..Default::default()
            });
            return Ok(id);
        }
        let mut spec = SpeciesSpec {
            id: self.match_identifier().ok_or(ParseError::ExpectedSpecies)?,
            ..Default::default()
        };
        while self.match_token(&Token::Comma) {
            let attribute = self
                .match_identifier()
                .ok_or_else(|| ParseError::MissingToken("Expect attribute name.".to_string()))?;
            self.consume(Token::Equals, "Expect '=' after attribute name.")?;
            let value = self.value()?;
            match attribute.as_str() {
                "name" => spec.name = Some(value),
                "formula" => spec.formula = Some(value),
                "charge" => {
                    let charge = value
                        .parse::<f64>()
                        .ok()
                        .filter(|c| c.fract() == 0.)
                        .ok_or_else(|| ParseError::InvalidAttributeValue(attribute, value))?;
                    spec.charge = Some(charge as i32);
                }
                _ => return Err(ParseError::UnknownAttribute(attribute)),
            }
        }
        self.consume(Token::RightBracket, "Expect ']' after species.")?;
        if self.match_token(&Token::LeftBracket) {
            spec.compartment = Some(
                self.match_identifier()
                    .ok_or_else(|| ParseError::MissingToken("Expect compartment.".to_string()))?,
            );
            self.consume(Token::RightBracket, "Expect ']' after compartment.")?;
        }
        let id = spec.id.clone();
        self.add_species(spec);
        Ok(id)
    }

    fn value(&mut self) -> Result<String, ParseError> {
        match self.advance() {
            Token::Identifier(text) | Token::Str(text) => Ok(text),
            Token::Number(value) => Ok(value.to_string()),
            _ => Err(ParseError::MissingToken("Expect attribute value.".to_string())),
        }
    }

    // endregion Parsing Functions

    // region parsing helper functions

    /// Merge a species into the list, later attributes override earlier ones
    fn add_species(&mut self, spec: SpeciesSpec) {
        match self.species.iter_mut().find(|s| s.id == spec.id) {
            Some(existing) => {
                existing.name = spec.name.or(existing.name.take());
                existing.formula = spec.formula.or(existing.formula.take());
                existing.charge = spec.charge.or(existing.charge);
                existing.compartment = spec.compartment.or(existing.compartment.take());
            }
            None => self.species.push(spec),
        }
    }

    /// Check whether the current token matches `token`, if it does advance and return true
    fn match_token(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            return true;
        }
        false
    }

    /// If the current token is an identifier, advance and return it
    fn match_identifier(&mut self) -> Option<String> {
        if let Token::Identifier(id) = self.peek() {
            self.advance();
            return Some(id);
        }
        None
    }

    fn is_arrow(&self) -> bool {
        matches!(
            self.peek(),
            Token::ReversibleArrow | Token::ForwardArrow | Token::BackwardArrow
        )
    }

    fn check(&self, token: &Token) -> bool {
        if self.is_at_end() {
            return false;
        }
        &self.peek() == token
    }

    /// Advance one position unless at the end, then return the previous token
    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek() == Token::Eof
    }

    fn peek(&self) -> Token {
        self.tokens.get(self.current).cloned().unwrap_or(Token::Eof)
    }

    fn previous(&self) -> Token {
        match self.current {
            0 => Token::Eof,
            i => self.tokens.get(i - 1).cloned().unwrap_or(Token::Eof),
        }
    }

    /// Consume the expected token or return [`ParseError::MissingToken`] with `msg`
    fn consume(&mut self, token: Token, msg: &str) -> Result<Token, ParseError> {
        if self.check(&token) {
            return Ok(self.advance());
        }
        Err(ParseError::MissingToken(msg.to_string()))
    }

    // endregion parsing helper functions
}

/// Enum representing possible parse errors
#[derive(Debug, Error, PartialEq, Clone)]
pub enum ParseError {
    #[error("Reaction string must start with a reaction id")]
    ExpectedReactionId,
    #[error("Expected one of '<=>', '-->' or '<--'")]
    ExpectedArrow,
    #[error("Expected a species")]
    ExpectedSpecies,
    #[error("{0}")]
    MissingToken(String),
    #[error("Unknown species attribute {0}")]
    UnknownAttribute(String),
    #[error("Invalid value for attribute {0}: {1}")]
    InvalidAttributeValue(String, String),
    #[error("Unexpected tokens after the end of the reaction")]
    EarlyTermination,
}

#[cfg(test)]
mod parser_tests {
    use super::*;
    use crate::io::reaction_parse::lexer::Lexer;

    fn parse(input: &str) -> Result<ParsedReaction, ParseError> {
        ReactionParser::new(Lexer::new(input).scan_tokens().unwrap()).parse()
    }

    #[test]
    fn test_reversible_reaction() {
        let rxn = parse("v1: 2 A + B <=> C").unwrap();
        assert_eq!(rxn.id, "v1");
        assert!(rxn.reversible);
        assert_eq!(
            rxn.metabolites,
            IndexMap::from([
                ("A".to_string(), -2.),
                ("B".to_string(), -1.),
                ("C".to_string(), 1.)
            ])
        );
    }

    #[test]
    fn test_backward_arrow_swaps_sides() {
        let rxn = parse("v2: C <-- A").unwrap();
        assert!(!rxn.reversible);
        assert_eq!(rxn.metabolites["A"], -1.);
        assert_eq!(rxn.metabolites["C"], 1.);
    }

    #[test]
    fn test_nothing_side() {
        let rxn = parse("DM_A: A --> nothing").unwrap();
        assert_eq!(rxn.metabolites.len(), 1);
        let rxn = parse("S_A: --> A").unwrap();
        assert_eq!(rxn.metabolites["A"], 1.);
    }

    #[test]
    fn test_species_attributes() {
        let rxn = parse(
            "E1: s[ENZ][c] + s[x1, name=\"x one\", charge=-2, formula=C6H12O6][c] <=> s[ENZ&x1][c]",
        )
        .unwrap();
        assert_eq!(rxn.species.len(), 3);
        let x1 = &rxn.species[1];
        assert_eq!(x1.name.as_deref(), Some("x one"));
        assert_eq!(x1.charge, Some(-2));
        assert_eq!(x1.formula.as_deref(), Some("C6H12O6"));
        assert_eq!(x1.compartment.as_deref(), Some("c"));
        assert_eq!(rxn.metabolites["ENZ&x1"], 1.);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse("A <=> B"),
            Err(ParseError::MissingToken("Expect ':' after reaction id.".to_string()))
        );
        assert_eq!(parse("v1: A B"), Err(ParseError::ExpectedArrow));
        assert_eq!(parse("v1: A <=> B C"), Err(ParseError::EarlyTermination));
        assert_eq!(
            parse("v1: s[A, color=red] <=> B"),
            Err(ParseError::UnknownAttribute("color".to_string()))
        );
        assert_eq!(
            parse("v1: s[A, charge=1.5] <=> B"),
            Err(ParseError::InvalidAttributeValue("charge".to_string(), "1.5".to_string()))
        );
    }
}
