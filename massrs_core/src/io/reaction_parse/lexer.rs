//! Lex a reaction string into a series of tokens for later parsing
use thiserror::Error;

use crate::io::reaction_parse::token::Token;

pub struct Lexer {
    source: Vec<char>,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            tokens: Vec::new(),
            start: 0,
            current: 0,
        }
    }

    /// Convert the source into tokens, always ending with [`Token::Eof`]
    pub fn scan_tokens(mut self) -> Result<Vec<Token>, LexerError> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token()?;
        }
        self.tokens.push(Token::Eof);
        Ok(self.tokens)
    }

    fn scan_token(&mut self) -> Result<(), LexerError> {
        let c = self.advance();
        match c {
            // Single Character Tokens
            ':' => self.add_token(Token::Colon),
            ',' => self.add_token(Token::Comma),
            '=' => self.add_token(Token::Equals),
            '+' => self.add_token(Token::Plus),
            '[' => self.add_token(Token::LeftBracket),
            ']' => self.add_token(Token::RightBracket),
            // Arrows
            '<' => {
                if self.match_str("=>") {
                    self.add_token(Token::ReversibleArrow)
                } else if self.match_str("--") {
                    self.add_token(Token::BackwardArrow)
                } else {
                    return Err(LexerError::InvalidToken(c, self.start));
                }
            }
            '-' => {
                if self.match_str("->") {
                    self.add_token(Token::ForwardArrow)
                } else if self.peek().is_ascii_digit() {
                    self.read_word()
                } else {
                    return Err(LexerError::InvalidToken(c, self.start));
                }
            }
            '"' | '\'' => self.read_string(c)?,
            c if Lexer::is_word(c) => self.read_word(),
            // Whitespace
            ' ' | '\r' | '\n' | '\t' => {}
            _ => return Err(LexerError::InvalidToken(c, self.start)),
        };
        Ok(())
    }

    fn advance(&mut self) -> char {
        let char_at_current = self.source[self.current];
        self.current += 1;
        char_at_current
    }

    /// Consume `expected` if the source continues with it
    fn match_str(&mut self, expected: &str) -> bool {
        let end = self.current + expected.chars().count();
        if end > self.source.len()
            || !self.source[self.current..end].iter().copied().eq(expected.chars())
        {
            return false;
        }
        self.current = end;
        true
    }

    /// Identifiers and numbers, a word which parses as a number is a number
    fn read_word(&mut self) {
        while Lexer::is_word(self.peek()) {
            self.advance();
        }
        let text: String = self.source[self.start..self.current].iter().collect();
        match text.parse::<f64>() {
            Ok(value) if text.starts_with(|c: char| c.is_ascii_digit() || c == '.' || c == '-') => {
                self.add_token(Token::Number(value))
            }
            _ => self.add_token(Token::Identifier(text)),
        }
    }

    fn read_string(&mut self, quote: char) -> Result<(), LexerError> {
        while !self.is_at_end() && self.peek() != quote {
            self.advance();
        }
        if self.is_at_end() {
            return Err(LexerError::UnterminatedString(self.start));
        }
        let text: String = self.source[self.start + 1..self.current].iter().collect();
        // Closing quote
        self.advance();
        self.add_token(Token::Str(text));
        Ok(())
    }

    fn is_word(c: char) -> bool {
        c.is_alphanumeric() || matches!(c, '_' | '&' | '.')
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            return '\0';
        }
        self.source[self.current]
    }

    fn add_token(&mut self, token: Token) {
        self.tokens.push(token);
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }
}

#[derive(Debug, Error, PartialEq, Clone)]
pub enum LexerError {
    #[error("Invalid character '{0}' at position {1}")]
    InvalidToken(char, usize),
    #[error("Unterminated string starting at position {0}")]
    UnterminatedString(usize),
}

#[cfg(test)]
mod lexer_tests {
    use super::*;

    #[test]
    fn test_simple_reaction() {
        let tokens = Lexer::new("v1: 2 A <=> B").scan_tokens().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Identifier("v1".to_string()),
                Token::Colon,
                Token::Number(2.),
                Token::Identifier("A".to_string()),
                Token::ReversibleArrow,
                Token::Identifier("B".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_species_with_attributes() {
        let tokens = Lexer::new("s[E&S, name=\"bound enzyme\", charge=2][c] --> nothing")
            .scan_tokens()
            .unwrap();
        assert_eq!(tokens.len(), 18);
        assert_eq!(tokens[2], Token::Identifier("E&S".to_string()));
        assert_eq!(tokens[6], Token::Str("bound enzyme".to_string()));
        assert_eq!(tokens[10], Token::Number(2.));
        assert_eq!(tokens[15], Token::ForwardArrow);
    }

    #[test]
    fn test_leading_digit_identifier() {
        let tokens = Lexer::new("13dpg <-- 0.5 pg3").scan_tokens().unwrap();
        assert_eq!(tokens[0], Token::Identifier("13dpg".to_string()));
        assert_eq!(tokens[1], Token::BackwardArrow);
        assert_eq!(tokens[2], Token::Number(0.5));
    }

    #[test]
    fn test_negative_number() {
        let tokens = Lexer::new("charge=-2").scan_tokens().unwrap();
        assert_eq!(tokens[2], Token::Number(-2.));
    }

    #[test]
    fn test_invalid_tokens() {
        assert_eq!(
            Lexer::new("A -> B").scan_tokens(),
            Err(LexerError::InvalidToken('-', 2))
        );
        assert_eq!(
            Lexer::new("s[A, name=\"open").scan_tokens(),
            Err(LexerError::UnterminatedString(10))
        );
    }
}
