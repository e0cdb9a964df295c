//! Module providing the Token enum for lexing reaction strings

/// Represents Tokens in a reaction string
#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Identifier(String),
    Number(f64),
    Str(String),
    Colon,
    Comma,
    Equals,
    Plus,
    LeftBracket,
    RightBracket,
    /// `<=>`
    ReversibleArrow,
    /// `-->`
    ForwardArrow,
    /// `<--`
    BackwardArrow,
    Eof,
}
