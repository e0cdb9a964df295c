//! Parse chemical formulas such as `C6H12O6` into element counts
use indexmap::IndexMap;
use thiserror::Error;

/// Parse a chemical formula into an ordered map of element symbol to atom count
///
/// Elements start with an uppercase letter, optionally followed by lowercase letters, and an
/// optional count (1 when omitted). Repeated elements are summed.
///
/// # Examples
/// ```rust
/// use massrs_core::utils::formula::parse_formula;
/// let water = parse_formula("H2O").unwrap();
/// assert_eq!(water.get("H"), Some(&2));
/// assert_eq!(water.get("O"), Some(&1));
/// ```
pub fn parse_formula(formula: &str) -> Result<IndexMap<String, u32>, FormulaError> {
    let chars: Vec<char> = formula.trim().chars().collect();
    let mut elements: IndexMap<String, u32> = IndexMap::new();
    let mut current = 0;
    while current < chars.len() {
        let c = chars[current];
        if !c.is_ascii_uppercase() {
            return Err(FormulaError::UnexpectedCharacter(c, formula.to_string()));
        }
        let start = current;
        current += 1;
        while current < chars.len() && chars[current].is_ascii_lowercase() {
            current += 1;
        }
        let element: String = chars[start..current].iter().collect();
        let digits_start = current;
        while current < chars.len() && chars[current].is_ascii_digit() {
            current += 1;
        }
        let count = if digits_start == current {
            1
        } else {
            let digits: String = chars[digits_start..current].iter().collect();
            digits
                .parse::<u32>()
                .map_err(|_| FormulaError::InvalidCount(digits, formula.to_string()))?
        };
        *elements.entry(element).or_insert(0) += count;
    }
    Ok(elements)
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum FormulaError {
    #[error("Unexpected character '{0}' in formula {1}")]
    UnexpectedCharacter(char, String),
    #[error("Invalid element count {0} in formula {1}")]
    InvalidCount(String, String),
}

#[cfg(test)]
mod formula_tests {
    use super::*;

    #[test]
    fn glucose() {
        let glc = parse_formula("C6H12O6").unwrap();
        assert_eq!(glc.len(), 3);
        assert_eq!(glc["C"], 6);
        assert_eq!(glc["H"], 12);
        assert_eq!(glc["O"], 6);
    }

    #[test]
    fn multi_letter_and_repeated_elements() {
        let met = parse_formula("CH3COOFe").unwrap();
        assert_eq!(met["C"], 2);
        assert_eq!(met["H"], 3);
        assert_eq!(met["O"], 2);
        assert_eq!(met["Fe"], 1);
    }

    #[test]
    fn empty_and_invalid() {
        assert!(parse_formula("").unwrap().is_empty());
        assert_eq!(
            parse_formula("h2o"),
            Err(FormulaError::UnexpectedCharacter('h', "h2o".to_string()))
        );
    }
}
