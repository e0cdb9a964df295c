//! Custom rate expressions which replace generated rate laws
//!
//! A custom rate is written as an arithmetic string, e.g. `Vmax*S(t)/(Km + S(t))`.
//! Concentrations may be written as `id(t)` or as a bare metabolite id, every other identifier
//! is a constant symbol. Powers may be written with `**` or `^`.
use evalexpr::{build_operator_tree, DefaultNumericTypes, EvalexprError, Node, Operator};
use indexmap::IndexMap;
use log::info;
use thiserror::Error;

use crate::kinetics::expr::Expr;
use crate::mass_model::model::{Model, ModelError};

#[derive(Error, Debug)]
pub enum ExpressionError {
    /// Error from the expression parser
    #[error("Failed to parse expression: {0}")]
    BuildError(#[from] EvalexprError<DefaultNumericTypes>),
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),
    #[error("Unsupported function: {0}")]
    UnsupportedFunction(String),
    /// A constant which is not a number
    #[error("Expected numeric constant: {0}")]
    ConstOperator(String),
    #[error("Expected a single expression: {0}")]
    RootNode(String),
    /// An exponent which is not a numeric constant
    #[error("Exponent must be a numeric constant: {0}")]
    Exponent(String),
}

/// Parse a rate expression
///
/// # Parameters
/// - `expression`: the expression string
/// - `is_metabolite`: decides whether a bare identifier is a metabolite concentration
///
/// # Examples
/// ```rust
/// use massrs_core::kinetics::custom_rate::parse_rate_expression;
/// let rate = parse_rate_expression("Vmax*S/(Km + S(t))", |id| id == "S").unwrap();
/// assert_eq!(rate.to_string(), "Vmax*S(t)/(Km + S(t))");
/// ```
pub fn parse_rate_expression<F>(expression: &str, is_metabolite: F) -> Result<Expr, ExpressionError>
where
    F: Fn(&str) -> bool,
{
    let tree = build_operator_tree::<DefaultNumericTypes>(&expression.replace("**", "^"))?;
    convert(&tree, &is_metabolite)
}

fn convert<F>(node: &Node, is_metabolite: &F) -> Result<Expr, ExpressionError>
where
    F: Fn(&str) -> bool,
{
    let children = node.children();
    let binary = |make: fn(Box<Expr>, Box<Expr>) -> Expr| -> Result<Expr, ExpressionError> {
        let (first, rest) = children
            .split_first()
            .ok_or_else(|| ExpressionError::UnsupportedOperator(format!("{:?}", node.operator())))?;
        rest.iter().try_fold(convert(first, is_metabolite)?, |acc, child| {
            Ok(make(Box::new(acc), Box::new(convert(child, is_metabolite)?)))
        })
    };
    match node.operator() {
        Operator::Add => binary(Expr::Add),
        Operator::Sub => binary(Expr::Sub),
        Operator::Mul => binary(Expr::Mul),
        Operator::Div => binary(Expr::Div),
        Operator::Neg => match children {
            [child] => Ok(-convert(child, is_metabolite)?),
            _ => Err(ExpressionError::UnsupportedOperator("-".to_string())),
        },
        Operator::Exp => match children {
            [base, exponent] => Ok(convert(base, is_metabolite)?.pow(constant_exponent(exponent)?)),
            _ => Err(ExpressionError::UnsupportedOperator("^".to_string())),
        },
        Operator::Const { value } => match value {
            evalexpr::Value::Float(f) => Ok(Expr::Num(*f)),
            evalexpr::Value::Int(i) => Ok(Expr::Num(*i as f64)),
            _ => Err(ExpressionError::ConstOperator(format!("{value:?}"))),
        },
        Operator::VariableIdentifierRead { identifier } => {
            if is_metabolite(identifier) {
                Ok(Expr::Concentration(identifier.to_string()))
            } else {
                Ok(Expr::Symbol(identifier.to_string()))
            }
        }
        // `id(t)` is a concentration, anything else is not a known function
        Operator::FunctionIdentifier { identifier } => match children {
            [argument] if is_time(argument) => Ok(Expr::Concentration(identifier.to_string())),
            _ => Err(ExpressionError::UnsupportedFunction(identifier.to_string())),
        },
        Operator::RootNode => match children {
            [child] => convert(child, is_metabolite),
            _ => Err(ExpressionError::RootNode(format!("{children:?}"))),
        },
        other => Err(ExpressionError::UnsupportedOperator(format!("{other:?}"))),
    }
}

fn is_time(node: &Node) -> bool {
    match (node.operator(), node.children()) {
        (Operator::VariableIdentifierRead { identifier }, _) => identifier == "t",
        (Operator::RootNode, [child]) => is_time(child),
        _ => false,
    }
}

fn constant_exponent(node: &Node) -> Result<f64, ExpressionError> {
    match (node.operator(), node.children()) {
        (Operator::Const { value }, _) => match value {
            evalexpr::Value::Float(f) => Ok(*f),
            evalexpr::Value::Int(i) => Ok(*i as f64),
            _ => Err(ExpressionError::Exponent(format!("{value:?}"))),
        },
        (Operator::Neg, [child]) => Ok(-constant_exponent(child)?),
        (Operator::RootNode, [child]) => constant_exponent(child),
        (other, _) => Err(ExpressionError::Exponent(format!("{other:?}"))),
    }
}

// region Model custom rate functions
impl Model {
    /// Set a custom rate for a reaction, replacing its generated rate law
    ///
    /// # Parameters
    /// - `reaction_id`: id of an existing reaction
    /// - `rate`: rate expression, see [`parse_rate_expression`]
    /// - `parameters`: values of parameters used by the expression. Parameters already known
    ///   to the model keep their value unless given here.
    pub fn add_custom_rate(
        &mut self,
        reaction_id: &str,
        rate: &str,
        parameters: &IndexMap<String, f64>,
    ) -> Result<(), ModelError> {
        if !self.reactions.contains(reaction_id) {
            return Err(ModelError::NotFound(format!("Reaction {reaction_id}")));
        }
        let expr = parse_rate_expression(rate, |id| self.metabolites.contains(id))?;
        let old_rate = self.custom_rates.insert(reaction_id.to_string(), expr);
        let mut old_parameters = Vec::new();
        for (name, value) in parameters {
            old_parameters.push((name.clone(), self.custom_parameters.insert(name.clone(), *value)));
        }
        let reaction_id = reaction_id.to_string();
        self.record(move |m: &mut Model| {
            for (name, old) in old_parameters.into_iter().rev() {
                match old {
                    Some(v) => m.custom_parameters.insert(name, v),
                    None => m.custom_parameters.shift_remove(&name),
                };
            }
            match old_rate {
                Some(rate) => m.custom_rates.insert(reaction_id, rate),
                None => m.custom_rates.shift_remove(&reaction_id),
            };
        });
        Ok(())
    }

    /// Remove the custom rate of a reaction
    ///
    /// Custom parameters no longer used by any remaining custom rate are removed too.
    pub fn remove_custom_rate(&mut self, reaction_id: &str) -> Result<(), ModelError> {
        if !self.custom_rates.contains_key(reaction_id) {
            return Err(ModelError::NotFound(format!("Custom rate for {reaction_id}")));
        }
        let old_rates = self.custom_rates.clone();
        let old_parameters = self.custom_parameters.clone();
        self.drop_custom_rate(reaction_id);
        self.record(move |m: &mut Model| {
            m.custom_rates = old_rates;
            m.custom_parameters = old_parameters;
        });
        Ok(())
    }

    /// Remove every custom rate and custom parameter
    pub fn reset_custom_rates(&mut self) {
        let old_rates = std::mem::take(&mut self.custom_rates);
        let old_parameters = std::mem::take(&mut self.custom_parameters);
        info!("Reset {} custom rates", old_rates.len());
        self.record(move |m: &mut Model| {
            m.custom_rates = old_rates;
            m.custom_parameters = old_parameters;
        });
    }

    /// Drop a custom rate and its unshared parameters without recording a reversal
    pub(crate) fn drop_custom_rate(&mut self, reaction_id: &str) {
        let Some(rate) = self.custom_rates.shift_remove(reaction_id) else {
            return;
        };
        for symbol in rate.symbols() {
            let shared = self.custom_rates.values().any(|other| other.contains(&symbol));
            if !shared {
                self.custom_parameters.shift_remove(&symbol);
            }
        }
    }

    pub fn custom_rates(&self) -> &IndexMap<String, Expr> {
        &self.custom_rates
    }

    pub fn custom_parameters(&self) -> &IndexMap<String, f64> {
        &self.custom_parameters
    }
}
// endregion Model custom rate functions

#[cfg(test)]
mod custom_rate_tests {
    use super::*;
    use crate::mass_model::reaction::Reaction;

    fn setup_model() -> Model {
        let mut model = Model::new("custom");
        model.add_reactions(vec![
            Reaction::new(
                "v1",
                IndexMap::from([("S".to_string(), -1.), ("P".to_string(), 1.)]),
            ),
            Reaction::new(
                "v2",
                IndexMap::from([("P".to_string(), -1.), ("Q".to_string(), 1.)]),
            ),
        ]);
        model
    }

    #[test]
    fn parse_concentrations_and_symbols() {
        let rate = parse_rate_expression("Vmax*S/(Km + S(t))", |id| id == "S").unwrap();
        assert_eq!(rate.to_string(), "Vmax*S(t)/(Km + S(t))");
        assert_eq!(rate.concentrations().len(), 1);
        assert_eq!(rate.symbols().len(), 2);

        let rate = parse_rate_expression("k*A(t)**2 - B(t)^0.5", |_| false).unwrap();
        assert_eq!(rate.to_string(), "k*A(t)**2 - B(t)**0.5");
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(
            parse_rate_expression("sqrt(S(t))", |_| false),
            Err(ExpressionError::UnsupportedFunction(_))
        ));
        assert!(matches!(
            parse_rate_expression("S(t)^k", |_| false),
            Err(ExpressionError::Exponent(_))
        ));
        assert!(matches!(
            parse_rate_expression("(S(t)", |_| false),
            Err(ExpressionError::BuildError(_))
        ));
    }

    #[test]
    fn add_and_remove_custom_rates() {
        let mut model = setup_model();
        let params = IndexMap::from([("Vmax".to_string(), 2.), ("Km".to_string(), 0.1)]);
        model.add_custom_rate("v1", "Vmax*S(t)/(Km + S(t))", &params).unwrap();
        model.add_custom_rate("v2", "Vmax*P(t)", &IndexMap::new()).unwrap();
        assert_eq!(model.custom_rates().len(), 2);
        assert_eq!(model.custom_parameters()["Vmax"], 2.);

        // Vmax is still used by v2
        model.remove_custom_rate("v1").unwrap();
        assert!(model.custom_parameters().contains_key("Vmax"));
        assert!(!model.custom_parameters().contains_key("Km"));

        model.remove_custom_rate("v2").unwrap();
        assert!(model.custom_parameters().is_empty());
        assert!(model.remove_custom_rate("v2").is_err());
    }

    #[test]
    fn custom_rate_requires_reaction() {
        let mut model = setup_model();
        assert!(matches!(
            model.add_custom_rate("v9", "k*S(t)", &IndexMap::new()),
            Err(ModelError::NotFound(_))
        ));
        assert!(matches!(
            model.add_custom_rate("v1", "(k*S(t)", &IndexMap::new()),
            Err(ModelError::ExpressionError(_))
        ));
        assert!(model.custom_rates().is_empty());
    }

    #[test]
    fn removing_reaction_drops_custom_rate() {
        let mut model = setup_model();
        model
            .add_custom_rate("v2", "k*P(t)", &IndexMap::from([("k".to_string(), 1.)]))
            .unwrap();
        model.remove_reactions(&["v2"], false);
        assert!(model.custom_rates().is_empty());
        assert!(model.custom_parameters().is_empty());
    }

    #[test]
    fn custom_rates_are_reverted() {
        let mut model = setup_model();
        model
            .with_context(|m| -> Result<(), ModelError> {
                m.add_custom_rate("v1", "k*S(t)", &IndexMap::from([("k".to_string(), 3.)]))?;
                m.reset_custom_rates();
                assert!(m.custom_rates().is_empty());
                Ok(())
            })
            .unwrap();
        assert!(model.custom_rates().is_empty());
        assert!(model.custom_parameters().is_empty());
    }
}
