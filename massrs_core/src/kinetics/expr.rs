//! Symbolic expression tree for rate laws and ODEs.
//!
//! This module provides the [`Expr`] type used throughout the kinetics engine. Expressions
//! distinguish time-dependent metabolite concentrations (displayed as `id(t)`) from constant
//! symbols such as rate constants, custom parameters and boundary species.
//!
//! Supported operations:
//! - Arithmetic: addition, subtraction, multiplication, division, negation
//! - Powers with a constant exponent (displayed as `**`)
//! - Substitution of symbols by values or by other expressions
//! - Numeric evaluation
//! - Constant folding and identity simplification
//! - Extraction of a rational function (numerator and denominator polynomials) in one symbol
//!
//! Expressions can be combined with the standard operators:
//! ```rust
//! use massrs_core::kinetics::expr::Expr;
//! let rate = Expr::sym("kf_v1") * (Expr::conc("A") - Expr::conc("B") / Expr::sym("Keq_v1"));
//! assert_eq!(rate.to_string(), "kf_v1*(A(t) - B(t)/Keq_v1)");
//! ```
use std::fmt::{Display, Formatter};
use std::ops;

use indexmap::{IndexMap, IndexSet};

/// A symbolic expression
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Numeric constant
    Num(f64),
    /// Time independent symbol (rate constant, parameter, boundary species)
    Symbol(String),
    /// Time dependent concentration of a metabolite, displayed as `id(t)`
    Concentration(String),
    /// Sum of two expressions
    Add(Box<Expr>, Box<Expr>),
    /// Difference of two expressions
    Sub(Box<Expr>, Box<Expr>),
    /// Product of two expressions
    Mul(Box<Expr>, Box<Expr>),
    /// Quotient of two expressions
    Div(Box<Expr>, Box<Expr>),
    /// Expression raised to a constant power
    Pow(Box<Expr>, f64),
    /// Negated expression
    Neg(Box<Expr>),
}

impl Expr {
    pub fn num(value: f64) -> Expr {
        Expr::Num(value)
    }

    pub fn sym(name: &str) -> Expr {
        Expr::Symbol(name.to_string())
    }

    pub fn conc(metabolite_id: &str) -> Expr {
        Expr::Concentration(metabolite_id.to_string())
    }

    /// Raise to a power, an exponent of exactly 1 returns the expression unchanged
    pub fn pow(self, exponent: f64) -> Expr {
        if exponent == 1. {
            self
        } else {
            Expr::Pow(Box::new(self), exponent)
        }
    }

    // region Inspection

    /// Names of the constant symbols in the expression, in order of first appearance
    pub fn symbols(&self) -> IndexSet<String> {
        let mut out = IndexSet::new();
        self.visit(&mut |e| {
            if let Expr::Symbol(name) = e {
                out.insert(name.clone());
            }
        });
        out
    }

    /// Ids of the metabolites whose concentration appears in the expression
    pub fn concentrations(&self) -> IndexSet<String> {
        let mut out = IndexSet::new();
        self.visit(&mut |e| {
            if let Expr::Concentration(name) = e {
                out.insert(name.clone());
            }
        });
        out
    }

    /// Whether a constant symbol or concentration with this name appears in the expression
    pub fn contains(&self, name: &str) -> bool {
        let mut found = false;
        self.visit(&mut |e| match e {
            Expr::Symbol(n) | Expr::Concentration(n) if n == name => found = true,
            _ => {}
        });
        found
    }

    fn visit<F: FnMut(&Expr)>(&self, f: &mut F) {
        f(self);
        match self {
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) | Expr::Div(a, b) => {
                a.visit(f);
                b.visit(f);
            }
            Expr::Pow(a, _) | Expr::Neg(a) => a.visit(f),
            Expr::Num(_) | Expr::Symbol(_) | Expr::Concentration(_) => {}
        }
    }

    // endregion Inspection

    // region Substitution

    /// Rebuild the expression, replacing every leaf for which `f` returns `Some`
    pub fn substitute<F>(&self, f: &F) -> Expr
    where
        F: Fn(&Expr) -> Option<Expr>,
    {
        match self {
            Expr::Num(_) | Expr::Symbol(_) | Expr::Concentration(_) => {
                f(self).unwrap_or_else(|| self.clone())
            }
            Expr::Add(a, b) => Expr::Add(Box::new(a.substitute(f)), Box::new(b.substitute(f))),
            Expr::Sub(a, b) => Expr::Sub(Box::new(a.substitute(f)), Box::new(b.substitute(f))),
            Expr::Mul(a, b) => Expr::Mul(Box::new(a.substitute(f)), Box::new(b.substitute(f))),
            Expr::Div(a, b) => Expr::Div(Box::new(a.substitute(f)), Box::new(b.substitute(f))),
            Expr::Pow(a, e) => Expr::Pow(Box::new(a.substitute(f)), *e),
            Expr::Neg(a) => Expr::Neg(Box::new(a.substitute(f))),
        }
    }

    /// Replace constant symbols with values
    pub fn subs_symbols(&self, values: &IndexMap<String, f64>) -> Expr {
        self.substitute(&|e| match e {
            Expr::Symbol(name) => values.get(name).map(|v| Expr::Num(*v)),
            _ => None,
        })
    }

    /// Replace metabolite concentrations with values
    pub fn subs_concentrations(&self, values: &IndexMap<String, f64>) -> Expr {
        self.substitute(&|e| match e {
            Expr::Concentration(name) => values.get(name).map(|v| Expr::Num(*v)),
            _ => None,
        })
    }

    /// Replace both constant symbols and concentrations with values, matched by name
    pub fn subs_values(&self, values: &IndexMap<String, f64>) -> Expr {
        self.substitute(&|e| match e {
            Expr::Symbol(name) | Expr::Concentration(name) => {
                values.get(name).map(|v| Expr::Num(*v))
            }
            _ => None,
        })
    }

    /// Replace a constant symbol with another expression
    pub fn subs_expr(&self, name: &str, replacement: &Expr) -> Expr {
        self.substitute(&|e| match e {
            Expr::Symbol(n) if n == name => Some(replacement.clone()),
            _ => None,
        })
    }

    /// Turn every time dependent concentration into a constant symbol of the same name
    pub fn strip_time(&self) -> Expr {
        self.substitute(&|e| match e {
            Expr::Concentration(name) => Some(Expr::Symbol(name.clone())),
            _ => None,
        })
    }

    /// Rename metabolite concentrations, names missing from `names` are kept
    pub fn rename_concentrations(&self, names: &IndexMap<String, String>) -> Expr {
        self.substitute(&|e| match e {
            Expr::Concentration(name) => names.get(name).map(|n| Expr::Concentration(n.clone())),
            _ => None,
        })
    }

    /// Rename constant symbols, names missing from `names` are kept
    pub fn rename_symbols(&self, names: &IndexMap<String, String>) -> Expr {
        self.substitute(&|e| match e {
            Expr::Symbol(name) => names.get(name).map(|n| Expr::Symbol(n.clone())),
            _ => None,
        })
    }

    // endregion Substitution

    // region Evaluation

    /// Evaluate the expression, looking up symbols and concentrations by name
    ///
    /// Returns `None` if any name is missing from `values`.
    pub fn eval(&self, values: &IndexMap<String, f64>) -> Option<f64> {
        Some(match self {
            Expr::Num(v) => *v,
            Expr::Symbol(name) | Expr::Concentration(name) => *values.get(name)?,
            Expr::Add(a, b) => a.eval(values)? + b.eval(values)?,
            Expr::Sub(a, b) => a.eval(values)? - b.eval(values)?,
            Expr::Mul(a, b) => a.eval(values)? * b.eval(values)?,
            Expr::Div(a, b) => a.eval(values)? / b.eval(values)?,
            Expr::Pow(a, e) => a.eval(values)?.powf(*e),
            Expr::Neg(a) => -a.eval(values)?,
        })
    }

    /// Fold constants and remove identities
    ///
    /// Rules:
    /// - Operations on two numbers are evaluated
    /// - `x + 0`, `0 + x`, `x - 0` become `x`
    /// - `x * 1`, `1 * x`, `x / 1`, `x ** 1` become `x`
    /// - `0 - x` becomes `-x`
    /// - Double negation is removed, negated numbers are folded
    ///
    /// Products with zero are kept, since the other factor may be infinite.
    pub fn simplify(&self) -> Expr {
        match self {
            Expr::Num(_) | Expr::Symbol(_) | Expr::Concentration(_) => self.clone(),
            Expr::Add(a, b) => match (a.simplify(), b.simplify()) {
                (Expr::Num(x), Expr::Num(y)) => Expr::Num(x + y),
                (Expr::Num(z), other) | (other, Expr::Num(z)) if z == 0. => other,
                (l, r) => Expr::Add(Box::new(l), Box::new(r)),
            },
            Expr::Sub(a, b) => match (a.simplify(), b.simplify()) {
                (Expr::Num(x), Expr::Num(y)) => Expr::Num(x - y),
                (l, Expr::Num(z)) if z == 0. => l,
                (Expr::Num(z), r) if z == 0. => Expr::Neg(Box::new(r)).simplify(),
                (l, r) => Expr::Sub(Box::new(l), Box::new(r)),
            },
            Expr::Mul(a, b) => match (a.simplify(), b.simplify()) {
                (Expr::Num(x), Expr::Num(y)) => Expr::Num(x * y),
                (Expr::Num(one), other) | (other, Expr::Num(one)) if one == 1. => other,
                (l, r) => Expr::Mul(Box::new(l), Box::new(r)),
            },
            Expr::Div(a, b) => match (a.simplify(), b.simplify()) {
                (Expr::Num(x), Expr::Num(y)) => Expr::Num(x / y),
                (l, Expr::Num(one)) if one == 1. => l,
                (l, r) => Expr::Div(Box::new(l), Box::new(r)),
            },
            Expr::Pow(a, e) => match a.simplify() {
                Expr::Num(x) => Expr::Num(x.powf(*e)),
                base if *e == 1. => base,
                base => Expr::Pow(Box::new(base), *e),
            },
            Expr::Neg(a) => match a.simplify() {
                Expr::Num(x) => Expr::Num(-x),
                Expr::Neg(inner) => *inner,
                other => Expr::Neg(Box::new(other)),
            },
        }
    }

    /// Numerator and denominator of the expression as polynomials in the symbol `var`
    ///
    /// Coefficients are given lowest power first, a constant denominator is divided out. Returns `None` if any other symbol or
    /// concentration remains, or if `var` is raised to a power that is not an integer.
    pub fn as_rational(&self, var: &str) -> Option<(Vec<f64>, Vec<f64>)> {
        let (numerator, denominator) = match self {
            Expr::Num(v) => (vec![*v], vec![1.]),
            Expr::Symbol(name) if name == var => (vec![0., 1.], vec![1.]),
            Expr::Symbol(_) | Expr::Concentration(_) => return None,
            Expr::Add(a, b) | Expr::Sub(a, b) => {
                let sign = if matches!(self, Expr::Add(_, _)) { 1. } else { -1. };
                let (an, ad) = a.as_rational(var)?;
                let (bn, bd) = b.as_rational(var)?;
                if ad == bd {
                    (poly_add(&an, &bn, sign), ad)
                } else {
                    (
                        poly_add(&poly_mul(&an, &bd), &poly_mul(&bn, &ad), sign),
                        poly_mul(&ad, &bd),
                    )
                }
            }
            Expr::Mul(a, b) => {
                let (an, ad) = a.as_rational(var)?;
                let (bn, bd) = b.as_rational(var)?;
                (poly_mul(&an, &bn), poly_mul(&ad, &bd))
            }
            Expr::Div(a, b) => {
                let (an, ad) = a.as_rational(var)?;
                let (bn, bd) = b.as_rational(var)?;
                (poly_mul(&an, &bd), poly_mul(&ad, &bn))
            }
            Expr::Pow(a, e) => {
                let (n, d) = a.as_rational(var)?;
                if n.len() == 1 && d.len() == 1 {
                    (vec![(n[0] / d[0]).powf(*e)], vec![1.])
                } else if e.fract() == 0. {
                    let power =
                        |p: &[f64]| (0..e.abs() as usize).fold(vec![1.], |acc, _| poly_mul(&acc, p));
                    if *e >= 0. {
                        (power(&n), power(&d))
                    } else {
                        (power(&d), power(&n))
                    }
                } else {
                    return None;
                }
            }
            Expr::Neg(a) => {
                let (n, d) = a.as_rational(var)?;
                (n.into_iter().map(|c| -c).collect(), d)
            }
        };
        let (numerator, denominator) = (trim(numerator), trim(denominator));
        match denominator.as_slice() {
            [d] if *d != 0. => Some((numerator.into_iter().map(|c| c / d).collect(), vec![1.])),
            _ => Some((numerator, denominator)),
        }
    }

    // endregion Evaluation

    // region Display helpers

    fn precedence(&self) -> u8 {
        match self {
            Expr::Num(v) if *v < 0. => 1,
            Expr::Num(_) | Expr::Symbol(_) | Expr::Concentration(_) => 4,
            Expr::Add(_, _) | Expr::Sub(_, _) | Expr::Neg(_) => 1,
            Expr::Mul(_, _) | Expr::Div(_, _) => 2,
            Expr::Pow(_, _) => 3,
        }
    }

    fn is_signed(&self) -> bool {
        matches!(self, Expr::Neg(_)) || matches!(self, Expr::Num(v) if *v < 0.)
    }

    // endregion Display helpers
}

fn poly_add(a: &[f64], b: &[f64], sign: f64) -> Vec<f64> {
    let mut out = vec![0.; a.len().max(b.len())];
    for (i, c) in a.iter().enumerate() {
        out[i] += c;
    }
    for (i, c) in b.iter().enumerate() {
        out[i] += sign * c;
    }
    out
}

fn poly_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    if a.is_empty() || b.is_empty() {
        return vec![0.];
    }
    let mut out = vec![0.; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// Drop zero coefficients of the highest powers, keeping at least the constant term
fn trim(mut coefficients: Vec<f64>) -> Vec<f64> {
    while coefficients.len() > 1 && coefficients.last() == Some(&0.) {
        coefficients.pop();
    }
    if coefficients.is_empty() {
        coefficients.push(0.);
    }
    coefficients
}

fn write_operand(f: &mut Formatter<'_>, e: &Expr, parens: bool) -> std::fmt::Result {
    if parens {
        write!(f, "({e})")
    } else {
        write!(f, "{e}")
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Num(v) => write!(f, "{v}"),
            Expr::Symbol(name) => write!(f, "{name}"),
            Expr::Concentration(name) => write!(f, "{name}(t)"),
            Expr::Add(a, b) => {
                write!(f, "{a} + ")?;
                write_operand(f, b, b.is_signed())
            }
            Expr::Sub(a, b) => {
                write!(f, "{a} - ")?;
                write_operand(f, b, b.precedence() <= 1)
            }
            Expr::Mul(a, b) => {
                write_operand(f, a, a.precedence() < 2)?;
                write!(f, "*")?;
                write_operand(f, b, b.precedence() < 2)
            }
            Expr::Div(a, b) => {
                write_operand(f, a, a.precedence() < 2)?;
                write!(f, "/")?;
                write_operand(f, b, b.precedence() <= 2)
            }
            Expr::Pow(a, e) => {
                write_operand(f, a, a.precedence() <= 3)?;
                if *e < 0. {
                    write!(f, "**({e})")
                } else {
                    write!(f, "**{e}")
                }
            }
            Expr::Neg(a) => {
                write!(f, "-")?;
                write_operand(f, a, a.precedence() <= 1)
            }
        }
    }
}

// region Operators
impl ops::Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::Add(Box::new(self), Box::new(rhs))
    }
}

impl ops::Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::Sub(Box::new(self), Box::new(rhs))
    }
}

impl ops::Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::Mul(Box::new(self), Box::new(rhs))
    }
}

impl ops::Div for Expr {
    type Output = Expr;
    fn div(self, rhs: Expr) -> Expr {
        Expr::Div(Box::new(self), Box::new(rhs))
    }
}

impl ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}
// endregion Operators

#[cfg(test)]
mod expr_tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn display_parenthesizes_by_precedence() {
        let a = Expr::conc("A");
        let b = Expr::conc("B");
        let k = Expr::sym("k");
        assert_eq!((k.clone() * (a.clone() + b.clone())).to_string(), "k*(A(t) + B(t))");
        assert_eq!((a.clone() - (b.clone() - k.clone())).to_string(), "A(t) - (B(t) - k)");
        assert_eq!((a.clone() / (b.clone() * k.clone())).to_string(), "A(t)/(B(t)*k)");
        assert_eq!((a.clone() * b.clone() / k.clone()).to_string(), "A(t)*B(t)/k");
        assert_eq!((-(a.clone() * k.clone())).to_string(), "-A(t)*k");
        assert_eq!((-(a.clone() - b.clone())).to_string(), "-(A(t) - B(t))");
        assert_eq!(a.clone().pow(2.).to_string(), "A(t)**2");
        assert_eq!((a.clone() * b.clone()).pow(0.5).to_string(), "(A(t)*B(t))**0.5");
        assert_eq!(a.clone().pow(1.), a);
        assert_eq!((k * Expr::num(-2.)).to_string(), "k*(-2)");
    }

    #[test]
    fn symbols_and_concentrations() {
        let e = Expr::sym("kf") * (Expr::conc("A") - Expr::conc("B") / Expr::sym("Keq"));
        assert_eq!(
            e.symbols().into_iter().collect::<Vec<_>>(),
            vec!["kf".to_string(), "Keq".to_string()]
        );
        assert_eq!(e.concentrations().len(), 2);
        assert!(e.contains("A"));
        assert!(!e.contains("kr"));
        let renamed = e.rename_symbols(&IndexMap::from([("kf".to_string(), "kf_x".to_string())]));
        assert_eq!(renamed.to_string(), "kf_x*(A(t) - B(t)/Keq)");
        let stripped = e.strip_time();
        assert!(stripped.concentrations().is_empty());
        assert_eq!(stripped.symbols().len(), 4);
    }

    #[test]
    fn substitution_and_evaluation() {
        let e = Expr::sym("kf") * (Expr::conc("A") - Expr::conc("B") / Expr::sym("Keq"));
        let values = IndexMap::from([("kf".to_string(), 2.), ("Keq".to_string(), 4.)]);
        assert_eq!(e.subs_symbols(&values).to_string(), "2*(A(t) - B(t)/4)");
        let all = IndexMap::from([
            ("kf".to_string(), 2.),
            ("Keq".to_string(), 4.),
            ("A".to_string(), 3.),
            ("B".to_string(), 2.),
        ]);
        assert_relative_eq!(e.eval(&all).unwrap(), 5.);
        assert!(e.eval(&values).is_none());
        let replaced = e.subs_expr("Keq", &(Expr::sym("kf") / Expr::sym("kr")));
        assert_eq!(replaced.to_string(), "kf*(A(t) - B(t)/(kf/kr))");
    }

    #[test]
    fn simplification() {
        let e = (Expr::num(2.) * Expr::num(3.)) * Expr::sym("x") + Expr::num(0.);
        assert_eq!(e.simplify().to_string(), "6*x");
        let e = Expr::num(1.) * Expr::sym("x") / Expr::num(1.);
        assert_eq!(e.simplify(), Expr::sym("x"));
        let e = -(-Expr::sym("x"));
        assert_eq!(e.simplify(), Expr::sym("x"));
        let e = Expr::num(0.) - Expr::num(2.) * Expr::sym("x");
        assert_eq!(e.simplify().to_string(), "-2*x");
    }

    #[test]
    fn rational_coefficients() {
        // 2*(x*3 - 1/4) => -0.5 + 6x
        let e = Expr::num(2.) * (Expr::sym("x") * Expr::num(3.) - Expr::num(1.) / Expr::num(4.));
        let (numerator, denominator) = e.as_rational("x").unwrap();
        assert_eq!(numerator, vec![-0.5, 6.]);
        assert_eq!(denominator, vec![1.]);
        // (x + 1)**2 / 2 => 0.5 + x + 0.5 x^2
        let e = (Expr::sym("x") + Expr::num(1.)).pow(2.) / Expr::num(2.);
        assert_eq!(e.as_rational("x").unwrap(), (vec![0.5, 1., 0.5], vec![1.]));
        // 2/x - 0.5 => (2 - 0.5x)/x
        let e = Expr::num(2.) / Expr::sym("x") - Expr::num(0.5);
        assert_eq!(e.as_rational("x").unwrap(), (vec![2., -0.5], vec![0., 1.]));
        // x**(-2) => 1/x^2
        let e = Expr::sym("x").pow(-2.);
        assert_eq!(e.as_rational("x").unwrap(), (vec![1.], vec![0., 0., 1.]));
        assert!((Expr::sym("x") * Expr::sym("y")).as_rational("x").is_none());
        assert!(Expr::sym("x").pow(0.5).as_rational("x").is_none());
        assert_eq!(Expr::num(4.).pow(0.5).as_rational("x").unwrap(), (vec![2.], vec![1.]));
        let (numerator, _) = (Expr::sym("x") - Expr::sym("x")).as_rational("x").unwrap();
        assert_eq!(numerator, vec![0.]);
    }
}
