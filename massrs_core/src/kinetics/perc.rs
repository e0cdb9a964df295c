//! Steady state back-calculation of pseudo elementary rate constants (PERCs)
//!
//! Rates are written with rate type 1, leaving `kf_{id}` as the only unknown of each reaction
//! once the steady state concentrations, fluxes, equilibrium constants and custom parameters
//! are substituted. Each rate is then solved for `kf_{id}` so that it equals the reaction's
//! steady state flux.
use std::fmt::{Display, Formatter};

use indexmap::IndexMap;
use log::{debug, info, warn};
use nalgebra::DMatrix;

use crate::kinetics::expr::Expr;
use crate::kinetics::rate_law::RateType;
use crate::mass_model::model::{Model, ModelError};
use crate::utils::round_to_precision;

/// Inputs of [`Model::calculate_percs`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PercOptions {
    /// Steady state concentrations by metabolite or boundary species id, defaults to the
    /// initial conditions of the model
    pub concentrations: Option<IndexMap<String, f64>>,
    /// Steady state fluxes by reaction id, defaults to the fluxes stored in the reactions
    pub fluxes: Option<IndexMap<String, f64>>,
    /// Value given to reactions with zero flux, defaults to the configured value
    pub at_equilibrium_default: Option<f64>,
    /// Write the solved constants back into the reactions
    pub update_reactions: bool,
}

/// A value needed to calculate the PERC of a reaction
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MissingValue {
    Concentration(String),
    Flux,
    EquilibriumConstant,
    RateConstant(String),
    CustomParameter(String),
}

impl Display for MissingValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MissingValue::Concentration(id) => write!(f, "concentration of {id}"),
            MissingValue::Flux => write!(f, "steady state flux"),
            MissingValue::EquilibriumConstant => write!(f, "equilibrium constant"),
            MissingValue::RateConstant(name) => write!(f, "rate constant {name}"),
            MissingValue::CustomParameter(name) => write!(f, "custom parameter {name}"),
        }
    }
}

/// Result of a PERC calculation
#[derive(Clone, Debug, PartialEq)]
pub enum PercOutcome {
    /// Solved forward rate constants by symbol name
    Solved(IndexMap<String, f64>),
    /// Every missing value, by reaction id. Nothing was calculated.
    MissingValues(IndexMap<String, Vec<MissingValue>>),
}

impl PercOutcome {
    pub fn solved(&self) -> Option<&IndexMap<String, f64>> {
        match self {
            PercOutcome::Solved(percs) => Some(percs),
            PercOutcome::MissingValues(_) => None,
        }
    }
}

/// Imaginary parts below this fraction of the magnitude count as real eigenvalues
const REAL_TOLERANCE: f64 = 1e-6;
/// Decades on either side of zero scanned by the bracketed search
const SEARCH_DECADES: i32 = 9;
const STEPS_PER_DECADE: i32 = 16;
const BISECTION_STEPS: usize = 200;

/// Value of a polynomial given lowest power first
fn horner(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0., |acc, c| acc * x + c)
}

/// Distinct real roots of a polynomial given lowest power first
///
/// Degrees above two use the eigenvalues of the companion matrix, each real one refined with
/// a few Newton steps.
fn polynomial_real_roots(coefficients: &[f64]) -> Vec<f64> {
    if coefficients.is_empty() {
        return Vec::new();
    }
    let scale = coefficients.iter().fold(0., |acc: f64, c| acc.max(c.abs()));
    let mut degree = coefficients.len() - 1;
    while degree > 0 && coefficients[degree].abs() <= 1e-12 * scale {
        degree -= 1;
    }
    let coefficients = &coefficients[..=degree];
    let mut roots = match *coefficients {
        [] | [_] => Vec::new(),
        [c0, c1] => vec![-c0 / c1],
        [c0, c1, c2] => {
            let discriminant = c1 * c1 - 4. * c2 * c0;
            if discriminant < 0. {
                Vec::new()
            } else if discriminant == 0. {
                vec![-c1 / (2. * c2)]
            } else {
                let root = discriminant.sqrt();
                vec![(-c1 + root) / (2. * c2), (-c1 - root) / (2. * c2)]
            }
        }
        _ => {
            let leading = coefficients[degree];
            let companion = DMatrix::from_fn(degree, degree, |i, j| {
                if j == degree - 1 {
                    -coefficients[i] / leading
                } else if i == j + 1 {
                    1.
                } else {
                    0.
                }
            });
            let derivative: Vec<f64> = coefficients
                .iter()
                .enumerate()
                .skip(1)
                .map(|(power, c)| power as f64 * c)
                .collect();
            companion
                .complex_eigenvalues()
                .iter()
                .filter(|z| z.im.abs() <= REAL_TOLERANCE * z.re.abs().max(1.))
                .map(|z| {
                    let mut x = z.re;
                    for _ in 0..4 {
                        let slope = horner(&derivative, x);
                        if slope == 0. {
                            break;
                        }
                        x -= horner(coefficients, x) / slope;
                    }
                    x
                })
                .collect()
        }
    };
    roots.sort_by(|a, b| a.total_cmp(b));
    roots.dedup_by(|a, b| (*a - *b).abs() <= REAL_TOLERANCE * a.abs().max(1.));
    roots
}

/// Real roots of `equation` in `var` located by sign changes over a logarithmic grid
///
/// Each bracket is narrowed by bisection. Sign changes across poles are discarded.
fn bracketed_real_roots(equation: &Expr, var: &str) -> Vec<f64> {
    let f = |x: f64| {
        equation
            .eval(&IndexMap::from([(var.to_string(), x)]))
            .filter(|v| !v.is_nan())
    };
    let positive: Vec<f64> = (-SEARCH_DECADES * STEPS_PER_DECADE..=SEARCH_DECADES * STEPS_PER_DECADE)
        .map(|step| 10f64.powf(step as f64 / STEPS_PER_DECADE as f64))
        .collect();
    let grid: Vec<f64> = positive
        .iter()
        .rev()
        .map(|x| -x)
        .chain(std::iter::once(0.))
        .chain(positive.iter().copied())
        .collect();

    let mut roots = Vec::new();
    let mut previous: Option<(f64, f64)> = None;
    for x in grid {
        let Some(value) = f(x).filter(|v| v.is_finite()) else {
            previous = None;
            continue;
        };
        if value == 0. {
            roots.push(x);
            previous = None;
            continue;
        }
        if let Some((lo, f_lo)) = previous {
            if f_lo.signum() != value.signum() {
                let scale = f_lo.abs().max(value.abs()).max(1.);
                let (mut lo, mut hi, mut f_lo) = (lo, x, f_lo);
                for _ in 0..BISECTION_STEPS {
                    let mid = 0.5 * (lo + hi);
                    match f(mid) {
                        Some(v) if v == 0. => {
                            (lo, hi) = (mid, mid);
                            break;
                        }
                        Some(v) if v.signum() == f_lo.signum() => (lo, f_lo) = (mid, v),
                        Some(_) => hi = mid,
                        None => break,
                    }
                }
                let root = 0.5 * (lo + hi);
                if f(root).is_some_and(|v| v.abs() <= 1e-6 * scale) {
                    roots.push(root);
                }
            }
        }
        previous = Some((x, value));
    }
    roots
}

/// Solve `equation = 0` for `var`, which must have exactly one real solution
///
/// Rational equations are solved through the real roots of their numerator that do not cancel
/// the denominator. Anything else falls back to a bracketed search.
fn solve_for(equation: &Expr, var: &str) -> Result<f64, String> {
    let roots: Vec<f64> = match equation.as_rational(var) {
        Some((numerator, _)) if numerator.len() == 1 => {
            return Err("rate does not depend on the rate constant".to_string());
        }
        Some((numerator, denominator)) => {
            let scale = denominator.iter().fold(0., |acc: f64, c| acc.max(c.abs()));
            polynomial_real_roots(&numerator)
                .into_iter()
                .filter(|root| horner(&denominator, *root).abs() > 1e-12 * scale)
                .collect()
        }
        None => {
            debug!("Equation {equation} is not rational in {var}, searching for roots");
            bracketed_real_roots(equation, var)
        }
    };
    match roots.as_slice() {
        [root] => Ok(*root),
        [] => Err("no real solution".to_string()),
        _ => Err(format!("{} real solutions", roots.len())),
    }
}

impl Model {
    /// Calculate the pseudo elementary rate constant `kf` of every reaction
    ///
    /// # Returns
    /// - `Ok(PercOutcome::Solved(percs))` with the constants keyed by `kf_{id}`
    /// - `Ok(PercOutcome::MissingValues(missing))` listing every value missing per reaction
    /// - `Err(ModelError::UnsolvableEquation)` when the steady state equation of a reaction
    ///   does not have exactly one real solution in its `kf`
    ///
    /// Reactions with a custom rate which does not use their `kf` are left out.
    pub fn calculate_percs(&mut self, options: &PercOptions) -> Result<PercOutcome, ModelError> {
        let concentrations = options
            .concentrations
            .clone()
            .unwrap_or_else(|| self.initial_conditions());
        let fluxes = options
            .fluxes
            .clone()
            .unwrap_or_else(|| self.steady_state_fluxes());
        let at_equilibrium = options
            .at_equilibrium_default
            .unwrap_or(self.config.at_equilibrium_default);
        let sorted = self.sort_symbols(Some(RateType::One));
        let parameters = self.parameters();

        let mut equations = Vec::new();
        let mut missing: IndexMap<String, Vec<MissingValue>> = IndexMap::new();
        for (rxn_id, rate) in &sorted.rates {
            let Some(rxn) = self.reactions.get(rxn_id) else {
                continue;
            };
            let unknown = rxn.kf_str();
            if !rate.contains(&unknown) {
                info!("Reaction {rxn_id} does not use {unknown}, skipping");
                continue;
            }
            let mut values: IndexMap<String, f64> = IndexMap::new();
            let mut absent = Vec::new();
            let flux = fluxes.get(rxn_id).copied();
            if flux.is_none() {
                absent.push(MissingValue::Flux);
            }
            if rxn.keq(&self.config).is_none() {
                absent.push(MissingValue::EquilibriumConstant);
            }
            for id in rate.concentrations() {
                match concentrations.get(&id) {
                    Some(v) => {
                        values.insert(id, *v);
                    }
                    None => absent.push(MissingValue::Concentration(id)),
                }
            }
            for name in rate.symbols() {
                if name == unknown {
                    continue;
                }
                let classes = &sorted.classes;
                let (value, missing_value) = if classes.concentrations.contains(&name) {
                    (concentrations.get(&name), MissingValue::Concentration(name.clone()))
                } else if classes.rate_constants.contains(&name) {
                    if name == rxn.keq_str() {
                        (parameters.get(&name), MissingValue::EquilibriumConstant)
                    } else {
                        (parameters.get(&name), MissingValue::RateConstant(name.clone()))
                    }
                } else {
                    (
                        self.custom_parameters.get(&name),
                        MissingValue::CustomParameter(name.clone()),
                    )
                };
                match value {
                    Some(v) => {
                        values.insert(name, *v);
                    }
                    None if !absent.contains(&missing_value) => absent.push(missing_value),
                    None => {}
                }
            }
            if !absent.is_empty() {
                missing.insert(rxn_id.clone(), absent);
            } else if let Some(flux) = flux {
                equations.push((rxn_id.clone(), unknown, rate.subs_values(&values), flux));
            }
        }

        if !missing.is_empty() {
            for (rxn_id, values) in &missing {
                let listed: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                warn!(
                    "Cannot calculate the PERC of {rxn_id}, missing {}",
                    listed.join(", ")
                );
            }
            return Ok(PercOutcome::MissingValues(missing));
        }

        let mut percs = IndexMap::new();
        for (rxn_id, unknown, rate, flux) in equations {
            let value = if flux == 0. {
                debug!("Reaction {rxn_id} is at equilibrium");
                at_equilibrium
            } else {
                let equation = (rate - Expr::Num(flux)).simplify();
                solve_for(&equation, &unknown).map_err(|reason| ModelError::UnsolvableEquation {
                    reaction: rxn_id.clone(),
                    reason,
                })?
            };
            percs.insert(unknown, round_to_precision(value, self.config.decimal_precision));
        }

        if options.update_reactions {
            self.update_parameters(&percs)?;
        }
        Ok(PercOutcome::Solved(percs))
    }
}

#[cfg(test)]
mod perc_tests {
    use super::*;
    use crate::mass_model::model::ExchangeType;
    use crate::mass_model::reaction::Reaction;
    use approx::assert_relative_eq;

    /// S_A: -> A, v1: A <=> B, DM_B: B ->
    fn setup_model() -> Model {
        let mut model = Model::new("perc");
        model.add_reactions(vec![Reaction::new(
            "v1",
            IndexMap::from([("A".to_string(), -1.), ("B".to_string(), 1.)]),
        )]);
        model.add_exchange("A", ExchangeType::Source, Some(1.)).unwrap();
        model.add_exchange("B", ExchangeType::Demand, None).unwrap();
        model
            .update_initial_conditions(&IndexMap::from([
                ("A".to_string(), 2.),
                ("B".to_string(), 1.),
            ]))
            .unwrap();
        model
            .update_parameters(&IndexMap::from([
                ("Keq_v1".to_string(), 4.),
                ("v_v1".to_string(), 0.5),
                ("v_S_A".to_string(), 0.5),
                ("v_DM_B".to_string(), 0.5),
            ]))
            .unwrap();
        model
    }

    #[test]
    fn solve_forward_rate_constants() {
        let mut model = setup_model();
        let outcome = model.calculate_percs(&PercOptions::default()).unwrap();
        let percs = outcome.solved().unwrap();
        // 0.5 = kf*(2 - 1/4)
        assert_relative_eq!(percs["kf_v1"], 0.5 / 1.75, epsilon = 1e-12);
        // 0.5 = kf*A_b, A_b fixed at 1
        assert_relative_eq!(percs["kf_S_A"], 0.5, epsilon = 1e-12);
        // 0.5 = kf*B
        assert_relative_eq!(percs["kf_DM_B"], 0.5, epsilon = 1e-12);
        assert!(model.reactions.get("v1").unwrap().kf().is_none());
    }

    #[test]
    fn zero_flux_uses_equilibrium_default() {
        let mut model = setup_model();
        let options = PercOptions {
            fluxes: Some(IndexMap::from([
                ("v1".to_string(), 0.),
                ("S_A".to_string(), 0.5),
                ("DM_B".to_string(), 0.5),
            ])),
            ..Default::default()
        };
        let percs = model.calculate_percs(&options).unwrap();
        assert_eq!(percs.solved().unwrap()["kf_v1"], 100000.);

        let options = PercOptions {
            at_equilibrium_default: Some(1e3),
            ..options
        };
        let percs = model.calculate_percs(&options).unwrap();
        assert_eq!(percs.solved().unwrap()["kf_v1"], 1e3);
    }

    #[test]
    fn missing_values_are_reported() {
        let mut model = setup_model();
        model
            .update_parameters(&IndexMap::from([("Keq_v1".to_string(), 4.)]))
            .unwrap();
        let options = PercOptions {
            concentrations: Some(IndexMap::from([("A".to_string(), 2.)])),
            fluxes: Some(IndexMap::from([("v1".to_string(), 1.)])),
            ..Default::default()
        };
        let outcome = model.calculate_percs(&options).unwrap();
        let PercOutcome::MissingValues(missing) = outcome else {
            panic!("expected missing values");
        };
        assert_eq!(missing["v1"], vec![MissingValue::Concentration("B".to_string())]);
        assert_eq!(missing["S_A"], vec![MissingValue::Flux]);
        assert_eq!(
            missing["DM_B"],
            vec![MissingValue::Flux, MissingValue::Concentration("B".to_string())]
        );
    }

    #[test]
    fn multiple_roots_are_unsolvable() {
        let mut model = setup_model();
        model
            .add_custom_rate("v1", "kf_v1**2*A(t) - kf_v1", &IndexMap::new())
            .unwrap();
        // 2*kf^2 - kf - 0.5 has two real roots
        let result = model.calculate_percs(&PercOptions::default());
        assert!(matches!(
            result,
            Err(ModelError::UnsolvableEquation { reaction, .. }) if reaction == "v1"
        ));
    }

    #[test]
    fn cubic_rate_with_one_real_root() {
        let mut model = setup_model();
        model
            .add_custom_rate("v1", "kf_v1**3*A(t)", &IndexMap::new())
            .unwrap();
        // 2*kf^3 = 0.5
        let outcome = model.calculate_percs(&PercOptions::default()).unwrap();
        assert_relative_eq!(
            outcome.solved().unwrap()["kf_v1"],
            0.25f64.powf(1. / 3.),
            epsilon = 1e-10
        );
    }

    #[test]
    fn rate_constant_in_denominator() {
        let mut model = setup_model();
        model
            .add_custom_rate("v1", "A(t)/kf_v1", &IndexMap::new())
            .unwrap();
        // 2/kf = 0.5
        let outcome = model.calculate_percs(&PercOptions::default()).unwrap();
        assert_relative_eq!(outcome.solved().unwrap()["kf_v1"], 4., epsilon = 1e-12);
    }

    #[test]
    fn fractional_power_of_rate_constant() {
        let mut model = setup_model();
        model
            .add_custom_rate("v1", "kf_v1**0.5*A(t)", &IndexMap::new())
            .unwrap();
        // 2*kf^0.5 = 0.5
        let outcome = model.calculate_percs(&PercOptions::default()).unwrap();
        assert_relative_eq!(outcome.solved().unwrap()["kf_v1"], 0.0625, epsilon = 1e-9);
    }

    #[test]
    fn zero_flux_on_nonlinear_rate() {
        let mut model = setup_model();
        model
            .add_custom_rate("v1", "kf_v1**3*A(t)", &IndexMap::new())
            .unwrap();
        let options = PercOptions {
            fluxes: Some(IndexMap::from([
                ("v1".to_string(), 0.),
                ("S_A".to_string(), 0.5),
                ("DM_B".to_string(), 0.5),
            ])),
            ..Default::default()
        };
        let outcome = model.calculate_percs(&options).unwrap();
        assert_eq!(outcome.solved().unwrap()["kf_v1"], 100000.);
    }

    #[test]
    fn real_roots_of_polynomials() {
        // (x - 1)(x - 2)(x - 3)
        let roots = polynomial_real_roots(&[-6., 11., -6., 1.]);
        assert_eq!(roots.len(), 3);
        for (root, expected) in roots.iter().zip([1., 2., 3.]) {
            assert_relative_eq!(*root, expected, epsilon = 1e-9);
        }
        // x^4 + 1 has no real root
        assert!(polynomial_real_roots(&[1., 0., 0., 0., 1.]).is_empty());
        assert_eq!(polynomial_real_roots(&[3.]), Vec::<f64>::new());
        // x/(x - 1) = 0 only at x = 0, and 1/x has no root
        let e = Expr::sym("x") / (Expr::sym("x") - Expr::num(1.));
        assert_relative_eq!(solve_for(&e, "x").unwrap(), 0.);
        assert!(solve_for(&(Expr::num(1.) / Expr::sym("x")), "x").is_err());
    }

    #[test]
    fn write_back_and_rounding() {
        let mut model = setup_model();
        model
            .update_configuration(|config| {
                config.decimal_precision = Some(3);
                Ok(())
            })
            .unwrap();
        let options = PercOptions {
            update_reactions: true,
            ..Default::default()
        };
        let percs = model.calculate_percs(&options).unwrap();
        assert_eq!(percs.solved().unwrap()["kf_v1"], 0.286);
        assert_eq!(model.reactions.get("v1").unwrap().kf(), Some(0.286));
        assert_eq!(model.reactions.get("DM_B").unwrap().kf(), Some(0.5));
    }
}
