//! Scoped mutation of a model with automatic rollback
//!
//! Entering a scope with [`Model::with_context`] pushes an [`UndoLog`] onto the model's stack.
//! While a scope is active, every mutating model operation records a closure reverting its
//! effect in the innermost log. When the scope ends, normally or with an error, the log is
//! popped and its reversals are applied in last-in-first-out order.
use std::fmt::{Debug, Formatter};

use indexmap::{IndexMap, IndexSet};
use log::debug;

use crate::kinetics::expr::Expr;
use crate::mass_model::gene::Gene;
use crate::mass_model::metabolite::Metabolite;
use crate::mass_model::model::Model;
use crate::mass_model::reaction::Reaction;
use crate::mass_model::registry::Registry;
use crate::mass_model::stoichiometry::StoichiometricMatrix;

type Reversal = Box<dyn FnOnce(&mut Model)>;

/// Ordered list of actions reverting the mutations made inside one scope
#[derive(Default)]
pub struct UndoLog {
    reversals: Vec<Reversal>,
}

impl UndoLog {
    pub fn len(&self) -> usize {
        self.reversals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reversals.is_empty()
    }

    fn push(&mut self, reversal: Reversal) {
        self.reversals.push(reversal);
    }

    /// Apply the reversals newest first
    fn rollback(self, model: &mut Model) {
        for reversal in self.reversals.into_iter().rev() {
            reversal(model);
        }
    }
}

impl Debug for UndoLog {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "UndoLog({} reversals)", self.reversals.len())
    }
}

/// Copy of everything a structural change (adding or removing entities) can touch
struct StructuralSnapshot {
    metabolites: Registry<Metabolite>,
    reactions: Registry<Reaction>,
    genes: Registry<Gene>,
    custom_rates: IndexMap<String, Expr>,
    custom_parameters: IndexMap<String, f64>,
    fixed_concentrations: IndexMap<String, f64>,
    modules: IndexSet<String>,
    s_matrix: Option<StoichiometricMatrix>,
    matrix_stale: bool,
}

impl StructuralSnapshot {
    fn take(model: &Model) -> Self {
        StructuralSnapshot {
            metabolites: model.metabolites.clone(),
            reactions: model.reactions.clone(),
            genes: model.genes.clone(),
            custom_rates: model.custom_rates.clone(),
            custom_parameters: model.custom_parameters.clone(),
            fixed_concentrations: model.fixed_concentrations.clone(),
            modules: model.modules.clone(),
            s_matrix: model.s_matrix.clone(),
            matrix_stale: model.matrix_stale,
        }
    }

    fn restore(self, model: &mut Model) {
        model.metabolites = self.metabolites;
        model.reactions = self.reactions;
        model.genes = self.genes;
        model.custom_rates = self.custom_rates;
        model.custom_parameters = self.custom_parameters;
        model.fixed_concentrations = self.fixed_concentrations;
        model.modules = self.modules;
        model.s_matrix = self.s_matrix;
        model.matrix_stale = self.matrix_stale;
    }
}

impl Model {
    /// Run `f` inside a transactional scope, reverting every change it made afterward
    ///
    /// Scopes nest, the result of `f` is passed through unchanged, and the model is restored
    /// whether `f` succeeds or fails.
    ///
    /// # Examples
    /// ```rust
    /// use indexmap::IndexMap;
    /// use massrs_core::mass_model::model::{Model, ModelError};
    /// use massrs_core::mass_model::reaction::Reaction;
    /// let mut model = Model::new("example");
    /// let count = model.with_context(|m| -> Result<usize, ModelError> {
    ///     m.add_reactions(vec![Reaction::new("v1", IndexMap::from([("A".to_string(), -1.)]))]);
    ///     Ok(m.reactions.len())
    /// });
    /// assert_eq!(count.unwrap(), 1);
    /// assert!(model.reactions.is_empty());
    /// ```
    pub fn with_context<R, E, F>(&mut self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut Model) -> Result<R, E>,
    {
        self.contexts.push(UndoLog::default());
        let result = f(self);
        if let Some(log) = self.contexts.pop() {
            debug!("Leaving context, reverting {} changes", log.len());
            // Reversals must not be recorded into the enclosing scopes
            let outer = std::mem::take(&mut self.contexts);
            log.rollback(self);
            self.contexts = outer;
        }
        result
    }

    /// Number of currently active transactional scopes
    pub fn context_depth(&self) -> usize {
        self.contexts.len()
    }

    /// Record a reversal in the innermost active scope, if there is one
    pub(crate) fn record<F>(&mut self, reversal: F)
    where
        F: FnOnce(&mut Model) + 'static,
    {
        if let Some(log) = self.contexts.last_mut() {
            log.push(Box::new(reversal));
        }
    }

    /// Record the current structure so it is restored when the innermost scope ends
    pub(crate) fn record_structure(&mut self) {
        if self.contexts.is_empty() {
            return;
        }
        let snapshot = StructuralSnapshot::take(self);
        self.record(move |m: &mut Model| snapshot.restore(m));
    }
}

#[cfg(test)]
mod transaction_tests {
    use super::*;
    use crate::kinetics::rate_law::RateType;
    use crate::mass_model::model::ModelError;

    fn setup_model() -> Model {
        let mut model = Model::new("transactions");
        let mut v1 = Reaction::new(
            "v1",
            IndexMap::from([("A".to_string(), -1.), ("B".to_string(), 1.)]),
        );
        v1.set_kf(Some(1.)).unwrap();
        model.add_reactions(vec![v1]);
        model
    }

    #[test]
    fn changes_reverted_on_success() {
        let mut model = setup_model();
        let result: Result<(), ModelError> = model.with_context(|m| {
            m.update_parameters(&IndexMap::from([("kf_v1".to_string(), 5.)]))?;
            m.set_rate_type(RateType::Two);
            m.add_reactions(vec![Reaction::new(
                "v2",
                IndexMap::from([("B".to_string(), -1.), ("C".to_string(), 1.)]),
            )]);
            assert_eq!(m.reactions.get("v1").unwrap().kf(), Some(5.));
            assert_eq!(m.context_depth(), 1);
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(model.context_depth(), 0);
        assert_eq!(model.reactions.get("v1").unwrap().kf(), Some(1.));
        assert_eq!(model.rate_type(), RateType::One);
        assert!(!model.reactions.contains("v2"));
        assert!(!model.metabolites.contains("C"));
        assert_eq!(model.metabolites.get("B").unwrap().reactions().len(), 1);
    }

    #[test]
    fn changes_reverted_on_error() {
        let mut model = setup_model();
        let result: Result<(), ModelError> = model.with_context(|m| {
            m.remove_metabolites(&["A"], false);
            Err(ModelError::NotFound("forced".to_string()))
        });
        assert!(result.is_err());
        assert!(model.metabolites.contains("A"));
        assert_eq!(model.reactions.get("v1").unwrap().get_coefficient("A"), Some(-1.));
    }

    #[test]
    fn nested_scopes_revert_in_order() {
        let mut model = setup_model();
        let result: Result<(), ModelError> = model.with_context(|outer| {
            outer.update_parameters(&IndexMap::from([("kf_v1".to_string(), 2.)]))?;
            outer.with_context(|inner| -> Result<(), ModelError> {
                inner.update_parameters(&IndexMap::from([("kf_v1".to_string(), 3.)]))?;
                assert_eq!(inner.context_depth(), 2);
                Ok(())
            })?;
            // Inner scope restored its own change only
            assert_eq!(outer.reactions.get("v1").unwrap().kf(), Some(2.));
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(model.reactions.get("v1").unwrap().kf(), Some(1.));
    }

    #[test]
    fn no_recording_outside_scope() {
        let mut model = setup_model();
        model
            .update_parameters(&IndexMap::from([("kf_v1".to_string(), 9.)]))
            .unwrap();
        assert_eq!(model.reactions.get("v1").unwrap().kf(), Some(9.));
        assert_eq!(model.context_depth(), 0);
    }
}
