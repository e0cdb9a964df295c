//! This module provides the Model struct for representing an entire kinetic model
use std::fmt::{Display, Formatter};

use indexmap::{IndexMap, IndexSet};
use log::{info, warn};
use thiserror::Error;

use crate::configuration::{Configuration, ConfigurationError, DEFAULT_CONFIGURATION};
use crate::io::reaction_parse::ReactionParseError;
use crate::kinetics::custom_rate::ExpressionError;
use crate::kinetics::expr::Expr;
use crate::kinetics::rate_law::RateType;
use crate::mass_model::gene::Gene;
use crate::mass_model::metabolite::Metabolite;
use crate::mass_model::reaction::Reaction;
use crate::mass_model::registry::Registry;
use crate::mass_model::stoichiometry::{MatrixError, StoichiometricMatrix};
use crate::mass_model::transaction::UndoLog;
use crate::utils::formula::FormulaError;

/// Represents a kinetic model of a biochemical reaction network
#[derive(Debug)]
pub struct Model {
    /// Id associated with the Model
    pub id: String,
    /// Human readable name of the Model
    pub name: Option<String>,
    /// Metabolites, in stoichiometric matrix row order
    pub metabolites: Registry<Metabolite>,
    /// Reactions, in stoichiometric matrix column order
    pub reactions: Registry<Reaction>,
    /// Genes associated with the reactions
    pub genes: Registry<Gene>,
    /// Compartments in the model
    ///
    /// An IndexMap<String, String> of {short name: long name}
    pub compartments: IndexMap<String, String>,
    /// Ids of the models merged into this one
    pub modules: IndexSet<String>,
    pub(crate) rate_type: RateType,
    /// Reaction id to the expression replacing its generated rate law
    pub(crate) custom_rates: IndexMap<String, Expr>,
    /// Values of the parameters used in custom rates
    pub(crate) custom_parameters: IndexMap<String, f64>,
    /// Metabolite (or external species) id to its clamped concentration
    pub(crate) fixed_concentrations: IndexMap<String, f64>,
    pub(crate) config: Configuration,
    pub(crate) s_matrix: Option<StoichiometricMatrix>,
    /// Whether `s_matrix` needs a rebuild before use
    pub(crate) matrix_stale: bool,
    pub(crate) contexts: Vec<UndoLog>,
}

impl Clone for Model {
    /// Copy the model, active transactional scopes are not carried over to the copy
    fn clone(&self) -> Self {
        Model {
            id: self.id.clone(),
            name: self.name.clone(),
            metabolites: self.metabolites.clone(),
            reactions: self.reactions.clone(),
            genes: self.genes.clone(),
            compartments: self.compartments.clone(),
            modules: self.modules.clone(),
            rate_type: self.rate_type,
            custom_rates: self.custom_rates.clone(),
            custom_parameters: self.custom_parameters.clone(),
            fixed_concentrations: self.fixed_concentrations.clone(),
            config: self.config.clone(),
            s_matrix: self.s_matrix.clone(),
            matrix_stale: self.matrix_stale,
            contexts: Vec::new(),
        }
    }
}

impl Display for Model {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} metabolites, {} reactions, {} genes)",
            self.id,
            self.metabolites.len(),
            self.reactions.len(),
            self.genes.len()
        )
    }
}

/// Kinds of boundary reactions created by [`Model::add_exchange`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExchangeType {
    /// Reversible exchange with the boundary, `EX_` prefix
    Exchange,
    /// Irreversible removal into the boundary, `DM_` prefix
    Demand,
    /// Irreversible supply from the boundary, `S_` prefix
    Source,
}

impl ExchangeType {
    fn prefix(&self) -> &'static str {
        match self {
            ExchangeType::Exchange => "EX",
            ExchangeType::Demand => "DM",
            ExchangeType::Source => "S",
        }
    }
}

impl Model {
    /// Create an empty model using the default configuration
    pub fn new(id: &str) -> Self {
        Self::with_configuration(id, DEFAULT_CONFIGURATION.clone())
    }

    /// Create an empty model using a specific configuration
    pub fn with_configuration(id: &str, config: Configuration) -> Self {
        Model {
            id: id.to_string(),
            name: None,
            metabolites: Registry::new(),
            reactions: Registry::new(),
            genes: Registry::new(),
            compartments: IndexMap::new(),
            modules: IndexSet::new(),
            rate_type: RateType::One,
            custom_rates: IndexMap::new(),
            custom_parameters: IndexMap::new(),
            fixed_concentrations: IndexMap::new(),
            config,
            s_matrix: None,
            matrix_stale: true,
            contexts: Vec::new(),
        }
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    /// Replace the model's configuration, invalidating the cached matrix
    pub fn set_configuration(&mut self, config: Configuration) {
        let old = std::mem::replace(&mut self.config, config);
        self.record(move |m: &mut Model| {
            m.config = old;
            m.matrix_stale = true;
        });
        self.matrix_stale = true;
    }

    /// Change the configuration through its validating setters
    ///
    /// The changes are made on a copy which replaces the configuration only if `update`
    /// succeeds.
    ///
    /// # Examples
    /// ```rust
    /// use massrs_core::mass_model::model::Model;
    /// let mut model = Model::new("example");
    /// model.update_configuration(|config| config.set_irreversible_kr(0.1)).unwrap();
    /// assert!(model.update_configuration(|config| config.set_irreversible_kr(-1.)).is_err());
    /// assert_eq!(model.configuration().irreversible_kr, 0.1);
    /// ```
    pub fn update_configuration<F>(&mut self, update: F) -> Result<(), ModelError>
    where
        F: FnOnce(&mut Configuration) -> Result<(), ConfigurationError>,
    {
        let mut config = self.config.clone();
        update(&mut config)?;
        self.set_configuration(config);
        Ok(())
    }

    /// Rate law type used when generating rates and ODEs
    pub fn rate_type(&self) -> RateType {
        self.rate_type
    }

    pub fn set_rate_type(&mut self, rate_type: RateType) {
        let old = self.rate_type;
        self.record(move |m: &mut Model| m.rate_type = old);
        self.rate_type = rate_type;
    }

    // region Metabolites

    /// Add metabolites to the model
    ///
    /// Metabolites whose id is already present are skipped with a warning.
    ///
    /// # Returns
    /// The ids of the metabolites which were added
    ///
    /// # Examples
    /// ```rust
    /// use massrs_core::mass_model::metabolite::MetaboliteBuilder;
    /// use massrs_core::mass_model::model::Model;
    /// let mut model = Model::new("example");
    /// let atp = MetaboliteBuilder::default().id("atp_c".to_string()).build().unwrap();
    /// assert_eq!(model.add_metabolites(vec![atp.clone(), atp]).len(), 1);
    /// ```
    pub fn add_metabolites(&mut self, metabolites: Vec<Metabolite>) -> Vec<String> {
        self.record_structure();
        let added = self.metabolites.insert_batch(metabolites.into_iter().map(|mut m| {
            m.reactions.clear();
            m
        }));
        if !added.is_empty() {
            self.patch_s(&[]);
        }
        added
    }

    /// Remove metabolites from the model
    ///
    /// # Parameters
    /// - `ids`: ids of the metabolites to remove, unknown ids are ignored
    /// - `destructive`: if true, every reaction the metabolite takes part in is removed as well,
    ///   otherwise the metabolite is only dropped from those reactions' stoichiometry
    ///
    /// Custom rates using the concentration of a removed metabolite are dropped, so the
    /// reactions fall back to their generated rate laws.
    pub fn remove_metabolites(&mut self, ids: &[&str], destructive: bool) {
        self.record_structure();
        for id in ids {
            let Some(met) = self.metabolites.get(id) else {
                warn!("Metabolite {id} is not in the model, ignoring");
                continue;
            };
            let reactions: Vec<String> = met.reactions.iter().cloned().collect();
            if destructive {
                let reaction_ids: Vec<&str> = reactions.iter().map(|r| r.as_str()).collect();
                self.remove_reactions(&reaction_ids, false);
            } else {
                for rxn_id in &reactions {
                    if let Some(rxn) = self.reactions.get_mut(rxn_id) {
                        rxn.metabolites.shift_remove(*id);
                    }
                }
            }
            self.metabolites.remove(id);
            self.fixed_concentrations.shift_remove(*id);
            let stale_rates: Vec<String> = self
                .custom_rates
                .iter()
                .filter(|(_, rate)| rate.concentrations().contains(*id))
                .map(|(rxn_id, _)| rxn_id.clone())
                .collect();
            for rxn_id in stale_rates {
                warn!("Custom rate of {rxn_id} uses removed metabolite {id}, dropping it");
                self.custom_rates.shift_remove(&rxn_id);
            }
        }
        self.matrix_stale = true;
    }

    /// Set the initial conditions of metabolites
    ///
    /// Every id must belong to a metabolite of the model, and every value must be non-negative,
    /// otherwise nothing is changed.
    pub fn update_initial_conditions(
        &mut self,
        values: &IndexMap<String, f64>,
    ) -> Result<(), ModelError> {
        for (id, value) in values {
            if !self.metabolites.contains(id) {
                return Err(ModelError::NotFound(format!("Metabolite {id}")));
            }
            if value.is_nan() || *value < 0. {
                return Err(ModelError::InvalidValue(format!(
                    "Initial condition of {id} must be non-negative, got {value}"
                )));
            }
        }
        let mut previous = Vec::new();
        for (id, value) in values {
            if let Some(met) = self.metabolites.get_mut(id) {
                previous.push((id.clone(), met.initial_condition));
                met.initial_condition = Some(*value);
            }
        }
        self.record(move |m: &mut Model| {
            for (id, old) in previous {
                if let Some(met) = m.metabolites.get_mut(&id) {
                    met.initial_condition = old;
                }
            }
        });
        Ok(())
    }

    /// Initial conditions of the metabolites which have one
    pub fn initial_conditions(&self) -> IndexMap<String, f64> {
        self.metabolites
            .iter()
            .filter_map(|m| m.initial_condition.map(|ic| (m.id.clone(), ic)))
            .collect()
    }

    // endregion Metabolites

    // region Reactions

    /// Add reactions to the model
    ///
    /// Reactions whose id is already present are skipped with a warning. Metabolites and genes
    /// referenced by a new reaction but missing from the model are created. If the cached
    /// stoichiometric matrix is current, it is patched with the new columns.
    ///
    /// # Returns
    /// The ids of the reactions which were added
    ///
    /// # Examples
    /// ```rust
    /// use indexmap::IndexMap;
    /// use massrs_core::mass_model::model::Model;
    /// use massrs_core::mass_model::reaction::ReactionBuilder;
    /// let mut model = Model::new("example");
    /// let v1 = ReactionBuilder::default()
    ///     .id("v1".to_string())
    ///     .metabolites(IndexMap::from([("A".to_string(), -1.), ("B".to_string(), 1.)]))
    ///     .build()
    ///     .unwrap();
    /// model.add_reactions(vec![v1]);
    /// assert!(model.metabolites.contains("B"));
    /// ```
    pub fn add_reactions(&mut self, reactions: Vec<Reaction>) -> Vec<String> {
        self.record_structure();
        let mut added = Vec::new();
        for mut rxn in reactions {
            if self.reactions.contains(&rxn.id) {
                warn!("{}, skipping", ModelError::DuplicateEntity(rxn.id.clone()));
                continue;
            }
            rxn.metabolites.retain(|_, coef| *coef != 0.);
            for met_id in rxn.metabolites.keys() {
                if !self.metabolites.contains(met_id) {
                    // Registry insert only fails for duplicates, which was just checked
                    let _ = self.metabolites.insert(Metabolite::new(met_id));
                }
                if let Some(met) = self.metabolites.get_mut(met_id) {
                    met.reactions.insert(rxn.id.clone());
                }
            }
            for gene_id in &rxn.genes {
                if !self.genes.contains(gene_id) {
                    let _ = self.genes.insert(Gene::new(gene_id));
                }
                if let Some(gene) = self.genes.get_mut(gene_id) {
                    gene.reactions.insert(rxn.id.clone());
                }
            }
            added.push(rxn.id.clone());
            let _ = self.reactions.insert(rxn);
        }
        if !added.is_empty() {
            self.patch_s(&added);
        }
        added
    }

    /// Remove reactions from the model
    ///
    /// Custom rates of the removed reactions are dropped along with them.
    ///
    /// # Parameters
    /// - `ids`: ids of the reactions to remove, unknown ids are ignored
    /// - `remove_orphans`: also remove metabolites and genes left without any reaction
    pub fn remove_reactions(&mut self, ids: &[&str], remove_orphans: bool) {
        self.record_structure();
        for id in ids {
            let Some(rxn) = self.reactions.remove(id) else {
                warn!("Reaction {id} is not in the model, ignoring");
                continue;
            };
            for met_id in rxn.metabolites.keys() {
                let orphaned = match self.metabolites.get_mut(met_id) {
                    Some(met) => {
                        met.reactions.shift_remove(*id);
                        met.reactions.is_empty()
                    }
                    None => false,
                };
                if orphaned && remove_orphans {
                    info!("Removing orphaned metabolite {met_id}");
                    self.metabolites.remove(met_id);
                    self.fixed_concentrations.shift_remove(met_id);
                }
            }
            for gene_id in &rxn.genes {
                let orphaned = match self.genes.get_mut(gene_id) {
                    Some(gene) => {
                        gene.reactions.shift_remove(*id);
                        gene.reactions.is_empty()
                    }
                    None => false,
                };
                if orphaned && remove_orphans {
                    info!("Removing orphaned gene {gene_id}");
                    self.genes.remove(gene_id);
                }
            }
            if let Some(external) = rxn.external_metabolite_id(&self.config) {
                let still_used = self.reactions.iter().any(|other| {
                    other.external_metabolite_id(&self.config).as_deref() == Some(external.as_str())
                });
                if !still_used {
                    self.fixed_concentrations.shift_remove(&external);
                }
            }
            self.drop_custom_rate(id);
        }
        self.matrix_stale = true;
    }

    /// Add a boundary reaction for a metabolite
    ///
    /// # Parameters
    /// - `metabolite_id`: metabolite exchanged with the boundary
    /// - `exchange_type`: see [`ExchangeType`]
    /// - `external_concentration`: if given, the boundary species is fixed at this value
    ///
    /// # Returns
    /// The id of the new reaction, `{EX|DM|S}_{metabolite_id}`
    pub fn add_exchange(
        &mut self,
        metabolite_id: &str,
        exchange_type: ExchangeType,
        external_concentration: Option<f64>,
    ) -> Result<String, ModelError> {
        if !self.metabolites.contains(metabolite_id) {
            return Err(ModelError::NotFound(format!("Metabolite {metabolite_id}")));
        }
        let id = format!("{}_{}", exchange_type.prefix(), metabolite_id);
        if self.reactions.contains(&id) {
            return Err(ModelError::DuplicateEntity(id));
        }
        let (coefficient, reversible) = match exchange_type {
            ExchangeType::Exchange => (-1., true),
            ExchangeType::Demand => (-1., false),
            ExchangeType::Source => (1., false),
        };
        let mut rxn = Reaction::new(
            &id,
            IndexMap::from([(metabolite_id.to_string(), coefficient)]),
        );
        rxn.reversible = reversible;
        rxn.exchange = true;
        rxn.external_metabolite = rxn.external_metabolite_id(&self.config);
        let external = rxn.external_metabolite.clone();
        self.add_reactions(vec![rxn]);
        if let (Some(external), Some(value)) = (external, external_concentration) {
            self.add_fixed_concentrations(&IndexMap::from([(external, value)]))?;
        }
        Ok(id)
    }

    /// Exchange (boundary) reactions of the model
    pub fn exchanges(&self) -> Vec<&Reaction> {
        self.reactions.iter().filter(|r| r.is_exchange()).collect()
    }

    /// Ids of the boundary species standing in for the empty side of exchange reactions
    pub fn external_metabolites(&self) -> IndexSet<String> {
        self.reactions
            .iter()
            .filter_map(|r| r.external_metabolite_id(&self.config))
            .collect()
    }

    /// Update parameters by symbol name
    ///
    /// `kf_{id}`, `kr_{id}`, `Keq_{id}` set rate constants and `v_{id}` sets the steady state
    /// flux of reaction `id`. Any other name is stored as a custom parameter. All values are
    /// validated before anything is changed.
    pub fn update_parameters(&mut self, values: &IndexMap<String, f64>) -> Result<(), ModelError> {
        let mut updates = Vec::new();
        let mut custom = Vec::new();
        for (name, value) in values {
            match self.parse_parameter_name(name) {
                Some((kind, rxn_id)) => {
                    if kind != ParameterKind::Flux && (value.is_nan() || *value < 0.) {
                        return Err(ModelError::InvalidValue(format!(
                            "{name} must be a non-negative number, got {value}"
                        )));
                    }
                    updates.push((kind, rxn_id, *value));
                }
                None => custom.push((name.clone(), *value)),
            }
        }
        let mut previous = Vec::new();
        for (kind, rxn_id, value) in updates {
            if let Some(rxn) = self.reactions.get_mut(&rxn_id) {
                let slot = kind.slot(rxn);
                previous.push((kind, rxn_id, *slot));
                *slot = Some(value);
            }
        }
        let mut previous_custom = Vec::new();
        for (name, value) in custom {
            previous_custom.push((name.clone(), self.custom_parameters.insert(name, value)));
        }
        self.record(move |m: &mut Model| {
            for (name, old) in previous_custom.into_iter().rev() {
                match old {
                    Some(v) => m.custom_parameters.insert(name, v),
                    None => m.custom_parameters.shift_remove(&name),
                };
            }
            for (kind, rxn_id, old) in previous.into_iter().rev() {
                if let Some(rxn) = m.reactions.get_mut(&rxn_id) {
                    *kind.slot(rxn) = old;
                }
            }
        });
        Ok(())
    }

    /// Split a reaction parameter symbol into its kind and reaction id
    fn parse_parameter_name(&self, name: &str) -> Option<(ParameterKind, String)> {
        let (prefix, rxn_id) = name.split_once('_')?;
        let kind = match prefix {
            "kf" => ParameterKind::Kf,
            "kr" => ParameterKind::Kr,
            "Keq" => ParameterKind::Keq,
            "v" => ParameterKind::Flux,
            _ => return None,
        };
        if !self.reactions.contains(rxn_id) {
            return None;
        }
        Some((kind, rxn_id.to_string()))
    }

    /// Every known rate constant and custom parameter, by symbol name
    pub fn parameters(&self) -> IndexMap<String, f64> {
        let mut values: IndexMap<String, f64> = self
            .reactions
            .iter()
            .flat_map(|r| r.parameter_values(&self.config))
            .collect();
        values.extend(self.custom_parameters.iter().map(|(k, v)| (k.clone(), *v)));
        values
    }

    /// Steady state fluxes of the reactions which have one
    pub fn steady_state_fluxes(&self) -> IndexMap<String, f64> {
        self.reactions
            .iter()
            .filter_map(|r| r.steady_state_flux.map(|v| (r.id.clone(), v)))
            .collect()
    }

    /// Compartments of the metabolites, by short id with their name
    ///
    /// Metabolites without a compartment are counted in the configured default compartment.
    /// Names come from [`Model::compartments`], falling back to the short id.
    pub fn metabolite_compartments(&self) -> IndexMap<String, String> {
        let (default_id, default_name) = &self.config.default_compartment;
        self.metabolites
            .iter()
            .map(|met| match &met.compartment {
                Some(id) => {
                    let name = self.compartments.get(id).cloned().unwrap_or_else(|| id.clone());
                    (id.clone(), name)
                }
                None => (default_id.clone(), default_name.clone()),
            })
            .collect()
    }

    /// Irreversible reactions of the model
    pub fn irreversible_reactions(&self) -> Vec<&Reaction> {
        self.reactions.iter().filter(|r| !r.reversible).collect()
    }

    // endregion Reactions

    // region Genes

    /// Add genes to the model, skipping ids already present
    pub fn add_genes(&mut self, genes: Vec<Gene>) -> Vec<String> {
        self.record_structure();
        self.genes.insert_batch(genes.into_iter().map(|mut g| {
            g.reactions.clear();
            g
        }))
    }

    // endregion Genes

    // region Fixed Concentrations

    /// Clamp metabolites (or boundary species of exchange reactions) at constant concentrations
    ///
    /// Fixed metabolites get no ODE, and their concentration is substituted as a constant into
    /// every rate expression.
    pub fn add_fixed_concentrations(
        &mut self,
        values: &IndexMap<String, f64>,
    ) -> Result<(), ModelError> {
        let external = self.external_metabolites();
        for (id, value) in values {
            if !self.metabolites.contains(id) && !external.contains(id) {
                return Err(ModelError::NotFound(format!("Metabolite or boundary species {id}")));
            }
            if value.is_nan() || *value < 0. {
                return Err(ModelError::InvalidValue(format!(
                    "Fixed concentration of {id} must be non-negative, got {value}"
                )));
            }
        }
        let mut previous = Vec::new();
        for (id, value) in values {
            previous.push((id.clone(), self.fixed_concentrations.insert(id.clone(), *value)));
        }
        self.record(move |m: &mut Model| {
            for (id, old) in previous.into_iter().rev() {
                match old {
                    Some(v) => m.fixed_concentrations.insert(id, v),
                    None => m.fixed_concentrations.shift_remove(&id),
                };
            }
        });
        Ok(())
    }

    /// Release fixed concentrations, ids which are not fixed are ignored
    pub fn remove_fixed_concentrations(&mut self, ids: &[&str]) {
        let mut previous = Vec::new();
        for id in ids {
            match self.fixed_concentrations.shift_remove_full(*id) {
                Some((index, key, value)) => previous.push((index, key, value)),
                None => warn!("{id} does not have a fixed concentration"),
            }
        }
        self.record(move |m: &mut Model| {
            for (index, key, value) in previous.into_iter().rev() {
                let index = index.min(m.fixed_concentrations.len());
                m.fixed_concentrations.shift_insert(index, key, value);
            }
        });
    }

    pub fn fixed_concentrations(&self) -> &IndexMap<String, f64> {
        &self.fixed_concentrations
    }

    // endregion Fixed Concentrations

    // region Maintenance

    /// Rebuild registry indices and every back-reference from the reactions' stoichiometry
    ///
    /// Needed after entities were changed through the public registries instead of the model's
    /// add and remove functions. Metabolites and genes referenced by reactions but missing from
    /// the model are created.
    pub fn repair(&mut self) {
        self.record_structure();
        self.metabolites.repair();
        self.reactions.repair();
        self.genes.repair();
        for met in self.metabolites.iter_mut() {
            met.reactions.clear();
        }
        for gene in self.genes.iter_mut() {
            gene.reactions.clear();
        }
        let mut links: Vec<(String, Vec<String>, Vec<String>)> = Vec::new();
        for rxn in self.reactions.iter_mut() {
            rxn.metabolites.retain(|_, coef| *coef != 0.);
            links.push((
                rxn.id.clone(),
                rxn.metabolites.keys().cloned().collect(),
                rxn.genes.iter().cloned().collect(),
            ));
        }
        for (rxn_id, met_ids, gene_ids) in links {
            for met_id in met_ids {
                if !self.metabolites.contains(&met_id) {
                    let _ = self.metabolites.insert(Metabolite::new(&met_id));
                }
                if let Some(met) = self.metabolites.get_mut(&met_id) {
                    met.reactions.insert(rxn_id.clone());
                }
            }
            for gene_id in gene_ids {
                if !self.genes.contains(&gene_id) {
                    let _ = self.genes.insert(Gene::new(&gene_id));
                }
                if let Some(gene) = self.genes.get_mut(&gene_id) {
                    gene.reactions.insert(rxn_id.clone());
                }
            }
        }
        self.matrix_stale = true;
    }

    /// Merge another model into this one
    ///
    /// # Parameters
    /// - `other`: model to merge in, left unchanged
    /// - `prefix_existing`: if given, metabolites and reactions of `other` whose id already
    ///   exists here are added as `{prefix}_{id}`, otherwise they are skipped. Rate constant
    ///   symbols in custom rates and boundary species of exchanges follow the new ids.
    ///
    /// Custom rates, custom parameters and fixed concentrations of `other` are added where they
    /// don't conflict, and `other`'s id joins this model's modules.
    pub fn merge(&mut self, other: &Model, prefix_existing: Option<&str>) {
        self.record_structure();
        let mut renamed: IndexMap<String, String> = IndexMap::new();
        let mut new_metabolites = Vec::new();
        for met in other.metabolites.iter() {
            let mut met = met.clone();
            if self.metabolites.contains(&met.id) {
                let Some(prefix) = prefix_existing else {
                    info!("Metabolite {} already in {}, keeping existing", met.id, self.id);
                    continue;
                };
                let new_id = format!("{prefix}_{}", met.id);
                renamed.insert(met.id.clone(), new_id.clone());
                met.id = new_id;
            }
            new_metabolites.push(met);
        }
        self.add_metabolites(new_metabolites);

        let mut new_reactions = Vec::new();
        let mut reaction_ids: IndexMap<String, String> = IndexMap::new();
        // Symbols (rate constants, fluxes, boundary species) whose name follows a renamed id
        let mut symbols: IndexMap<String, String> = IndexMap::new();
        for rxn in other.reactions.iter() {
            let mut rxn = rxn.clone();
            let original_id = rxn.id.clone();
            if self.reactions.contains(&rxn.id) {
                let Some(prefix) = prefix_existing else {
                    info!("Reaction {} already in {}, keeping existing", rxn.id, self.id);
                    continue;
                };
                let old_symbols = [rxn.kf_str(), rxn.kr_str(), rxn.keq_str(), rxn.flux_symbol_str()];
                rxn.id = format!("{prefix}_{}", rxn.id);
                let new_symbols = [rxn.kf_str(), rxn.kr_str(), rxn.keq_str(), rxn.flux_symbol_str()];
                symbols.extend(old_symbols.into_iter().zip(new_symbols));
            }
            let species_renamed = rxn
                .metabolites
                .first()
                .is_some_and(|(id, _)| renamed.contains_key(id));
            if let (Some(prefix), true) = (prefix_existing, species_renamed) {
                if let Some(external) = rxn.external_metabolite_id(&other.config) {
                    let new_external = format!("{prefix}_{external}");
                    rxn.external_metabolite = Some(new_external.clone());
                    symbols.insert(external, new_external);
                }
            }
            rxn.metabolites = rxn
                .metabolites
                .into_iter()
                .map(|(id, coef)| (renamed.get(&id).cloned().unwrap_or(id), coef))
                .collect();
            reaction_ids.insert(original_id, rxn.id.clone());
            new_reactions.push(rxn);
        }
        self.add_reactions(new_reactions);

        for (original_id, new_id) in &reaction_ids {
            if let Some(rate) = other.custom_rates.get(original_id) {
                if !self.custom_rates.contains_key(new_id) {
                    let rate = rate.rename_concentrations(&renamed).rename_symbols(&symbols);
                    self.custom_rates.insert(new_id.clone(), rate);
                }
            }
        }
        for (name, value) in &other.custom_parameters {
            self.custom_parameters.entry(name.clone()).or_insert(*value);
        }
        for (id, value) in &other.fixed_concentrations {
            let id = renamed
                .get(id)
                .or_else(|| symbols.get(id))
                .cloned()
                .unwrap_or(id.clone());
            self.fixed_concentrations.entry(id).or_insert(*value);
        }
        for (short, long) in &other.compartments {
            self.compartments.entry(short.clone()).or_insert(long.clone());
        }
        self.modules.insert(other.id.clone());
        self.modules.extend(other.modules.iter().cloned());
        info!("Merged {} into {}", other.id, self.id);
    }

    // endregion Maintenance
}

/// Rate constant or flux slot of a reaction addressed by symbol name
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ParameterKind {
    Kf,
    Kr,
    Keq,
    Flux,
}

impl ParameterKind {
    fn slot(self, rxn: &mut Reaction) -> &mut Option<f64> {
        match self {
            ParameterKind::Kf => &mut rxn.kf,
            ParameterKind::Kr => &mut rxn.kr,
            ParameterKind::Keq => &mut rxn.keq,
            ParameterKind::Flux => &mut rxn.steady_state_flux,
        }
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error("Entity with id {0} already exists in the model")]
    DuplicateEntity(String),
    #[error("{0} not found in the model")]
    NotFound(String),
    #[error("Unable to solve for the rate constant of {reaction}: {reason}")]
    UnsolvableEquation { reaction: String, reason: String },
    #[error("Stoichiometric matrix error: {0}")]
    MatrixError(#[from] MatrixError),
    #[error("Unable to build rate expression: {0}")]
    ExpressionError(#[from] ExpressionError),
    #[error("Unable to parse reaction string: {0}")]
    ReactionParseError(#[from] ReactionParseError),
    #[error("Unable to parse formula: {0}")]
    FormulaError(#[from] FormulaError),
    #[error("Invalid configuration: {0}")]
    ConfigurationError(#[from] ConfigurationError),
}
