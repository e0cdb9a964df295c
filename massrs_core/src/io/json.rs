//! Module providing JSON IO for kinetic Models
use std::fs;
use std::path::Path;

use indexmap::{IndexMap, IndexSet};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::kinetics::rate_law::RateType;
use crate::mass_model::gene::Gene;
use crate::mass_model::metabolite::Metabolite;
use crate::mass_model::model::{Model, ModelError};
use crate::mass_model::reaction::{Reaction, ReactionBuilder, ReactionBuilderError};
use crate::mass_model::stoichiometry::{Dtype, MatrixType};

// region JSON Model
/// Represents a JSON serialized model, used for reading and writing models in json format
#[derive(Serialize, Deserialize)]
struct JsonModel {
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    metabolites: Vec<JsonMetabolite>,
    reactions: Vec<JsonReaction>,
    #[serde(default)]
    genes: Vec<JsonGene>,
    #[serde(default)]
    compartments: Option<IndexMap<String, String>>,
    #[serde(default)]
    modules: Vec<String>,
    /// Reaction id to custom rate expression string
    #[serde(default)]
    custom_rates: IndexMap<String, String>,
    #[serde(default)]
    custom_parameters: IndexMap<String, f64>,
    #[serde(default)]
    fixed_concentrations: IndexMap<String, f64>,
    #[serde(default)]
    rate_type: Option<RateType>,
    #[serde(default)]
    matrix_type: Option<MatrixType>,
    #[serde(default)]
    dtype: Option<Dtype>,
}

#[derive(Serialize, Deserialize)]
struct JsonMetabolite {
    id: String,
    name: Option<String>,
    compartment: Option<String>,
    charge: Option<i32>,
    formula: Option<String>,
    #[serde(default)]
    initial_condition: Option<f64>,
    #[serde(default)]
    notes: Option<Value>,
    #[serde(default)]
    annotation: Option<Value>,
}

fn reversible_default() -> bool {
    true
}

#[derive(Serialize, Deserialize)]
struct JsonReaction {
    id: String,
    name: Option<String>,
    metabolites: IndexMap<String, f64>,
    #[serde(default)]
    subsystem: Option<String>,
    #[serde(default = "reversible_default")]
    reversible: bool,
    #[serde(default)]
    kf: Option<f64>,
    #[serde(default)]
    kr: Option<f64>,
    #[serde(default, rename = "Keq")]
    keq: Option<f64>,
    #[serde(default)]
    steady_state_flux: Option<f64>,
    #[serde(default)]
    exchange: bool,
    #[serde(default)]
    external_metabolite: Option<String>,
    #[serde(default)]
    genes: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct JsonGene {
    id: String,
    name: Option<String>,
}
// endregion JSON Model

// region Conversions
impl From<JsonGene> for Gene {
    fn from(g: JsonGene) -> Self {
        Self {
            id: g.id,
            name: g.name,
            reactions: IndexSet::new(),
        }
    }
}

impl From<JsonMetabolite> for Metabolite {
    fn from(m: JsonMetabolite) -> Self {
        // Notes and annotations are kept as their JSON text
        Self {
            id: m.id,
            name: m.name,
            compartment: m.compartment,
            charge: m.charge.unwrap_or_default(),
            formula: m.formula,
            initial_condition: m.initial_condition,
            notes: m.notes.map(|v| v.to_string()),
            annotation: m.annotation.map(|v| v.to_string()),
            reactions: IndexSet::new(),
        }
    }
}

impl TryFrom<JsonReaction> for Reaction {
    type Error = JsonError;

    fn try_from(r: JsonReaction) -> Result<Self, Self::Error> {
        let mut reaction = ReactionBuilder::default()
            .id(r.id)
            .metabolites(r.metabolites)
            .name(r.name)
            .subsystem(r.subsystem)
            .reversible(r.reversible)
            .steady_state_flux(r.steady_state_flux)
            .exchange(r.exchange)
            .external_metabolite(r.external_metabolite)
            .genes(r.genes.into_iter().collect())
            .build()?;
        // Rate constants go through the validating setters
        reaction.set_kf(r.kf)?;
        reaction.set_kr(r.kr)?;
        reaction.set_keq(r.keq)?;
        Ok(reaction)
    }
}

impl From<&Gene> for JsonGene {
    fn from(g: &Gene) -> Self {
        Self {
            id: g.id.clone(),
            name: g.name.clone(),
        }
    }
}

impl From<&Metabolite> for JsonMetabolite {
    fn from(m: &Metabolite) -> Self {
        Self {
            id: m.id.clone(),
            name: m.name.clone(),
            compartment: m.compartment.clone(),
            charge: Some(m.charge),
            formula: m.formula.clone(),
            initial_condition: m.initial_condition,
            notes: m
                .notes
                .clone()
                .map(|n| serde_json::from_str(&n).unwrap_or(Value::String(n))),
            annotation: m
                .annotation
                .clone()
                .map(|a| serde_json::from_str(&a).unwrap_or(Value::String(a))),
        }
    }
}

impl From<&Reaction> for JsonReaction {
    fn from(r: &Reaction) -> Self {
        Self {
            id: r.id.clone(),
            name: r.name.clone(),
            metabolites: r.metabolites.clone(),
            subsystem: r.subsystem.clone(),
            reversible: r.reversible,
            kf: r.kf,
            kr: r.kr,
            keq: r.keq,
            steady_state_flux: r.steady_state_flux,
            exchange: r.exchange,
            external_metabolite: r.external_metabolite.clone(),
            genes: r.genes.iter().cloned().collect(),
        }
    }
}

impl Model {
    /// Read a model from a JSON file
    pub fn read_json<P: AsRef<Path>>(path: P) -> Result<Model, JsonError> {
        let model_str = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) => return Err(JsonError::UnableToRead(format!("{:?}", err))),
        };
        Model::from_json_str(&model_str)
    }

    /// Write the model to a JSON file
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<(), JsonError> {
        let model_string = self.to_json_string()?;
        fs::write(path, model_string)?;
        Ok(())
    }

    /// Parse a model from a JSON string
    ///
    /// # Examples
    /// ```rust
    /// use massrs_core::mass_model::model::Model;
    /// let model = Model::from_json_str(r#"{
    ///     "id": "toy",
    ///     "metabolites": [],
    ///     "reactions": [{"id": "v1", "name": null, "metabolites": {"A": -1.0, "B": 1.0}}]
    /// }"#).unwrap();
    /// assert_eq!(model.metabolites.len(), 2);
    /// ```
    pub fn from_json_str(model_str: &str) -> Result<Model, JsonError> {
        let json_model = match serde_json::from_str::<JsonModel>(model_str) {
            Ok(model) => model,
            Err(err) => return Err(JsonError::UnableToParse(format!("{:?}", err))),
        };
        Model::from_json(json_model)
    }

    /// Serialize the model to a JSON string
    pub fn to_json_string(&self) -> Result<String, JsonError> {
        Ok(serde_json::to_string(&self.to_json())?)
    }

    fn from_json(json_model: JsonModel) -> Result<Self, JsonError> {
        let mut model = Model::new(&json_model.id.unwrap_or_default());
        model.name = json_model.name;
        model.compartments = json_model.compartments.unwrap_or_default();
        model.modules = json_model.modules.into_iter().collect();
        if let Some(rate_type) = json_model.rate_type {
            model.rate_type = rate_type;
        }
        if let Some(matrix_type) = json_model.matrix_type {
            model.config.matrix_type = matrix_type;
        }
        if let Some(dtype) = json_model.dtype {
            model.config.dtype = dtype;
        }
        model.add_metabolites(json_model.metabolites.into_iter().map(Metabolite::from).collect());
        model.add_genes(json_model.genes.into_iter().map(Gene::from).collect());
        let reactions = json_model
            .reactions
            .into_iter()
            .map(Reaction::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        model.add_reactions(reactions);
        model.custom_parameters = json_model.custom_parameters;
        for (rxn_id, rate) in &json_model.custom_rates {
            model.add_custom_rate(rxn_id, rate, &IndexMap::new())?;
        }
        model.add_fixed_concentrations(&json_model.fixed_concentrations)?;
        debug!(
            "Read model {} with {} metabolites and {} reactions",
            model.id,
            model.metabolites.len(),
            model.reactions.len()
        );
        Ok(model)
    }

    fn to_json(&self) -> JsonModel {
        JsonModel {
            id: Some(self.id.clone()),
            name: self.name.clone(),
            metabolites: self.metabolites.iter().map(JsonMetabolite::from).collect(),
            reactions: self.reactions.iter().map(JsonReaction::from).collect(),
            genes: self.genes.iter().map(JsonGene::from).collect(),
            compartments: Some(self.compartments.clone()),
            modules: self.modules.iter().cloned().collect(),
            custom_rates: self
                .custom_rates
                .iter()
                .map(|(id, rate)| (id.clone(), rate.to_string()))
                .collect(),
            custom_parameters: self.custom_parameters.clone(),
            fixed_concentrations: self.fixed_concentrations.clone(),
            rate_type: Some(self.rate_type),
            matrix_type: Some(self.config.matrix_type),
            dtype: Some(self.config.dtype),
        }
    }
}

#[derive(Error, Debug)]
pub enum JsonError {
    #[error("Unable to read file due to {0}")]
    UnableToRead(String),
    #[error("Unable to parse json due to {0}")]
    UnableToParse(String),
    #[error("Unable to build reaction")]
    UnableToBuildReaction(#[from] ReactionBuilderError),
    #[error("Invalid model content: {0}")]
    InvalidModel(#[from] ModelError),
    #[error("Serde json error")]
    SerdeJsonError(#[from] serde_json::Error),
    #[error("Unable to write to file")]
    UnableToWrite(#[from] std::io::Error),
}

// endregion Conversions

#[cfg(test)]
mod json_tests {
    use super::*;
    use crate::mass_model::model::ExchangeType;
    use approx::assert_relative_eq;

    #[test]
    fn json_metabolite() {
        let data = r#"{
"id":"glc__D_c",
"name":"D-Glucose",
"compartment":"c",
"charge":0,
"formula":"C6H12O6",
"initial_condition":0.0486,
"notes":{
"original_bigg_ids":[
"glc_D_c"
]
}
}"#;
        let met: JsonMetabolite = serde_json::from_str(data).unwrap();
        assert_eq!(met.id, "glc__D_c");
        let met = Metabolite::from(met);
        assert_eq!(met.name.as_deref(), Some("D-Glucose"));
        assert_eq!(met.formula.as_deref(), Some("C6H12O6"));
        assert_eq!(met.initial_condition, Some(0.0486));
        assert!(met.notes.unwrap().contains("original_bigg_ids"));
        assert!(met.annotation.is_none());
    }

    #[test]
    fn json_reaction() {
        let data = r#"{
"id":"PFK",
"name":"Phosphofructokinase",
"metabolites":{
"adp_c":1.0,
"atp_c":-1.0,
"f6p_c":-1.0,
"fdp_c":1.0,
"h_c":1.0
},
"subsystem":"Glycolysis",
"reversible":false,
"kf":0.5,
"Keq":1000.0,
"steady_state_flux":1.12,
"genes":["b3916", "b1723"]
}"#;
        let reaction = Reaction::try_from(serde_json::from_str::<JsonReaction>(data).unwrap()).unwrap();
        assert_eq!(reaction.id, "PFK");
        assert!(!reaction.reversible);
        assert_eq!(reaction.metabolites.len(), 5);
        assert_eq!(reaction.kf(), Some(0.5));
        assert_eq!(reaction.keq, Some(1000.));
        assert!(reaction.kr.is_none());
        assert_relative_eq!(reaction.steady_state_flux.unwrap(), 1.12);
        assert_eq!(reaction.genes.len(), 2);
        assert!(!reaction.exchange);
    }

    #[test]
    fn invalid_rate_constant() {
        let data = r#"{"id":"v1","name":null,"metabolites":{"A":-1.0},"kr":-1.0}"#;
        let result = Reaction::try_from(serde_json::from_str::<JsonReaction>(data).unwrap());
        assert!(matches!(
            result,
            Err(JsonError::InvalidModel(ModelError::InvalidValue(_)))
        ));
    }

    #[test]
    fn json_model() {
        let data = r#"{
"id":"toy",
"metabolites":[
{"id":"A","name":null,"compartment":"c","charge":null,"formula":null,"initial_condition":2.0}
],
"reactions":[
{"id":"v1","name":null,"metabolites":{"A":-1.0,"B":1.0},"kf":1.0,"Keq":2.0,"genes":["g1"]},
{"id":"DM_B","name":null,"metabolites":{"B":-1.0},"reversible":false,"exchange":true}
],
"genes":[{"id":"g1","name":"gene one"}],
"compartments":{"c":"cytosol"},
"custom_rates":{"DM_B":"Vmax*B(t)/(Km + B(t))"},
"custom_parameters":{"Vmax":1.5,"Km":0.2},
"fixed_concentrations":{"B_b":0.1},
"rate_type":2,
"matrix_type":"LIL",
"dtype":"int64"
}"#;
        let model = Model::from_json_str(data).unwrap();
        assert_eq!(model.id, "toy");
        assert_eq!(model.metabolites.len(), 2);
        assert_eq!(model.genes.get("g1").unwrap().reactions().len(), 1);
        assert_eq!(model.genes.get("g1").unwrap().name.as_deref(), Some("gene one"));
        assert_eq!(model.rate_type(), RateType::Two);
        assert_eq!(model.configuration().matrix_type, MatrixType::Lil);
        assert_eq!(model.configuration().dtype, Dtype::Int64);
        assert_eq!(model.fixed_concentrations()["B_b"], 0.1);
        assert_eq!(
            model.custom_rates()["DM_B"].to_string(),
            "Vmax*B(t)/(Km + B(t))"
        );
        assert_eq!(model.initial_conditions()["A"], 2.);

        let copy = Model::from_json_str(&model.to_json_string().unwrap()).unwrap();
        assert_eq!(copy.reactions.ids().collect::<Vec<_>>(), vec!["v1", "DM_B"]);
        assert_eq!(copy.parameters(), model.parameters());
        assert_eq!(copy.custom_rates(), model.custom_rates());
        assert_eq!(copy.fixed_concentrations(), model.fixed_concentrations());
        assert_eq!(copy.configuration().matrix_type, MatrixType::Lil);
        assert_eq!(copy.rate_type(), RateType::Two);
    }

    #[test]
    fn invalid_models() {
        let unknown_matrix = r#"{"id":"m","metabolites":[],"reactions":[],"matrix_type":"sparse"}"#;
        assert!(matches!(
            Model::from_json_str(unknown_matrix),
            Err(JsonError::UnableToParse(_))
        ));
        let unknown_reaction = r#"{"id":"m","metabolites":[],"reactions":[],"custom_rates":{"v9":"k"}}"#;
        assert!(matches!(
            Model::from_json_str(unknown_reaction),
            Err(JsonError::InvalidModel(ModelError::NotFound(_)))
        ));
        let negative_fixed = r#"{"id":"m","metabolites":[{"id":"A","name":null,"compartment":null,"charge":null,"formula":null}],"reactions":[],"fixed_concentrations":{"A":-1.0}}"#;
        assert!(matches!(
            Model::from_json_str(negative_fixed),
            Err(JsonError::InvalidModel(ModelError::InvalidValue(_)))
        ));
    }

    #[test]
    fn write_and_read_file() {
        let mut model = Model::new("file_model");
        model
            .add_reaction_from_string("v1: A <=> B")
            .unwrap();
        model.add_exchange("B", ExchangeType::Exchange, Some(0.5)).unwrap();
        let path = std::env::temp_dir().join("massrs_core_write_and_read_file.json");
        model.write_json(&path).unwrap();
        let read = Model::read_json(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(read.reactions.len(), 2);
        assert!(read.reactions.get("EX_B").unwrap().exchange);
        assert_eq!(read.fixed_concentrations()["B_b"], 0.5);
        assert!(matches!(
            Model::read_json("/nonexistent/model.json"),
            Err(JsonError::UnableToRead(_))
        ));
    }
}
