//! The stoichiometric matrix, its representations, and how it is built from a model
//!
//! The matrix has one row per metabolite and one column per reaction, in registry order. Five
//! representations are supported:
//! - [`MatrixType::Dense`]: a dense [`DMatrix`]
//! - [`MatrixType::Dok`]: a coordinate sparse matrix, cheap to write single entries into
//! - [`MatrixType::Lil`]: a compressed sparse row matrix, cheap to slice by row
//! - [`MatrixType::DataFrame`]: a dense matrix addressed by metabolite and reaction ids
//! - [`MatrixType::Symbolic`]: exact rational entries
//!
//! All representations carry the row and column ids, so any of them can be addressed by label.
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use indexmap::IndexMap;
use log::{debug, warn};
use nalgebra::DMatrix;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use num_rational::Rational64;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mass_model::metabolite::Metabolite;
use crate::mass_model::model::{Model, ModelError};
use crate::mass_model::reaction::Reaction;
use crate::mass_model::registry::Registry;

/// Available representations of the stoichiometric matrix
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MatrixType {
    Dense,
    Dok,
    Lil,
    DataFrame,
    Symbolic,
}

impl MatrixType {
    pub const ALL: [MatrixType; 5] = [
        MatrixType::Dense,
        MatrixType::Dok,
        MatrixType::Lil,
        MatrixType::DataFrame,
        MatrixType::Symbolic,
    ];
}

impl FromStr for MatrixType {
    type Err = MatrixError;

    /// Parse a representation name, ignoring case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dense" => Ok(MatrixType::Dense),
            "dok" | "coo" => Ok(MatrixType::Dok),
            "lil" | "csr" => Ok(MatrixType::Lil),
            "dataframe" | "labeled" => Ok(MatrixType::DataFrame),
            "symbolic" => Ok(MatrixType::Symbolic),
            _ => Err(MatrixError::UnknownMatrixType(s.to_string())),
        }
    }
}

impl TryFrom<String> for MatrixType {
    type Error = MatrixError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MatrixType> for String {
    fn from(value: MatrixType) -> Self {
        value.to_string()
    }
}

impl Display for MatrixType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MatrixType::Dense => "dense",
            MatrixType::Dok => "dok",
            MatrixType::Lil => "lil",
            MatrixType::DataFrame => "dataframe",
            MatrixType::Symbolic => "symbolic",
        };
        write!(f, "{name}")
    }
}

/// Numeric type of the matrix entries
///
/// `Int64` truncates coefficients toward zero. It has no effect on the symbolic representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Dtype {
    Float64,
    Int64,
}

impl FromStr for Dtype {
    type Err = MatrixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "float64" | "float" | "f64" => Ok(Dtype::Float64),
            "int64" | "int" | "i64" => Ok(Dtype::Int64),
            _ => Err(MatrixError::UnknownDtype(s.to_string())),
        }
    }
}

impl TryFrom<String> for Dtype {
    type Error = MatrixError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Dtype> for String {
    fn from(value: Dtype) -> Self {
        value.to_string()
    }
}

impl Display for Dtype {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Dtype::Float64 => write!(f, "float64"),
            Dtype::Int64 => write!(f, "int64"),
        }
    }
}

impl Dtype {
    fn cast(&self, value: f64) -> f64 {
        match self {
            Dtype::Float64 => value,
            Dtype::Int64 => value.trunc(),
        }
    }
}

/// Matrix storage for each representation
#[derive(Clone, Debug)]
pub enum MatrixData {
    Dense(DMatrix<f64>),
    Dok(CooMatrix<f64>),
    Lil(CsrMatrix<f64>),
    DataFrame(DMatrix<f64>),
    Symbolic(DMatrix<Rational64>),
}

/// Stoichiometric matrix with its row (metabolite) and column (reaction) labels
#[derive(Clone, Debug)]
pub struct StoichiometricMatrix {
    row_ids: Vec<String>,
    col_ids: Vec<String>,
    dtype: Dtype,
    data: MatrixData,
}

impl StoichiometricMatrix {
    /// Build a matrix from labels and `(row, column, value)` entries
    ///
    /// Entries at the same position are summed, zero entries are not stored by the sparse
    /// representations.
    pub fn from_entries<I>(
        row_ids: Vec<String>,
        col_ids: Vec<String>,
        entries: I,
        matrix_type: MatrixType,
        dtype: Dtype,
    ) -> Result<Self, MatrixError>
    where
        I: IntoIterator<Item = (usize, usize, f64)>,
    {
        let mut coo = CooMatrix::new(row_ids.len(), col_ids.len());
        for (i, j, value) in entries {
            if i >= row_ids.len() || j >= col_ids.len() {
                return Err(MatrixError::OutOfBounds(i, j));
            }
            let value = dtype.cast(value);
            if value != 0. {
                coo.push(i, j, value);
            }
        }
        StoichiometricMatrix {
            row_ids,
            col_ids,
            dtype,
            data: MatrixData::Dok(coo),
        }
        .convert(matrix_type)
    }

    /// Build the stoichiometric matrix of a set of metabolites and reactions from scratch
    pub fn build(
        metabolites: &Registry<Metabolite>,
        reactions: &Registry<Reaction>,
        matrix_type: MatrixType,
        dtype: Dtype,
    ) -> Result<Self, MatrixError> {
        let row_ids: Vec<String> = metabolites.ids().map(String::from).collect();
        let col_ids: Vec<String> = reactions.ids().map(String::from).collect();
        let entries = reaction_entries(metabolites, reactions, reactions.iter());
        Self::from_entries(row_ids, col_ids, entries, matrix_type, dtype)
    }

    /// Produce the matrix for a model whose registries have grown by appending
    ///
    /// The existing entries are carried over through the point-update representation and only
    /// the columns of `new_reactions` are written. Entries whose metabolite or reaction is no
    /// longer present trigger a full rebuild instead.
    pub fn updated_with(
        &self,
        metabolites: &Registry<Metabolite>,
        reactions: &Registry<Reaction>,
        new_reactions: &[String],
        matrix_type: MatrixType,
        dtype: Dtype,
    ) -> Result<Self, MatrixError> {
        let current = self.convert(MatrixType::Dok)?;
        let MatrixData::Dok(ref old) = current.data else {
            return Self::build(metabolites, reactions, matrix_type, dtype);
        };
        let mut coo = CooMatrix::new(metabolites.len(), reactions.len());
        for (i, j, value) in old.triplet_iter() {
            let row = metabolites.index_of(&self.row_ids[i]);
            let col = reactions.index_of(&self.col_ids[j]);
            match (row, col) {
                (Some(row), Some(col)) => coo.push(row, col, dtype.cast(*value)),
                _ => {
                    debug!("Stoichiometric matrix entries went stale, rebuilding from scratch");
                    return Self::build(metabolites, reactions, matrix_type, dtype);
                }
            }
        }
        let appended = new_reactions.iter().filter_map(|id| reactions.get(id));
        for (i, j, value) in reaction_entries(metabolites, reactions, appended) {
            let value = dtype.cast(value);
            if value != 0. {
                coo.push(i, j, value);
            }
        }
        StoichiometricMatrix {
            row_ids: metabolites.ids().map(String::from).collect(),
            col_ids: reactions.ids().map(String::from).collect(),
            dtype,
            data: MatrixData::Dok(coo),
        }
        .convert(matrix_type)
    }

    // region Accessors

    pub fn matrix_type(&self) -> MatrixType {
        match self.data {
            MatrixData::Dense(_) => MatrixType::Dense,
            MatrixData::Dok(_) => MatrixType::Dok,
            MatrixData::Lil(_) => MatrixType::Lil,
            MatrixData::DataFrame(_) => MatrixType::DataFrame,
            MatrixData::Symbolic(_) => MatrixType::Symbolic,
        }
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    pub fn data(&self) -> &MatrixData {
        &self.data
    }

    pub fn row_ids(&self) -> &[String] {
        &self.row_ids
    }

    pub fn col_ids(&self) -> &[String] {
        &self.col_ids
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.row_ids.len(), self.col_ids.len())
    }

    /// Nonzero entries as `(row, column, value)`, sorted by row then column
    pub fn entries(&self) -> Vec<(usize, usize, f64)> {
        let mut entries: Vec<(usize, usize, f64)> = match self.data {
            MatrixData::Dense(ref m) | MatrixData::DataFrame(ref m) => dense_entries(m),
            MatrixData::Dok(ref m) => {
                // Duplicate positions are summed through the dense form
                dense_entries(&DMatrix::from(m))
            }
            MatrixData::Lil(ref m) => m
                .triplet_iter()
                .filter(|(_, _, v)| **v != 0.)
                .map(|(i, j, v)| (i, j, *v))
                .collect(),
            MatrixData::Symbolic(ref m) => {
                let mut out = Vec::new();
                for j in 0..m.ncols() {
                    for i in 0..m.nrows() {
                        let r = m[(i, j)];
                        if *r.numer() != 0 {
                            out.push((i, j, ratio_to_f64(r)));
                        }
                    }
                }
                out
            }
        };
        entries.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        entries
    }

    /// Coefficient of a metabolite in a reaction, addressed by id
    pub fn get(&self, row_id: &str, col_id: &str) -> Option<f64> {
        let i = self.row_ids.iter().position(|r| r == row_id)?;
        let j = self.col_ids.iter().position(|c| c == col_id)?;
        Some(self.get_index(i, j))
    }

    /// Coefficient at a position, 0 for positions without an entry
    pub fn get_index(&self, i: usize, j: usize) -> f64 {
        match self.data {
            MatrixData::Dense(ref m) | MatrixData::DataFrame(ref m) => m[(i, j)],
            MatrixData::Dok(ref m) => m
                .triplet_iter()
                .filter(|(r, c, _)| *r == i && *c == j)
                .map(|(_, _, v)| *v)
                .sum(),
            MatrixData::Lil(ref m) => m
                .get_entry(i, j)
                .map(|entry| entry.into_value())
                .unwrap_or(0.),
            MatrixData::Symbolic(ref m) => ratio_to_f64(m[(i, j)]),
        }
    }

    /// Nonzero coefficients of one row, keyed by column id
    pub fn row(&self, row_id: &str) -> Option<IndexMap<String, f64>> {
        let i = self.row_ids.iter().position(|r| r == row_id)?;
        let values = match self.data {
            MatrixData::Lil(ref m) => {
                let row = m.row(i);
                row.col_indices()
                    .iter()
                    .zip(row.values())
                    .filter(|(_, v)| **v != 0.)
                    .map(|(j, v)| (self.col_ids[*j].clone(), *v))
                    .collect()
            }
            _ => self
                .entries()
                .into_iter()
                .filter(|(r, _, _)| *r == i)
                .map(|(_, j, v)| (self.col_ids[j].clone(), v))
                .collect(),
        };
        Some(values)
    }

    /// Nonzero coefficients of one column, keyed by row id
    pub fn column(&self, col_id: &str) -> Option<IndexMap<String, f64>> {
        let j = self.col_ids.iter().position(|c| c == col_id)?;
        Some(
            self.entries()
                .into_iter()
                .filter(|(_, c, _)| *c == j)
                .map(|(i, _, v)| (self.row_ids[i].clone(), v))
                .collect(),
        )
    }

    /// Dense copy of the matrix
    pub fn to_dense(&self) -> DMatrix<f64> {
        match self.data {
            MatrixData::Dense(ref m) | MatrixData::DataFrame(ref m) => m.clone(),
            MatrixData::Dok(ref m) => DMatrix::from(m),
            MatrixData::Lil(ref m) => DMatrix::from(m),
            MatrixData::Symbolic(ref m) => m.map(ratio_to_f64),
        }
    }

    /// Dense copy of the matrix with integer entries (truncated toward zero)
    pub fn to_dense_i64(&self) -> DMatrix<i64> {
        self.to_dense().map(|v| v.trunc() as i64)
    }

    // endregion Accessors

    // region Conversion

    /// Convert the matrix into another representation, keeping labels and dtype
    ///
    /// Conversion to [`MatrixType::Symbolic`] fails for values without a close `i64` fraction.
    pub fn convert(&self, matrix_type: MatrixType) -> Result<Self, MatrixError> {
        if matrix_type == self.matrix_type() {
            return Ok(self.clone());
        }
        let data = match matrix_type {
            MatrixType::Dense => MatrixData::Dense(self.to_dense()),
            MatrixType::DataFrame => MatrixData::DataFrame(self.to_dense()),
            MatrixType::Dok => MatrixData::Dok(match self.data {
                MatrixData::Lil(ref m) => CooMatrix::from(m),
                _ => CooMatrix::from(&self.to_dense()),
            }),
            MatrixType::Lil => MatrixData::Lil(match self.data {
                MatrixData::Dok(ref m) => CsrMatrix::from(m),
                _ => CsrMatrix::from(&self.to_dense()),
            }),
            MatrixType::Symbolic => {
                let dense = self.to_dense();
                let mut exact = DMatrix::from_element(
                    dense.nrows(),
                    dense.ncols(),
                    Rational64::from_integer(0),
                );
                for (index, value) in dense.iter().enumerate() {
                    exact[index] = Rational64::approximate_float(*value)
                        .ok_or(MatrixError::NotRepresentable(*value))?;
                }
                MatrixData::Symbolic(exact)
            }
        };
        Ok(StoichiometricMatrix {
            row_ids: self.row_ids.clone(),
            col_ids: self.col_ids.clone(),
            dtype: self.dtype,
            data,
        })
    }

    // endregion Conversion
}

/// `(metabolite index, reaction index, coefficient)` for the given reactions
fn reaction_entries<'a, I>(
    metabolites: &Registry<Metabolite>,
    reactions: &Registry<Reaction>,
    selected: I,
) -> Vec<(usize, usize, f64)>
where
    I: Iterator<Item = &'a Reaction>,
{
    let mut entries = Vec::new();
    for rxn in selected {
        let Some(j) = reactions.index_of(&rxn.id) else {
            continue;
        };
        for (met, coef) in &rxn.metabolites {
            match metabolites.index_of(met) {
                Some(i) => entries.push((i, j, *coef)),
                None => warn!(
                    "Metabolite {met} of reaction {} is not in the model, leaving it out of the matrix",
                    rxn.id
                ),
            }
        }
    }
    entries
}

fn dense_entries(m: &DMatrix<f64>) -> Vec<(usize, usize, f64)> {
    let mut out = Vec::new();
    for j in 0..m.ncols() {
        for i in 0..m.nrows() {
            if m[(i, j)] != 0. {
                out.push((i, j, m[(i, j)]));
            }
        }
    }
    out
}

fn ratio_to_f64(r: Rational64) -> f64 {
    *r.numer() as f64 / *r.denom() as f64
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum MatrixError {
    #[error("Unrecognized matrix type {0}, expected one of dense, dok, lil, dataframe, symbolic")]
    UnknownMatrixType(String),
    #[error("Unrecognized dtype {0}, expected float64 or int64")]
    UnknownDtype(String),
    #[error("Entry ({0}, {1}) is outside of the matrix")]
    OutOfBounds(usize, usize),
    #[error("Value {0} can not be represented exactly as a rational number")]
    NotRepresentable(f64),
}

// region Model matrix functions
impl Model {
    /// Build the stoichiometric matrix from scratch
    ///
    /// # Parameters
    /// - `matrix_type`: representation to build, defaults to the model's configured type
    /// - `dtype`: numeric type, defaults to the model's configured dtype
    /// - `update_model`: store the result as the model's cached matrix, and make the given
    ///   representation and dtype the model's defaults
    ///
    /// # Examples
    /// ```rust
    /// use indexmap::IndexMap;
    /// use massrs_core::mass_model::model::Model;
    /// use massrs_core::mass_model::reaction::Reaction;
    /// use massrs_core::mass_model::stoichiometry::MatrixType;
    /// let mut model = Model::new("example");
    /// let v1 = Reaction::new("v1", IndexMap::from([("A".to_string(), -1.), ("B".to_string(), 1.)]));
    /// model.add_reactions(vec![v1]);
    /// let s = model.update_s(Some(MatrixType::Lil), None, false).unwrap();
    /// assert_eq!(s.get("A", "v1"), Some(-1.));
    /// ```
    pub fn update_s(
        &mut self,
        matrix_type: Option<MatrixType>,
        dtype: Option<Dtype>,
        update_model: bool,
    ) -> Result<StoichiometricMatrix, ModelError> {
        let matrix_type = matrix_type.unwrap_or(self.config.matrix_type);
        let dtype = dtype.unwrap_or(self.config.dtype);
        let matrix =
            StoichiometricMatrix::build(&self.metabolites, &self.reactions, matrix_type, dtype)?;
        if update_model {
            let (old_type, old_dtype) = (self.config.matrix_type, self.config.dtype);
            self.record(move |m: &mut Model| {
                m.config.matrix_type = old_type;
                m.config.dtype = old_dtype;
                m.matrix_stale = true;
            });
            self.config.matrix_type = matrix_type;
            self.config.dtype = dtype;
            self.s_matrix = Some(matrix.clone());
            self.matrix_stale = false;
        }
        Ok(matrix)
    }

    /// The cached stoichiometric matrix, rebuilt first if it is missing or out of date
    pub fn s(&mut self) -> Result<&StoichiometricMatrix, ModelError> {
        let cached_ok = !self.matrix_stale
            && self.s_matrix.as_ref().is_some_and(|s| {
                s.matrix_type() == self.config.matrix_type && s.dtype() == self.config.dtype
            });
        if !cached_ok {
            debug!("Rebuilding stoichiometric matrix of model {}", self.id);
            self.s_matrix = Some(StoichiometricMatrix::build(
                &self.metabolites,
                &self.reactions,
                self.config.matrix_type,
                self.config.dtype,
            )?);
            self.matrix_stale = false;
        }
        self.s_matrix
            .as_ref()
            .ok_or_else(|| ModelError::NotFound("stoichiometric matrix".to_string()))
    }

    /// Patch the cached matrix after metabolites or reactions were appended
    pub(crate) fn patch_s(&mut self, new_reactions: &[String]) {
        if self.matrix_stale {
            return;
        }
        let Some(ref cached) = self.s_matrix else {
            return;
        };
        match cached.updated_with(
            &self.metabolites,
            &self.reactions,
            new_reactions,
            self.config.matrix_type,
            self.config.dtype,
        ) {
            Ok(updated) => {
                debug!("Patched stoichiometric matrix with {} reactions", new_reactions.len());
                self.s_matrix = Some(updated);
            }
            Err(err) => {
                debug!("Unable to patch stoichiometric matrix ({err}), marking it stale");
                self.matrix_stale = true;
            }
        }
    }

    /// Matrix of element counts, rows `C H O P N S q` (charge as `q`), one column per metabolite
    pub fn elemental_matrix(
        &self,
        matrix_type: Option<MatrixType>,
    ) -> Result<StoichiometricMatrix, ModelError> {
        let elements = ["C", "H", "O", "P", "N", "S", "q"];
        let mut entries = Vec::new();
        for (j, met) in self.metabolites.iter().enumerate() {
            let counts = met.elements()?;
            for (i, element) in elements.iter().enumerate() {
                let value = if *element == "q" {
                    met.charge as f64
                } else {
                    counts.get(*element).copied().unwrap_or(0) as f64
                };
                entries.push((i, j, value));
            }
        }
        Ok(StoichiometricMatrix::from_entries(
            elements.iter().map(|e| e.to_string()).collect(),
            self.metabolites.ids().map(String::from).collect(),
            entries,
            matrix_type.unwrap_or(self.config.matrix_type),
            Dtype::Float64,
        )?)
    }
}
// endregion Model matrix functions
