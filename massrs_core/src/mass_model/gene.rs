//! This module provides the Gene struct, representing a gene associated with reactions
use std::fmt::{Display, Formatter};
use std::hash::Hash;

use derive_builder::Builder;
use indexmap::IndexSet;

use crate::mass_model::registry::Entity;

/// Structure Representing a Gene
#[derive(Builder, Clone, Debug, Eq, PartialEq)]
pub struct Gene {
    /// Used to identify the gene
    pub id: String,
    /// Human Readable Gene Name
    #[builder(default = "None")]
    pub name: Option<String>,
    /// Ids of the reactions associated with this gene, maintained by the model
    #[builder(setter(skip))]
    pub(crate) reactions: IndexSet<String>,
}

impl Gene {
    pub fn new(id: &str) -> Gene {
        Gene {
            id: id.to_string(),
            name: None,
            reactions: IndexSet::new(),
        }
    }

    pub fn reactions(&self) -> &IndexSet<String> {
        &self.reactions
    }
}

impl Entity for Gene {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Display for Gene {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl Hash for Gene {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
