use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::filters::{FilterCatalog, FilterParams};
use crate::history::Identified;
use crate::source::SourceImage;

/// One filter contribution inside an edit state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppliedFilter {
    pub id: String,
    pub params: FilterParams,
}

/// Serializable list of applied filters, detached from any source image.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EditRecipe {
    pub filters: Vec<AppliedFilter>,
}

impl EditRecipe {
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Immutable snapshot of the filters applied over a source image.
///
/// Filters compose in insertion order. A filter whose parameters are
/// neutral is absent from the list, never stored with zero values.
#[derive(Clone)]
pub struct EditState {
    source: Arc<SourceImage>,
    filters: Vec<AppliedFilter>,
}

impl EditState {
    /// The unedited state of `source`.
    pub fn new(source: Arc<SourceImage>) -> Self {
        Self {
            source,
            filters: Vec::new(),
        }
    }

    /// Rebuild a state from a saved recipe. Every id must exist in `catalog`.
    pub fn from_recipe(
        source: Arc<SourceImage>,
        recipe: &EditRecipe,
        catalog: &FilterCatalog,
    ) -> Result<Self, PipelineError> {
        let mut state = Self::new(source);
        for applied in &recipe.filters {
            state = state.with_filter(catalog, &applied.id, &applied.params)?;
        }
        Ok(state)
    }

    pub fn source(&self) -> &Arc<SourceImage> {
        &self.source
    }

    pub fn filters(&self) -> &[AppliedFilter] {
        &self.filters
    }

    pub fn params(&self, id: &str) -> Option<&FilterParams> {
        self.filters.iter().find(|f| f.id == id).map(|f| &f.params)
    }

    pub fn is_unedited(&self) -> bool {
        self.filters.is_empty()
    }

    /// A copy with `id` set to `params`: replaced in place if present,
    /// appended otherwise, removed when `params` is neutral.
    ///
    /// Parameters are checked against the filter's kind and clamped first,
    /// so out-of-range values that clamp to neutral also remove the entry.
    pub fn with_filter(
        &self,
        catalog: &FilterCatalog,
        id: &str,
        params: &FilterParams,
    ) -> Result<Self, PipelineError> {
        let params = catalog.get(id)?.validate(params)?;
        Ok(self.with_validated(id, params))
    }

    fn with_validated(&self, id: &str, params: FilterParams) -> Self {
        let mut filters = self.filters.clone();
        let existing = filters.iter().position(|f| f.id == id);

        match (existing, params.is_neutral()) {
            (Some(index), true) => {
                filters.remove(index);
            }
            (Some(index), false) => filters[index].params = params,
            (None, true) => {}
            (None, false) => filters.push(AppliedFilter {
                id: id.to_string(),
                params,
            }),
        }

        Self {
            source: Arc::clone(&self.source),
            filters,
        }
    }

    pub fn without_filter(&self, id: &str) -> Self {
        Self {
            source: Arc::clone(&self.source),
            filters: self.filters.iter().filter(|f| f.id != id).cloned().collect(),
        }
    }

    pub fn recipe(&self) -> EditRecipe {
        EditRecipe {
            filters: self.filters.clone(),
        }
    }

    /// Digest over the source pixels and the ordered filter list.
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.source.content_hash().as_bytes());
        for applied in &self.filters {
            hasher.update(applied.id.as_bytes());
            hasher.update(&[0]);
            applied.params.hash_into(&mut hasher);
        }
        hasher.finalize().to_hex().to_string()
    }
}

impl Identified for EditState {
    type Id = String;

    fn identity(&self) -> String {
        self.digest()
    }
}

impl fmt::Debug for EditState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditState")
            .field("source", &self.source.content_hash())
            .field("filters", &self.filters)
            .finish()
    }
}
