//! # FHIRPath Evaluation Result
//!
//! What one evaluation step hands back: the collection plus whether its order
//! is meaningful. Order is a property of the producing operation, not of the
//! collection, so it travels alongside it.

use crate::evaluation_error::EvaluationError;
use crate::value::{Collection, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub collection: Collection,
    pub ordered: bool,
}

impl EvaluationResult {
    pub fn new(collection: Collection, ordered: bool) -> Self {
        Self { collection, ordered }
    }

    /// An ordered result.
    pub fn ordered(collection: Collection) -> Self {
        Self::new(collection, true)
    }

    /// A result whose order carries no meaning.
    pub fn unordered(collection: Collection) -> Self {
        Self::new(collection, false)
    }

    /// The empty collection, which is trivially ordered.
    pub fn empty() -> Self {
        Self::ordered(Collection::new())
    }

    pub fn single(value: impl Into<Value>) -> Self {
        Self::ordered(Collection::single(value))
    }

    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    pub fn len(&self) -> usize {
        self.collection.len()
    }

    /// Applies the singleton rule: the only item, `None` when empty, an error
    /// when there are several.
    pub fn singleton(&self, what: &str) -> Result<Option<&Value>, EvaluationError> {
        self.collection.singleton(what)
    }

    pub fn into_collection(self) -> Collection {
        self.collection
    }
}

impl From<Collection> for EvaluationResult {
    fn from(collection: Collection) -> Self {
        Self::ordered(collection)
    }
}
