use std::sync::Arc;

use vellum_types::{Document, Value};

/// Parameter bindings for one statement execution: positional values bound
/// by 1-based ordinal (`?`) and named values bound by `$name`.
#[derive(Debug, Clone, Default)]
pub struct Params {
    positional: Vec<Value>,
    named: Vec<(String, Value)>,
}

impl Params {
    /// No bindings.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from positional and named bindings.
    pub fn new(positional: Vec<Value>, named: Vec<(String, Value)>) -> Self {
        Self { positional, named }
    }

    /// Value for the 1-based ordinal `n`.
    pub fn positional(&self, n: u32) -> Option<&Value> {
        self.positional.get(n.checked_sub(1)? as usize)
    }

    /// Value bound to `name`.
    pub fn named(&self, name: &str) -> Option<&Value> {
        self.named.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// Per-row evaluation context: the current document, its storage key, the
/// statement parameters, and an optional outer environment for scoping.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    doc: Option<Document>,
    key: Option<Vec<u8>>,
    params: Arc<Params>,
    outer: Option<Box<Environment>>,
}

impl Environment {
    /// An environment with parameters but no current document.
    pub fn with_params(params: Arc<Params>) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    /// Derive an environment for a new current document, keeping parameters
    /// and scope.
    #[must_use]
    pub fn with_document(&self, doc: Document) -> Self {
        Self {
            doc: Some(doc),
            key: self.key.clone(),
            params: Arc::clone(&self.params),
            outer: self.outer.clone(),
        }
    }

    /// Derive an environment for a stored row: document plus its key bytes.
    #[must_use]
    pub fn with_row(&self, key: Vec<u8>, doc: Document) -> Self {
        Self {
            doc: Some(doc),
            key: Some(key),
            params: Arc::clone(&self.params),
            outer: self.outer.clone(),
        }
    }

    /// Derive a child environment scoped inside this one.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            doc: None,
            key: None,
            params: Arc::clone(&self.params),
            outer: Some(Box::new(self.clone())),
        }
    }

    /// The current document, if any.
    pub fn document(&self) -> Option<&Document> {
        match &self.doc {
            Some(doc) => Some(doc),
            None => self.outer.as_ref().and_then(|outer| outer.document()),
        }
    }

    /// Replace the current document in place.
    pub fn set_document(&mut self, doc: Document) {
        self.doc = Some(doc);
    }

    /// The storage key of the current row, if it came from a table.
    pub fn key(&self) -> Option<&[u8]> {
        match &self.key {
            Some(key) => Some(key),
            None => self.outer.as_ref().and_then(|outer| outer.key()),
        }
    }

    /// Set the storage key of the current row.
    pub fn set_key(&mut self, key: Vec<u8>) {
        self.key = Some(key);
    }

    /// Resolve a positional parameter through the scope chain.
    pub fn positional(&self, n: u32) -> Option<&Value> {
        self.params
            .positional(n)
            .or_else(|| self.outer.as_ref().and_then(|outer| outer.positional(n)))
    }

    /// Resolve a named parameter through the scope chain.
    pub fn named(&self, name: &str) -> Option<&Value> {
        self.params
            .named(name)
            .or_else(|| self.outer.as_ref().and_then(|outer| outer.named(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_resolve_by_ordinal_and_name() {
        let params = Params::new(
            vec![Value::Int(10), Value::Int(20)],
            vec![("val".to_owned(), Value::Int(30))],
        );
        assert_eq!(params.positional(1), Some(&Value::Int(10)));
        assert_eq!(params.positional(2), Some(&Value::Int(20)));
        assert_eq!(params.positional(3), None);
        assert_eq!(params.positional(0), None);
        assert_eq!(params.named("val"), Some(&Value::Int(30)));
        assert_eq!(params.named("nope"), None);
    }

    #[test]
    fn child_environment_sees_outer_bindings() {
        let params = Arc::new(Params::new(vec![Value::Int(1)], vec![]));
        let outer = Environment::with_params(params).with_document(Document::from_fields([
            ("a", 1i64),
        ]));
        let child = outer.child();
        assert!(child.document().is_some());
        assert_eq!(child.positional(1), Some(&Value::Int(1)));
    }
}
