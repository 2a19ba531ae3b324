use std::fmt;

/// One navigation step: a document field or an array index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PathStep {
    /// Navigate to a named field of a document.
    Field(String),
    /// Navigate to a zero-based array element.
    Index(usize),
}

/// A non-empty sequence of steps into a document, e.g. `a.b[2].c`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Path {
    steps: Vec<PathStep>,
}

/// Errors raised by write navigation; reads never fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathWriteError {
    /// An index step landed on a document or scalar.
    IndexIntoDocument,
    /// A field step landed on an array or scalar.
    FieldIntoNonDocument,
}

impl fmt::Display for PathWriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexIntoDocument => f.write_str("cannot index into a non-array value"),
            Self::FieldIntoNonDocument => f.write_str("cannot select a field of a non-document value"),
        }
    }
}

impl Path {
    /// Build a path from steps. Panics if `steps` is empty; paths come from
    /// the parser, which never produces an empty one.
    pub fn new(steps: Vec<PathStep>) -> Self {
        assert!(!steps.is_empty(), "a path must have at least one step");
        Self { steps }
    }

    /// A single-field path.
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            steps: vec![PathStep::Field(name.into())],
        }
    }

    /// The steps of this path.
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Extend with a field step.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>) -> Self {
        self.steps.push(PathStep::Field(name.into()));
        self
    }

    /// Extend with an index step.
    #[must_use]
    pub fn with_index(mut self, idx: usize) -> Self {
        self.steps.push(PathStep::Index(idx));
        self
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            match step {
                PathStep::Field(name) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(name)?;
                }
                PathStep::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}
