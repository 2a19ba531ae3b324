use std::fmt;

use crate::{Path, PathStep, PathWriteError, Value};

/// An insertion-ordered mapping from field name to [`Value`].
///
/// Field order is preserved so that encoding a document is reproducible, but
/// lookup is by name. Duplicate names are allowed (projections can produce
/// them): iteration yields every binding in order, while `get` reads the
/// last binding for a name (last write wins).
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    /// Create an empty document.
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Build a document from (name, value) pairs, preserving order.
    pub fn from_fields<I, N, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<Value>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        }
    }

    /// Number of field bindings (duplicates counted).
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Last value bound to `name`, if any (last write wins on duplicates).
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Mutable access to the last value bound to `name`.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields
            .iter_mut()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Bind `name` to `value`: replaces the last existing binding, or
    /// appends a new field at the end.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().rev().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Append a binding without looking for an existing one.
    ///
    /// Used by projections, where duplicate field names are legal.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Remove the last binding for `name`. Returns the removed value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let idx = self.fields.iter().rposition(|(n, _)| n == name)?;
        Some(self.fields.remove(idx).1)
    }

    /// Iterate over all bindings in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Resolve `path` against this document.
    ///
    /// Any missing field, out-of-range index, or class mismatch along the
    /// way resolves to `None`; read navigation never errors.
    pub fn get_path(&self, path: &Path) -> Option<&Value> {
        let mut current: Option<&Value> = None;
        for (i, step) in path.steps().iter().enumerate() {
            let target = if i == 0 {
                match step {
                    PathStep::Field(name) => self.get(name),
                    PathStep::Index(_) => None,
                }
            } else {
                match (current?, step) {
                    (Value::Document(d), PathStep::Field(name)) => d.get(name),
                    (Value::Array(a), PathStep::Index(idx)) => a.get(*idx),
                    _ => None,
                }
            };
            current = target;
            current?;
        }
        current
    }

    /// Write `value` at `path`, creating intermediate documents and arrays
    /// as needed. Writing past the end of an array pads with Null.
    ///
    /// # Errors
    ///
    /// Returns [`PathWriteError`] when a step's shape contradicts the
    /// existing value (an index step into a document, a field step into an
    /// array or scalar).
    pub fn set_path(&mut self, path: &Path, value: Value) -> Result<(), PathWriteError> {
        let steps = path.steps();
        let first = match &steps[0] {
            PathStep::Field(name) => name,
            PathStep::Index(_) => return Err(PathWriteError::IndexIntoDocument),
        };
        if steps.len() == 1 {
            self.set(first.clone(), value);
            return Ok(());
        }
        if self.get(first).is_none() {
            self.set(first.clone(), empty_container(&steps[1]));
        }
        let slot = self.get_mut(first).expect("binding just ensured");
        set_in_value(slot, &steps[1..], value)
    }

    /// Remove the field at `path`. Missing paths are a no-op.
    pub fn unset_path(&mut self, path: &Path) {
        let steps = path.steps();
        let first = match &steps[0] {
            PathStep::Field(name) => name,
            PathStep::Index(_) => return,
        };
        if steps.len() == 1 {
            self.remove(first);
            return;
        }
        if let Some(slot) = self.get_mut(first) {
            unset_in_value(slot, &steps[1..]);
        }
    }
}

/// The empty container appropriate for the next step.
fn empty_container(next: &PathStep) -> Value {
    match next {
        PathStep::Field(_) => Value::Document(Document::new()),
        PathStep::Index(_) => Value::Array(Vec::new()),
    }
}

fn set_in_value(
    target: &mut Value,
    steps: &[PathStep],
    value: Value,
) -> Result<(), PathWriteError> {
    let step = &steps[0];
    match (target, step) {
        (Value::Document(d), PathStep::Field(name)) => {
            if steps.len() == 1 {
                d.set(name.clone(), value);
                return Ok(());
            }
            if d.get(name).is_none() {
                d.set(name.clone(), empty_container(&steps[1]));
            }
            let slot = d.get_mut(name).expect("binding just ensured");
            set_in_value(slot, &steps[1..], value)
        }
        (Value::Array(a), PathStep::Index(idx)) => {
            // Pad with Null up to the requested index.
            while a.len() <= *idx {
                a.push(Value::Null);
            }
            if steps.len() == 1 {
                a[*idx] = value;
                return Ok(());
            }
            if a[*idx].is_null() {
                a[*idx] = empty_container(&steps[1]);
            }
            set_in_value(&mut a[*idx], &steps[1..], value)
        }
        (_, PathStep::Field(_)) => Err(PathWriteError::FieldIntoNonDocument),
        (_, PathStep::Index(_)) => Err(PathWriteError::IndexIntoDocument),
    }
}

fn unset_in_value(target: &mut Value, steps: &[PathStep]) {
    let step = &steps[0];
    match (target, step) {
        (Value::Document(d), PathStep::Field(name)) => {
            if steps.len() == 1 {
                d.remove(name);
            } else if let Some(slot) = d.get_mut(name) {
                unset_in_value(slot, &steps[1..]);
            }
        }
        (Value::Array(a), PathStep::Index(idx)) => {
            if steps.len() == 1 {
                if *idx < a.len() {
                    a.remove(*idx);
                }
            } else if let Some(slot) = a.get_mut(*idx) {
                unset_in_value(slot, &steps[1..]);
            }
        }
        _ => {}
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        f.write_str("}")
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = &'a (String, Value);
    type IntoIter = std::slice::Iter<'a, (String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
