use vellum_types::Value;

/// A statement argument: positional (bound to `?` by order of appearance) or
/// named (bound to `$name`).
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Positional(Value),
    Named(String, Value),
}

impl Param {
    /// A named argument for a `$name` placeholder.
    pub fn named(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Named(name.into(), value.into())
    }
}

impl<T: Into<Value>> From<T> for Param {
    fn from(value: T) -> Self {
        Self::Positional(value.into())
    }
}

/// Split arguments into the evaluator's binding table.
pub(crate) fn bind(params: &[Param]) -> vellum_expr::Params {
    let mut positional = Vec::new();
    let mut named = Vec::new();
    for param in params {
        match param {
            Param::Positional(value) => positional.push(value.clone()),
            Param::Named(name, value) => named.push((name.clone(), value.clone())),
        }
    }
    vellum_expr::Params::new(positional, named)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_order_is_preserved() {
        let params = bind(&[
            Param::from(1i64),
            Param::named("val", "x"),
            Param::from(2i64),
        ]);
        assert_eq!(params.positional(1), Some(&Value::Int(1)));
        assert_eq!(params.positional(2), Some(&Value::Int(2)));
        assert_eq!(params.named("val"), Some(&Value::Text("x".to_owned())));
    }
}
