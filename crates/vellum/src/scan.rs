use vellum_error::{Result, VellumError};
use vellum_types::{Document, Value};

/// Conversion from a projected [`Value`] into a Rust destination type.
///
/// The document model is dynamic; scanning is where static types come back.
/// Conversions are strict: an `i64` destination accepts only an Int column.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch(expected: &str, actual: &Value) -> VellumError {
    VellumError::type_error(format!(
        "cannot scan a {} value into {expected}",
        actual.type_name()
    ))
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_int().ok_or_else(|| mismatch("i64", value))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            other => Err(mismatch("f64", other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            other => Err(mismatch("bool", other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_text()
            .map(ToOwned::to_owned)
            .ok_or_else(|| mismatch("String", value))
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_blob()
            .map(ToOwned::to_owned)
            .ok_or_else(|| mismatch("Vec<u8>", value))
    }
}

impl FromValue for Document {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_document()
            .cloned()
            .ok_or_else(|| mismatch("Document", value))
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self> {
        let items = value.as_array().ok_or_else(|| mismatch("Vec<_>", value))?;
        items.iter().map(T::from_value).collect()
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_error::ErrorKind;

    #[test]
    fn scalar_conversions() {
        assert_eq!(i64::from_value(&Value::Int(5)).unwrap(), 5);
        assert_eq!(f64::from_value(&Value::Float(2.5)).unwrap(), 2.5);
        assert_eq!(f64::from_value(&Value::Int(2)).unwrap(), 2.0);
        assert!(bool::from_value(&Value::Bool(true)).unwrap());
        assert_eq!(
            String::from_value(&Value::Text("x".to_owned())).unwrap(),
            "x"
        );
    }

    #[test]
    fn nested_conversions() {
        let value = Value::from(vec![1i64, 2, 3]);
        assert_eq!(Vec::<i64>::from_value(&value).unwrap(), vec![1, 2, 3]);

        let doc = Document::from_fields([("foo", "bar")]);
        assert_eq!(
            Document::from_value(&Value::Document(doc.clone())).unwrap(),
            doc
        );
    }

    #[test]
    fn null_scans_into_option() {
        assert_eq!(Option::<i64>::from_value(&Value::Null).unwrap(), None);
        assert_eq!(
            Option::<i64>::from_value(&Value::Int(1)).unwrap(),
            Some(1)
        );
    }

    #[test]
    fn mismatches_are_type_errors() {
        assert_eq!(
            i64::from_value(&Value::Text("5".to_owned()))
                .unwrap_err()
                .kind(),
            ErrorKind::Type
        );
        assert_eq!(
            Vec::<i64>::from_value(&Value::Int(1)).unwrap_err().kind(),
            ErrorKind::Type
        );
    }
}
