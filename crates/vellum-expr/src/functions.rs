//! Built-in scalar functions.

use vellum_codec::decode_key;
use vellum_error::{Result, VellumError};
use vellum_types::Value;

use crate::env::Environment;

/// Dispatch a scalar function call by name (case-insensitive).
pub fn call(name: &str, args: &[Value], env: &Environment) -> Result<Value> {
    match name.to_ascii_lowercase().as_str() {
        "pk" => pk(args, env),
        _ => Err(VellumError::NoSuchFunction {
            name: name.to_owned(),
        }),
    }
}

/// `pk()` — the primary key of the current row, decoded from its storage
/// key. Null when the row did not come from a table.
fn pk(args: &[Value], env: &Environment) -> Result<Value> {
    if !args.is_empty() {
        return Err(VellumError::type_error("pk() takes no arguments"));
    }
    match env.key() {
        Some(key) => decode_key(key),
        None => Ok(Value::Null),
    }
}
