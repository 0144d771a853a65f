//! Decoding of the untyped argument bag into typed parameter structs.

use crate::error::ToolError;
use rmcp::model::JsonObject;
use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::Value;

/// Arguments of a single tool invocation.
#[derive(Debug, Clone, Default)]
pub struct Arguments(JsonObject);

impl Arguments {
    /// Wrap a raw JSON object.
    pub fn new(object: JsonObject) -> Self {
        Self(object)
    }

    /// Decode the bag into a typed parameter struct.
    ///
    /// Any missing required field or type mismatch is reported as a single
    /// [`ToolError::InvalidArguments`].
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ToolError> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))
    }

    /// Borrow the raw object.
    pub fn as_object(&self) -> &JsonObject {
        &self.0
    }
}

impl From<JsonObject> for Arguments {
    fn from(object: JsonObject) -> Self {
        Self(object)
    }
}

impl From<Option<JsonObject>> for Arguments {
    fn from(object: Option<JsonObject>) -> Self {
        Self(object.unwrap_or_default())
    }
}

/// Deserialize an optional positive count, discarding values that are not
/// positive integers.
///
/// Use with `#[serde(default, deserialize_with = "positive_integer")]` and
/// apply the default with `unwrap_or`. Integral floats such as `50.0` are
/// accepted since JSON clients frequently send every number as a float.
pub fn positive_integer<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(as_positive_integer))
}

fn as_positive_integer(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return (n > 0).then_some(n);
    }
    let f = value.as_f64()?;
    if f >= 1.0 && f.fract() == 0.0 && f <= u64::MAX as f64 {
        Some(f as u64)
    } else {
        None
    }
}

/// Default for optional namespace arguments.
pub fn default_namespace() -> String {
    "default".to_owned()
}
