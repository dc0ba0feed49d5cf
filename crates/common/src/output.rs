use schemars::JsonSchema;
use serde::de::DeserializeOwned;

/// A record the reasoning service is asked to produce.
///
/// The JSON schema is derived from the type and appended to the prompt;
/// after deserialization `check` enforces constraints serde cannot express.
pub trait ModelOutput: DeserializeOwned + JsonSchema {
    /// Semantic validation beyond the structural shape.
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Render the JSON schema for `T` as compact JSON text.
pub fn schema_text<T: JsonSchema>() -> String {
    let schema = schemars::schema_for!(T);
    serde_json::to_string(&schema).unwrap_or_else(|_| "{}".to_string())
}
