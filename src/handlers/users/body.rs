// handlers/users/body.rs - Request body shared by create and update

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::ApiError;

/// Fields accepted on create and update. Missing or `null` fields decode as
/// empty and are rejected by `validate`; unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserBody {
    #[serde(deserialize_with = "null_as_empty")]
    pub first_name: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub last_name: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub biography: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl UserBody {
    /// Decodes the first JSON value in `bytes` regardless of content type;
    /// anything after it is ignored. A JSON `null` is treated as an object
    /// with every field missing.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let first = serde_json::Deserializer::from_slice(bytes)
            .into_iter::<Value>()
            .next()
            .unwrap_or_else(|| Err(serde_json::Error::custom("empty body")))?;

        match first {
            Value::Null => Ok(Self::default()),
            value @ Value::Object(_) => serde_json::from_value(value),
            _ => Err(serde_json::Error::custom("expected a JSON object")),
        }
    }

    /// First empty field wins, checked in declaration order
    pub fn validate(&self) -> Result<(), ApiError> {
        let fields = [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("biography", &self.biography),
        ];

        for (name, value) in fields {
            if value.is_empty() {
                return Err(ApiError::bad_request(format!(
                    "Please provide {} for the user",
                    name
                )));
            }
        }

        Ok(())
    }
}
