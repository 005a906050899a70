/// A list of strings kept in a single CSV cell as a JSON array.
pub mod json_list {
    use serde::de::Error as _;
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(items: &[String], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let raw = serde_json::to_string(items).map_err(S::Error::custom)?;
        serializer.serialize_str(&raw)
    }

    // blank cells read as an empty list
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        if raw.trim().is_empty() {
            return Ok(vec![]);
        }
        serde_json::from_str(&raw).map_err(D::Error::custom)
    }
}
