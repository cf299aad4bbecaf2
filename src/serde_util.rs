use serde::{Deserialize, Deserializer};

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`). Use with `#[serde(default, deserialize_with = ...)]`.
pub fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "super::double_option")]
        flag: Option<Option<bool>>,
    }

    #[test]
    fn absent_null_and_value_differ() {
        let absent: Patch = serde_json::from_str("{}").expect("absent");
        assert_eq!(absent.flag, None);
        let null: Patch = serde_json::from_str(r#"{"flag":null}"#).expect("null");
        assert_eq!(null.flag, Some(None));
        let set: Patch = serde_json::from_str(r#"{"flag":true}"#).expect("set");
        assert_eq!(set.flag, Some(Some(true)));
    }
}
