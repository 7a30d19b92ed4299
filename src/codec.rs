//! Tagged string encoding for persisted session properties.
//!
//! A value is stored as `<Type>:<payload>`. `String` payloads are stored
//! raw, `History` payloads as a JSON array of command lines.

use crate::error::CodecError;

const STRING_TAG: &str = "String";
const HISTORY_TAG: &str = "History";

/// A decoded property value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    String(String),
    History(Vec<String>),
}

impl PropertyValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::String(_) => STRING_TAG,
            PropertyValue::History(_) => HISTORY_TAG,
        }
    }
}

pub fn encode(value: &PropertyValue) -> String {
    match value {
        PropertyValue::String(s) => format!("{}:{}", STRING_TAG, s),
        PropertyValue::History(entries) => {
            let payload = serde_json::Value::from(entries.clone());
            format!("{}:{}", HISTORY_TAG, payload)
        }
    }
}

pub fn decode(tagged: &str) -> Result<PropertyValue, CodecError> {
    let (tag, payload) = tagged
        .split_once(':')
        .ok_or_else(|| CodecError::MissingTag(tagged.to_string()))?;

    match tag {
        STRING_TAG => Ok(PropertyValue::String(payload.to_string())),
        HISTORY_TAG => {
            let entries: Vec<String> = serde_json::from_str(payload)
                .map_err(|e| CodecError::InvalidHistory(e.to_string()))?;
            Ok(PropertyValue::History(entries))
        }
        other => Err(CodecError::UnknownTag(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_values() {
        let values = [
            PropertyValue::String("/home/user/projects: the good ones".into()),
            PropertyValue::String(String::new()),
            PropertyValue::History(vec![]),
            PropertyValue::History(vec!["git status".into(), "echo \"a:b\"".into()]),
        ];
        for value in values {
            assert_eq!(decode(&encode(&value)).unwrap(), value);
        }
    }

    #[test]
    fn test_round_trip_tagged_strings() {
        for tagged in ["String:/tmp", "History:[]", "History:[\"ls\",\"cd ..\"]"] {
            assert_eq!(encode(&decode(tagged).unwrap()), tagged);
        }
    }

    #[test]
    fn test_history_payload_is_compact_json() {
        let value = PropertyValue::History(vec!["ls -la".into(), "echo \"hi\"".into()]);
        assert_eq!(encode(&value), r#"History:["ls -la","echo \"hi\""]"#);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            decode("Number:3"),
            Err(CodecError::UnknownTag("Number".into()))
        );
        assert!(matches!(decode("no separator"), Err(CodecError::MissingTag(_))));
        assert!(matches!(
            decode("History:{not json"),
            Err(CodecError::InvalidHistory(_))
        ));
    }
}
