//! The exportable application state.

use {
    rand::Rng,
    serde::{Deserialize, Deserializer, Serialize},
    serde_json::{Map, Value},
};

/// Full application state carried inside a backup file.
///
/// Unknown top-level fields are kept in [`extra`](Self::extra) so a snapshot
/// written by a newer install survives an export/import round trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion_history: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_sessions: Option<Vec<Value>>,
    #[serde(
        default,
        deserialize_with = "lenient_streak",
        skip_serializing_if = "Option::is_none"
    )]
    pub streak: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// ISO-8601 timestamp of the export, kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Snapshot {
    /// Give every chat session without an `id` a fresh one.
    ///
    /// The id is the session's `timestamp` (or the current time in ms)
    /// followed by nine random base-36 characters. Returns how many sessions
    /// were changed.
    pub fn backfill_session_ids(&mut self) -> usize {
        let Some(sessions) = self.chat_sessions.as_mut() else {
            return 0;
        };

        let mut changed = 0;
        for session in sessions.iter_mut() {
            let Value::Object(fields) = session else {
                continue;
            };
            if fields.get("id").is_some_and(is_truthy) {
                continue;
            }
            let stem = match fields.get("timestamp") {
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                _ => chrono::Utc::now().timestamp_millis().to_string(),
            };
            fields.insert("id".into(), Value::String(format!("{stem}{}", random_base36(9))));
            changed += 1;
        }
        changed
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn random_base36(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .filter_map(|_| char::from_digit(rng.random_range(0..36), 36))
        .collect()
}

/// Older installs stored the streak as a string.
fn lenient_streak<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| {
                D::Error::custom(format!("streak must be a non-negative integer, got {n}"))
            }),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("streak is not a number: {s:?}"))),
        Some(other) => Err(D::Error::custom(format!(
            "streak must be a number, got {other}"
        ))),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn camel_case_fields() {
        let snapshot: Snapshot = serde_json::from_value(json!({
            "emotionHistory": [{"id": "1", "text": "hello"}],
            "chatSessions": [],
            "streak": 3,
            "language": "ko",
            "exportDate": "2024-05-01T10:00:00.000Z",
            "encrypted": true,
        }))
        .unwrap();

        assert_eq!(snapshot.emotion_history.as_ref().unwrap().len(), 1);
        assert_eq!(snapshot.streak, Some(3));
        assert_eq!(snapshot.language.as_deref(), Some("ko"));
        assert_eq!(snapshot.encrypted, Some(true));
        assert!(snapshot.extra.is_empty());
    }

    #[test]
    fn absent_fields_stay_absent() {
        let input = json!({"emotionHistory": [{"id": "1", "text": "hello"}], "streak": 3});
        let snapshot: Snapshot = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(serde_json::to_value(&snapshot).unwrap(), input);
    }

    #[test]
    fn unknown_fields_are_preserved() {
        let input = json!({"streak": 1, "theme": "dark", "nested": {"a": [1, 2]}});
        let snapshot: Snapshot = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(snapshot.extra.get("theme"), Some(&json!("dark")));
        assert_eq!(serde_json::to_value(&snapshot).unwrap(), input);
    }

    #[test]
    fn string_streak_is_accepted() {
        let snapshot: Snapshot = serde_json::from_value(json!({"streak": "12"})).unwrap();
        assert_eq!(snapshot.streak, Some(12));

        let snapshot: Snapshot = serde_json::from_value(json!({"streak": null})).unwrap();
        assert_eq!(snapshot.streak, None);
    }

    #[test]
    fn garbage_streak_is_rejected() {
        assert!(serde_json::from_value::<Snapshot>(json!({"streak": "many"})).is_err());
        assert!(serde_json::from_value::<Snapshot>(json!({"streak": -1})).is_err());
        assert!(serde_json::from_value::<Snapshot>(json!({"streak": [3]})).is_err());
    }

    #[test]
    fn backfill_only_touches_sessions_without_id() {
        let mut snapshot = Snapshot {
            chat_sessions: Some(vec![
                json!({"id": "keep", "timestamp": 1}),
                json!({"timestamp": 1700000000000u64, "messages": []}),
                json!({"id": "", "messages": []}),
                json!("not an object"),
            ]),
            ..Default::default()
        };

        assert_eq!(snapshot.backfill_session_ids(), 2);
        let sessions = snapshot.chat_sessions.unwrap();

        assert_eq!(sessions[0]["id"], "keep");

        let id = sessions[1]["id"].as_str().unwrap();
        assert!(id.starts_with("1700000000000"));
        assert_eq!(id.len(), "1700000000000".len() + 9);
        assert!(id.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));

        assert!(!sessions[2]["id"].as_str().unwrap().is_empty());
        assert_eq!(sessions[3], json!("not an object"));
    }

    #[test]
    fn backfill_without_sessions_is_noop() {
        let mut snapshot = Snapshot::default();
        assert_eq!(snapshot.backfill_session_ids(), 0);
        assert!(snapshot.chat_sessions.is_none());
    }
}
