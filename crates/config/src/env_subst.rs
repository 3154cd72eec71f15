/// Expand `${NAME}` and `${NAME:-fallback}` placeholders from the process
/// environment.
///
/// A placeholder whose variable is unset and has no fallback is kept
/// verbatim so validation can still point at it.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

/// Same as [`substitute_env`] with an explicit variable lookup.
pub(crate) fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated: copy the tail as is.
            out.push_str(&rest[start..]);
            return out;
        };

        let body = &after[..end];
        let (name, fallback) = match body.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (body, None),
        };

        match lookup(name).or_else(|| fallback.map(str::to_string)) {
            Some(value) if !name.is_empty() => out.push_str(&value),
            _ => {
                out.push_str("${");
                out.push_str(body);
                out.push('}');
            },
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

/// Whether `value` is entirely a `${...}` placeholder.
pub fn is_placeholder(value: &str) -> bool {
    value.starts_with("${") && value.ends_with('}') && value.len() > 3
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "SOLACE_DB" => Some("/var/lib/solace.db".to_string()),
            "EMPTY" => Some(String::new()),
            _ => None,
        }
    }

    #[test]
    fn expands_known_variable() {
        assert_eq!(
            substitute_env_with("database = \"${SOLACE_DB}\"", lookup),
            "database = \"/var/lib/solace.db\""
        );
    }

    #[test]
    fn keeps_unknown_variable() {
        assert_eq!(substitute_env_with("${SOLACE_UNSET_XYZ}", lookup), "${SOLACE_UNSET_XYZ}");
    }

    #[test]
    fn uses_fallback_when_unset() {
        assert_eq!(substitute_env_with("${SOLACE_UNSET:-solace.db}", lookup), "solace.db");
        assert_eq!(substitute_env_with("${SOLACE_DB:-other}", lookup), "/var/lib/solace.db");
    }

    #[test]
    fn set_but_empty_wins_over_fallback() {
        assert_eq!(substitute_env_with("[${EMPTY:-x}]", lookup), "[]");
    }

    #[test]
    fn unterminated_placeholder_is_literal() {
        assert_eq!(substitute_env_with("a ${SOLACE_DB", lookup), "a ${SOLACE_DB");
        assert_eq!(substitute_env_with("${}", lookup), "${}");
    }

    #[test]
    fn multiple_placeholders() {
        assert_eq!(
            substitute_env_with("${SOLACE_DB}|${NOPE}|${NOPE:-d}", lookup),
            "/var/lib/solace.db|${NOPE}|d"
        );
    }

    #[test]
    fn plain_text_untouched() {
        assert_eq!(substitute_env("no placeholders here"), "no placeholders here");
    }

    #[test]
    fn detects_placeholder_values() {
        assert!(is_placeholder("${SOLACE_BACKUP_PASSWORD}"));
        assert!(!is_placeholder("hunter22"));
        assert!(!is_placeholder("${}"));
    }
}
