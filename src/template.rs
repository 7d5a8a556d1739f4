use serde_json::Value;

use crate::config::ProjectConfig;
use crate::meta::BuildMeta;

/// Substitutes `{name}` placeholders in `input`.
///
/// Each name is looked up on the configuration first, then on the build meta.
/// Strings are inserted as-is and numbers/booleans as their JSON text.
/// Unknown names and non-scalar values leave the placeholder untouched,
/// braces included. Substituted text is never rescanned.
pub fn resolve_template(input: &str, config: &ProjectConfig, meta: Option<&BuildMeta>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let name_len = after
            .find(|c: char| !is_name_char(c))
            .unwrap_or(after.len());
        let closes = after[name_len..].starts_with('}');
        if name_len == 0 || !closes {
            out.push('{');
            rest = after;
            continue;
        }

        let name = &after[..name_len];
        let replacement = config
            .attribute(name)
            .and_then(|value| scalar_text(&value))
            .or_else(|| meta.and_then(|meta| meta.get(name)).and_then(scalar_text));
        match replacement {
            Some(text) => out.push_str(&text),
            None => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
        }
        rest = &after[name_len + 1..];
    }
    out.push_str(rest);
    out
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::resolve_template;
    use crate::config::ProjectConfig;
    use crate::meta::BuildMeta;
    use serde_json::json;

    fn config_with(key: &str, value: serde_json::Value) -> ProjectConfig {
        let mut config = ProjectConfig::default();
        let mut overrides = serde_json::Map::new();
        overrides.insert(key.to_string(), value);
        config.apply_overrides(&overrides);
        config
    }

    #[test]
    fn substitutes_config_values() {
        let config = config_with("foo", json!("bar"));
        assert_eq!(resolve_template("{foo}/baz", &config, None), "bar/baz");
    }

    #[test]
    fn leaves_unknown_placeholders() {
        let config = ProjectConfig::default();
        assert_eq!(
            resolve_template("{missing}/baz", &config, None),
            "{missing}/baz"
        );
        assert_eq!(resolve_template("{}/{a b}/{", &config, None), "{}/{a b}/{");
    }

    #[test]
    fn config_wins_over_meta_and_meta_fills_gaps() {
        let config = config_with("tmp", json!("/work"));
        let mut meta = BuildMeta::new();
        meta.set("tmp", json!("/meta"));
        meta.set("build-id", json!(42));
        assert_eq!(
            resolve_template("{tmp}/{build-id}.log", &config, Some(&meta)),
            "/work/42.log"
        );
    }

    #[test]
    fn substitution_is_single_pass() {
        let config = config_with("outer", json!("{inner}"));
        let mut meta = BuildMeta::new();
        meta.set("inner", json!("deep"));
        assert_eq!(
            resolve_template("{outer}/x", &config, Some(&meta)),
            "{inner}/x"
        );
    }

    #[test]
    fn non_scalar_values_are_not_substituted() {
        let config = config_with("list", json!(["a", "b"]));
        assert_eq!(resolve_template("{list}", &config, None), "{list}");
    }
}
