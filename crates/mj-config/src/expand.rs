//! `${VAR}` and `${VAR:-default}` expansion for configuration strings.

use crate::ConfigError;

/// Variable that was referenced but is not set.
struct Unset(String);

/// Expand environment variable references in `value`.
///
/// Strings without `${` are returned unchanged, so a lone `$` in a password
/// or path survives. `field` names the configuration key in error messages.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env_with_context(value, |name| match std::env::var(name) {
        Ok(found) => Ok(Some(found)),
        Err(_) => Err(Unset(name.to_owned())),
    })
    .map(std::borrow::Cow::into_owned)
    .map_err(|e| ConfigError::EnvVar {
        field: field.to_owned(),
        message: format!("${{{}}} not set", e.cause.0),
    })
}

/// Expand every element of `values`, labelling each as `field[i]`.
pub(crate) fn expand_all(values: &[String], field: &str) -> Result<Vec<String>, ConfigError> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| expand_env(value, &format!("{field}[{i}]")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_set_var() {
        // SAFETY: variable name is unique to this test
        unsafe {
            std::env::set_var("MJ_EXPAND_SET", "mjml-server");
        }
        let result = expand_env("${MJ_EXPAND_SET}", "renderer.tcp.servers[0].host").unwrap();
        assert_eq!(result, "mjml-server");
        unsafe {
            std::env::remove_var("MJ_EXPAND_SET");
        }
    }

    #[test]
    fn test_expand_default_when_unset() {
        let result = expand_env("${MJ_EXPAND_NEVER_SET:-127.0.0.1}", "host").unwrap();
        assert_eq!(result, "127.0.0.1");
    }

    #[test]
    fn test_expand_unset_without_default_is_error() {
        let err = expand_env("${MJ_EXPAND_MISSING}", "renderer.http.servers[0].url").unwrap_err();

        assert!(matches!(err, ConfigError::EnvVar { .. }));
        let message = err.to_string();
        assert!(message.contains("MJ_EXPAND_MISSING"));
        assert!(message.contains("renderer.http.servers[0].url"));
    }

    #[test]
    fn test_expand_embedded_in_url() {
        // SAFETY: variable name is unique to this test
        unsafe {
            std::env::set_var("MJ_EXPAND_API_HOST", "mjml.internal");
        }
        let result = expand_env("https://${MJ_EXPAND_API_HOST}/v1/render", "url").unwrap();
        assert_eq!(result, "https://mjml.internal/v1/render");
        unsafe {
            std::env::remove_var("MJ_EXPAND_API_HOST");
        }
    }

    #[test]
    fn test_bare_dollar_untouched() {
        assert_eq!(expand_env("pa$$word", "auth").unwrap(), "pa$$word");
        assert_eq!(expand_env("$HOME/bin/mjml", "cmd").unwrap(), "$HOME/bin/mjml");
    }

    #[test]
    fn test_expand_all_labels_index() {
        let values = vec!["node".to_owned(), "${MJ_EXPAND_ARG_MISSING}".to_owned()];
        let err = expand_all(&values, "renderer.process.command").unwrap_err();

        assert!(err.to_string().contains("renderer.process.command[1]"));
    }
}
