//! Shell-like `${...}` / `$NAME` template expansion used inside `env`
//! blocks (`spec.md` §4.3). Deliberately narrow: only plain variable
//! reference and the `${NAME:-default}` fallback form are understood,
//! so a packager cannot smuggle a subshell or a `${NAME#pattern}`-style
//! extended expansion into a settings file.

use std::collections::HashMap;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("unterminated `${{` in template: `{0}`")]
    Unterminated(String),
    #[error("unsupported expansion syntax in `${{{0}}}`: only `NAME` and `NAME:-default` are allowed")]
    UnsupportedExpansion(String),
    #[error("`{0}` is not a valid variable name")]
    InvalidName(String),
}

/// Expand `template` against `lookup`, which is consulted in order for
/// each `$NAME`/`${NAME}` reference; the first `Some` wins. Callers pass
/// closures so the precedence chain (prior keys in the same env block,
/// then the merged settings env, then the process environment) stays
/// declared at the call site rather than inside this module.
pub fn expand(template: &str, lookup: &impl Fn(&str) -> Option<String>) -> Result<String, Error> {
    let bytes: Vec<char> = template.chars().collect();
    let mut out = String::with_capacity(template.len());
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c != '$' {
            out.push(c);
            i += 1;
            continue;
        }

        match bytes.get(i + 1) {
            Some('$') => {
                out.push('$');
                i += 2;
            }
            Some('{') => {
                let start = i + 2;
                let mut depth = 1;
                let mut j = start;
                let mut end = None;
                while j < bytes.len() {
                    match bytes[j] {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                end = Some(j);
                                break;
                            }
                        }
                        _ => {}
                    }
                    j += 1;
                }
                let end = end.ok_or_else(|| Error::Unterminated(template.to_string()))?;
                let inner: String = bytes[start..end].iter().collect();
                out.push_str(&expand_braced(&inner, lookup)?);
                i = end + 1;
            }
            Some(&c2) if is_name_start(c2) => {
                let start = i + 1;
                let mut j = start;
                while j < bytes.len() && is_name_char(bytes[j]) {
                    j += 1;
                }
                let name: String = bytes[start..j].iter().collect();
                out.push_str(&lookup(&name).unwrap_or_default());
                i = j;
            }
            _ => {
                out.push('$');
                i += 1;
            }
        }
    }

    Ok(out)
}

fn expand_braced(inner: &str, lookup: &impl Fn(&str) -> Option<String>) -> Result<String, Error> {
    if let Some((name, default)) = inner.split_once(":-") {
        validate_name(name)?;
        return Ok(lookup(name).unwrap_or_else(|| default.to_string()));
    }

    if inner.contains(['(', ')', '`', '#', '%', '^', ',', '/', ':']) {
        return Err(Error::UnsupportedExpansion(inner.to_string()));
    }

    validate_name(inner)?;
    Ok(lookup(inner).unwrap_or_default())
}

fn validate_name(name: &str) -> Result<(), Error> {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if is_name_start(c) => {}
        _ => return Err(Error::InvalidName(name.to_string())),
    }
    if chars.all(is_name_char) {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// A small ordered-lookup helper: checks `layers` in order, falling back
/// to the process environment last.
#[must_use]
pub fn layered_lookup<'a>(layers: &'a [&'a HashMap<String, String>]) -> impl Fn(&str) -> Option<String> + 'a {
    move |name: &str| {
        for layer in layers {
            if let Some(v) = layer.get(name) {
                return Some(v.clone());
            }
        }
        std::env::var(name).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_lookup(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_plain_dollar_name() {
        let lookup = |n: &str| (n == "FOO").then(|| "bar".to_string());
        assert_eq!(expand("$FOO-x", &lookup).unwrap(), "bar-x");
    }

    #[test]
    fn test_braced_name() {
        let lookup = |n: &str| (n == "FOO").then(|| "bar".to_string());
        assert_eq!(expand("${FOO}baz", &lookup).unwrap(), "barbaz");
    }

    #[test]
    fn test_default_fallback() {
        assert_eq!(
            expand("${MISSING:-fallback}", &empty_lookup).unwrap(),
            "fallback"
        );
    }

    #[test]
    fn test_default_not_used_when_present() {
        let lookup = |n: &str| (n == "X").then(|| "present".to_string());
        assert_eq!(expand("${X:-fallback}", &lookup).unwrap(), "present");
    }

    #[test]
    fn test_literal_double_dollar() {
        assert_eq!(expand("$$", &empty_lookup).unwrap(), "$");
    }

    #[test]
    fn test_subshell_rejected() {
        let err = expand("${FOO$(whoami)}", &empty_lookup).unwrap_err();
        assert!(matches!(err, Error::UnsupportedExpansion(_)));
    }

    #[test]
    fn test_extended_expansion_rejected() {
        let err = expand("${FOO#prefix}", &empty_lookup).unwrap_err();
        assert!(matches!(err, Error::UnsupportedExpansion(_)));
    }

    #[test]
    fn test_unterminated_brace() {
        let err = expand("${FOO", &empty_lookup).unwrap_err();
        assert!(matches!(err, Error::Unterminated(_)));
    }
}
