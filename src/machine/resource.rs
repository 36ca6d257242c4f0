//! `Resource` template resolution.
//!
//! Task resources are written as templates such as
//! `arn:aws:lambda:{{aws_region}}:{{aws_account}}:function:{{lambda_name}}`
//! and resolved by the caller before the definition is uploaded.

use crate::error::{Result, WardenError};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Matches `{{name}}`, tolerating inner whitespace.
static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("Invalid placeholder regex")
});

/// Variables for the standard lambda resource template.
pub fn resource_vars(region: &str, account: &str, lambda_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("aws_region".to_string(), region.to_string()),
        ("aws_account".to_string(), account.to_string()),
        ("lambda_name".to_string(), lambda_name.to_string()),
    ])
}

/// Substitute every `{{name}}` in `template`.
///
/// Unknown names are a `ParseError` listing all of them.
pub fn resolve_resource(template: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let mut missing = Vec::new();

    let resolved = PLACEHOLDER_REGEX.replace_all(template, |caps: &Captures| {
        let name = &caps[1];
        match vars.get(name) {
            Some(value) => value.clone(),
            None => {
                missing.push(name.to_string());
                caps[0].to_string()
            }
        }
    });

    if !missing.is_empty() {
        return Err(WardenError::ParseError(format!(
            "unresolved placeholder(s) {} in resource '{}'",
            missing
                .iter()
                .map(|m| format!("{{{{{}}}}}", m))
                .collect::<Vec<_>>()
                .join(", "),
            template
        )));
    }

    Ok(resolved.into_owned())
}

/// Names of the placeholders in `template`, in order of appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    PLACEHOLDER_REGEX
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}
