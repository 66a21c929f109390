//! Name qualification
//!
//! Tools are exposed as `<tool_prefix><name>`. Prompts, resources and resource
//! templates whose key collides across targets are exposed as `<target>::<key>`.
//! Target names may not contain the delimiter, which keeps both schemes invertible.

use crate::error::{GatewayError, Result};

/// Delimiter between a target name and a namespaced key
pub const NAMESPACE_DELIMITER: &str = "::";

/// Name a tool is exposed under
pub fn prefixed_tool_name(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}{}", prefix, name),
        None => name.to_string(),
    }
}

/// Recover the original tool name, if `exposed` carries `prefix`
pub fn strip_tool_prefix<'a>(prefix: Option<&str>, exposed: &'a str) -> Option<&'a str> {
    match prefix {
        Some(prefix) => exposed.strip_prefix(prefix).filter(|rest| !rest.is_empty()),
        None => Some(exposed),
    }
}

/// Namespace a key with its owning target
pub fn qualify(target: &str, key: &str) -> String {
    format!("{}{}{}", target, NAMESPACE_DELIMITER, key)
}

/// Split a namespaced key into `(target, key)`
pub fn split_qualified(qualified: &str) -> Option<(&str, &str)> {
    let (target, key) = qualified.split_once(NAMESPACE_DELIMITER)?;
    if target.is_empty() || key.is_empty() {
        return None;
    }
    Some((target, key))
}

/// Two non-empty prefixes overlap when one starts with the other
pub fn prefixes_overlap(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && (a.starts_with(b) || b.starts_with(a))
}

/// Target names must be non-empty and free of the namespace delimiter
pub fn validate_target_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(GatewayError::bad_request("Target name must not be empty"));
    }
    if name.contains(NAMESPACE_DELIMITER) {
        return Err(GatewayError::bad_request(format!(
            "Target name '{}' must not contain '{}'",
            name, NAMESPACE_DELIMITER
        ))
        .with_context("name", name));
    }
    Ok(())
}

/// Case-insensitive target name comparison
pub fn same_target_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_round_trip() {
        let exposed = prefixed_tool_name(Some("b_"), "echo");
        assert_eq!(exposed, "b_echo");
        assert_eq!(strip_tool_prefix(Some("b_"), &exposed), Some("echo"));
        assert_eq!(strip_tool_prefix(Some("b_"), "echo"), None);
        assert_eq!(strip_tool_prefix(Some("b_"), "b_"), None);
        assert_eq!(strip_tool_prefix(None, "echo"), Some("echo"));
    }

    #[test]
    fn test_qualify_round_trip() {
        let qualified = qualify("docs", "file:///readme.md");
        assert_eq!(qualified, "docs::file:///readme.md");
        assert_eq!(split_qualified(&qualified), Some(("docs", "file:///readme.md")));
        assert_eq!(split_qualified("plain"), None);
        assert_eq!(split_qualified("::x"), None);
    }

    #[test]
    fn test_prefix_overlap() {
        assert!(prefixes_overlap("git_", "git_hub_"));
        assert!(prefixes_overlap("a_", "a_"));
        assert!(!prefixes_overlap("a_", "b_"));
        assert!(!prefixes_overlap("", "b_"));
    }

    #[test]
    fn test_target_name_validation() {
        assert!(validate_target_name("files").is_ok());
        assert!(validate_target_name("  ").is_err());
        let err = validate_target_name("a::b").unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::BadRequest);
    }

    #[test]
    fn test_same_target_name() {
        assert!(same_target_name("Files", "fILES"));
        assert!(!same_target_name("files", "file"));
    }
}
