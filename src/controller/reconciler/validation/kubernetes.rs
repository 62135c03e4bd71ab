//! # Kubernetes Validation
//!
//! Validates names and label values per RFC 1123.

use anyhow::Result;
use regex::Regex;

/// Validate an RFC 1123 label: lowercase alphanumeric and hyphens, 1-63
/// characters, no leading or trailing hyphen
///
/// Pipeline names, label values built from record names and the name parts
/// of a target all follow this form.
pub fn validate_dns_label(value: &str, field_name: &str) -> Result<()> {
    if value.is_empty() {
        return Err(anyhow::anyhow!("{field_name} cannot be empty"));
    }

    if value.len() > 63 {
        return Err(anyhow::anyhow!(
            "{} '{}' exceeds maximum length of 63 characters (got {})",
            field_name,
            value,
            value.len()
        ));
    }

    let label_regex = Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$")
        .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;

    if !label_regex.is_match(value) {
        return Err(anyhow::anyhow!(
            "{field_name} '{value}' must be lowercase alphanumeric or hyphens and cannot start or end with a hyphen"
        ));
    }

    Ok(())
}

/// Validate an RFC 1123 subdomain, e.g. a service account name
pub fn validate_kubernetes_name(name: &str, field_name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow::anyhow!("{field_name} cannot be empty"));
    }

    if name.len() > 253 {
        return Err(anyhow::anyhow!(
            "{} '{}' exceeds maximum length of 253 characters (got {})",
            field_name,
            name,
            name.len()
        ));
    }

    let name_regex =
        Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
            .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;

    if !name_regex.is_match(name) {
        return Err(anyhow::anyhow!(
            "{field_name} '{name}' must be a valid Kubernetes name (lowercase alphanumeric, hyphens, dots; cannot start/end with hyphen or dot)"
        ));
    }

    Ok(())
}

/// Validate a pipeline parameter name
pub fn validate_parameter_name(name: &str) -> Result<()> {
    let param_regex = Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_.-]*$")
        .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;

    if !param_regex.is_match(name) {
        return Err(anyhow::anyhow!(
            "parameter name '{name}' must start with a letter or underscore and contain only alphanumerics, '_', '.' or '-'"
        ));
    }

    Ok(())
}
