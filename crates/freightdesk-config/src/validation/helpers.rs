//! Shared range-validation helpers used by all section validators.

/// Push an error if `value` is outside `[min, max]`.
pub(crate) fn validate_range(errors: &mut Vec<String>, name: &str, value: u32, min: u32, max: u32) {
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}

/// Push an error if a URL does not use one of the allowed schemes.
pub(crate) fn validate_scheme(errors: &mut Vec<String>, name: &str, url: &str, schemes: &[&str]) {
    if url.is_empty() {
        errors.push(format!("{name} must not be empty"));
        return;
    }
    if !schemes.iter().any(|s| url.starts_with(&format!("{s}://"))) {
        errors.push(format!(
            "{name} = {url:?} must use one of: {}",
            schemes.join(", ")
        ));
    }
}
