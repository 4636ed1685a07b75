//! Input validation for document fields.

use crate::error::{CoreError, Result};

/// Size limits applied to user-supplied fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    /// Maximum title length in characters.
    pub max_title_len: usize,
    /// Maximum number of tags per document.
    pub max_tags: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_title_len: 256,
            max_tags: 32,
        }
    }
}

/// Validate a title: required, not blank, within the length limit.
pub fn validate_title(title: &str, limits: &ValidationLimits) -> Result<()> {
    if title.trim().is_empty() {
        return Err(CoreError::Validation("Title is required".into()));
    }
    if title.chars().count() > limits.max_title_len {
        return Err(CoreError::Validation(format!(
            "Title exceeds {} characters",
            limits.max_title_len
        )));
    }
    Ok(())
}

/// Validate content: it must be present. An empty body is allowed.
pub fn validate_content(content: Option<&str>) -> Result<&str> {
    content.ok_or_else(|| CoreError::Validation("Content is required".into()))
}

/// Validate tags: bounded count, no blank tags.
pub fn validate_tags(tags: &[String], limits: &ValidationLimits) -> Result<()> {
    if tags.len() > limits.max_tags {
        return Err(CoreError::Validation(format!(
            "At most {} tags are allowed",
            limits.max_tags
        )));
    }
    if tags.iter().any(|t| t.trim().is_empty()) {
        return Err(CoreError::Validation("Tags must not be blank".into()));
    }
    Ok(())
}
