use crate::errors::ValidationError;
use crate::models::TaskPatch;

/// Tag validation policy. The default matches the strict variant: tags are
/// folded to lowercase and capped at 20 characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagPolicy {
    pub max_length: usize,
    pub lowercase: bool,
}

impl Default for TagPolicy {
    fn default() -> Self {
        Self {
            max_length: 20,
            lowercase: true,
        }
    }
}

/// Trims the title and rejects empty results.
pub fn validate_title(title: &str) -> Result<String, ValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    Ok(trimmed.to_string())
}

/// Trims the description; an empty or whitespace-only description becomes
/// `None`.
pub fn normalize_description(description: Option<&str>) -> Option<String> {
    description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

/// Normalizes a raw tag list under the given policy: trim, optional case
/// fold, length bound, dedupe preserving first-seen order.
pub fn normalize_tags(raw: &[String], policy: &TagPolicy) -> Result<Vec<String>, ValidationError> {
    let mut tags: Vec<String> = Vec::with_capacity(raw.len());
    for tag in raw {
        let mut tag = tag.trim().to_string();
        if policy.lowercase {
            tag = tag.to_lowercase();
        }
        if tag.is_empty() {
            return Err(ValidationError::EmptyTag);
        }
        if tag.chars().count() > policy.max_length {
            return Err(ValidationError::TagTooLong {
                tag,
                max: policy.max_length,
            });
        }
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    Ok(tags)
}

/// Validates and normalizes a partial edit. Fields that are present go
/// through the same checks as `add` input; a patch with no fields at all is
/// rejected.
pub fn validate_patch(patch: &TaskPatch, policy: &TagPolicy) -> Result<TaskPatch, ValidationError> {
    if patch.is_empty() {
        return Err(ValidationError::EmptyPatch);
    }

    let title = patch.title.as_deref().map(validate_title).transpose()?;
    let description = patch
        .description
        .as_deref()
        .map(|d| normalize_description(Some(d)).unwrap_or_default());
    let tags = patch
        .tags
        .as_deref()
        .map(|t| normalize_tags(t, policy))
        .transpose()?;

    Ok(TaskPatch {
        title,
        description,
        tags,
        completed: patch.completed,
    })
}
