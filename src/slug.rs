use chrono::Utc;

use crate::db::repository::{Record, Repository};
use crate::error::AppError;

/// Highest numeric suffix probed before falling back to a timestamp.
pub const MAX_SUFFIX: u32 = 50;

/// Turn a free-text label into a URL-safe token.
///
/// Lowercases, collapses every run of characters outside `[a-z0-9]` into a
/// single hyphen and trims hyphens from both ends. Input with no usable
/// characters yields an empty string.
pub fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    let mut pending_hyphen = false;

    for ch in label.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch);
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// A slug chosen by [`unique_slug`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueSlug {
    pub slug: String,
    /// Every numbered suffix was taken and a timestamp suffix was used.
    pub degraded: bool,
}

/// Derive a slug from `label` that is not yet used in `store`.
///
/// Tries the bare slug, then `-2` through `-50`, one existence query each,
/// and finally appends the current Unix time in milliseconds.
pub async fn unique_slug<T: Record>(
    store: &dyn Repository<T>,
    label: &str,
) -> Result<UniqueSlug, AppError> {
    let base = slugify(label);

    if !store.exists(&base).await? {
        return Ok(UniqueSlug {
            slug: base,
            degraded: false,
        });
    }

    for suffix in 2..=MAX_SUFFIX {
        let candidate = format!("{base}-{suffix}");
        if !store.exists(&candidate).await? {
            return Ok(UniqueSlug {
                slug: candidate,
                degraded: false,
            });
        }
    }

    let slug = format!("{base}-{}", Utc::now().timestamp_millis());
    tracing::warn!(
        "Slug '{}' exhausted {} suffixes in '{}', using '{}'",
        base,
        MAX_SUFFIX,
        T::COLLECTION,
        slug
    );

    Ok(UniqueSlug {
        slug,
        degraded: true,
    })
}
