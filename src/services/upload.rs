//! Checks applied to an upload before it is decoded

use crate::error::{ALLOWED_CONTENT_TYPES, BgRemovalError, Result};

/// Reject content types outside [`ALLOWED_CONTENT_TYPES`]
///
/// Parameters such as `; charset=...` are ignored and the comparison is
/// case-insensitive. A missing content type is rejected.
///
/// # Errors
/// - `InvalidContentType` for any other type
pub fn check_content_type(content_type: Option<&str>) -> Result<()> {
    let raw = content_type.unwrap_or_default();
    let essence = raw
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if ALLOWED_CONTENT_TYPES.contains(&essence.as_str()) {
        Ok(())
    } else {
        Err(BgRemovalError::invalid_content_type(raw))
    }
}

/// Reject uploads larger than `limit` bytes
///
/// # Errors
/// - `PayloadTooLarge` when `size > limit`
pub fn check_size(size: usize, limit: usize) -> Result<()> {
    if size > limit {
        Err(BgRemovalError::payload_too_large(size, limit))
    } else {
        Ok(())
    }
}

/// Upload file name up to its last `.`, `image` when no name was sent
///
/// A leading dot counts as the extension separator, so `.hidden` gives an
/// empty stem. Characters that cannot appear in a quoted header value are replaced
/// with `_`.
#[must_use]
pub fn upload_stem(filename: Option<&str>) -> String {
    let Some(name) = filename else {
        return "image".to_string();
    };
    let stem = match name.rfind('.') {
        Some(dot) => name.get(..dot).unwrap_or(name),
        None => name,
    };

    stem.chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Attachment name of a binary result
#[must_use]
pub fn result_filename(filename: Option<&str>) -> String {
    format!("no_bg_{}.png", upload_stem(filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_content_types() {
        for content_type in ALLOWED_CONTENT_TYPES {
            assert!(check_content_type(Some(content_type)).is_ok());
        }
        assert!(check_content_type(Some("IMAGE/PNG")).is_ok());
        assert!(check_content_type(Some("image/jpeg; foo=bar")).is_ok());
    }

    #[test]
    fn test_rejected_content_types() {
        for content_type in [Some("text/plain"), Some("image/gif"), Some(""), None] {
            let err = check_content_type(content_type).unwrap_err();
            assert!(err.to_string().contains("image/png, image/jpeg, image/jpg, image/webp"));
        }
    }

    #[test]
    fn test_size_limit_is_inclusive() {
        let limit = 50 * 1024 * 1024;
        assert!(check_size(limit, limit).is_ok());
        assert!(matches!(
            check_size(limit + 1, limit).unwrap_err(),
            BgRemovalError::PayloadTooLarge { .. }
        ));
    }

    #[test]
    fn test_result_filename() {
        assert_eq!(result_filename(Some("photo.jpg")), "no_bg_photo.png");
        assert_eq!(result_filename(Some("archive.tar.gz")), "no_bg_archive.tar.png");
        assert_eq!(result_filename(Some("noext")), "no_bg_noext.png");
        assert_eq!(result_filename(Some(".hidden")), "no_bg_.png");
        assert_eq!(result_filename(Some("")), "no_bg_.png");
        assert_eq!(result_filename(None), "no_bg_image.png");
        assert_eq!(result_filename(Some("é\"x.png")), "no_bg___x.png");
    }
}
