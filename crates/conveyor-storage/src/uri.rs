//! Storage URI parsing.

use std::fmt;

use conveyor_core::{AppError, AppResult};

/// A parsed `scheme://bucket/path` storage location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageUri {
    /// URI scheme, e.g. `s3`.
    pub scheme: String,
    /// Bucket name.
    pub bucket: String,
    /// Object key (path within the bucket).
    pub key: String,
}

impl StorageUri {
    /// Parse a `scheme://bucket/path` URI.
    pub fn parse(uri: &str) -> AppResult<Self> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| malformed(uri, "missing '://'"))?;
        let (bucket, key) = rest
            .split_once('/')
            .ok_or_else(|| malformed(uri, "missing path after bucket"))?;

        if scheme.is_empty() {
            return Err(malformed(uri, "empty scheme"));
        }
        if bucket.is_empty() {
            return Err(malformed(uri, "empty bucket"));
        }
        if key.is_empty() {
            return Err(malformed(uri, "empty path"));
        }

        Ok(Self {
            scheme: scheme.to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// A new URI with `segment` appended to the key.
    pub fn join(&self, segment: &str) -> Self {
        Self {
            scheme: self.scheme.clone(),
            bucket: self.bucket.clone(),
            key: format!("{}/{}", self.key.trim_end_matches('/'), segment),
        }
    }
}

impl fmt::Display for StorageUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.key)
    }
}

fn malformed(uri: &str, reason: &str) -> AppError {
    AppError::validation(format!(
        "Malformed storage URI '{uri}': {reason} (expected scheme://bucket/path)"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_key() {
        let uri = StorageUri::parse("s3://bucket/key/sub").expect("parse");
        assert_eq!(uri.scheme, "s3");
        assert_eq!(uri.bucket, "bucket");
        assert_eq!(uri.key, "key/sub");
    }

    #[test]
    fn test_not_a_uri_is_rejected() {
        let err = StorageUri::parse("not-a-uri").expect_err("must fail");
        assert!(err.message.contains("scheme://bucket/path"));
    }

    #[test]
    fn test_missing_path_is_rejected() {
        assert!(StorageUri::parse("s3://bucket").is_err());
        assert!(StorageUri::parse("s3://bucket/").is_err());
    }

    #[test]
    fn test_empty_bucket_is_rejected() {
        assert!(StorageUri::parse("s3:///key").is_err());
    }

    #[test]
    fn test_display_round_trips() {
        let uri = StorageUri::parse("s3://outputs/job-5/frames").expect("parse");
        assert_eq!(uri.to_string(), "s3://outputs/job-5/frames");
    }

    #[test]
    fn test_join_appends_segment() {
        let uri = StorageUri::parse("s3://outputs/job-5").expect("parse");
        assert_eq!(uri.join("render.log").key, "job-5/render.log");
    }

    #[test]
    fn test_join_never_doubles_slashes() {
        let uri = StorageUri::parse("s3://outputs/job-5/").expect("parse");
        assert_eq!(uri.join("render.log").key, "job-5/render.log");
    }
}
