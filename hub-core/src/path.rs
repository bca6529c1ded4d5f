use crate::error::ValidationError;
use std::fmt;

/// A relative path beneath a principal's namespace (§3 Data model).
///
/// Rejects absolute paths, `..` traversal, and empty components at
/// construction time so drivers never have to re-validate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectPath(String);

impl ObjectPath {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.is_empty() || raw.starts_with('/') {
            return Err(ValidationError::InvalidPath);
        }
        for segment in raw.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(ValidationError::InvalidPath);
            }
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if any path component is an archival history entry, i.e. its
    /// filename component begins with `.history.` (§3, §GLOSSARY).
    pub fn is_historical(&self) -> bool {
        self.file_name().starts_with(".history.")
    }

    /// True for the revocation clock's own key, which only `authBump`
    /// (the revocation path) may write; direct store/delete requests
    /// against it are rejected with `ConflictingNameError` (§7).
    pub fn is_reserved(&self) -> bool {
        self.0 == ".authTimestamp"
    }

    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The directory prefix (everything before the final `/`), or the empty
    /// string if this path has no directory component.
    pub fn dir_prefix(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[..idx],
            None => "",
        }
    }

    /// Builds the historical sibling name for this path: `<dir>/.history.<t>.<rand>.<name>`.
    pub fn historical_sibling(&self, unix_millis: u64, rand10: &str) -> ObjectPath {
        let dir = self.dir_prefix();
        let name = self.file_name();
        let joined = if dir.is_empty() {
            format!(".history.{unix_millis}.{rand10}.{name}")
        } else {
            format!("{dir}/.history.{unix_millis}.{rand10}.{name}")
        };
        ObjectPath(joined)
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
