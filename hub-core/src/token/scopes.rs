use crate::token::envelope::RawScopeEntry;

/// The six scope action kinds named in the wire format (§3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    PutFile,
    PutFilePrefix,
    DeleteFile,
    DeleteFilePrefix,
    PutFileArchival,
    PutFileArchivalPrefix,
}

impl ScopeKind {
    fn from_wire(s: &str) -> Option<Self> {
        Some(match s {
            "putFile" => ScopeKind::PutFile,
            "putFilePrefix" => ScopeKind::PutFilePrefix,
            "deleteFile" => ScopeKind::DeleteFile,
            "deleteFilePrefix" => ScopeKind::DeleteFilePrefix,
            "putFileArchival" => ScopeKind::PutFileArchival,
            "putFileArchivalPrefix" => ScopeKind::PutFileArchivalPrefix,
            _ => return None,
        })
    }
}

/// The six disjoint scope lists extracted from a token's `scopes` array.
/// A missing (empty) list for a given kind means "no restriction."
#[derive(Debug, Clone, Default)]
pub struct ScopeSet {
    pub put_file: Vec<String>,
    pub put_file_prefix: Vec<String>,
    pub delete_file: Vec<String>,
    pub delete_file_prefix: Vec<String>,
    pub put_file_archival: Vec<String>,
    pub put_file_archival_prefix: Vec<String>,
}

impl ScopeSet {
    /// Unrecognized scope kinds are dropped rather than rejected: the wire
    /// format may grow new kinds this hub doesn't understand yet.
    pub fn from_raw(entries: &[RawScopeEntry]) -> Self {
        let mut set = ScopeSet::default();
        for entry in entries {
            match ScopeKind::from_wire(&entry.scope) {
                Some(ScopeKind::PutFile) => set.put_file.push(entry.domain.clone()),
                Some(ScopeKind::PutFilePrefix) => set.put_file_prefix.push(entry.domain.clone()),
                Some(ScopeKind::DeleteFile) => set.delete_file.push(entry.domain.clone()),
                Some(ScopeKind::DeleteFilePrefix) => {
                    set.delete_file_prefix.push(entry.domain.clone())
                }
                Some(ScopeKind::PutFileArchival) => {
                    set.put_file_archival.push(entry.domain.clone())
                }
                Some(ScopeKind::PutFileArchivalPrefix) => {
                    set.put_file_archival_prefix.push(entry.domain.clone())
                }
                None => {}
            }
        }
        set
    }

    /// Archival scopes of either kind being present makes every write for
    /// this principal archival (§3: "archival kinds are overlaid").
    pub fn is_archival(&self) -> bool {
        !self.put_file_archival.is_empty() || !self.put_file_archival_prefix.is_empty()
    }

    /// Authorizes a write to `path`: archival scopes are consulted if
    /// archival is in effect, otherwise the plain put scopes are.
    pub fn authorizes_write(&self, path: &str) -> bool {
        if self.is_archival() {
            authorizes(&self.put_file_archival, &self.put_file_archival_prefix, path)
        } else {
            authorizes(&self.put_file, &self.put_file_prefix, path)
        }
    }

    pub fn authorizes_delete(&self, path: &str) -> bool {
        authorizes(&self.delete_file, &self.delete_file_prefix, path)
    }
}

/// A request to `path` is authorized if there are no scopes of the matching
/// kind at all (unrestricted), or an exact-path scope equals `path`, or a
/// prefix scope is a prefix of `path` (§3).
fn authorizes(exact: &[String], prefixes: &[String], path: &str) -> bool {
    if exact.is_empty() && prefixes.is_empty() {
        return true;
    }
    exact.iter().any(|p| p == path) || prefixes.iter().any(|p| path.starts_with(p.as_str()))
}
