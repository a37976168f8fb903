//! Record identity: natural key plus normalized (source file, OS) scope.

use std::path::Path;

use chrono::{DateTime, Utc};

use super::records::Scope;

/// Normalize a blueprint path for use in a status scope.
///
/// Symlinks are resolved and the path made absolute. A path that does not
/// exist falls back to its lexical absolute form so both sides of a
/// comparison still agree.
#[must_use]
pub fn normalize_source(path: &Path) -> String {
    dunce::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

/// Common view over the per-kind status records.
pub trait StatusEntry: Clone + PartialEq {
    /// Kind-specific identity (path, host, `plugin@version`, …).
    fn natural_key(&self) -> String;
    /// Provenance of the record.
    fn scope(&self) -> &Scope;
    /// When the record was last applied.
    fn applied_at(&self) -> DateTime<Utc>;
    /// Overwrite the timestamp.
    fn set_applied_at(&mut self, at: DateTime<Utc>);

    /// Whether this record has the given identity.
    fn is(&self, key: &str, scope: &Scope) -> bool {
        self.scope() == scope && self.natural_key() == key
    }
}

/// Implement [`StatusEntry`] for a record type with an `applied_at` field
/// and a flattened `scope`.
macro_rules! impl_status_entry {
    ($ty:ty, |$rec:ident| $key:expr) => {
        impl $crate::status::identity::StatusEntry for $ty {
            fn natural_key(&self) -> String {
                let $rec = self;
                $key
            }
            fn scope(&self) -> &$crate::status::records::Scope {
                &self.scope
            }
            fn applied_at(&self) -> chrono::DateTime<chrono::Utc> {
                self.applied_at
            }
            fn set_applied_at(&mut self, at: chrono::DateTime<chrono::Utc>) {
                self.applied_at = at;
            }
        }
    };
}
pub(super) use impl_status_entry;

/// Insert `entry`, replacing any record with the same identity in place.
///
/// A replacement that differs only in its timestamp is dropped so that an
/// unchanged re-run leaves the document untouched. Returns `true` if the
/// list changed.
pub fn upsert<T: StatusEntry>(list: &mut Vec<T>, mut entry: T) -> bool {
    let key = entry.natural_key();
    let Some(existing) = list.iter_mut().find(|e| e.is(&key, entry.scope())) else {
        list.push(entry);
        return true;
    };
    let fresh = entry.applied_at();
    entry.set_applied_at(existing.applied_at());
    if *existing == entry {
        return false;
    }
    entry.set_applied_at(fresh);
    *existing = entry;
    true
}

/// Remove the record with the given identity. Returns `true` if one was
/// removed.
pub fn remove<T: StatusEntry>(list: &mut Vec<T>, key: &str, scope: &Scope) -> bool {
    let before = list.len();
    list.retain(|e| !e.is(key, scope));
    list.len() != before
}

/// Remove every record in `scope` whose natural key satisfies `matches`.
pub fn remove_where<T: StatusEntry>(
    list: &mut Vec<T>,
    scope: &Scope,
    matches: impl Fn(&str) -> bool,
) -> bool {
    let before = list.len();
    list.retain(|e| !(e.scope() == scope && matches(&e.natural_key())));
    list.len() != before
}

/// Records belonging to `scope`, in document order.
pub fn in_scope<'a, T: StatusEntry>(list: &'a [T], scope: &'a Scope) -> impl Iterator<Item = &'a T> {
    list.iter().filter(move |e| e.scope() == scope)
}

/// Look up a record by identity.
pub fn find<'a, T: StatusEntry>(list: &'a [T], key: &str, scope: &Scope) -> Option<&'a T> {
    list.iter().find(|e| e.is(key, scope))
}

/// First record in `scope` whose natural key satisfies `matches`.
pub fn find_where<'a, T: StatusEntry>(
    list: &'a [T],
    scope: &Scope,
    matches: impl Fn(&str) -> bool,
) -> Option<&'a T> {
    list.iter().find(|e| e.scope() == scope && matches(&e.natural_key()))
}
