//! Uninstall synthesis for resources no longer declared.

use std::path::Path;

use crate::blueprint::{Action, Rule};
use crate::handlers::{declared_keys, find_uninstall_rules};
use crate::status::{Scope, Status};

/// Uninstall rules for every in-scope status record whose natural key no
/// rule in `rules` declares, visiting kinds in [`Action::KINDS`] order.
///
/// Each synthesized rule gets a `drift:<kind>:<natural key>` id, unique
/// within a scope, so it never makes an `after:` reference ambiguous.
/// Path keys are compared in canonical form against `home`.
#[must_use]
pub fn synthesize_uninstalls(status: &Status, rules: &[Rule], scope: &Scope, home: &Path) -> Vec<Rule> {
    Action::KINDS
        .into_iter()
        .flat_map(|kind| {
            find_uninstall_rules(kind, status, rules, scope, home)
                .into_iter()
                .map(move |rule| {
                    let key = declared_keys(kind, &rule.params, home).join(",");
                    rule.with_id(format!("drift:{kind}:{key}"))
                })
        })
        .collect()
}
