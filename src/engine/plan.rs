//! Human-readable rendering of a [`Plan`].

use std::fmt::Write as _;

use super::Plan;
use crate::handlers::{Handler, HandlerEnv, RuleHandler};

/// One entry per rule, in execution order, with its parameters and the
/// exact command it would run.
#[must_use]
pub fn render_plan(plan: &Plan, env: HandlerEnv<'_>) -> String {
    let mut out = String::new();
    for (i, planned) in plan.rules.iter().enumerate() {
        let rule = &planned.rule;
        let drift = if planned.synthesized { " [drift]" } else { "" };
        let after = if rule.after.is_empty() {
            String::new()
        } else {
            format!(" (after: {})", rule.after.join(", "))
        };
        match Handler::new(rule, env) {
            Ok(handler) => {
                let _ = writeln!(
                    out,
                    "{}. {}{drift}{after}",
                    i + 1,
                    handler.display_details(rule.is_uninstall())
                );
                let _ = writeln!(out, "      {}", handler.display_info());
                let _ = writeln!(out, "      $ {}", handler.command());
            }
            Err(e) => {
                let _ = writeln!(out, "{}. {}{drift}{after}", i + 1, rule.dependency_key());
                let _ = writeln!(out, "      ! {e}");
            }
        }
    }
    if plan.rules.is_empty() {
        out.push_str("nothing to do\n");
    }
    out
}
