//! Dependency ordering of rules.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::blueprint::Rule;
use crate::error::ResolveError;

/// Order `rules` so that every rule comes after the rules named in its
/// `after` list.
///
/// Uses Kahn's algorithm with the ready set ordered by declaration index, so
/// the output is deterministic: independent rules keep their declared order.
/// Fails closed: on any error no partial order is returned.
///
/// # Errors
///
/// - [`ResolveError::DuplicateId`] if two rules share an explicit id.
/// - [`ResolveError::UnknownDependency`] if an `after` token matches no rule.
/// - [`ResolveError::AmbiguousDependency`] if it matches several rules.
/// - [`ResolveError::DependencyCycle`] if the graph is cyclic.
pub fn resolve(rules: Vec<Rule>) -> Result<Vec<Rule>, ResolveError> {
    let mut seen_ids = HashSet::new();
    for id in rules.iter().filter_map(|r| r.id.as_deref()) {
        if !seen_ids.insert(id) {
            return Err(ResolveError::DuplicateId(id.to_string()));
        }
    }

    let keys: Vec<String> = rules.iter().map(Rule::dependency_key).collect();
    let mut key_to_idx: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, key) in keys.iter().enumerate() {
        key_to_idx.entry(key.as_str()).or_default().push(i);
    }

    let mut in_degree = vec![0usize; rules.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); rules.len()];
    for (i, rule) in rules.iter().enumerate() {
        let mut deps = BTreeSet::new();
        for reference in &rule.after {
            let dep = match key_to_idx.get(reference.as_str()).map(Vec::as_slice) {
                None | Some([]) => {
                    return Err(ResolveError::UnknownDependency {
                        reference: reference.clone(),
                        rule: keys.get(i).cloned().unwrap_or_default(),
                    });
                }
                Some([one]) => *one,
                Some(many) => {
                    return Err(ResolveError::AmbiguousDependency {
                        reference: reference.clone(),
                        count: many.len(),
                    });
                }
            };
            deps.insert(dep);
        }
        for dep in deps {
            if let Some(d) = dependents.get_mut(dep) {
                d.push(i);
            }
            if let Some(count) = in_degree.get_mut(i) {
                *count += 1;
            }
        }
    }

    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter_map(|(i, &d)| (d == 0).then_some(i))
        .collect();
    let mut order = Vec::with_capacity(rules.len());

    while let Some(idx) = ready.pop_first() {
        order.push(idx);
        for &dep in dependents.get(idx).map_or(&[][..], Vec::as_slice) {
            if let Some(count) = in_degree.get_mut(dep) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(dep);
                }
            }
        }
    }

    if order.len() != rules.len() {
        let placed: HashSet<usize> = order.iter().copied().collect();
        let members = keys
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !placed.contains(i))
            .map(|(_, k)| k)
            .collect();
        return Err(ResolveError::DependencyCycle { members });
    }

    let mut slots: Vec<Option<Rule>> = rules.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|i| slots.get_mut(i).and_then(Option::take))
        .collect())
}
