//! Symptom matching: free text to a canonical health problem.
//!
//! Matching is plain substring containment on the case-folded input. A short
//! canonical name can therefore match inside an unrelated word ("flu" in
//! "fluid"); callers should keep names and synonyms specific.

use crate::{Catalog, HealthProblem};

/// Find the health problem mentioned in `user_input`
///
/// Problems are checked in catalog load order. For each problem the
/// canonical name is tried first, then each synonym; the first hit wins.
pub fn find_health_problem<'a>(
    catalog: &'a Catalog,
    user_input: &str,
) -> Option<&'a HealthProblem> {
    let input = user_input.to_lowercase();

    let found = catalog.problems.iter().find(|problem| {
        input.contains(problem.id.as_str())
            || problem
                .synonyms
                .iter()
                .any(|synonym| input.contains(synonym.to_lowercase().as_str()))
    });

    match found {
        Some(problem) => tracing::debug!("Matched input to '{}'", problem.id),
        None => tracing::debug!("No health problem found in input"),
    }
    found
}
