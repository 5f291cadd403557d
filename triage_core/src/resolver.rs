//! Prescription resolution from collected answers.
//!
//! Answer categories form a priority list: the category of an earlier
//! question beats any later one, so a single ruleset covers every answer
//! combination without enumerating them.

use crate::{AnswerOption, Catalog, Prescription};

/// Resolve the prescription for `problem_id` given answers in question order
///
/// Returns `None` when the problem has no ruleset, no answered category
/// has a rule, or the winning rule is blank (see [`Prescription::is_blank`]).
pub fn resolve_prescription<'a>(
    catalog: &'a Catalog,
    problem_id: &str,
    answers: &[AnswerOption],
) -> Option<&'a Prescription> {
    let categories: Vec<&str> = answers
        .iter()
        .filter_map(|a| a.category.as_deref())
        .collect();

    let Some(ruleset) = catalog.ruleset_for(problem_id) else {
        tracing::debug!("No ruleset for '{}'", problem_id);
        return None;
    };

    let mut best = categories.iter().find_map(|c| ruleset.get(c));

    // Fallback to the first category. Always agrees with the scan above.
    if best.is_none() {
        if let Some(first) = categories.first() {
            best = ruleset.get(first);
        }
    }

    // A blank winning rule does not fall through to lower-priority ones
    if let Some(prescription) = best.filter(|p| p.is_blank()) {
        tracing::warn!(
            "Blank prescription {} for '{}' treated as unavailable",
            prescription.0,
            problem_id
        );
        return None;
    }

    match best {
        Some(_) => tracing::info!("Resolved prescription for '{}'", problem_id),
        None => tracing::info!(
            "No prescription for '{}' with categories {:?}",
            problem_id,
            categories
        ),
    }
    best
}
