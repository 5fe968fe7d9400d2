//! Semantic invariants of persisted results not expressible via JSON Schema.

use std::collections::HashSet;

use crate::core::types::ResultFragment;

/// Check persisted results:
/// - every result has an id, and ids are unique
/// - `stats.first <= stats.last`
/// - no result claims to be mid-run (`queued`/`running`)
pub fn validate_invariants(results: &[ResultFragment]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for (index, result) in results.iter().enumerate() {
        let path = result.id.clone().unwrap_or_else(|| format!("#{index}"));
        validate_result(result, &mut seen, &mut errors, &path);
    }
    errors
}

fn validate_result(
    result: &ResultFragment,
    seen: &mut HashSet<String>,
    errors: &mut Vec<String>,
    path: &str,
) {
    match &result.id {
        Some(id) => {
            if !seen.insert(id.clone()) {
                errors.push(format!("duplicate id '{}' at {}", id, path));
            }
        }
        None => errors.push(format!("{}: missing id", path)),
    }

    let stats = result.stats.unwrap_or_default();
    if let (Some(first), Some(last)) = (stats.first, stats.last) {
        if first > last {
            errors.push(format!(
                "{}: first seen {} is after last run {}",
                path, first, last
            ));
        }
    }

    if let Some(status) = result.status.filter(|status| status.is_in_flight()) {
        errors.push(format!("{}: persisted status must not be {}", path, status));
    }

    for (index, child) in result.tests.iter().flatten().enumerate() {
        let child_path = match &child.id {
            Some(id) => format!("{}/{}", path, id),
            None => format!("{}/#{}", path, index),
        };
        validate_result(child, seen, errors, &child_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::status::Status;
    use crate::core::types::Stats;
    use crate::test_support::{at, test_fragment};

    #[test]
    fn valid_results_pass() {
        let results = vec![
            test_fragment("s", Status::Idle).with_tests(vec![test_fragment("a", Status::Passed)]),
        ];
        assert!(validate_invariants(&results).is_empty());
    }

    #[test]
    fn reports_duplicates_missing_ids_and_in_flight_statuses() {
        let results = vec![test_fragment("s", Status::Queued).with_tests(vec![
            test_fragment("a", Status::Passed),
            test_fragment("a", Status::Passed),
            ResultFragment::default(),
        ])];
        assert_eq!(
            validate_invariants(&results),
            vec![
                "s: persisted status must not be queued".to_string(),
                "duplicate id 'a' at s/a".to_string(),
                "s/#2: missing id".to_string(),
            ]
        );
    }

    #[test]
    fn reports_first_seen_after_last_run() {
        let results = vec![ResultFragment {
            stats: Some(Stats {
                first: Some(at(5)),
                last: Some(at(1)),
                duration_ms: None,
            }),
            ..test_fragment("s", Status::Idle)
        }];
        let errors = validate_invariants(&results);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("s: first seen"));
    }
}
