use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::facts::{conceptual_path_identifier, Fact, FactKind, Location};

/// A change to one element between two versions of a document.
///
/// Just a wrapper container for `ChangeKind`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    /// Where the element is. Always the location of a fact in one of the compared versions.
    pub location: Location,
    /// What the element is.
    pub kind: FactKind,
    /// Data specific to the kind of change.
    pub change: ChangeKind,
}

/// The kind of change + data relevant to the change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    /// The element only exists in the current version.
    Added {
        /// The element's value in the current version.
        added: Value,
    },
    /// The element only exists in the past version.
    Removed {
        /// The element's value in the past version.
        before: Value,
    },
    /// The element exists in both versions with different values.
    Changed {
        /// The element's value in the past version.
        before: Value,
        /// The element's value in the current version.
        after: Value,
    },
}

/// Compare the facts of two versions of a document.
///
/// Facts are matched by conceptual path. The result lists additions, then removals, then
/// changes, each in the order the facts were given. A renamed element shows up as a removal
/// plus an addition; no rename detection is attempted.
pub fn facts_to_changelog(past: &[Fact], current: &[Fact]) -> Vec<Change> {
    let past_lookup = lookup(past);
    let current_lookup = lookup(current);

    let added = current
        .iter()
        .filter(|fact| !past_lookup.contains_key(&identifier(fact)))
        .map(|fact| Change {
            location: fact.location.clone(),
            kind: fact.kind,
            change: ChangeKind::Added {
                added: fact.value.clone(),
            },
        });

    let removed = past
        .iter()
        .filter(|fact| !current_lookup.contains_key(&identifier(fact)))
        .map(|fact| Change {
            location: fact.location.clone(),
            kind: fact.kind,
            change: ChangeKind::Removed {
                before: fact.value.clone(),
            },
        });

    // serde_json compares objects as maps and arrays element by element.
    let changed = past.iter().filter_map(|fact| {
        let after = current_lookup.get(&identifier(fact))?;
        (fact.value != after.value).then(|| Change {
            location: fact.location.clone(),
            kind: fact.kind,
            change: ChangeKind::Changed {
                before: fact.value.clone(),
                after: after.value.clone(),
            },
        })
    });

    let changes: Vec<Change> = added.chain(removed).chain(changed).collect();
    tracing::debug!(
        past = past.len(),
        current = current.len(),
        changes = changes.len(),
        "computed changelog"
    );
    changes
}

fn identifier(fact: &Fact) -> String {
    conceptual_path_identifier(&fact.location.conceptual_path)
}

fn lookup(facts: &[Fact]) -> HashMap<String, &Fact> {
    facts.iter().map(|fact| (identifier(fact), fact)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::ConceptualLocation;
    use serde_json::json;

    fn fact(path: &[&str], value: Value) -> Fact {
        Fact {
            kind: FactKind::Operation,
            location: Location {
                json_path: String::new(),
                conceptual_path: path.iter().map(|s| s.to_string()).collect(),
                conceptual_location: ConceptualLocation::Specification,
            },
            value,
        }
    }

    #[test]
    fn identical_facts_have_no_changes() {
        let facts = vec![fact(&["a"], json!({"x": 1})), fact(&["b"], json!([1, 2]))];
        assert!(facts_to_changelog(&facts, &facts).is_empty());
    }

    #[test]
    fn added_then_removed_then_changed() {
        let past = vec![
            fact(&["keep"], json!({"a": 1, "b": 2})),
            fact(&["gone"], json!(1)),
            fact(&["edit"], json!([1, 2])),
        ];
        let current = vec![
            fact(&["edit"], json!([2, 1])),
            fact(&["new"], json!(true)),
            fact(&["keep"], json!({"b": 2, "a": 1})),
        ];
        let changes = facts_to_changelog(&past, &current);
        assert_eq!(changes.len(), 3);
        assert!(matches!(changes[0].change, ChangeKind::Added { .. }));
        assert_eq!(changes[0].location.conceptual_path, vec!["new"]);
        assert!(matches!(changes[1].change, ChangeKind::Removed { .. }));
        assert_eq!(changes[1].location.conceptual_path, vec!["gone"]);
        assert_eq!(
            changes[2].change,
            ChangeKind::Changed {
                before: json!([1, 2]),
                after: json!([2, 1])
            }
        );
    }
}
