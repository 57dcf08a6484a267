use crate::exceptions::ExceptionListAssociation;

/// Result of merging a candidate association into a rule's collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeResult {
    /// The rule already references the candidate list; nothing to write.
    AlreadyPresent,
    /// Full replacement collection to write back.
    ToApply(Vec<ExceptionListAssociation>),
}

/// Merges `candidate` into `existing` by internal id.
///
/// The returned collection is `existing` in its original order with the
/// candidate appended. Duplicates already present in `existing` are left
/// alone; only the candidate is checked.
pub fn merge(
    existing: &[ExceptionListAssociation],
    candidate: &ExceptionListAssociation,
) -> MergeResult {
    if existing
        .iter()
        .any(|association| association.refers_to_same_list(candidate))
    {
        return MergeResult::AlreadyPresent;
    }

    let mut merged = Vec::with_capacity(existing.len() + 1);
    merged.extend_from_slice(existing);
    merged.push(candidate.clone());
    MergeResult::ToApply(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exceptions::{ListType, NamespaceType};

    fn association(internal_id: &str, human_id: &str) -> ExceptionListAssociation {
        ExceptionListAssociation::new(
            internal_id,
            human_id,
            ListType::Detection,
            NamespaceType::Single,
        )
    }

    #[test]
    fn empty_collection_gets_candidate() {
        let candidate = association("L1", "trusted-ips");
        assert_eq!(
            merge(&[], &candidate),
            MergeResult::ToApply(vec![candidate.clone()])
        );
    }

    #[test]
    fn candidate_with_known_internal_id_is_already_present() {
        let existing = vec![association("L1", "trusted-ips")];
        let candidate = association("L1", "trusted-ips");
        assert_eq!(merge(&existing, &candidate), MergeResult::AlreadyPresent);
    }

    #[test]
    fn match_ignores_display_metadata() {
        let existing = vec![association("L1", "old-name")];
        let candidate = ExceptionListAssociation {
            list_type: ListType::Endpoint,
            namespace_type: NamespaceType::Agnostic,
            ..association("L1", "new-name")
        };
        assert_eq!(merge(&existing, &candidate), MergeResult::AlreadyPresent);
    }

    #[test]
    fn same_human_id_with_new_internal_id_is_appended() {
        let existing = vec![association("L1", "trusted-ips")];
        let candidate = association("L2", "trusted-ips");
        let MergeResult::ToApply(merged) = merge(&existing, &candidate) else {
            panic!("expected ToApply");
        };
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn order_is_preserved_and_candidate_is_last() {
        let existing = vec![
            association("L3", "c"),
            association("L1", "a"),
            association("L3", "c-dup"),
        ];
        let candidate = association("L2", "b");
        let MergeResult::ToApply(merged) = merge(&existing, &candidate) else {
            panic!("expected ToApply");
        };
        assert_eq!(&merged[..existing.len()], existing.as_slice());
        assert_eq!(merged.last(), Some(&candidate));
        assert_eq!(merged.len(), existing.len() + 1);
    }

    #[test]
    fn merge_is_repeatable() {
        let existing = vec![association("L1", "a")];
        let candidate = association("L2", "b");
        assert_eq!(merge(&existing, &candidate), merge(&existing, &candidate));
        assert_eq!(existing, vec![association("L1", "a")]);
    }
}
