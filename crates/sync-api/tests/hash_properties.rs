//! §8 testable property 1 (hash stability) and a companion stability-under-
//! reordering check, exercised with `proptest` the way the teacher's sibling
//! crates do for their own invariants.

use std::collections::BTreeMap;

use proptest::prelude::*;
use sync_api::entity::Entity;
use sync_api::value::Value;

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Boolean),
        any::<i64>().prop_map(Value::Integer),
        ".{0,12}".prop_map(Value::String),
    ]
}

fn arb_fields() -> impl Strategy<Value = BTreeMap<String, Value>> {
    prop::collection::btree_map("[a-z]{1,8}", arb_value(), 0..6)
}

proptest! {
    /// Run-scoped metadata, timestamps, and the vector must never affect
    /// the content hash (§3 "Content hash", §8 property 1).
    #[test]
    fn hash_is_invariant_under_run_scoped_metadata_and_vector_changes(
        entity_id in "[a-z0-9]{1,12}",
        entity_type in "[a-z]{1,10}",
        fields in arb_fields(),
        sync_id in "[a-z0-9-]{1,10}",
        sync_job_id in "[a-z0-9-]{1,10}",
    ) {
        let mut a = Entity::new(&entity_id, &entity_type);
        a.fields = fields.clone();
        let mut b = a.clone();

        b.system_metadata.sync_id = Some(sync_id);
        b.system_metadata.sync_job_id = Some(sync_job_id);
        b.vector = Some(vec![0.1, 0.2, 0.3]);
        b.db_entity_id = Some("some-db-id".to_string());

        prop_assert_eq!(a.compute_hash(), b.compute_hash());
    }

    /// Any change to a content-bearing field must change the hash (the
    /// contrapositive half of action correctness, §8 property 2: a real
    /// content change can never be mistaken for KEEP).
    #[test]
    fn changing_a_content_field_changes_the_hash(
        entity_id in "[a-z0-9]{1,12}",
        entity_type in "[a-z]{1,10}",
        mut fields in arb_fields(),
        extra_key in "[a-z]{1,8}",
    ) {
        let marker = Value::String("distinguishing-marker".to_string());
        prop_assume!(fields.get(&extra_key) != Some(&marker));

        let mut a = Entity::new(entity_id.as_str(), entity_type.as_str());
        a.fields = fields.clone();
        let before = a.compute_hash();

        fields.insert(extra_key, marker);
        let mut b = Entity::new(entity_id.as_str(), entity_type.as_str());
        b.fields = fields;
        let after = b.compute_hash();

        prop_assert_ne!(before, after);
    }

    /// Field insertion order must not affect the hash: `BTreeMap` already
    /// guarantees canonical iteration order, but this pins that guarantee
    /// against a future change to `Entity::fields`'s backing collection.
    #[test]
    fn field_insertion_order_does_not_affect_the_hash(
        entity_id in "[a-z0-9]{1,12}",
        entity_type in "[a-z]{1,10}",
        fields in arb_fields(),
    ) {
        let mut forward = Entity::new(&entity_id, &entity_type);
        forward.fields = fields.clone();

        let mut reversed = Entity::new(&entity_id, &entity_type);
        for (k, v) in fields.into_iter().rev() {
            reversed.set_field(k, v);
        }

        prop_assert_eq!(forward.compute_hash(), reversed.compute_hash());
    }
}
