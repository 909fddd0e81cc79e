//! Compiler tests - build record tables from parsed and builder-made trees

use maplit::btreemap;
use serde_json::{json, Value as JsonValue};

use super::{compile, compile_definition, CompileError};
use crate::ir::{batch, call, leaf, sequence, Node};
use crate::parser::parse;
use crate::registry::Registry;
use crate::types::{ArgKey, Args, Record, RecordTable};

/* ===================== Helpers ===================== */

fn registry() -> Registry {
    let mut registry = Registry::new();
    for worker in ["Worker1", "Worker2", "Worker3"] {
        registry.register_worker(worker).unwrap();
    }
    registry
}

/// `BatchNestedChild(:first_argument) { Worker2(:first_argument) { Worker3(:first_argument) } }`
fn registry_with_nested_child() -> Registry {
    let mut registry = registry();
    let body = parse(
        r#"
        Worker2 :first_argument do
          Worker3 :first_argument
        end
        "#,
    )
    .unwrap();
    registry
        .register("BatchNestedChild", vec!["first_argument".to_string()], body)
        .unwrap();
    registry
}

fn first_arguments(values: JsonValue) -> Args {
    btreemap! { "first_arguments".to_string() => values }
}

fn record(
    id: u32,
    class: &str,
    keys: &[&str],
    values: Vec<JsonValue>,
    parent: Option<u32>,
) -> Record {
    Record {
        id,
        worker_class: class.to_string(),
        arg_keys: keys.iter().map(|k| ArgKey::from(*k)).collect(),
        arg_values: values,
        parent_id: parent,
        children_ids: None,
        next_id: None,
    }
}

fn batch_root(id: u32, parent: Option<u32>, children: Vec<u32>) -> Record {
    Record {
        arg_keys: vec![ArgKey::Bindings(btreemap! {
            "first_arguments".to_string() => "first_argument".to_string(),
        })],
        arg_values: vec![json!({"first_arguments": "first_argument"})],
        children_ids: Some(children),
        ..record(id, "batch", &[], vec![], parent)
    }
}

fn with_children(mut record: Record, children: Vec<u32>) -> Record {
    record.children_ids = Some(children);
    record
}

fn with_next(mut record: Record, next: u32) -> Record {
    record.next_id = Some(next);
    record
}

fn table(records: Vec<Record>) -> RecordTable {
    records.into_iter().collect()
}

fn parents(table: &RecordTable) -> Vec<Option<u32>> {
    table.iter().map(|r| r.parent_id).collect()
}

/* ===================== Reference Scenarios ===================== */

#[test]
fn test_batch_with_two_step_body() {
    let node = parse(
        r#"
        batch first_arguments: :first_argument do
          Worker1 :first_argument
          Worker2 :first_argument
        end
        "#,
    )
    .unwrap();

    let records = compile(&node, &first_arguments(json!([10, 11, 12])), &registry()).unwrap();

    let k = &["first_argument"];
    let expected = table(vec![
        batch_root(1, None, vec![2, 5, 8]),
        record(2, "batch_child", k, vec![json!(10)], Some(1)),
        with_next(record(3, "Worker1", k, vec![json!(10)], Some(2)), 4),
        record(4, "Worker2", k, vec![json!(10)], Some(2)),
        record(5, "batch_child", k, vec![json!(11)], Some(1)),
        with_next(record(6, "Worker1", k, vec![json!(11)], Some(5)), 7),
        record(7, "Worker2", k, vec![json!(11)], Some(5)),
        record(8, "batch_child", k, vec![json!(12)], Some(1)),
        with_next(record(9, "Worker1", k, vec![json!(12)], Some(8)), 10),
        record(10, "Worker2", k, vec![json!(12)], Some(8)),
    ]);

    assert_eq!(records, expected);
}

#[test]
fn test_batch_with_nested_superworker() {
    let node = parse(
        r#"
        batch first_arguments: :first_argument do
          BatchNestedChild :first_argument
        end
        "#,
    )
    .unwrap();

    let records = compile(
        &node,
        &first_arguments(json!([10, 11])),
        &registry_with_nested_child(),
    )
    .unwrap();

    let k = &["first_argument"];
    let expected = table(vec![
        batch_root(1, None, vec![2, 6]),
        record(2, "batch_child", k, vec![json!(10)], Some(1)),
        with_children(record(3, "BatchNestedChild", k, vec![json!(10)], Some(2)), vec![4]),
        with_children(record(4, "Worker2", k, vec![json!(10)], Some(3)), vec![5]),
        record(5, "Worker3", k, vec![json!(10)], Some(4)),
        record(6, "batch_child", k, vec![json!(11)], Some(1)),
        with_children(record(7, "BatchNestedChild", k, vec![json!(11)], Some(6)), vec![8]),
        with_children(record(8, "Worker2", k, vec![json!(11)], Some(7)), vec![9]),
        record(9, "Worker3", k, vec![json!(11)], Some(8)),
    ]);

    assert_eq!(records, expected);
}

#[test]
fn test_batch_with_nested_superworker_and_sibling() {
    let node = parse(
        r#"
        batch first_arguments: :first_argument do
          BatchNestedChild :first_argument
          Worker1 :first_argument
        end
        "#,
    )
    .unwrap();

    let records = compile(
        &node,
        &first_arguments(json!([10, 11])),
        &registry_with_nested_child(),
    )
    .unwrap();

    let k = &["first_argument"];
    let expected = table(vec![
        batch_root(1, None, vec![2, 7]),
        record(2, "batch_child", k, vec![json!(10)], Some(1)),
        with_next(
            with_children(record(3, "BatchNestedChild", k, vec![json!(10)], Some(2)), vec![4]),
            6,
        ),
        with_children(record(4, "Worker2", k, vec![json!(10)], Some(3)), vec![5]),
        record(5, "Worker3", k, vec![json!(10)], Some(4)),
        record(6, "Worker1", k, vec![json!(10)], Some(2)),
        record(7, "batch_child", k, vec![json!(11)], Some(1)),
        with_next(
            with_children(record(8, "BatchNestedChild", k, vec![json!(11)], Some(7)), vec![9]),
            11,
        ),
        with_children(record(9, "Worker2", k, vec![json!(11)], Some(8)), vec![10]),
        record(10, "Worker3", k, vec![json!(11)], Some(9)),
        record(11, "Worker1", k, vec![json!(11)], Some(7)),
    ]);

    assert_eq!(records, expected);
}

#[test]
fn test_scenario_json_matches_reference_shape() {
    let node = parse(
        r#"
        batch first_arguments: :first_argument do
          Worker1 :first_argument
        end
        "#,
    )
    .unwrap();

    let records = compile(&node, &first_arguments(json!([10])), &registry()).unwrap();

    assert_eq!(
        serde_json::to_value(&records).unwrap(),
        json!({
            "1": {
                "subjob_id": 1,
                "subworker_class": "batch",
                "arg_keys": [{"first_arguments": "first_argument"}],
                "arg_values": [{"first_arguments": "first_argument"}],
                "parent_id": null,
                "children_ids": [2]
            },
            "2": {
                "subjob_id": 2,
                "subworker_class": "batch_child",
                "arg_keys": ["first_argument"],
                "arg_values": [10],
                "parent_id": 1
            },
            "3": {
                "subjob_id": 3,
                "subworker_class": "Worker1",
                "arg_keys": ["first_argument"],
                "arg_values": [10],
                "parent_id": 2
            }
        })
    );
}

/* ===================== Structure ===================== */

#[test]
fn test_single_step_is_its_own_root() {
    let node = call("Worker1").param("a").build();
    let records = compile(&node, &btreemap! {"a".to_string() => json!(1)}, &registry()).unwrap();

    assert_eq!(
        records,
        table(vec![record(1, "Worker1", &["a"], vec![json!(1)], None)])
    );
}

#[test]
fn test_multi_step_body_gets_superworker_root() {
    let node = parse("Worker1 :a\nWorker2\nWorker3 :a").unwrap();
    let args = btreemap! {"a".to_string() => json!("x")};
    let records = compile(&node, &args, &registry()).unwrap();

    let expected = table(vec![
        with_children(record(1, "superworker", &["a"], vec![json!("x")], None), vec![2]),
        with_next(record(2, "Worker1", &["a"], vec![json!("x")], Some(1)), 3),
        with_next(record(3, "Worker2", &[], vec![], Some(1)), 4),
        record(4, "Worker3", &["a"], vec![json!("x")], Some(1)),
    ]);

    assert_eq!(records, expected);
}

#[test]
fn test_sequence_chaining_links_m_minus_one() {
    let steps = (0..5).map(|_| call("Worker1").build());
    let node = sequence(steps);
    let records = compile(&node, &Args::new(), &registry()).unwrap();

    let chained: Vec<_> = records.iter().filter(|r| r.next_id.is_some()).collect();
    assert_eq!(chained.len(), 4);
    for r in chained {
        let next = records.get(r.next_id.unwrap()).unwrap();
        assert_eq!(next.parent_id, r.parent_id);
    }
}

#[test]
fn test_nested_sequences_flatten() {
    let node = sequence([
        call("Worker1").build(),
        sequence([call("Worker2").build(), call("Worker3").build()]),
    ]);
    let records = compile(&node, &Args::new(), &registry()).unwrap();

    assert_eq!(records.len(), 4);
    assert_eq!(records.get(2).unwrap().next_id, Some(3));
    assert_eq!(records.get(3).unwrap().next_id, Some(4));
    assert_eq!(records.get(4).unwrap().next_id, None);
    assert_eq!(parents(&records), vec![None, Some(1), Some(1), Some(1)]);
}

#[test]
fn test_worker_nested_block_becomes_single_child() {
    let node = parse(
        r#"
        Worker1 :a do
          Worker2 :a
          Worker3 :a
        end
        "#,
    )
    .unwrap();
    let records = compile(&node, &btreemap! {"a".to_string() => json!(5)}, &registry()).unwrap();

    let root = records.root().unwrap();
    assert_eq!(root.worker_class, "Worker1");
    assert_eq!(root.children_ids, Some(vec![2]));
    assert_eq!(records.get(2).unwrap().next_id, Some(3));
    assert_eq!(parents(&records), vec![None, Some(1), Some(1)]);
}

#[test]
fn test_literal_and_keyed_arguments() {
    let node = call("Worker1")
        .param_as("user", "id")
        .literal("retries", 3)
        .literal("mode", "fast")
        .build();
    let records = compile(&node, &btreemap! {"id".to_string() => json!(42)}, &registry()).unwrap();

    let root = records.root().unwrap();
    assert_eq!(
        root.arg_keys,
        vec![ArgKey::from("user"), ArgKey::from("retries"), ArgKey::from("mode")]
    );
    assert_eq!(root.arg_values, vec![json!(42), json!(3), json!("fast")]);
}

/* ===================== Batches ===================== */

#[test]
fn test_multi_list_batch_pairs_elements_by_position() {
    let node = batch("users", "user")
        .bind("emails", "email")
        .body(call("Worker1").param("user").param("email"));
    let args = btreemap! {
        "users".to_string() => json!([1, 2]),
        "emails".to_string() => json!(["a@x", "b@x"]),
    };
    let records = compile(&node, &args, &registry()).unwrap();

    let root = records.root().unwrap();
    assert_eq!(
        root.arg_keys,
        vec![ArgKey::Bindings(btreemap! {
            "users".to_string() => "user".to_string(),
            "emails".to_string() => "email".to_string(),
        })]
    );

    assert_eq!(
        serde_json::to_string(&root.arg_keys).unwrap(),
        r#"[{"emails":"email","users":"user"}]"#
    );

    let child = records.get(2).unwrap();
    assert_eq!(child.arg_keys, vec![ArgKey::from("user"), ArgKey::from("email")]);
    assert_eq!(child.arg_values, vec![json!(1), json!("a@x")]);

    let second = records.get(4).unwrap();
    assert_eq!(second.worker_class, "batch_child");
    assert_eq!(second.arg_values, vec![json!(2), json!("b@x")]);
    assert_eq!(records.get(5).unwrap().arg_values, vec![json!(2), json!("b@x")]);
}

#[test]
fn test_fan_out_cardinality_and_order() {
    let node = batch("items", "item").body(call("Worker1").param("item"));
    let values: Vec<JsonValue> = (0..7).map(|i| json!(i * 10)).collect();
    let args = btreemap! {"items".to_string() => JsonValue::Array(values.clone())};
    let records = compile(&node, &args, &registry()).unwrap();

    let children = records.root().unwrap().children_ids.clone().unwrap();
    assert_eq!(children.len(), 7);

    let seen: Vec<JsonValue> = children
        .iter()
        .map(|id| records.get(*id).unwrap().arg_values[0].clone())
        .collect();
    assert_eq!(seen, values);
    assert!(children.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_empty_batch_has_no_children() {
    let node = batch("items", "item").body(call("Worker1").param("item"));
    let args = btreemap! {"items".to_string() => json!([])};
    let records = compile(&node, &args, &registry()).unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records.root().unwrap().children_ids, None);
}

#[test]
fn test_nested_batches_see_outer_elements() {
    let node = parse(
        r#"
        batch rows: :row do
          batch cols: :col do
            Worker1 :row, :col
          end
        end
        "#,
    )
    .unwrap();
    let args = btreemap! {
        "rows".to_string() => json!([1, 2]),
        "cols".to_string() => json!(["a", "b", "c"]),
    };
    let records = compile(&node, &args, &registry()).unwrap();

    // 1 outer batch, per row: 1 child + 1 inner batch + 3 * (child + worker)
    assert_eq!(records.len(), 1 + 2 * (1 + 1 + 3 * 2));

    let workers: Vec<_> = records
        .iter()
        .filter(|r| r.worker_class == "Worker1")
        .map(|r| r.arg_values.clone())
        .collect();
    assert_eq!(workers[0], vec![json!(1), json!("a")]);
    assert_eq!(workers[5], vec![json!(2), json!("c")]);
}

/* ===================== Superworkers ===================== */

#[test]
fn test_superworker_binds_parameters_positionally() {
    let mut registry = registry();
    registry
        .register(
            "Notify",
            vec!["user".to_string(), "channel".to_string()],
            call("Worker1").param("user").param("channel").build(),
        )
        .unwrap();

    let node = call("Notify").param("id").literal("via", "sms").build();
    let records = compile(&node, &btreemap! {"id".to_string() => json!(9)}, &registry).unwrap();

    let root = records.root().unwrap();
    assert_eq!(root.worker_class, "Notify");
    assert_eq!(root.arg_keys, vec![ArgKey::from("id"), ArgKey::from("via")]);
    assert_eq!(root.children_ids, Some(vec![2]));

    let inner = records.get(2).unwrap();
    assert_eq!(inner.arg_keys, vec![ArgKey::from("user"), ArgKey::from("channel")]);
    assert_eq!(inner.arg_values, vec![json!(9), json!("sms")]);
}

#[test]
fn test_superworker_body_does_not_see_caller_scope() {
    let mut registry = registry();
    registry
        .register("Leaky", vec![], call("Worker1").param("secret").build())
        .unwrap();

    let node = call("Leaky").build();
    let err = compile(
        &node,
        &btreemap! {"secret".to_string() => json!(1)},
        &registry,
    )
    .unwrap_err();

    assert_eq!(
        err,
        CompileError::UnboundParameter {
            name: "secret".to_string()
        }
    );
}

#[test]
fn test_call_site_block_runs_after_expansion() {
    let mut registry = registry();
    registry
        .register(
            "Pair",
            vec!["a".to_string()],
            sequence([call("Worker1").param("a").build(), call("Worker2").param("a").build()]),
        )
        .unwrap();

    let node = call("Pair")
        .param("x")
        .nested(call("Worker3").param("x").build())
        .build();
    let records = compile(&node, &btreemap! {"x".to_string() => json!(1)}, &registry).unwrap();

    assert_eq!(records.len(), 4);
    assert_eq!(records.get(1).unwrap().children_ids, Some(vec![2]));
    assert_eq!(records.get(2).unwrap().next_id, Some(3));
    assert_eq!(records.get(3).unwrap().next_id, Some(4));
    assert_eq!(records.get(4).unwrap().worker_class, "Worker3");
    assert_eq!(parents(&records), vec![None, Some(1), Some(1), Some(1)]);
}

#[test]
fn test_compile_definition_binds_by_name() {
    let records = compile_definition(
        "BatchNestedChild",
        &btreemap! {"first_argument".to_string() => json!("v")},
        &registry_with_nested_child(),
    )
    .unwrap();

    let root = records.root().unwrap();
    assert_eq!(root.worker_class, "BatchNestedChild");
    assert_eq!(root.arg_values, vec![json!("v")]);
    assert_eq!(records.len(), 3);
}

#[test]
fn test_superworker_inlining_matches_hand_written_body() {
    let mut registry = registry();
    let body = sequence([call("Worker1").param("a").build(), call("Worker2").param("a").build()]);
    registry
        .register("Inline", vec!["a".to_string()], body.clone())
        .unwrap();

    let args = btreemap! {"a".to_string() => json!(3)};
    let via_call = compile(&call("Inline").param("a").build(), &args, &registry).unwrap();
    let direct = compile(&body, &args, &registry).unwrap();

    let shape = |t: &RecordTable| -> Vec<(String, Vec<JsonValue>, Option<u32>)> {
        t.iter()
            .skip(1)
            .map(|r| (r.worker_class.clone(), r.arg_values.clone(), r.next_id))
            .collect()
    };
    assert_eq!(shape(&via_call), shape(&direct));
}

/* ===================== Properties ===================== */

#[test]
fn test_ids_are_contiguous_with_single_root() {
    let node = parse(
        r#"
        Worker1 :first_arguments
        batch first_arguments: :first_argument do
          BatchNestedChild :first_argument do
            Worker1 :first_argument
          end
        end
        Worker3
        "#,
    )
    .unwrap();
    let records = compile(
        &node,
        &first_arguments(json!([1, 2, 3])),
        &registry_with_nested_child(),
    )
    .unwrap();

    let ids: Vec<u32> = records.ids().collect();
    let expected: Vec<u32> = (1..=records.len() as u32).collect();
    assert_eq!(ids, expected);
    assert_eq!(records.iter().filter(|r| r.parent_id.is_none()).count(), 1);

    for r in records.iter() {
        assert_eq!(r.arg_keys.len(), r.arg_values.len());
        if let Some(parent) = r.parent_id {
            assert!(parent < r.id, "record {} allocated before its parent", r.id);
        }
    }
}

#[test]
fn test_compilation_is_deterministic() {
    let node = parse(
        r#"
        batch first_arguments: :first_argument do
          BatchNestedChild :first_argument
          Worker1 :first_argument
        end
        "#,
    )
    .unwrap();
    let registry = registry_with_nested_child();
    let args = first_arguments(json!([1, 2, 3, 4]));

    let first = compile(&node, &args, &registry).unwrap();
    let second = compile(&node, &args, &registry).unwrap();

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

/* ===================== Errors ===================== */

#[test]
fn test_unknown_worker_fails_fast_under_empty_batch() {
    let node = batch("items", "item").body(call("Nope").param("item"));
    let err = compile(&node, &btreemap! {"items".to_string() => json!([])}, &registry()).unwrap_err();

    assert_eq!(
        err,
        CompileError::UnknownWorker {
            name: "Nope".to_string()
        }
    );
}

#[test]
fn test_leaf_does_not_resolve_superworkers() {
    let registry = registry_with_nested_child();
    let node = leaf("BatchNestedChild").param("first_argument").build();

    let err = compile(&node, &Args::new(), &registry).unwrap_err();
    assert!(matches!(err, CompileError::UnknownWorker { .. }));
}

#[test]
fn test_unknown_worker_inside_registered_body() {
    let mut registry = registry();
    registry
        .register("Broken", vec![], call("Missing").build())
        .unwrap();

    let err = compile(&call("Broken").build(), &Args::new(), &registry).unwrap_err();
    assert_eq!(err, CompileError::unknown_worker("Missing"));
}

#[test]
fn test_unequal_lists_are_rejected() {
    let node = batch("a", "x").bind("b", "y").body(call("Worker1").param("x"));
    let args = btreemap! {
        "a".to_string() => json!([1, 2, 3]),
        "b".to_string() => json!([1, 2]),
    };

    assert_eq!(
        compile(&node, &args, &registry()).unwrap_err(),
        CompileError::ArgumentCountMismatch {
            list: "b".to_string(),
            expected: 3,
            found: 2,
        }
    );
}

#[test]
fn test_batch_over_non_list() {
    let node = batch("a", "x").body(call("Worker1").param("x"));
    let args = btreemap! {"a".to_string() => json!("nope")};

    assert_eq!(
        compile(&node, &args, &registry()).unwrap_err(),
        CompileError::NotAList {
            name: "a".to_string(),
            found: "string".to_string(),
        }
    );
}

#[test]
fn test_unbound_parameter() {
    let node = call("Worker1").param("missing").build();

    assert_eq!(
        compile(&node, &Args::new(), &registry()).unwrap_err(),
        CompileError::unbound("missing")
    );
}

#[test]
fn test_arity_mismatch() {
    let registry = registry_with_nested_child();
    let node = call("BatchNestedChild").build();

    assert_eq!(
        compile(&node, &Args::new(), &registry).unwrap_err(),
        CompileError::ArityMismatch {
            name: "BatchNestedChild".to_string(),
            expected: 1,
            found: 0,
        }
    );
}

#[test]
fn test_recursive_definition() {
    let mut registry = registry();
    registry
        .register("Ping", vec![], call("Pong").build())
        .unwrap();
    registry
        .register("Pong", vec![], call("Ping").build())
        .unwrap();

    let err = compile(&call("Ping").build(), &Args::new(), &registry).unwrap_err();
    assert_eq!(
        err,
        CompileError::RecursiveDefinition {
            chain: "Ping -> Pong -> Ping".to_string()
        }
    );
}

#[test]
fn test_repeated_superworker_is_not_recursion() {
    let registry = registry_with_nested_child();
    let node = sequence([
        call("BatchNestedChild").param("v").build(),
        call("BatchNestedChild").param("v").build(),
    ]);

    let records = compile(&node, &btreemap! {"v".to_string() => json!(1)}, &registry).unwrap();
    assert_eq!(records.len(), 1 + 3 + 3);
}

#[test]
fn test_malformed_builder_trees() {
    let empty = Node::Sequence {
        steps: vec![],
        span: Default::default(),
    };
    assert!(matches!(
        compile(&empty, &Args::new(), &registry()),
        Err(CompileError::MalformedDefinition { .. })
    ));

    let unbound_batch = Node::Batch {
        bindings: vec![],
        body: Box::new(call("Worker1").build()),
        span: Default::default(),
    };
    assert!(matches!(
        compile(&unbound_batch, &Args::new(), &registry()),
        Err(CompileError::MalformedDefinition { .. })
    ));
}

#[test]
fn test_compile_definition_unknown_name() {
    assert_eq!(
        compile_definition("Nope", &Args::new(), &registry()).unwrap_err(),
        CompileError::unknown_worker("Nope")
    );
}
