use super::*;
use crate::model::ItemStatus;
use crate::ops::{ItemDraft, OpKind};

fn id(value: &str) -> ItemId {
    ItemId::try_new(value).unwrap()
}

fn item(value: &str, parent: Option<&str>, level: u32, order: u32) -> OutlineItem {
    OutlineItem {
        id: id(value),
        parent_id: parent.map(id),
        title: format!("Title {value}"),
        description: None,
        level,
        order,
        status: ItemStatus::Draft,
        word_count: 100,
        estimated_reading_time: 1,
        content_ref: None,
    }
}

/// a(1) [a1(1) [a1x(1)], a2(2)], b(2)
fn base() -> Vec<OutlineItem> {
    vec![
        item("a", None, 1, 1),
        item("a1", Some("a"), 2, 1),
        item("a1x", Some("a1"), 3, 1),
        item("a2", Some("a"), 2, 2),
        item("b", None, 1, 2),
    ]
}

fn order_of(items: &[OutlineItem]) -> Vec<(String, Option<String>, u32, u32)> {
    items
        .iter()
        .map(|item| {
            (
                item.id.as_str().to_string(),
                item.parent_id.as_ref().map(|p| p.as_str().to_string()),
                item.level,
                item.order,
            )
        })
        .collect()
}

fn insert(value: &str, parent: Option<&str>, placement: Placement) -> MutationOperation {
    MutationOperation::Insert {
        item: ItemDraft::new(id(value), format!("Title {value}")),
        parent_id: parent.map(id),
        placement,
    }
}

fn rejection(result: Result<MutationPlan, PlanError>) -> ValidationError {
    match result {
        Err(PlanError::Validation(err)) => err,
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn reorder_before_sibling_renumbers_group() {
    let planner = MutationPlanner::default();
    let base = vec![item("a", None, 1, 1), item("b", None, 1, 2)];
    let plan = planner
        .plan(
            &base,
            &[MutationOperation::Reorder {
                id: id("b"),
                placement: Placement::Before(id("a")),
            }],
        )
        .unwrap();

    assert_eq!(
        order_of(&plan.items),
        vec![
            ("b".to_string(), None, 1, 1),
            ("a".to_string(), None, 1, 2)
        ]
    );
    assert_eq!(
        plan.applied_ops,
        vec![MutationOperation::Reorder {
            id: id("b"),
            placement: Placement::Index(1),
        }]
    );
    assert_eq!(plan.upserts.len(), 2);
    assert!(plan.removals.is_empty());
}

#[test]
fn batch_can_reference_items_it_inserted() {
    let planner = MutationPlanner::default();
    let plan = planner
        .plan(
            &base(),
            &[
                insert("c", None, Placement::Last),
                insert("c1", Some("c"), Placement::Last),
                MutationOperation::Reorder {
                    id: id("c"),
                    placement: Placement::First,
                },
                MutationOperation::Rename {
                    id: id("c1"),
                    title: "  Setting the scene  ".to_string(),
                },
            ],
        )
        .unwrap();

    let c = plan.items.iter().find(|item| item.id == id("c")).unwrap();
    assert_eq!((c.level, c.order), (1, 1));
    let c1 = plan.items.iter().find(|item| item.id == id("c1")).unwrap();
    assert_eq!(c1.parent_id, Some(id("c")));
    assert_eq!(c1.level, 2);
    assert_eq!(c1.title, "Setting the scene");

    let roots = plan
        .items
        .iter()
        .filter(|item| item.parent_id.is_none())
        .map(|item| (item.id.as_str().to_string(), item.order))
        .collect::<Vec<_>>();
    assert_eq!(
        roots,
        vec![
            ("c".to_string(), 1),
            ("a".to_string(), 2),
            ("b".to_string(), 3)
        ]
    );
}

#[test]
fn reference_to_item_inserted_later_is_unknown() {
    let planner = MutationPlanner::default();
    let err = rejection(planner.plan(
        &base(),
        &[
            MutationOperation::Rename {
                id: id("late"),
                title: "Too early".to_string(),
            },
            insert("late", None, Placement::Last),
        ],
    ));
    assert_eq!(err.op_index, Some(0));
    assert_eq!(err.op_kind, Some(OpKind::Rename));
    assert_eq!(err.reason, ValidationReason::UnknownItem { id: id("late") });
}

#[test]
fn move_under_own_descendant_is_a_cycle() {
    let planner = MutationPlanner::default();
    let err = rejection(planner.plan(
        &base(),
        &[MutationOperation::Move {
            id: id("a"),
            new_parent_id: Some(id("a1x")),
            placement: Placement::Last,
        }],
    ));
    assert_eq!(
        err,
        ValidationError::at(
            0,
            OpKind::Move,
            ValidationReason::CycleDetected {
                id: id("a"),
                new_parent_id: id("a1x"),
            }
        )
    );

    let err = rejection(planner.plan(
        &base(),
        &[MutationOperation::Move {
            id: id("a1"),
            new_parent_id: Some(id("a1")),
            placement: Placement::Last,
        }],
    ));
    assert!(matches!(err.reason, ValidationReason::CycleDetected { .. }));
}

#[test]
fn delete_cascades_and_inverse_restores_preorder() {
    let planner = MutationPlanner::default();
    let plan = planner
        .plan(&base(), &[MutationOperation::Delete { id: id("a") }])
        .unwrap();

    assert_eq!(
        order_of(&plan.items),
        vec![("b".to_string(), None, 1, 1)]
    );
    let mut removals = plan
        .removals
        .iter()
        .map(|id| id.as_str().to_string())
        .collect::<Vec<_>>();
    removals.sort();
    assert_eq!(removals, vec!["a", "a1", "a1x", "a2"]);

    let reinserted = plan
        .inverse_ops
        .iter()
        .map(|op| op.target().as_str().to_string())
        .collect::<Vec<_>>();
    assert_eq!(reinserted, vec!["a", "a1", "a1x", "a2"]);

    let restored = planner.plan(&plan.items, &plan.inverse_ops).unwrap();
    assert_eq!(restored.items, base());
}

#[test]
fn inverse_of_mixed_batch_restores_content() {
    let planner = MutationPlanner::default();
    let ops = vec![
        MutationOperation::Move {
            id: id("a2"),
            new_parent_id: None,
            placement: Placement::After(id("b")),
        },
        MutationOperation::Rename {
            id: id("b"),
            title: "Renamed".to_string(),
        },
        insert("n", Some("a1"), Placement::First),
        MutationOperation::Reorder {
            id: id("b"),
            placement: Placement::First,
        },
        MutationOperation::Delete { id: id("a1") },
    ];
    let forward = planner.plan(&base(), &ops).unwrap();
    assert!(!forward.items.iter().any(|item| item.id == id("n")));

    let back = planner.plan(&forward.items, &forward.inverse_ops).unwrap();
    assert_eq!(back.items, base());
}

#[test]
fn placement_errors_name_the_operation() {
    let planner = MutationPlanner::default();

    let err = rejection(planner.plan(
        &base(),
        &[MutationOperation::Reorder {
            id: id("a"),
            placement: Placement::Index(3),
        }],
    ));
    assert_eq!(
        err.reason,
        ValidationReason::PositionOutOfRange {
            position: 3,
            max: 2
        }
    );

    let err = rejection(planner.plan(
        &base(),
        &[MutationOperation::Reorder {
            id: id("a"),
            placement: Placement::After(id("a1")),
        }],
    ));
    assert_eq!(err.reason, ValidationReason::InvalidAnchor { anchor: id("a1") });

    let err = rejection(planner.plan(
        &base(),
        &[MutationOperation::Reorder {
            id: id("a"),
            placement: Placement::Before(id("a")),
        }],
    ));
    assert_eq!(err.reason, ValidationReason::AnchorIsTarget { id: id("a") });
}

#[test]
fn titles_and_duplicates_are_validated() {
    let planner = MutationPlanner::new(PlannerLimits {
        max_title_chars: 8,
        ..PlannerLimits::default()
    });

    let err = rejection(planner.plan(
        &base(),
        &[MutationOperation::Rename {
            id: id("a"),
            title: "   ".to_string(),
        }],
    ));
    assert_eq!(err.reason, ValidationReason::EmptyTitle);

    let err = rejection(planner.plan(
        &base(),
        &[MutationOperation::Rename {
            id: id("a"),
            title: "much too long".to_string(),
        }],
    ));
    assert_eq!(err.reason, ValidationReason::TitleTooLong { max: 8 });

    let err = rejection(planner.plan(&base(), &[insert("b", None, Placement::Last)]));
    assert_eq!(err.reason, ValidationReason::DuplicateItem { id: id("b") });
}

#[test]
fn limits_apply_to_batch_depth_and_size() {
    let planner = MutationPlanner::new(PlannerLimits {
        max_operations: 2,
        max_items: 6,
        max_depth: 3,
        max_title_chars: 100,
    });

    let err = rejection(planner.plan(&base(), &[]));
    assert_eq!(err, ValidationError::batch(ValidationReason::EmptyBatch));

    let three = vec![
        MutationOperation::Delete { id: id("b") },
        MutationOperation::Delete { id: id("a2") },
        MutationOperation::Delete { id: id("a1") },
    ];
    let err = rejection(planner.plan(&base(), &three));
    assert_eq!(err.reason, ValidationReason::TooManyOperations { max: 2 });

    let err = rejection(planner.plan(&base(), &[insert("deep", Some("a1x"), Placement::Last)]));
    assert_eq!(err.reason, ValidationReason::DepthExceeded { max: 3 });

    let err = rejection(planner.plan(
        &base(),
        &[MutationOperation::Move {
            id: id("a1"),
            new_parent_id: Some(id("a2")),
            placement: Placement::Last,
        }],
    ));
    assert_eq!(err.reason, ValidationReason::DepthExceeded { max: 3 });

    let err = rejection(planner.plan(
        &base(),
        &[
            insert("x", None, Placement::Last),
            insert("y", None, Placement::Last),
        ],
    ));
    assert_eq!(err.op_index, Some(1));
    assert_eq!(err.reason, ValidationReason::TooManyItems { max: 6 });
}

#[test]
fn corrupt_base_is_not_a_validation_error() {
    let planner = MutationPlanner::default();
    let corrupt = vec![item("a", None, 1, 1), item("b", None, 1, 5)];
    let result = planner.plan(&corrupt, &[MutationOperation::Delete { id: id("a") }]);
    assert!(matches!(result, Err(PlanError::Snapshot(TreeError::OrderGap { .. }))));
}

#[test]
fn unchanged_items_are_not_rewritten() {
    let planner = MutationPlanner::default();
    let plan = planner
        .plan(
            &base(),
            &[MutationOperation::Rename {
                id: id("a2"),
                title: "Fresh".to_string(),
            }],
        )
        .unwrap();
    assert_eq!(plan.upserts.len(), 1);
    assert_eq!(plan.upserts[0].id, id("a2"));
}
