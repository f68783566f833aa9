#![forbid(unsafe_code)]

use rusqlite::Connection;
use std::path::PathBuf;
use toc_core::{
    ActorId, BookId, ConflictStage, EngineConfig, ItemDraft, ItemId, MutationOperation,
    MutationRequest, MutationResult, OutlineStore, Placement, RejectReason, RetryPolicy,
    TocEngine, ValidationReason,
};
use toc_storage::{SqliteStore, StoreError};

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("toc_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn book() -> BookId {
    BookId::try_new("book-42").expect("book id")
}

fn id(value: &str) -> ItemId {
    ItemId::try_new(value).expect("item id")
}

fn engine(dir: &PathBuf) -> TocEngine<SqliteStore> {
    let store = SqliteStore::open(dir).expect("open store");
    let config = EngineConfig {
        retry: RetryPolicy::no_delay(3),
        ..EngineConfig::default()
    };
    TocEngine::new(store, config)
}

fn request(base_version: u64, operations: Vec<MutationOperation>) -> MutationRequest {
    MutationRequest {
        book_id: book(),
        base_version,
        operations,
        actor_id: ActorId::try_new("author-1").expect("actor id"),
    }
}

fn insert(value: &str, parent: Option<&str>) -> MutationOperation {
    let mut item = ItemDraft::new(id(value), format!("Chapter {value}"));
    item.word_count = 1200;
    item.estimated_reading_time = 6;
    MutationOperation::Insert {
        item,
        parent_id: parent.map(id),
        placement: Placement::Last,
    }
}

fn layout(engine: &TocEngine<SqliteStore>) -> Vec<(String, Option<String>, u32, u32)> {
    let state = engine.outline(&book()).expect("load outline");
    state
        .items()
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

fn row(id: &str, parent: Option<&str>, level: u32, order: u32) -> (String, Option<String>, u32, u32) {
    (id.to_string(), parent.map(str::to_string), level, order)
}

#[test]
fn reorder_persists_with_audit_record() {
    let dir = temp_dir("reorder_persists_with_audit_record");
    let mut engine = engine(&dir);
    let init = engine
        .submit(request(0, vec![insert("a", None), insert("b", None)]))
        .expect("init");
    assert_eq!(init.new_version(), Some(1));

    let result = engine
        .submit(request(
            1,
            vec![MutationOperation::Reorder {
                id: id("b"),
                placement: Placement::Before(id("a")),
            }],
        ))
        .expect("reorder");
    let MutationResult::Applied {
        new_version,
        applied_ops,
        audit_id,
    } = result
    else {
        panic!("expected applied, got {result:?}");
    };
    assert_eq!(new_version, 2);
    assert_eq!(
        applied_ops,
        vec![MutationOperation::Reorder {
            id: id("b"),
            placement: Placement::Index(1),
        }]
    );
    assert_eq!(layout(&engine), vec![row("b", None, 1, 1), row("a", None, 1, 2)]);

    let record = engine
        .store()
        .audit_record(&book(), 2)
        .expect("audit read")
        .expect("audit record v2");
    assert_eq!(record.id, audit_id);
    assert_eq!((record.base_version, record.new_version), (1, 2));
    assert_eq!(record.operations_applied, applied_ops);
    assert_eq!(
        record.inverse_operations,
        vec![MutationOperation::Reorder {
            id: id("b"),
            placement: Placement::Index(2),
        }]
    );

    drop(engine);
    let reopened = self::engine(&dir);
    assert_eq!(reopened.outline(&book()).expect("reload").version(), 2);
    assert_eq!(layout(&reopened), vec![row("b", None, 1, 1), row("a", None, 1, 2)]);
}

#[test]
fn stale_session_conflicts_across_connections() {
    let dir = temp_dir("stale_session_conflicts_across_connections");
    let mut session_1 = engine(&dir);
    session_1
        .submit(request(0, vec![insert("a", None), insert("b", None)]))
        .expect("init");
    let mut session_2 = engine(&dir);

    let rename = session_1
        .submit(request(
            1,
            vec![MutationOperation::Rename {
                id: id("a"),
                title: "Opening".to_string(),
            }],
        ))
        .expect("rename");
    assert_eq!(rename.new_version(), Some(2));

    let delete = session_2
        .submit(request(1, vec![MutationOperation::Delete { id: id("a") }]))
        .expect("delete");
    match delete {
        MutationResult::Conflict {
            current_version,
            current_outline,
            stage,
        } => {
            assert_eq!(current_version, 2);
            assert_eq!(stage, ConflictStage::PreCheck);
            let outline = current_outline.expect("current outline");
            assert_eq!(
                outline.item(&id("a")).map(|item| item.title.as_str()),
                Some("Opening")
            );
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert!(layout(&session_1).iter().any(|(item, ..)| item == "a"));
    assert_eq!(
        session_2.audit_log(&book(), 0, 10).expect("audit log").len(),
        2
    );
}

#[test]
fn cycle_is_rejected_without_writing() {
    let dir = temp_dir("cycle_is_rejected_without_writing");
    let mut engine = engine(&dir);
    engine
        .submit(request(0, vec![insert("c", None), insert("c1", Some("c"))]))
        .expect("init");

    let result = engine
        .submit(request(
            1,
            vec![MutationOperation::Move {
                id: id("c"),
                new_parent_id: Some(id("c1")),
                placement: Placement::Last,
            }],
        ))
        .expect("move");
    match result {
        MutationResult::Rejected {
            reason: RejectReason::Validation(err),
        } => {
            assert_eq!(err.op_index, Some(0));
            assert_eq!(
                err.reason,
                ValidationReason::CycleDetected {
                    id: id("c"),
                    new_parent_id: id("c1"),
                }
            );
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(engine.outline(&book()).expect("load").version(), 1);
    assert_eq!(engine.audit_log(&book(), 0, 10).expect("audit log").len(), 1);
}

#[test]
fn cascade_delete_is_one_transition_and_undo_restores_it() {
    let dir = temp_dir("cascade_delete_is_one_transition_and_undo_restores_it");
    let mut engine = engine(&dir);
    engine
        .submit(request(
            0,
            vec![
                insert("a", None),
                insert("a1", Some("a")),
                insert("a1x", Some("a1")),
                insert("a2", Some("a")),
                insert("b", None),
            ],
        ))
        .expect("init");
    let before = engine
        .outline(&book())
        .expect("load")
        .into_outline()
        .expect("active");

    let deleted = engine
        .submit(request(1, vec![MutationOperation::Delete { id: id("a") }]))
        .expect("delete");
    assert_eq!(deleted.new_version(), Some(2));
    assert_eq!(layout(&engine), vec![row("b", None, 1, 1)]);
    assert_eq!(engine.audit_log(&book(), 1, 10).expect("audit log").len(), 1);

    let undo = engine
        .undo_last(&book(), 2, ActorId::try_new("editor").expect("actor id"))
        .expect("undo");
    assert_eq!(undo.new_version(), Some(3));
    let after = engine
        .outline(&book())
        .expect("load")
        .into_outline()
        .expect("active");
    assert!(after.content_eq(&before));
    assert_eq!(after.version, 3);
    let restored = after.item(&id("a1x")).expect("a1x restored");
    assert_eq!((restored.word_count, restored.estimated_reading_time), (1200, 6));
}

#[test]
fn audit_log_pages_by_version() {
    let dir = temp_dir("audit_log_pages_by_version");
    let mut engine = engine(&dir);
    engine
        .submit(request(0, vec![insert("a", None)]))
        .expect("init");
    for (base, title) in [(1, "One"), (2, "Two"), (3, "Three")] {
        let result = engine
            .submit(request(
                base,
                vec![MutationOperation::Rename {
                    id: id("a"),
                    title: title.to_string(),
                }],
            ))
            .expect("rename");
        assert_eq!(result.new_version(), Some(base + 1));
    }

    let all = engine.audit_log(&book(), 0, 100).expect("audit log");
    let transitions = all
        .iter()
        .map(|record| (record.base_version, record.new_version))
        .collect::<Vec<_>>();
    assert_eq!(transitions, vec![(0, 1), (1, 2), (2, 3), (3, 4)]);

    let page = engine.audit_log(&book(), 2, 1).expect("audit page");
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].new_version, 3);
    assert!(engine.store().audit_record(&book(), 9).expect("read").is_none());
}

#[test]
fn deleted_book_stays_deleted() {
    let dir = temp_dir("deleted_book_stays_deleted");
    let mut engine = engine(&dir);
    engine
        .submit(request(0, vec![insert("a", None)]))
        .expect("init");
    assert!(engine.delete_book(&book()).expect("delete book"));
    assert!(!engine.delete_book(&book()).expect("delete again"));

    drop(engine);
    let mut engine = self::engine(&dir);
    assert!(engine.outline(&book()).expect("load").is_deleted());
    assert!(engine.audit_log(&book(), 0, 10).expect("audit").is_empty());
    for base in [0, 1] {
        assert_eq!(
            engine
                .submit(request(base, vec![insert("z", None)]))
                .expect("submit"),
            MutationResult::Rejected {
                reason: RejectReason::BookDeleted
            }
        );
    }
}

#[test]
fn corrupt_rows_surface_as_fatal() {
    let dir = temp_dir("corrupt_rows_surface_as_fatal");
    let mut engine = engine(&dir);
    engine
        .submit(request(0, vec![insert("a", None), insert("b", None)]))
        .expect("init");
    drop(engine);

    let conn = Connection::open(dir.join("toc_outline.db")).expect("open raw db");
    conn.execute(
        "UPDATE outline_items SET ord=7 WHERE item_id='b'",
        [],
    )
    .expect("corrupt order");
    drop(conn);

    let mut engine = self::engine(&dir);
    let err = engine
        .submit(request(1, vec![MutationOperation::Delete { id: id("a") }]))
        .expect_err("expected fatal");
    assert!(matches!(err, toc_core::EngineError::Fatal(_)), "got {err:?}");
}

#[test]
fn foreign_database_is_refused() {
    let dir = temp_dir("foreign_database_is_refused");
    let conn = Connection::open(dir.join("toc_outline.db")).expect("open raw db");
    conn.execute_batch("CREATE TABLE something_else (id INTEGER PRIMARY KEY);")
        .expect("create table");
    drop(conn);

    let err = SqliteStore::open(&dir).expect_err("expected refusal");
    match err {
        StoreError::InvalidInput(msg) => {
            assert_eq!(msg, "RESET_REQUIRED: required table is missing");
        }
        other => panic!("expected InvalidInput error, got {other:?}"),
    }
}
