mod common;

use common::{record, setup_live, test_owner, wait_until};
use tasksync_core::{StatusFilter, TaskRecord};

fn tagged(mut record: TaskRecord, completed: bool, tags: &[&str]) -> TaskRecord {
    record.completed = completed;
    record.tags = tags.iter().map(|t| t.to_string()).collect();
    record
}

#[tokio::test]
async fn test_unfiltered_view_is_newest_first_and_owner_scoped() {
    let setup = setup_live().await;
    assert!(setup
        .remote
        .push_snapshot(vec![record("mid", 30), record("new", 1), record("old", 90)])
        .await);
    wait_until(|| setup.store.derived_view().len() == 3).await;

    let view = setup.store.derived_view();
    let ids: Vec<String> = view.iter().map(|t| t.id.to_string()).collect();
    assert_eq!(ids, vec!["new", "mid", "old"]);
    assert!(view.iter().all(|t| t.owner_id == test_owner()));
    assert!(view
        .windows(2)
        .all(|pair| pair[0].created_at >= pair[1].created_at));
}

#[tokio::test]
async fn test_status_and_tag_filters_compose() {
    let setup = setup_live().await;
    assert!(setup
        .remote
        .push_snapshot(vec![
            tagged(record("one", 3), false, &["a"]),
            tagged(record("two", 2), true, &["b"]),
            tagged(record("three", 1), false, &["a", "b"]),
        ])
        .await);
    wait_until(|| setup.store.derived_view().len() == 3).await;

    setup.store.set_status_filter(StatusFilter::Active);
    setup.store.set_tag_filter(Some("b".to_string()));

    let view = setup.store.derived_view();
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].id.to_string(), "three");

    // Dropping the tag filter widens the view back to both active tasks.
    setup.store.set_tag_filter(None);
    assert_eq!(setup.store.derived_view().len(), 2);

    setup.store.set_status_filter(StatusFilter::Completed);
    let view = setup.store.derived_view();
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].id.to_string(), "two");

    setup.store.set_status_filter(StatusFilter::All);
    assert_eq!(setup.store.derived_view().len(), 3);
}

#[tokio::test]
async fn test_tag_filter_input_is_normalized_like_stored_tags() {
    let setup = setup_live().await;
    assert!(setup
        .remote
        .push_snapshot(vec![tagged(record("one", 1), false, &["home"])])
        .await);
    wait_until(|| setup.store.derived_view().len() == 1).await;

    setup.store.set_tag_filter(Some("  HOME ".to_string()));
    assert_eq!(setup.store.tag_filter().as_deref(), Some("home"));
    assert_eq!(setup.store.derived_view().len(), 1);

    setup.store.set_tag_filter(Some("   ".to_string()));
    assert!(setup.store.tag_filter().is_none());
}

#[tokio::test]
async fn test_available_tags_come_from_the_unfiltered_collection() {
    let setup = setup_live().await;
    assert!(setup
        .remote
        .push_snapshot(vec![
            tagged(record("one", 1), false, &["home", "urgent"]),
            tagged(record("two", 2), true, &["work", "home"]),
        ])
        .await);
    wait_until(|| setup.store.derived_view().len() == 2).await;

    // Narrow filters do not narrow the tag universe.
    setup.store.set_status_filter(StatusFilter::Active);
    setup.store.set_tag_filter(Some("urgent".to_string()));

    assert_eq!(setup.store.available_tags(), vec!["home", "urgent", "work"]);
}

#[tokio::test]
async fn test_filter_changes_never_touch_the_remote() {
    let setup = setup_live().await;
    assert!(setup
        .remote
        .push_snapshot(vec![tagged(record("one", 1), false, &["home"])])
        .await);
    wait_until(|| setup.store.derived_view().len() == 1).await;

    setup.store.set_status_filter(StatusFilter::Completed);
    setup.store.set_tag_filter(Some("home".to_string()));
    setup.store.set_status_filter(StatusFilter::All);
    setup.store.set_tag_filter(None);

    assert!(setup.remote.created().is_empty());
    assert!(setup.remote.updated().is_empty());
    assert!(setup.remote.deleted().is_empty());
}
