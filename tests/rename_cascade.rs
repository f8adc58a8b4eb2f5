//! End-to-end rename cascade scenarios across both namespaces.

mod common;

use beadstore::model::{Dependency, DependencyType, EventType, Status};
use common::{create_issue, create_wisp, link_parent_child, workspace};

#[test]
fn rename_with_wisp_references_leaves_no_trace_of_old_id() {
    let mut ws = workspace();
    let old_id = create_issue(&mut ws.store, "Anchor issue", Status::Open);

    // Three wisp dependencies and one wisp label referencing the issue
    for i in 0..3 {
        let wisp_id = create_wisp(&mut ws.store, &format!("Patrol wisp {i}"));
        ws.store
            .add_wisp_dependency(
                &Dependency::new(wisp_id, old_id.clone(), DependencyType::DiscoveredFrom),
                "test",
            )
            .unwrap();
    }
    let cross_wisp = create_wisp(&mut ws.store, "Labelled wisp");
    ws.store.add_wisp_label(&cross_wisp, "seen", "test").unwrap();
    // A wisp label row keyed by the permanent issue ID (cross-namespace)
    ws.store.add_wisp_label(&old_id, "cross-ref", "test").unwrap();

    let issue = ws.store.get_issue(&old_id).unwrap().unwrap();
    ws.store
        .update_issue_id(&old_id, "bd-renamed1", &issue, "renamer")
        .unwrap();

    // Zero rows reference the old ID anywhere
    assert!(ws.store.get_issue(&old_id).unwrap().is_none());
    assert!(ws.store.get_wisp_labels(&old_id).unwrap().is_empty());

    // Correct counts reference the new ID
    let moved = ws.store.get_issue("bd-renamed1").unwrap().unwrap();
    assert_eq!(moved.title, "Anchor issue");
    assert_eq!(ws.store.get_wisp_labels("bd-renamed1").unwrap(), vec!["cross-ref"]);

    // Exactly one renamed event under the new ID
    let renames: Vec<_> = ws
        .store
        .get_events("bd-renamed1", 0)
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == EventType::Renamed)
        .collect();
    assert_eq!(renames.len(), 1);
    assert_eq!(renames[0].old_value.as_deref(), Some(old_id.as_str()));
    assert_eq!(renames[0].new_value.as_deref(), Some("bd-renamed1"));
}

#[test]
fn rename_preserves_dependency_graph_shape() {
    let mut ws = workspace();
    let parent = create_issue(&mut ws.store, "Parent", Status::Open);
    let child = create_issue(&mut ws.store, "Child", Status::Open);
    let blocker = create_issue(&mut ws.store, "Blocker", Status::Open);
    link_parent_child(&mut ws.store, &child, &parent);
    ws.store
        .add_dependency(
            &Dependency::new(parent.clone(), blocker.clone(), DependencyType::Blocks),
            "test",
        )
        .unwrap();

    let issue = ws.store.get_issue(&parent).unwrap().unwrap();
    ws.store
        .update_issue_id(&parent, "bd-newroot1", &issue, "renamer")
        .unwrap();

    // The child now points at the renamed parent
    assert_eq!(
        ws.store.get_parent_id(&child).unwrap().as_deref(),
        Some("bd-newroot1")
    );
    // The renamed parent still blocks on its blocker
    let deps = ws.store.get_dependencies("bd-newroot1").unwrap();
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].depends_on_id, blocker);
}

#[test]
fn rename_consecutive_chain_keeps_single_identity() {
    let mut ws = workspace();
    let first = create_issue(&mut ws.store, "Traveller", Status::Open);
    ws.store.add_label(&first, "sticky", "test").unwrap();

    let issue = ws.store.get_issue(&first).unwrap().unwrap();
    ws.store
        .update_issue_id(&first, "bd-hop1", &issue, "renamer")
        .unwrap();
    let issue = ws.store.get_issue("bd-hop1").unwrap().unwrap();
    ws.store
        .update_issue_id("bd-hop1", "bd-hop2", &issue, "renamer")
        .unwrap();

    assert!(ws.store.get_issue(&first).unwrap().is_none());
    assert!(ws.store.get_issue("bd-hop1").unwrap().is_none());
    assert_eq!(ws.store.get_labels("bd-hop2").unwrap(), vec!["sticky"]);

    // Each hop left exactly one renamed event; both live under the
    // final ID now
    let renames = ws
        .store
        .get_events("bd-hop2", 0)
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == EventType::Renamed)
        .count();
    assert_eq!(renames, 2);
}

#[test]
fn wisp_rename_stays_in_wisp_namespace() {
    let mut ws = workspace();
    let wisp_id = create_wisp(&mut ws.store, "Mobile wisp");
    ws.store.add_wisp_label(&wisp_id, "hot", "test").unwrap();

    let wisp = ws.store.get_wisp(&wisp_id).unwrap().unwrap();
    ws.store
        .update_issue_id(&wisp_id, "bd-newwisp1", &wisp, "renamer")
        .unwrap();

    assert!(ws.store.is_wisp("bd-newwisp1").unwrap());
    assert!(ws.store.get_wisp(&wisp_id).unwrap().is_none());
    assert_eq!(ws.store.get_wisp_labels("bd-newwisp1").unwrap(), vec!["hot"]);

    let renames: Vec<_> = ws
        .store
        .get_wisp_events("bd-newwisp1", 0)
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == EventType::Renamed)
        .collect();
    assert_eq!(renames.len(), 1);
}

#[test]
fn rename_missing_id_is_not_found_and_store_stays_usable() {
    let mut ws = workspace();
    let issue = beadstore::model::Issue {
        title: "Ghost".to_string(),
        ..beadstore::model::Issue::default()
    };
    assert!(ws
        .store
        .update_issue_id("bd-ghost1", "bd-ghost2", &issue, "renamer")
        .is_err());

    // Enforcement was restored: a label for a missing issue is rejected
    let err = ws.store.add_label("bd-ghost1", "x", "test");
    assert!(err.is_err());

    // And ordinary writes still work
    let id = create_issue(&mut ws.store, "Alive", Status::Open);
    assert!(ws.store.add_label(&id, "ok", "test").unwrap());
}
