#![allow(dead_code)]

use beadstore::model::{Dependency, DependencyType, Issue, IssueType, Status};
use beadstore::storage::BeadStore;
use tempfile::TempDir;

/// A store backed by a scratch `.beads` directory.
pub struct TestWorkspace {
    pub dir: TempDir,
    pub store: BeadStore,
}

impl TestWorkspace {
    pub fn beads_dir(&self) -> &std::path::Path {
        self.dir.path()
    }
}

/// Open a file-backed store in a scratch directory.
pub fn workspace() -> TestWorkspace {
    let dir = TempDir::new().expect("create scratch dir");
    let store = BeadStore::open(&dir.path().join("beads.db")).expect("open store");
    TestWorkspace { dir, store }
}

/// Create an issue with the given title and status, returning its ID.
pub fn create_issue(store: &mut BeadStore, title: &str, status: Status) -> String {
    let mut issue = Issue {
        title: title.to_string(),
        status,
        ..Issue::default()
    };
    store.create_issue(&mut issue, "test").expect("create issue");
    issue.id
}

/// Create an epic with the given title, returning its ID.
pub fn create_epic(store: &mut BeadStore, title: &str) -> String {
    let mut issue = Issue {
        title: title.to_string(),
        issue_type: IssueType::Epic,
        ..Issue::default()
    };
    store.create_issue(&mut issue, "test").expect("create epic");
    issue.id
}

/// Create a wisp with the given title, returning its ID.
pub fn create_wisp(store: &mut BeadStore, title: &str) -> String {
    let mut wisp = Issue {
        title: title.to_string(),
        ..Issue::default()
    };
    store.create_wisp(&mut wisp, "test").expect("create wisp");
    wisp.id
}

/// Link `child` under `parent` with a parent-child edge.
pub fn link_parent_child(store: &mut BeadStore, child: &str, parent: &str) {
    store
        .add_dependency(
            &Dependency::new(child, parent, DependencyType::ParentChild),
            "test",
        )
        .expect("add parent-child dependency");
}
