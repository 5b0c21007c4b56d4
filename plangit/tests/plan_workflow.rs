//! Plan workflow against real repositories, once per backend.

use std::cell::RefCell;
use std::fmt;
use std::fs;
use std::path::Path;

use plangit::Error;
use plangit::plan::{PlanWorkflow, Progress, TracingProgress};
use plangit::test_support::{BACKENDS, TestRepo};
use plangit::vcs::Backend;

const PLAN: &str = "docs/plans/2024-01-15-add-auth.md";

#[derive(Default)]
struct Messages(RefCell<Vec<String>>);

impl Progress for Messages {
    fn report(&self, message: fmt::Arguments<'_>) {
        self.0.borrow_mut().push(message.to_string());
    }
}

fn on_master() -> TestRepo {
    let repo = TestRepo::with_initial_commit();
    repo.git(&["branch", "-m", "main", "master"]);
    repo
}

#[test]
fn untracked_plan_gets_its_own_branch_and_commit() {
    for kind in BACKENDS {
        let repo = on_master();
        repo.write(PLAN, "# add auth\n");
        let before = repo.commit_count();

        let backend = repo.open(kind);
        let messages = Messages::default();
        PlanWorkflow::new(&backend, &messages)
            .create_branch_for_plan(Path::new(PLAN))
            .expect("create branch");

        assert_eq!(repo.current_branch(), "add-auth", "{kind:?}");
        assert_eq!(repo.commit_count(), before + 1, "{kind:?}");
        assert!(repo.last_commit_message().contains("add-auth"), "{kind:?}");
        assert!(!backend.file_has_changes(Path::new(PLAN)).expect("status"), "{kind:?}");
        assert_eq!(*messages.0.borrow(), vec!["creating branch: add-auth"]);
    }
}

#[test]
fn unrelated_changes_keep_repository_on_master() {
    for kind in BACKENDS {
        let repo = on_master();
        repo.write(PLAN, "# add auth\n");
        repo.write("README.md", "# edited elsewhere\n");
        let head = repo.head();

        let backend = repo.open(kind);
        let err = PlanWorkflow::new(&backend, &TracingProgress)
            .create_branch_for_plan(Path::new(PLAN))
            .expect_err("dirty");

        assert!(matches!(err, Error::DirtyWorktree { .. }), "{kind:?}: {err:?}");
        assert!(err.to_string().contains("uncommitted changes"), "{kind:?}");
        assert_eq!(repo.current_branch(), "master", "{kind:?}");
        assert_eq!(repo.head(), head, "{kind:?}");
        assert!(!backend.branch_exists("add-auth"), "{kind:?}");
    }
}

#[test]
fn existing_branch_is_switched_to_without_new_commits() {
    for kind in BACKENDS {
        let repo = on_master();
        repo.write(PLAN, "# add auth\n");
        repo.commit_all("plan on master");
        repo.git(&["branch", "add-auth"]);
        let branch_head = repo.git(&["rev-parse", "add-auth"]);

        let backend = repo.open(kind);
        let messages = Messages::default();
        PlanWorkflow::new(&backend, &messages)
            .create_branch_for_plan(Path::new(PLAN))
            .expect("switch");

        assert_eq!(repo.current_branch(), "add-auth", "{kind:?}");
        assert_eq!(repo.head(), branch_head, "{kind:?}");
        assert_eq!(
            *messages.0.borrow(),
            vec!["switching to existing branch: add-auth"]
        );
    }
}

#[test]
fn rerun_on_feature_branch_is_a_no_op() {
    for kind in BACKENDS {
        let repo = on_master();
        repo.write(PLAN, "# add auth\n");
        let backend = repo.open(kind);
        let workflow = PlanWorkflow::new(&backend, &TracingProgress);
        workflow
            .create_branch_for_plan(Path::new(PLAN))
            .expect("first");
        let head = repo.head();
        workflow
            .create_branch_for_plan(Path::new(PLAN))
            .expect("second");
        assert_eq!(repo.head(), head, "{kind:?}");
        assert_eq!(repo.current_branch(), "add-auth", "{kind:?}");
    }
}

#[test]
fn completed_plan_moves_and_commits() {
    for kind in BACKENDS {
        let repo = on_master();
        repo.write(PLAN, "# add auth\n");
        repo.commit_all("add plan");

        let backend = repo.open(kind);
        PlanWorkflow::new(&backend, &TracingProgress)
            .move_plan_to_completed(&repo.join(PLAN))
            .expect("complete");

        assert!(!repo.join(PLAN).exists(), "{kind:?}");
        assert_eq!(
            repo.read("docs/plans/completed/2024-01-15-add-auth.md"),
            "# add auth\n"
        );
        assert_eq!(
            repo.last_commit_message(),
            "move completed plan: 2024-01-15-add-auth.md",
            "{kind:?}"
        );
        assert!(!backend.is_dirty().expect("dirty"), "{kind:?}");
    }
}

#[test]
fn untracked_completed_plan_falls_back_to_rename() {
    for kind in BACKENDS {
        let repo = on_master();
        repo.write(PLAN, "# add auth\n");

        let backend = repo.open(kind);
        PlanWorkflow::new(&backend, &TracingProgress)
            .move_plan_to_completed(Path::new(PLAN))
            .expect("complete");

        assert_eq!(
            repo.git(&["ls-files", "docs/plans"]),
            "docs/plans/completed/2024-01-15-add-auth.md",
            "{kind:?}"
        );
        assert!(!repo.join(PLAN).exists(), "{kind:?}");
    }
}

#[test]
fn archived_plan_with_same_name_is_never_overwritten() {
    const ARCHIVED: &str = "docs/plans/completed/a.md";
    for kind in BACKENDS {
        let repo = on_master();
        repo.write("docs/plans/a.md", "NEW plan\n");
        repo.write(ARCHIVED, "OLD archived plan\n");
        repo.commit_all("plans");
        let before = repo.commit_count();

        let backend = repo.open(kind);
        let messages = Messages::default();
        PlanWorkflow::new(&backend, &messages)
            .move_plan_to_completed(Path::new("docs/plans/a.md"))
            .expect_err("destination exists");

        assert_eq!(repo.read(ARCHIVED), "OLD archived plan\n", "{kind:?}");
        assert_eq!(repo.read("docs/plans/a.md"), "NEW plan\n", "{kind:?}");
        assert_eq!(repo.commit_count(), before, "{kind:?}");
        assert!(messages.0.borrow().is_empty(), "{kind:?}");
    }
}

#[test]
fn untracked_plan_never_replaces_archived_file() {
    const ARCHIVED: &str = "docs/plans/completed/a.md";
    for kind in BACKENDS {
        let repo = on_master();
        repo.write(ARCHIVED, "OLD archived plan\n");
        repo.commit_all("archive");
        repo.write("docs/plans/a.md", "NEW plan\n");
        let before = repo.commit_count();

        let backend = repo.open(kind);
        let err = PlanWorkflow::new(&backend, &TracingProgress)
            .move_plan_to_completed(Path::new("docs/plans/a.md"))
            .expect_err("destination exists");
        assert!(matches!(err, Error::Io { .. }), "{kind:?}: {err:?}");

        assert_eq!(repo.read(ARCHIVED), "OLD archived plan\n", "{kind:?}");
        assert_eq!(repo.commit_count(), before, "{kind:?}");
    }
}

#[test]
fn completion_resumes_after_uncommitted_move() {
    for kind in BACKENDS {
        let repo = on_master();
        repo.write(PLAN, "# add auth\n");
        repo.commit_all("add plan");
        fs::create_dir_all(repo.join("docs/plans/completed")).expect("mkdir");
        repo.git(&["mv", PLAN, "docs/plans/completed/2024-01-15-add-auth.md"]);

        let backend = repo.open(kind);
        PlanWorkflow::new(&backend, &TracingProgress)
            .move_plan_to_completed(Path::new(PLAN))
            .expect("resume");

        assert_eq!(
            repo.last_commit_message(),
            "move completed plan: 2024-01-15-add-auth.md",
            "{kind:?}"
        );
        assert_eq!(
            repo.read("docs/plans/completed/2024-01-15-add-auth.md"),
            "# add auth\n"
        );
        assert!(!backend.is_dirty().expect("dirty"), "{kind:?}");
    }
}

#[test]
fn completion_resumes_after_plain_rename() {
    for kind in BACKENDS {
        let repo = on_master();
        repo.write(PLAN, "# add auth\n");
        repo.commit_all("add plan");
        fs::create_dir_all(repo.join("docs/plans/completed")).expect("mkdir");
        fs::rename(
            repo.join(PLAN),
            repo.join("docs/plans/completed/2024-01-15-add-auth.md"),
        )
        .expect("rename");

        let backend = repo.open(kind);
        PlanWorkflow::new(&backend, &TracingProgress)
            .move_plan_to_completed(Path::new(PLAN))
            .expect("resume");

        assert_eq!(
            repo.git(&["ls-files", "docs/plans"]),
            "docs/plans/completed/2024-01-15-add-auth.md",
            "{kind:?}"
        );
        assert!(!backend.is_dirty().expect("dirty"), "{kind:?}");
    }
}

#[test]
fn bootstrap_creates_initial_commit_when_confirmed() {
    for kind in BACKENDS {
        let repo = TestRepo::new();
        repo.write("README.md", "# new\n");
        let backend = repo.open(kind);
        let workflow = PlanWorkflow::new(&backend, &TracingProgress);

        let err = workflow.ensure_has_commits(|| false).expect_err("declined");
        assert!(matches!(err, Error::NoCommitsDeclined), "{kind:?}");
        assert!(!backend.has_commits().expect("has commits"), "{kind:?}");

        workflow.ensure_has_commits(|| true).expect("bootstrap");
        assert_eq!(repo.last_commit_message(), "initial commit", "{kind:?}");
        workflow
            .ensure_has_commits(|| panic!("already has commits"))
            .expect("idempotent");
    }
}

#[test]
fn bootstrap_of_empty_tree_reports_no_files() {
    for kind in BACKENDS {
        let repo = TestRepo::new();
        let backend = repo.open(kind);
        let err = PlanWorkflow::new(&backend, &TracingProgress)
            .ensure_has_commits(|| true)
            .expect_err("empty");
        assert!(matches!(err, Error::NothingToCommit), "{kind:?}: {err:?}");
    }
}

#[test]
fn ensure_ignored_appends_once() {
    for kind in BACKENDS {
        let repo = TestRepo::with_initial_commit();
        let backend = repo.open(kind);
        let workflow = PlanWorkflow::new(&backend, &TracingProgress);
        let probe = Path::new(".plangit/cache/state.json");

        assert!(workflow.ensure_ignored(".plangit/", probe).expect("first"));
        assert!(backend.is_ignored(probe).expect("ignored"), "{kind:?}");
        assert!(!workflow.ensure_ignored(".plangit/", probe).expect("second"));
        assert_eq!(repo.read(".gitignore"), ".plangit/\n", "{kind:?}");
    }
}
