// tests/launcher_fake_transport.rs

mod common;

use std::sync::Arc;

use common::{FAST_POLL, FakeTransport, TaskDirBuilder, launcher, names, with_timeout};
use taskship::bundle::FileBundler;
use taskship::plan::TaskPlan;
use taskship::remote::{LaunchOutcome, RemoteLayout};
use taskship::status;
use taskship::types::TaskStatus;

async fn launch(
    dir: &TaskDirBuilder,
    fake: &FakeTransport,
    requested: &[&str],
) -> (TaskPlan, taskship::remote::LaunchReport) {
    let plan = TaskPlan::resolve(&dir.loader(), &names(requested), &[]).unwrap();
    let bundler = FileBundler::new(dir.cache_dir(), 2);
    let launcher = launcher(Arc::new(fake.clone()), "/tmp/tasks");
    let report = plan.launch(&bundler, &launcher).await.unwrap();
    (plan, report)
}

#[tokio::test]
async fn tasks_start_in_dependency_order_with_payload_copied() {
    common::init_tracing();
    let dir = TaskDirBuilder::new();
    let blob = dir.data_file("blob.bin", "payload");
    let dir = dir
        .with_task("a", &format!("SENDFILE {}\necho a\n", blob.display()))
        .with_task("b", "DEPENDS_ON a\necho b\n");

    let fake = FakeTransport::new();
    let (_, report) = with_timeout(launch(&dir, &fake, &["b"])).await;

    assert!(report.is_success());
    assert_eq!(fake.launched(), names(&["a", "b"]));
    assert_eq!(fake.copies(), vec![(vec![blob], "/tmp/tasks/a/files".to_string())]);

    let script = fake.launch_script("b").unwrap();
    assert!(script.contains("cat <<'TASKSHIP_EOF' >./script\n"));
    assert!(script.contains("DEPENDS_ON a\necho b\n"));
}

#[tokio::test]
async fn failed_start_skips_dependents() {
    let dir = TaskDirBuilder::new()
        .with_task("a", "echo a\n")
        .with_task("b", "DEPENDS_ON a\necho b\n")
        .with_task("c", "echo c\n");

    let fake = FakeTransport::new();
    fake.fail_start("a");
    let (_, report) = with_timeout(launch(&dir, &fake, &["b", "c"])).await;

    assert!(matches!(report.outcome("a"), Some(LaunchOutcome::Failed(_))));
    assert_eq!(
        report.outcome("b"),
        Some(&LaunchOutcome::Skipped { blocked_by: "a".to_string() })
    );
    assert_eq!(report.outcome("c"), Some(&LaunchOutcome::Started));
    assert!(!report.is_success());
    assert_eq!(report.errors().len(), 2);
    let mut launched = fake.launched();
    launched.sort();
    assert_eq!(launched, names(&["a", "c"]));
}

#[tokio::test]
async fn failed_copy_is_reported_per_task() {
    let dir = TaskDirBuilder::new();
    let blob = dir.data_file("x.conf", "x=1");
    let dir = dir
        .with_task("a", &format!("SENDFILE {}\n", blob.display()))
        .with_task("b", "DEPENDS_ON a\n");

    let fake = FakeTransport::new();
    fake.fail_copy("a");
    let (_, report) = with_timeout(launch(&dir, &fake, &["b"])).await;

    match report.outcome("a") {
        Some(LaunchOutcome::Failed(msg)) => assert!(msg.contains("connection reset")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(matches!(report.outcome("b"), Some(LaunchOutcome::Skipped { .. })));
    assert!(fake.launched().is_empty());
}

#[tokio::test]
async fn running_task_is_left_alone_and_dependents_still_start() {
    let dir = TaskDirBuilder::new()
        .with_task("a", "sleep 100\n")
        .with_task("b", "DEPENDS_ON a\n");

    let fake = FakeTransport::new();
    fake.already_running("a");
    let (_, report) = with_timeout(launch(&dir, &fake, &["b"])).await;

    assert_eq!(report.outcome("a"), Some(&LaunchOutcome::AlreadyRunning));
    assert_eq!(report.outcome("b"), Some(&LaunchOutcome::Started));
    assert!(report.is_success());
    assert_eq!(fake.launched(), names(&["b"]));
}

#[tokio::test]
async fn prereq_inserts_a_wait_into_the_successor() {
    let dir = TaskDirBuilder::new()
        .with_task("base", "PREREQ_FOR app\necho base\n")
        .with_task("app", "echo app\n");

    let fake = FakeTransport::new();
    let (plan, report) = with_timeout(launch(&dir, &fake, &["app", "base"])).await;

    assert!(report.is_success());
    assert_eq!(plan.graph().launch_order(), names(&["base", "app"]).as_slice());
    assert!(fake.launch_script("app").unwrap().contains("\nDEPENDS_ON base\necho app\n"));
    assert!(!fake.launch_script("base").unwrap().contains("\nDEPENDS_ON app\n"));
    assert!(plan.dry_run().contains(" - app (depends on: base)\n"));
}

#[tokio::test]
async fn join_reports_remote_failures() {
    let dir = TaskDirBuilder::new()
        .with_task("a", "exit 3\n")
        .with_task("b", "echo b\n");

    let fake = FakeTransport::new().completing_with(3);
    let (plan, report) = with_timeout(launch(&dir, &fake, &["a", "b"])).await;

    let layout = RemoteLayout::new("/tmp/tasks");
    let statuses = with_timeout(plan.join(&report, &fake, &layout, FAST_POLL))
        .await
        .unwrap();
    assert_eq!(statuses.get("a"), Some(&TaskStatus::Failed(3)));
    assert_eq!(status::failures(&statuses).len(), 2);
}

#[tokio::test]
async fn join_leaves_out_tasks_that_never_started() {
    let dir = TaskDirBuilder::new()
        .with_task("a", "echo a\n")
        .with_task("b", "DEPENDS_ON a\necho b\n")
        .with_task("c", "echo c\n");

    let fake = FakeTransport::new().completing_with(0);
    // Leftovers from an earlier successful run.
    fake.set_status("a", 0);
    fake.set_status("b", 0);
    fake.fail_start("a");
    let (plan, report) = with_timeout(launch(&dir, &fake, &["b", "c"])).await;
    assert_eq!(report.live(), names(&["c"]));

    let layout = RemoteLayout::new("/tmp/tasks");
    let statuses = with_timeout(plan.join(&report, &fake, &layout, FAST_POLL))
        .await
        .unwrap();
    assert_eq!(statuses.keys().cloned().collect::<Vec<_>>(), names(&["c"]));
    assert_eq!(statuses.get("c"), Some(&TaskStatus::Succeeded));

    // Preparing moved the stale results aside.
    let leftover = status::query_status(&fake, &layout, &names(&["a", "b"]))
        .await
        .unwrap();
    assert_eq!(leftover.get("a"), Some(&TaskStatus::Missing));
    assert_eq!(leftover.get("b"), Some(&TaskStatus::Missing));
}

#[tokio::test]
async fn join_waits_until_running_tasks_finish() {
    let fake = FakeTransport::new();
    fake.set_state(
        "slow",
        taskship::remote::RemoteTaskState {
            pid: Some("99".into()),
            ..Default::default()
        },
    );

    let finisher = {
        let fake = fake.clone();
        tokio::spawn(async move {
            tokio::time::sleep(FAST_POLL * 3).await;
            fake.set_status("slow", 0);
        })
    };

    let layout = RemoteLayout::new("/tmp/tasks");
    let statuses = with_timeout(status::join(&fake, &layout, &names(&["slow"]), FAST_POLL))
        .await
        .unwrap();
    finisher.await.unwrap();

    assert_eq!(statuses.get("slow"), Some(&TaskStatus::Succeeded));
}

#[tokio::test]
async fn status_lists_everything_and_marks_unknown_tasks_missing() {
    let fake = FakeTransport::new();
    fake.set_status("done", 0);
    fake.set_status("slow", 124);
    fake.set_state(
        "blocked",
        taskship::remote::RemoteTaskState {
            pid: Some("12".into()),
            wait: Some("done".into()),
            ..Default::default()
        },
    );
    let layout = RemoteLayout::new("/tmp/tasks");

    let all = status::query_status(&fake, &layout, &[]).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all.get("slow"), Some(&TaskStatus::TimedOut));
    assert_eq!(all.get("blocked"), Some(&TaskStatus::WaitingOn("done".into())));

    let some = status::query_status(&fake, &layout, &names(&["done", "ghost"]))
        .await
        .unwrap();
    assert_eq!(some.get("ghost"), Some(&TaskStatus::Missing));

    let table = status::render_status_table(&all);
    assert!(table.starts_with("Task     Status\n"));
    assert!(table.contains("slow     TIMED OUT\n"));
}
