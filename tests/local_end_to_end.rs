// tests/local_end_to_end.rs
//
// Runs the real launch stub and runtime library with bash on this machine,
// using a temp directory as the "remote" task directory.

mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use common::{FAST_POLL, TaskDirBuilder, launcher, names, with_timeout};
use taskship::bundle::FileBundler;
use taskship::plan::TaskPlan;
use taskship::remote::{
    LaunchOptions, LaunchOutcome, Launcher, LocalTransport, RemoteLayout, Transport,
};
use taskship::status;
use taskship::types::TaskStatus;

struct Host {
    dir: TaskDirBuilder,
    transport: Arc<LocalTransport>,
    layout: RemoteLayout,
}

impl Host {
    fn new(dir: TaskDirBuilder) -> Self {
        let transport = Arc::new(LocalTransport::with_home(dir.home_dir()));
        let layout = RemoteLayout::new(dir.remote_dir().display().to_string());
        Self {
            dir,
            transport,
            layout,
        }
    }

    fn launcher(&self) -> Launcher {
        launcher(self.transport.clone(), self.layout.base())
    }

    async fn run(&self, requested: &[&str]) -> std::collections::BTreeMap<String, TaskStatus> {
        let plan = TaskPlan::resolve(&self.dir.loader(), &names(requested), &[]).unwrap();
        let bundler = FileBundler::new(self.dir.cache_dir(), 2);
        let report = plan.launch(&bundler, &self.launcher()).await.unwrap();
        assert!(report.is_success(), "launch failed: {report:?}");
        plan.join(&report, self.transport.as_ref(), &self.layout, FAST_POLL)
            .await
            .unwrap()
    }

    async fn output_of(&self, task: &str) -> String {
        self.transport
            .read_file(&self.layout.file(task, "output"))
            .await
            .unwrap()
            .unwrap_or_default()
    }
}

#[tokio::test]
async fn dependent_waits_for_its_dependency() {
    common::init_tracing();
    let host = Host::new(
        TaskDirBuilder::new()
            .with_task("a", "sleep 0.3\necho ready >\"$TASK_BASE_DIR/marker\"\n")
            .with_task("b", "DEPENDS_ON a\ncat \"$TASK_BASE_DIR/marker\"\n"),
    );

    let statuses = with_timeout(host.run(&["b"])).await;

    assert_eq!(statuses.get("a"), Some(&TaskStatus::Succeeded));
    assert_eq!(statuses.get("b"), Some(&TaskStatus::Succeeded));
    assert!(host.output_of("b").await.contains("ready"));
    assert!(!host.dir.remote_dir().join("b").join("wait").exists());
    assert!(!host.dir.remote_dir().join("b").join("pid").exists());
}

#[tokio::test]
async fn dependency_failure_propagates() {
    let host = Host::new(
        TaskDirBuilder::new()
            .with_task("a", "exit 7\n")
            .with_task("b", "DEPENDS_ON a\necho never\n"),
    );

    let statuses = with_timeout(host.run(&["b"])).await;

    assert_eq!(statuses.get("a"), Some(&TaskStatus::Failed(7)));
    assert_eq!(statuses.get("b"), Some(&TaskStatus::Failed(1)));
    assert!(host.output_of("b").await.contains("dependency a failed with status 7"));
}

#[tokio::test]
async fn run_once_skips_after_success() {
    let host = Host::new(
        TaskDirBuilder::new().with_task("once", "RUN_ONCE\necho ran >>\"$HOME/once.log\"\n"),
    );

    for _ in 0..2 {
        let statuses = with_timeout(host.run(&["once"])).await;
        assert_eq!(statuses.get("once"), Some(&TaskStatus::Succeeded));
    }

    let log = fs::read_to_string(host.dir.home_dir().join("once.log")).unwrap();
    assert_eq!(log.lines().count(), 1);
    assert_eq!(
        fs::read_to_string(host.dir.remote_dir().join("once").join("status.old"))
            .unwrap()
            .trim(),
        "0"
    );
}

#[tokio::test]
async fn run_once_retries_after_failure() {
    let host = Host::new(TaskDirBuilder::new().with_task(
        "flaky",
        "RUN_ONCE\necho try >>\"$HOME/tries.log\"\n[ -f \"$HOME/fixed\" ]\n",
    ));

    let first = with_timeout(host.run(&["flaky"])).await;
    assert_eq!(first.get("flaky"), Some(&TaskStatus::Failed(1)));

    fs::write(host.dir.home_dir().join("fixed"), "").unwrap();
    let second = with_timeout(host.run(&["flaky"])).await;
    assert_eq!(second.get("flaky"), Some(&TaskStatus::Succeeded));

    let log = fs::read_to_string(host.dir.home_dir().join("tries.log")).unwrap();
    assert_eq!(log.lines().count(), 2);
}

#[tokio::test]
async fn timeout_is_reported_as_timed_out() {
    let host = Host::new(TaskDirBuilder::new().with_task("slow", "sleep 20\n"));
    let launcher = Launcher::new(
        host.transport.clone(),
        host.layout.clone(),
        LaunchOptions {
            timeout: Duration::from_secs(1),
            kill_after: Duration::from_secs(1),
            poll_interval: FAST_POLL,
            workers: 1,
        },
    );

    let plan = TaskPlan::resolve(&host.dir.loader(), &names(&["slow"]), &[]).unwrap();
    let bundler = FileBundler::new(host.dir.cache_dir(), 1);
    let report = with_timeout(plan.launch(&bundler, &launcher)).await.unwrap();
    assert_eq!(report.outcome("slow"), Some(&LaunchOutcome::Started));

    let statuses = with_timeout(plan.join(
        &report,
        host.transport.as_ref(),
        &host.layout,
        FAST_POLL,
    ))
    .await
    .unwrap();
    assert_eq!(statuses.get("slow"), Some(&TaskStatus::TimedOut));
    assert_eq!(status::failures(&statuses).len(), 1);
}

#[tokio::test]
async fn task_ignoring_sigterm_is_killed_and_reported_as_timed_out() {
    let host = Host::new(
        TaskDirBuilder::new().with_task("stubborn", "trap '' TERM
while true; do sleep 0.2; done
"),
    );
    let launcher = Launcher::new(
        host.transport.clone(),
        host.layout.clone(),
        LaunchOptions {
            timeout: Duration::from_secs(1),
            kill_after: Duration::from_secs(1),
            poll_interval: FAST_POLL,
            workers: 1,
        },
    );

    let plan = TaskPlan::resolve(&host.dir.loader(), &names(&["stubborn"]), &[]).unwrap();
    let bundler = FileBundler::new(host.dir.cache_dir(), 1);
    let report = with_timeout(plan.launch(&bundler, &launcher)).await.unwrap();
    assert_eq!(report.outcome("stubborn"), Some(&LaunchOutcome::Started));

    let statuses = with_timeout(plan.join(
        &report,
        host.transport.as_ref(),
        &host.layout,
        FAST_POLL,
    ))
    .await
    .unwrap();
    assert_eq!(statuses.get("stubborn"), Some(&TaskStatus::TimedOut));
    assert_eq!(
        fs::read_to_string(host.dir.remote_dir().join("stubborn").join("status"))
            .unwrap()
            .trim(),
        "124"
    );
}

#[tokio::test]
async fn task_exiting_137_on_its_own_is_a_failure() {
    let host = Host::new(TaskDirBuilder::new().with_task("oom", "exit 137
"));

    let statuses = with_timeout(host.run(&["oom"])).await;

    assert_eq!(statuses.get("oom"), Some(&TaskStatus::Failed(137)));
}

#[tokio::test]
async fn relaunching_a_live_task_is_refused() {
    let host = Host::new(TaskDirBuilder::new().with_task("busy", "sleep 1\n"));
    let plan = TaskPlan::resolve(&host.dir.loader(), &names(&["busy"]), &[]).unwrap();
    let bundler = FileBundler::new(host.dir.cache_dir(), 1);

    let first = with_timeout(plan.launch(&bundler, &host.launcher())).await.unwrap();
    assert_eq!(first.outcome("busy"), Some(&LaunchOutcome::Started));

    let running = status::query_status(host.transport.as_ref(), &host.layout, &names(&["busy"]))
        .await
        .unwrap();
    assert!(matches!(running.get("busy"), Some(TaskStatus::Running { pid: Some(_) })));

    let second = with_timeout(plan.launch(&bundler, &host.launcher())).await.unwrap();
    assert_eq!(second.outcome("busy"), Some(&LaunchOutcome::AlreadyRunning));

    let done = with_timeout(plan.join(
        &second,
        host.transport.as_ref(),
        &host.layout,
        FAST_POLL,
    ))
    .await
    .unwrap();
    assert_eq!(done.get("busy"), Some(&TaskStatus::Succeeded));
}

#[tokio::test]
async fn user_archive_is_extracted_into_home_before_the_body_runs() {
    let dir = TaskDirBuilder::new();
    let conf = dir.data_file("app/app.conf", "answer=42\n");
    let dir = dir.with_task(
        "configure",
        &format!(
            "INCLUDE_FILE {} ~/conf/app.conf\ngrep -q answer=42 \"$HOME/conf/app.conf\"\n",
            conf.display()
        ),
    );
    let host = Host::new(dir);

    let statuses = with_timeout(host.run(&["configure"])).await;

    assert_eq!(statuses.get("configure"), Some(&TaskStatus::Succeeded));
    assert!(host.dir.remote_dir().join("configure/files/user.tar.gz").is_file());
    assert_eq!(
        fs::read_to_string(host.dir.home_dir().join("conf/app.conf")).unwrap(),
        "answer=42\n"
    );
}

#[tokio::test]
async fn waiting_task_reports_its_dependency() {
    let host = Host::new(
        TaskDirBuilder::new()
            .with_task("a", "sleep 1.5\n")
            .with_task("b", "DEPENDS_ON a\necho b\n"),
    );
    let plan = TaskPlan::resolve(&host.dir.loader(), &names(&["b"]), &[]).unwrap();
    let bundler = FileBundler::new(host.dir.cache_dir(), 2);
    let report = with_timeout(plan.launch(&bundler, &host.launcher())).await.unwrap();
    assert!(report.is_success());

    let observed = with_timeout(async {
        loop {
            let now = status::query_status(host.transport.as_ref(), &host.layout, &names(&["b"]))
                .await
                .unwrap();
            if now.get("b") == Some(&TaskStatus::WaitingOn("a".into())) {
                break true;
            }
            tokio::time::sleep(FAST_POLL).await;
        }
    })
    .await;
    assert!(observed);

    let done = with_timeout(plan.join(
        &report,
        host.transport.as_ref(),
        &host.layout,
        FAST_POLL,
    ))
    .await
    .unwrap();
    assert_eq!(done.get("b"), Some(&TaskStatus::Succeeded));
}
