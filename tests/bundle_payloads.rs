// tests/bundle_payloads.rs

mod common;

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::time::{Duration, SystemTime};

use common::{TaskDirBuilder, names};
use filetime::FileTime;
use flate2::read::GzDecoder;
use taskship::bundle::FileBundler;
use taskship::errors::TaskshipError;
use taskship::plan::TaskPlan;
use taskship::types::ArchiveGroup;

fn archive_entries(path: &std::path::Path) -> BTreeSet<String> {
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(path).unwrap()));
    archive
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().display().to_string())
        .collect()
}

#[tokio::test]
async fn include_files_are_split_into_user_and_system_archives() {
    let dir = TaskDirBuilder::new();
    let rc = dir.data_file("dotfiles/.bashrc", "alias ll='ls -l'\n");
    dir.data_file("units/a.service", "[Unit]\n");
    dir.data_file("units/b.service", "[Unit]\n");
    dir.data_file("units/notes.txt", "skip me\n");
    let units = dir.root().join("data/units");

    let dir = dir.with_task(
        "setup",
        &format!(
            "INCLUDE_FILE {} ~/.bashrc\n\
             INCLUDE_FILE {}/*.service /etc/systemd/system/\n\
             MAYBE_INCLUDE_FILE /no/such/file ~/optional\n\
             echo setup\n",
            rc.display(),
            units.display()
        ),
    );

    let plan = TaskPlan::resolve(&dir.loader(), &names(&["setup"]), &[]).unwrap();
    let bundler = FileBundler::new(dir.cache_dir(), 2);
    let manifests = plan.bundle(&bundler).await.unwrap();

    let files = &manifests["setup"].files;
    assert_eq!(files.len(), 2);

    let user = bundler.cache().archive_path("setup", ArchiveGroup::User);
    let system = bundler.cache().archive_path("setup", ArchiveGroup::System);
    assert!(files.contains(&user));
    assert!(files.contains(&system));

    assert_eq!(archive_entries(&user), BTreeSet::from([".bashrc".to_string()]));
    assert_eq!(
        archive_entries(&system),
        BTreeSet::from([
            "etc/systemd/system/a.service".to_string(),
            "etc/systemd/system/b.service".to_string(),
        ])
    );
}

#[tokio::test]
async fn archives_are_rebuilt_only_when_sources_change() {
    let dir = TaskDirBuilder::new();
    let conf = dir.data_file("app.conf", "v1\n");
    let dir = dir.with_task("app", &format!("INCLUDE_FILE {} /etc/app.conf\n", conf.display()));

    let plan = TaskPlan::resolve(&dir.loader(), &names(&["app"]), &[]).unwrap();
    let bundler = FileBundler::new(dir.cache_dir(), 1);
    let archive = bundler.cache().archive_path("app", ArchiveGroup::System);

    // Pin the source in the past so the first archive is strictly newer.
    let past = FileTime::from_system_time(SystemTime::now() - Duration::from_secs(3600));
    filetime::set_file_mtime(&conf, past).unwrap();

    plan.bundle(&bundler).await.unwrap();
    let first = fs::metadata(&archive).unwrap().modified().unwrap();

    plan.bundle(&bundler).await.unwrap();
    assert_eq!(fs::metadata(&archive).unwrap().modified().unwrap(), first);

    fs::write(&conf, "v2\n").unwrap();
    let future = FileTime::from_system_time(SystemTime::now() + Duration::from_secs(3600));
    filetime::set_file_mtime(&conf, future).unwrap();

    plan.bundle(&bundler).await.unwrap();
    assert_ne!(fs::metadata(&archive).unwrap().modified().unwrap(), first);
}

#[tokio::test]
async fn missing_required_include_is_a_bundle_error() {
    let dir = TaskDirBuilder::new().with_task("bad", "INCLUDE_FILE /no/such/thing /etc/thing\n");

    let plan = TaskPlan::resolve(&dir.loader(), &names(&["bad"]), &[]).unwrap();
    let bundler = FileBundler::new(dir.cache_dir(), 1);

    match plan.bundle(&bundler).await {
        Err(TaskshipError::Bundle { task, message }) => {
            assert_eq!(task, "bad");
            assert!(message.contains("/no/such/thing"), "{message}");
        }
        other => panic!("Expected Bundle error, got: {other:?}"),
    }
}
