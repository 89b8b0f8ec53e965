// src/remote/script.rs

//! Shell text sent to the host: the runtime library, the prepare step and
//! the launch stub.

use std::borrow::Cow;
use std::time::Duration;

use shell_escape::unix::escape;

use crate::remote::state::{
    FILES_DIR, OUTPUT_FILE, PID_FILE, PREVIOUS_STATUS_FILE, RemoteLayout, SCRIPT_FILE,
    STATUS_FILE, WAIT_FILE,
};
use crate::types::{ArchiveGroup, TIMEOUT_EXIT_CODE};

/// Functions and variables every task script can rely on: `DEPENDS_ON`,
/// `RUN_ONCE`, `PKG_INSTALL` and the `OS_*` detection variables.
pub const TASKLIB: &str = include_str!("tasklib.sh");

/// Exit code of the prepare step and launch stub when a live process
/// already owns the task directory.
pub const ALREADY_RUNNING_EXIT_CODE: i32 = 75;

fn quote(s: &str) -> Cow<'_, str> {
    escape(Cow::Borrowed(s))
}

/// A heredoc delimiter that does not occur anywhere in `text`.
pub fn safe_heredoc(text: &str) -> String {
    let mut delim = String::from("TASKSHIP_EOF");
    let mut n = 0u32;
    while text.contains(&delim) {
        n += 1;
        delim = format!("TASKSHIP_EOF_{n}");
    }
    delim
}

/// The text written to `<task dir>/script`.
///
/// `waits` are extra dependencies to block on before the body runs (the
/// `PREREQ_FOR` edges the body does not declare itself).
pub fn task_script(body: &str, waits: &[&str]) -> String {
    let mut script = String::with_capacity(TASKLIB.len() + body.len() + 64);
    script.push_str(TASKLIB);
    script.push('\n');
    for dep in waits {
        script.push_str("DEPENDS_ON ");
        script.push_str(&quote(dep));
        script.push('\n');
    }
    script.push_str(body);
    if !script.ends_with('\n') {
        script.push('\n');
    }
    script
}

fn preamble(layout: &RemoteLayout, task: &str) -> String {
    format!(
        "export TASK_BASE_DIR={base}\n\
         export TASK_NAME={name}\n\
         export TASK_DIR=\"$TASK_BASE_DIR/$TASK_NAME\"\n\
         mkdir -p \"$TASK_DIR/{FILES_DIR}\" || exit 1\n\
         cd \"$TASK_DIR\" || exit 1\n\
         if [ -f {PID_FILE} ] && kill -0 \"$(cat {PID_FILE})\" 2>/dev/null; then\n\
         \x20   echo \"task $TASK_NAME is already running\" >&2\n\
         \x20   exit {ALREADY_RUNNING_EXIT_CODE}\n\
         fi\n",
        base = quote(layout.base()),
        name = quote(task),
    )
}

/// Create the task directory, refuse if the task is still running, and
/// move the previous `status` to `status.old`.
///
/// Runs before any payload is copied so a live run never sees its
/// `files/` change underneath it. After this step a task that is then
/// skipped or fails to start has no `status` a dependent or `join` could
/// mistake for the new run's result. `status.old` is kept when there is no
/// newer `status` to replace it.
pub fn prepare_script(layout: &RemoteLayout, task: &str) -> String {
    let mut out = preamble(layout, task);
    out.push_str(&format!(
        "if [ -f {STATUS_FILE} ]; then\n\
         \x20   mv -f {STATUS_FILE} {PREVIOUS_STATUS_FILE}\n\
         fi\n"
    ));
    out
}

/// Parameters of a single launch.
#[derive(Debug, Clone)]
pub struct LaunchStub<'a> {
    pub layout: &'a RemoteLayout,
    pub task: &'a str,
    /// Full script text, see [`task_script`].
    pub script: &'a str,
    pub timeout: Duration,
    /// Grace period between SIGTERM and SIGKILL once `timeout` expires.
    pub kill_after: Duration,
    pub poll_interval: Duration,
}

impl LaunchStub<'_> {
    /// Render the stub.
    ///
    /// In order: re-check the running guard, write the script, extract the
    /// reserved archives, start the script detached under `timeout`, and
    /// wait until the child has recorded its pid (or already finished).
    /// The stub fails if neither shows up in time.
    ///
    /// A script that ignores SIGTERM is killed after `kill_after` and
    /// `timeout` exits 137; the wrapper records that as a timeout too when
    /// the limit was reached.
    pub fn render(&self) -> String {
        let heredoc = safe_heredoc(self.script);
        let timeout = self.timeout.as_secs().max(1);
        let kill_after = self.kill_after.as_secs().max(1);
        let poll = format_interval(self.poll_interval);
        let user_archive = ArchiveGroup::User.archive_name();
        let system_archive = ArchiveGroup::System.archive_name();
        let eol = if self.script.ends_with('\n') { "" } else { "\n" };

        let mut out = preamble(self.layout, self.task);
        out.push_str(&format!(
            "export TASK_POLL_INTERVAL={poll}\n\
             rm -f {OUTPUT_FILE} {PID_FILE} {WAIT_FILE} {STATUS_FILE} {STATUS_FILE}.tmp\n\
             cat <<'{heredoc}' >./{SCRIPT_FILE}\n\
             {script}{eol}\
             {heredoc}\n\
             export TASK_DATA_DIR=\"$TASK_DIR/{FILES_DIR}\"\n\
             if [ -f \"$TASK_DATA_DIR/{system_archive}\" ]; then\n\
             \x20   sudo tar -C / -xzf \"$TASK_DATA_DIR/{system_archive}\" || exit 1\n\
             fi\n\
             if [ -f \"$TASK_DATA_DIR/{user_archive}\" ]; then\n\
             \x20   tar -C ~ -xzf \"$TASK_DATA_DIR/{user_archive}\" || exit 1\n\
             fi\n\
             nohup sh -c 'echo $$ >./{PID_FILE}; \
             started=$(date +%s); \
             timeout -k {kill_after} {timeout} bash -x ./{SCRIPT_FILE}; \
             rc=$?; \
             if [ $rc -eq 137 ] && [ $(($(date +%s) - started)) -ge {timeout} ]; then rc={TIMEOUT_EXIT_CODE}; fi; \
             echo $rc >./{STATUS_FILE}.tmp; \
             mv -f ./{STATUS_FILE}.tmp ./{STATUS_FILE}; \
             rm -f ./{PID_FILE}' >./{OUTPUT_FILE} 2>&1 </dev/null &\n\
             i=0\n\
             while [ ! -f {PID_FILE} ] && [ ! -f {STATUS_FILE} ] && [ $i -lt 100 ]; do\n\
             \x20   sleep 0.1\n\
             \x20   i=$((i + 1))\n\
             done\n\
             if [ ! -f {PID_FILE} ] && [ ! -f {STATUS_FILE} ]; then\n\
             \x20   echo \"task $TASK_NAME did not record a pid\" >&2\n\
             \x20   exit 1\n\
             fi\n",
            script = self.script,
        ));
        out
    }
}

/// Seconds, with a fractional part when below one second.
fn format_interval(d: Duration) -> String {
    let ms = d.as_millis().max(1);
    if ms % 1000 == 0 {
        (ms / 1000).to_string()
    } else {
        format!("{}.{:03}", ms / 1000, ms % 1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heredoc_delimiter_avoids_the_script() {
        assert_eq!(safe_heredoc("echo hi"), "TASKSHIP_EOF");
        assert_eq!(safe_heredoc("cat <<TASKSHIP_EOF\nTASKSHIP_EOF"), "TASKSHIP_EOF_1");
    }

    #[test]
    fn task_script_prepends_library_and_inserted_waits() {
        let script = task_script("echo body", &["setup"]);
        assert!(script.starts_with(TASKLIB));
        let tail = &script[TASKLIB.len()..];
        assert_eq!(tail, "\nDEPENDS_ON setup\necho body\n");
    }

    #[test]
    fn stub_quotes_names_and_sets_the_timeout() {
        let layout = RemoteLayout::new("/tmp/my tasks");
        let script = task_script("echo hi", &[]);
        let stub = LaunchStub {
            layout: &layout,
            task: "web server",
            script: &script,
            timeout: Duration::from_secs(600),
            kill_after: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
        }
        .render();

        assert!(stub.contains("export TASK_BASE_DIR='/tmp/my tasks'\n"));
        assert!(stub.contains("export TASK_NAME='web server'\n"));
        assert!(stub.contains("export TASK_POLL_INTERVAL=0.250\n"));
        assert!(stub.contains("timeout -k 30 600 bash -x ./script"));
        assert!(stub.contains("cat <<'TASKSHIP_EOF' >./script\n"));
        assert!(stub.contains("tar -C ~ -xzf \"$TASK_DATA_DIR/user.tar.gz\""));
        assert!(stub.contains(&format!("exit {ALREADY_RUNNING_EXIT_CODE}")));
    }

    #[test]
    fn forced_kill_after_the_limit_is_recorded_as_a_timeout() {
        let layout = RemoteLayout::new("/tmp/tasks");
        let script = task_script("trap '' TERM; sleep 100", &[]);
        let stub = LaunchStub {
            layout: &layout,
            task: "stubborn",
            script: &script,
            timeout: Duration::from_secs(5),
            kill_after: Duration::from_secs(2),
            poll_interval: Duration::from_secs(1),
        }
        .render();

        assert!(stub.contains("timeout -k 2 5 bash -x ./script; rc=$?;"));
        assert!(stub.contains(
            "if [ $rc -eq 137 ] && [ $(($(date +%s) - started)) -ge 5 ]; then rc=124; fi;"
        ));
        assert!(stub.contains("echo $rc >./status.tmp;"));
    }

    #[test]
    fn status_is_rotated_by_prepare_and_cleared_by_the_stub() {
        let layout = RemoteLayout::new("/tmp/tasks");
        let prepare = prepare_script(&layout, "web");
        let guard = prepare.find("exit 75").unwrap();
        let rotate = prepare.find("mv -f status status.old").unwrap();
        assert!(guard < rotate);
        assert!(!prepare.contains("rm -f status.old"));

        let script = task_script("echo hi", &[]);
        let stub = LaunchStub {
            layout: &layout,
            task: "web",
            script: &script,
            timeout: Duration::from_secs(60),
            kill_after: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
        }
        .render();
        assert!(!stub.contains("mv -f status status.old"));
        assert!(stub.contains("rm -f output pid wait status status.tmp\n"));
        assert!(stub.contains("did not record a pid"));
    }

    #[test]
    fn intervals_render_as_seconds() {
        assert_eq!(format_interval(Duration::from_secs(1)), "1");
        assert_eq!(format_interval(Duration::from_millis(50)), "0.050");
        assert_eq!(format_interval(Duration::from_millis(1500)), "1.500");
    }
}
