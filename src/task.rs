use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::Local;

use crate::dashboard::SharedDashboard;
use crate::logging::{FileLogger, TaskFileLogger, task_log_dir};

/// Exit code reported when the shell itself cannot be spawned.
const SPAWN_FAILURE_CODE: i32 = 127;

/// Start one worker thread per command. Each worker streams its process
/// output into the dashboard and reports the exit status exactly once; none
/// of them ever touch the screen directly.
pub fn spawn_workers(
    dashboard: &SharedDashboard,
    cmds: &[String],
    log: &Arc<FileLogger>,
    output_logs: bool,
) -> Vec<JoinHandle<()>> {
    let run_dir = output_logs.then(|| task_log_dir(Local::now()));
    cmds.iter()
        .enumerate()
        .map(|(i, cmd)| {
            let task_id = i + 1;
            let dashboard = Arc::clone(dashboard);
            let log = Arc::clone(log);
            let task_log = run_dir
                .as_ref()
                .map(|dir| Arc::new(TaskFileLogger::create(dir, task_id, Arc::clone(&log))));
            let cmd = cmd.clone();
            thread::spawn(move || run_task(task_id, &cmd, &dashboard, &log, task_log))
        })
        .collect()
}

fn run_task(
    task_id: usize,
    cmd: &str,
    dashboard: &SharedDashboard,
    log: &Arc<FileLogger>,
    task_log: Option<Arc<TaskFileLogger>>,
) {
    let tag = format!("Task {task_id}");
    if cmd.is_empty() {
        finish(dashboard, task_id, 0);
        return;
    }

    log.log(&tag, &format!("thread start cmd=\"{cmd}\""), 0);

    let mut child = match Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            log.log(&tag, &format!("spawn failed: {e}"), 0);
            finish(dashboard, task_id, SPAWN_FAILURE_CODE);
            return;
        }
    };

    // stderr merges into the same pane on a drain thread, so neither pipe
    // can fill up and stall the child.
    let stderr_drain = child.stderr.take().map(|stderr| {
        let dashboard = Arc::clone(dashboard);
        let task_log = task_log.clone();
        thread::spawn(move || forward_output(stderr, task_id, &dashboard, task_log.as_deref()))
    });

    if let Some(stdout) = child.stdout.take() {
        forward_output(stdout, task_id, dashboard, task_log.as_deref());
    }
    if let Some(drain) = stderr_drain {
        let _ = drain.join();
    }

    let retcode = match child.wait() {
        Ok(status) => status.code().unwrap_or(-1),
        Err(e) => {
            log.log(&tag, &format!("wait failed: {e}"), 0);
            -1
        }
    };

    log.log(&tag, &format!("thread end retcode {retcode}"), 0);
    finish(dashboard, task_id, retcode);
}

/// Forward a pipe to the dashboard chunk-by-chunk. Chunks end at newlines
/// except for a final unterminated line, so output is never reordered and
/// partial lines still show up on EOF.
fn forward_output(
    reader: impl Read,
    task_id: usize,
    dashboard: &SharedDashboard,
    task_log: Option<&TaskFileLogger>,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let chunk = String::from_utf8_lossy(&buf);
                if let Ok(mut dash) = dashboard.lock() {
                    dash.append_line(task_id, &chunk);
                }
                if let Some(task_log) = task_log {
                    task_log.write(&chunk);
                }
            }
        }
    }
}

fn finish(dashboard: &SharedDashboard, task_id: usize, retcode: i32) {
    if let Ok(mut dash) = dashboard.lock() {
        dash.mark_finished(task_id, retcode);
    }
}
