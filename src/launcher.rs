use std::collections::BTreeMap;
use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;

use thiserror::Error;
use tracing::{debug, error, info, warn};

#[cfg(unix)]
use std::os::unix::process::CommandExt;

#[cfg(unix)]
const PATH_SEPARATOR: &str = ":";
#[cfg(windows)]
const PATH_SEPARATOR: &str = ";";

#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

pub const PATH_KEY: &str = "PATH";

#[derive(Debug, Error)]
pub enum StartError {
    #[error("failed to start `{shell}` for `{command}`: {source}")]
    Spawn {
        shell: String,
        command: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    Failed(i32),
    Signaled(i32),
    WaitFailed(String),
}

impl ExitOutcome {
    fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            return ExitOutcome::Success;
        }
        if let Some(code) = status.code() {
            return ExitOutcome::Failed(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitOutcome::Signaled(signal);
            }
        }

        ExitOutcome::WaitFailed(format!("unrecognised exit status: {status}"))
    }
}

/// Interpreter used to run a command string, e.g. `/bin/sh -c`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shell {
    pub program: String,
    pub flag: String,
}

impl Shell {
    pub fn new(program: impl Into<String>) -> Self {
        let program = program.into();
        let flag = if is_cmd_exe(&program) { "/C" } else { "-c" };
        Self {
            program,
            flag: flag.to_string(),
        }
    }
}

fn is_cmd_exe(program: &str) -> bool {
    let name = program
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(program)
        .to_ascii_lowercase();
    name == "cmd" || name == "cmd.exe"
}

/// Directory holding binaries installed by the project's dependencies.
pub fn local_bin_dir(project_dir: &Path) -> PathBuf {
    project_dir.join("node_modules").join(".bin")
}

/// Returns `base_env` with the project's local bin directory appended to the
/// search path. Nothing else is touched, and the local directory always ends
/// up last so global binaries win.
pub fn build_environment<I>(base_env: I, project_dir: &Path) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut env: BTreeMap<String, String> = base_env.into_iter().collect();
    let local_bin = local_bin_dir(project_dir).to_string_lossy().into_owned();
    let key = path_key(&env);

    let value = match env.get(&key) {
        Some(original) if !original.is_empty() => {
            format!("{original}{PATH_SEPARATOR}{local_bin}")
        }
        _ => local_bin,
    };
    env.insert(key, value);
    env
}

#[cfg(windows)]
fn path_key(env: &BTreeMap<String, String>) -> String {
    env.keys()
        .find(|key| key.eq_ignore_ascii_case(PATH_KEY))
        .cloned()
        .unwrap_or_else(|| PATH_KEY.to_string())
}

#[cfg(not(windows))]
fn path_key(_env: &BTreeMap<String, String>) -> String {
    PATH_KEY.to_string()
}

/// Everything needed to start one script. Consumed by `start`.
#[derive(Debug, Clone)]
pub struct LaunchContext {
    pub command: String,
    pub working_dir: PathBuf,
    pub env: BTreeMap<String, String>,
    pub shell: Shell,
}

impl LaunchContext {
    pub fn new(command: impl Into<String>, working_dir: &Path, shell: Shell) -> Self {
        // Variables that are not valid UTF-8 are left out of the child's env.
        let base_env = env::vars_os().filter_map(|(key, value)| {
            Some((key.into_string().ok()?, value.into_string().ok()?))
        });
        Self {
            command: command.into(),
            working_dir: working_dir.to_path_buf(),
            env: build_environment(base_env, working_dir),
            shell,
        }
    }
}

/// A started child. It runs in its own process group and is never killed by
/// dropping the handle.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    command: String,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

pub fn start(context: LaunchContext) -> Result<ProcessHandle, StartError> {
    let LaunchContext {
        command,
        working_dir,
        env,
        shell,
    } = context;

    let mut process = Command::new(&shell.program);
    process
        .arg(&shell.flag)
        .arg(&command)
        .current_dir(&working_dir)
        .env_clear()
        .envs(&env)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    detach_process_group(&mut process);

    let child = process.spawn().map_err(|source| StartError::Spawn {
        shell: shell.program.clone(),
        command: command.clone(),
        source,
    })?;

    debug!(pid = child.id(), command = %command, "started script");
    Ok(ProcessHandle { child, command })
}

#[cfg(unix)]
fn detach_process_group(process: &mut Command) {
    process.process_group(0);
}

#[cfg(windows)]
fn detach_process_group(process: &mut Command) {
    use std::os::windows::process::CommandExt;
    process.creation_flags(CREATE_NEW_PROCESS_GROUP);
}

/// Blocks the calling thread until the child exits.
pub fn await_completion(mut handle: ProcessHandle) -> ExitOutcome {
    match handle.child.wait() {
        Ok(status) => ExitOutcome::from_status(status),
        Err(err) => ExitOutcome::WaitFailed(err.to_string()),
    }
}

/// Moves the handle onto a background thread that waits for the child and
/// logs how it ended. Callers are free to drop the join handle.
pub fn spawn_completion_watcher(handle: ProcessHandle) -> thread::JoinHandle<ExitOutcome> {
    thread::spawn(move || {
        let command = handle.command().to_string();
        let pid = handle.pid();
        let outcome = await_completion(handle);
        report_outcome(&command, pid, &outcome);
        outcome
    })
}

fn report_outcome(command: &str, pid: u32, outcome: &ExitOutcome) {
    match outcome {
        ExitOutcome::Success => info!(pid, command, "script finished"),
        ExitOutcome::Failed(code) => {
            warn!(pid, command, code, "script exited with non-zero status")
        }
        ExitOutcome::Signaled(signal) => {
            warn!(pid, command, signal, "script terminated by signal")
        }
        ExitOutcome::WaitFailed(reason) => {
            error!(pid, command, reason = %reason, "failed waiting for script")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn env_of(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn appends_local_bin_after_existing_path() {
        let project = Path::new("/work/app");
        let env = build_environment(
            env_of(&[("PATH", "/usr/bin"), ("HOME", "/home/me")]),
            project,
        );

        let expected = format!(
            "/usr/bin{PATH_SEPARATOR}{}",
            project.join("node_modules").join(".bin").display()
        );
        assert_eq!(env["PATH"], expected);
        assert_eq!(env["HOME"], "/home/me");
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn missing_or_empty_path_becomes_local_bin_only() {
        let project = Path::new("/work/app");
        let local = project.join("node_modules").join(".bin").display().to_string();

        let env = build_environment(env_of(&[("HOME", "/home/me")]), project);
        assert_eq!(env["PATH"], local);

        let env = build_environment(env_of(&[("PATH", "")]), project);
        assert_eq!(env["PATH"], local);
    }

    #[test]
    fn build_environment_keeps_every_other_variable() {
        let base = env_of(&[("A", "1"), ("B", "2"), ("PATH", "/bin"), ("Z", "")]);
        let env = build_environment(base.clone(), Path::new("/p"));
        for (key, value) in base.iter().filter(|(key, _)| key != "PATH") {
            assert_eq!(&env[key], value);
        }
        assert!(env["PATH"].starts_with("/bin"));
    }

    #[test]
    fn shell_flag_follows_interpreter() {
        assert_eq!(Shell::new("/bin/sh").flag, "-c");
        assert_eq!(Shell::new("cmd").flag, "/C");
        assert_eq!(Shell::new("C:\\Windows\\System32\\cmd.exe").flag, "/C");
    }

    #[test]
    fn launch_context_captures_process_environment() {
        let dir = std::env::temp_dir();
        let context = LaunchContext::new("echo hi", &dir, Shell::new("/bin/sh"));
        let local = local_bin_dir(&dir).to_string_lossy().into_owned();
        assert!(context.env[PATH_KEY].ends_with(&local));
        assert_eq!(context.working_dir, dir);
    }

    #[test]
    fn missing_interpreter_is_a_start_error() {
        let context = LaunchContext::new(
            "echo hi",
            &std::env::temp_dir(),
            Shell::new("/nonexistent/scriptpick-shell"),
        );
        let err = start(context).unwrap_err();
        let StartError::Spawn { shell, source, .. } = &err;
        assert_eq!(shell, "/nonexistent/scriptpick-shell");
        assert_eq!(source.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("echo hi"));
    }

    #[cfg(unix)]
    #[test]
    fn reports_success_and_exit_codes() {
        let dir = std::env::temp_dir();
        let ok = start(LaunchContext::new("true", &dir, Shell::new("/bin/sh"))).unwrap();
        assert_eq!(await_completion(ok), ExitOutcome::Success);

        let failing = start(LaunchContext::new("exit 3", &dir, Shell::new("/bin/sh"))).unwrap();
        assert_eq!(await_completion(failing), ExitOutcome::Failed(3));
    }

    #[cfg(unix)]
    #[test]
    fn reports_signal_termination() {
        let handle = start(LaunchContext::new(
            "kill -TERM $$",
            &std::env::temp_dir(),
            Shell::new("/bin/sh"),
        ))
        .unwrap();
        assert_eq!(await_completion(handle), ExitOutcome::Signaled(15));
    }

    #[cfg(unix)]
    #[test]
    fn child_sees_appended_path_and_working_dir() {
        let dir = std::env::temp_dir().canonicalize().unwrap();
        let local = local_bin_dir(&dir).to_string_lossy().into_owned();
        let script = format!(
            "case \"$PATH\" in *\":{local}\") ;; *) exit 1 ;; esac; test \"$(pwd -P)\" = \"{}\"",
            dir.display()
        );
        let handle = start(LaunchContext::new(script, &dir, Shell::new("/bin/sh"))).unwrap();
        assert_eq!(await_completion(handle), ExitOutcome::Success);
    }

    #[cfg(unix)]
    #[test]
    fn child_runs_in_its_own_process_group() {
        // /proc/<pid>/stat: pid (comm) state ppid pgrp ...
        if !Path::new("/proc/self/stat").exists() {
            return;
        }
        let handle = start(LaunchContext::new(
            "set -- $(cat /proc/$$/stat); test \"$5\" = \"$$\"",
            &std::env::temp_dir(),
            Shell::new("/bin/sh"),
        ))
        .unwrap();
        assert_eq!(await_completion(handle), ExitOutcome::Success);
    }

    #[cfg(unix)]
    #[test]
    fn watcher_thread_returns_outcome() {
        let handle = start(LaunchContext::new(
            "exit 7",
            &std::env::temp_dir(),
            Shell::new("/bin/sh"),
        ))
        .unwrap();
        let watcher = spawn_completion_watcher(handle);
        assert_eq!(watcher.join().unwrap(), ExitOutcome::Failed(7));
    }
}
