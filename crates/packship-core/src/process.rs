use crate::errors::{PackshipError, Result};
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Creates a `Command` that can resolve `.cmd` and `.bat` scripts on Windows.
///
/// On Windows, tools like npm and pnpm are installed as `.cmd`/`.bat` batch
/// scripts. Rust's `std::process::Command` only auto-resolves `.exe`
/// extensions, not `.cmd`/`.bat` (see rust-lang/rust#37519). This function
/// wraps the invocation through `cmd.exe /C` on Windows to ensure proper
/// resolution via PATHEXT.
pub fn command(program: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", program]);
        cmd
    } else {
        Command::new(program)
    }
}

/// How a command's output streams are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioMode {
    /// Stream through to the parent process; nothing is captured.
    Inherit,
    /// Capture stdout and return it as text.
    Piped,
}

/// A single external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Human-readable form used in logs ("git push origin v1.2.3").
    pub fn display(&self) -> String {
        let mut text = self.program.clone();
        for arg in &self.args {
            text.push(' ');
            text.push_str(arg);
        }
        text
    }
}

/// Executes external commands for the publish pipeline.
///
/// Implementations only report success/failure and captured output; the
/// failure policy (fatal vs swallowed, error hooks, dry-run logging) lives
/// in [`run_command`] so every call site shares it.
pub trait CommandRunner {
    /// Run the command to completion, returning captured stdout when `mode`
    /// is [`StdioMode::Piped`]. `Err` carries a display message for a spawn
    /// failure or non-zero exit.
    fn run(&self, spec: &CommandSpec, mode: StdioMode) -> std::result::Result<Option<String>, String>;

    /// Whether this runner only simulates execution.
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Failure policy for a [`run_command`] call.
pub struct RunOptions<'a> {
    pub mode: StdioMode,
    /// Propagate the failure to the caller; otherwise it is logged and
    /// swallowed and the call returns `Ok(None)`.
    pub throw_on_failure: bool,
    /// Invoked once on failure, before the policy above is applied.
    pub on_error: Option<&'a dyn Fn()>,
}

impl RunOptions<'_> {
    pub fn inherit() -> Self {
        Self {
            mode: StdioMode::Inherit,
            throw_on_failure: false,
            on_error: None,
        }
    }

    pub fn piped() -> Self {
        Self {
            mode: StdioMode::Piped,
            throw_on_failure: false,
            on_error: None,
        }
    }

    pub fn fatal(mut self) -> Self {
        self.throw_on_failure = true;
        self
    }
}

/// Run one external command under the shared failure policy.
///
/// Dry-run runners log the command and return an empty string without
/// executing anything. On failure the error is logged, the `on_error` hook
/// fires, and the error propagates only when `throw_on_failure` is set.
pub fn run_command(
    runner: &dyn CommandRunner,
    spec: &CommandSpec,
    opts: RunOptions<'_>,
) -> Result<Option<String>> {
    if runner.is_dry_run() {
        println!("dry-run: {}", spec.display());
        return Ok(Some(String::new()));
    }

    match runner.run(spec, opts.mode) {
        Ok(output) => Ok(output),
        Err(message) => {
            eprintln!("Command failed - {}: {}", spec.display(), message);
            if let Some(hook) = opts.on_error {
                hook();
            }
            if opts.throw_on_failure {
                Err(PackshipError::Command(format!(
                    "{}: {}",
                    spec.display(),
                    message
                )))
            } else {
                Ok(None)
            }
        }
    }
}

/// Runner backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner {
    /// Log commands instead of executing them.
    pub dry_run: bool,
}

impl SystemRunner {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    fn build(&self, spec: &CommandSpec) -> Command {
        let mut cmd = command(&spec.program);
        cmd.args(&spec.args);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec, mode: StdioMode) -> std::result::Result<Option<String>, String> {
        let mut cmd = self.build(spec);
        match mode {
            StdioMode::Inherit => {
                let status = cmd.status().map_err(|err| spawn_error(&spec.program, err))?;
                if status.success() {
                    Ok(None)
                } else {
                    Err(format!("exited with status {status}"))
                }
            }
            StdioMode::Piped => {
                let output = cmd
                    .stdin(Stdio::null())
                    .output()
                    .map_err(|err| spawn_error(&spec.program, err))?;
                if output.status.success() {
                    Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    let snippet: String = stderr.trim().chars().take(400).collect();
                    Err(format!("exited with status {}: {}", output.status, snippet))
                }
            }
        }
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

fn spawn_error(program: &str, err: std::io::Error) -> String {
    if err.kind() == std::io::ErrorKind::NotFound {
        format!("{program} not found in PATH; ensure {program} is installed")
    } else {
        err.to_string()
    }
}
