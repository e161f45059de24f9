//! Sandboxed renderer - runs generated plotting code in a child process
//!
//! Generated code never runs in-process. Each render writes a standalone
//! script into the output directory and executes it with the configured
//! interpreter under a wall-clock timeout. The child gets its own process
//! group so a timeout or cancellation takes down anything it spawned.
//! It starts from an empty environment and only its stderr tail is kept.

use async_trait::async_trait;
use chrono::Local;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

#[cfg(unix)]
use nix::sys::signal::{killpg, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_INTERPRETER: &str = "python3";
const MAX_DIAGNOSTIC_CHARS: usize = 4 * 1024;
/// Bytes of stderr held in memory while the script runs
const MAX_STDERR_BYTES: usize = MAX_DIAGNOSTIC_CHARS * 4;

/// Variables copied from the server environment into the child
const INHERITED_ENV: &[&str] = &["PATH", "LANG", "LC_ALL", "TZ"];

const PREAMBLE: &str = "import matplotlib\n\
matplotlib.use('Agg')\n\
import matplotlib.pyplot as plt\n\
import numpy as np\n\n";

static SHOW_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:plt|pyplot|matplotlib\.pyplot)\.show\([^)]*\)").expect("valid show regex")
});

/// Why a render produced no image
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("No code to execute.")]
    NoCode,
    #[error("Failed to launch interpreter: {0}")]
    Launch(#[source] std::io::Error),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{stderr}")]
    Failed { code: Option<i32>, stderr: String },
    #[error("Timeout ({})", format_timeout(.0))]
    Timeout(Duration),
    #[error("Render cancelled")]
    Cancelled,
    #[error("Script finished without writing an image")]
    MissingImage,
}

/// Renderer settings
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Interpreter program, resolved on PATH
    pub interpreter: String,
    /// Arguments placed before the script path
    pub interpreter_args: Vec<String>,
    pub output_dir: PathBuf,
    pub timeout: Duration,
}

impl RendererConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: DEFAULT_INTERPRETER.to_string(),
            interpreter_args: Vec::new(),
            output_dir: output_dir.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_env(output_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::new(output_dir);
        if let Ok(interpreter) = std::env::var("MATH_TUTOR_PYTHON") {
            config.interpreter = interpreter;
        }
        if let Some(secs) = std::env::var("MATH_TUTOR_RENDER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|s| *s > 0)
        {
            config.timeout = Duration::from_secs(secs);
        }
        config
    }

    /// Full path of the interpreter, if it can be found
    pub fn locate_interpreter(&self) -> Option<PathBuf> {
        which::which(&self.interpreter).ok()
    }
}

/// Anything that can turn plotting code into an image file
#[async_trait]
pub trait GraphRenderer: Send + Sync {
    async fn render(&self, code: &str, cancel: CancellationToken) -> Result<PathBuf, RenderError>;
}

/// Script and image paths for one render call
#[derive(Debug, Clone)]
struct Artifact {
    id: String,
    dir: PathBuf,
    script_path: PathBuf,
    image_path: PathBuf,
}

impl Artifact {
    /// Timestamp plus a random UUID so renders in the same second never collide
    fn new(dir: &Path) -> Self {
        let id = format!(
            "{}_{}",
            Local::now().format("%Y%m%d_%H%M%S"),
            uuid::Uuid::new_v4().simple()
        );
        Self {
            script_path: dir.join(format!("graph_{id}.py")),
            image_path: dir.join(format!("graph_{id}.png")),
            dir: dir.to_path_buf(),
            id,
        }
    }
}

/// Renderer that executes scripts with an external interpreter
pub struct SandboxedRenderer {
    config: RendererConfig,
}

impl SandboxedRenderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    async fn run_script(
        &self,
        artifact: &Artifact,
        cancel: CancellationToken,
    ) -> Result<(), RenderError> {
        let home = std::env::temp_dir().join("math_tutor_render");
        tokio::fs::create_dir_all(&home).await?;

        let mut cmd = Command::new(&self.config.interpreter);
        cmd.args(&self.config.interpreter_args)
            .arg(&artifact.script_path)
            .current_dir(&artifact.dir)
            .env_clear()
            .envs(INHERITED_ENV.iter().filter_map(|key| std::env::var_os(key).map(|v| (*key, v))))
            .env("HOME", &home)
            .env("MPLCONFIGDIR", &home)
            .env("MPLBACKEND", "Agg")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // New process group with the child as leader
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(RenderError::Launch)?;
        let mut group = ProcessGroup::new(child.id());
        let timeout = self.config.timeout;
        let stderr_pipe = child.stderr.take();

        let run = async {
            let stderr = match stderr_pipe {
                Some(pipe) => read_tail(pipe, MAX_STDERR_BYTES).await?,
                None => Vec::new(),
            };
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, stderr))
        };

        let (status, stderr) = tokio::select! {
            biased;

            () = cancel.cancelled() => return Err(RenderError::Cancelled),

            () = tokio::time::sleep(timeout) => return Err(RenderError::Timeout(timeout)),

            result = run => result?,
        };
        group.disarm();

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            let stderr = stderr.trim();
            return Err(RenderError::Failed {
                code: status.code(),
                stderr: if stderr.is_empty() {
                    "Unknown error".to_string()
                } else {
                    tail(stderr, MAX_DIAGNOSTIC_CHARS)
                },
            });
        }

        if tokio::fs::try_exists(&artifact.image_path).await? {
            Ok(())
        } else {
            Err(RenderError::MissingImage)
        }
    }
}

#[async_trait]
impl GraphRenderer for SandboxedRenderer {
    async fn render(&self, code: &str, cancel: CancellationToken) -> Result<PathBuf, RenderError> {
        if code.trim().is_empty() {
            return Err(RenderError::NoCode);
        }

        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        let dir = tokio::fs::canonicalize(&self.config.output_dir).await?;
        let artifact = Artifact::new(&dir);

        // Kept on disk after the run for debugging
        tokio::fs::write(&artifact.script_path, prepare_script(code, &artifact.image_path)).await?;
        tracing::debug!(artifact = %artifact.id, "Running graph script");

        match self.run_script(&artifact, cancel).await {
            Ok(()) => {
                tracing::debug!(artifact = %artifact.id, "Graph rendered");
                Ok(artifact.image_path)
            }
            Err(e) => {
                let exit_code = match &e {
                    RenderError::Failed { code, .. } => *code,
                    _ => None,
                };
                tracing::warn!(artifact = %artifact.id, exit_code = ?exit_code, error = %e, "Graph render failed");
                Err(e)
            }
        }
    }
}

/// Wrap generated code with the headless preamble and the save epilogue.
pub fn prepare_script(code: &str, image_path: &Path) -> String {
    let body = strip_show_calls(code);
    let target = python_string_literal(&image_path.to_string_lossy());
    format!(
        "{PREAMBLE}{body}\n\nplt.tight_layout()\nplt.savefig({target}, dpi=150, bbox_inches='tight')\nplt.close()\n"
    )
}

/// Replace interactive `show()` calls with `pass` so indented blocks stay valid.
pub fn strip_show_calls(code: &str) -> String {
    SHOW_CALL.replace_all(code, "pass").into_owned()
}

fn python_string_literal(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Keep the last `max_chars` characters; tracebacks end with the useful part.
fn tail(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().skip(count - max_chars).collect();
    format!("[{} chars truncated]\n{kept}", count - max_chars)
}

/// Read `reader` to EOF, holding at most the last `max_bytes` bytes.
async fn read_tail<R: AsyncRead + Unpin>(mut reader: R, max_bytes: usize) -> std::io::Result<Vec<u8>> {
    let mut kept = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(kept);
        }
        kept.extend_from_slice(&chunk[..n]);
        if kept.len() > max_bytes {
            kept.drain(..kept.len() - max_bytes);
        }
    }
}

/// Whole seconds print as `15s`; anything finer uses `Duration`'s own format.
fn format_timeout(timeout: &Duration) -> String {
    if timeout.subsec_nanos() == 0 {
        format!("{}s", timeout.as_secs())
    } else {
        format!("{timeout:?}")
    }
}

/// Kills the child's process group on drop unless the child exited normally.
struct ProcessGroup {
    pid: Option<u32>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self { pid }
    }

    fn disarm(&mut self) {
        self.pid = None;
    }
}

impl Drop for ProcessGroup {
    #[cfg(unix)]
    fn drop(&mut self) {
        let Some(pid) = self.pid.take() else { return };
        let pgid = Pid::from_raw(pid.cast_signed());
        tracing::debug!(pgid = pid, "Sending SIGKILL to render process group");
        let _ = killpg(pgid, Signal::SIGKILL);
    }

    #[cfg(not(unix))]
    fn drop(&mut self) {
        // kill_on_drop covers the direct child
    }
}
