// ABOUTME: Logged subprocess execution with timeouts and exit-code policies
// ABOUTME: Captures tool output to per-stage log files, optionally streaming lines

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::error::{Result, ToolError};

/// Look a binary up on PATH. Explicit paths (containing a separator)
/// are checked directly.
pub fn find_binary(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let full = dir.join(name);
        if full.is_file() {
            return Some(full);
        }
    }
    None
}

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub elapsed: Duration,
}

/// Builder for one external tool invocation. Stdout and stderr are
/// captured and written to the log file when one is set; `stdout_to`
/// redirects stdout into a result file instead (aligners that write
/// alignments to stdout).
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    envs: HashMap<String, String>,
    working_dir: Option<PathBuf>,
    log_file: Option<PathBuf>,
    stdout_file: Option<PathBuf>,
    timeout_seconds: Option<u64>,
    allow_any_exit: bool,
    expected_exit_codes: Vec<i32>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: HashMap::new(),
            working_dir: None,
            log_file: None,
            stdout_file: None,
            timeout_seconds: None,
            allow_any_exit: false,
            expected_exit_codes: vec![0],
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn log_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout_file = Some(path.into());
        self
    }

    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Gblocks exits non-zero even on success; this skips the check.
    pub fn allow_any_exit(mut self) -> Self {
        self.allow_any_exit = true;
        self
    }

    pub fn expect_exit_codes(mut self, codes: Vec<i32>) -> Self {
        self.expected_exit_codes = codes;
        self
    }

    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Run to completion, capturing output.
    pub async fn run(&self) -> Result<ToolOutput> {
        self.run_streaming(|_| {}).await
    }

    /// Run to completion, feeding each stdout line to the observer as
    /// it arrives. Used to follow RAxML-NG progress.
    pub async fn run_streaming<F>(&self, mut on_line: F) -> Result<ToolOutput>
    where
        F: FnMut(&str),
    {
        let program_name = self.program.display().to_string();
        debug!("running: {}", self.command_line());
        let start = Instant::now();

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in &self.envs {
            command.env(key, value);
        }
        if let Some(ref dir) = self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| self.io_error(e))?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // stderr drains on its own task so a chatty tool cannot deadlock
        // the pipe while we follow stdout line by line
        let stderr_handle = tokio::spawn(async move {
            let mut lines = Vec::new();
            if let Some(stderr) = stderr {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    lines.push(line);
                }
            }
            lines
        });

        let mut stdout_lines = Vec::new();
        let work = async {
            if let Some(stdout) = stdout {
                let mut reader = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    on_line(&line);
                    stdout_lines.push(line);
                }
            }
            child.wait().await.map_err(|e| self.io_error(e))
        };

        let status = match self.timeout_seconds {
            Some(seconds) => timeout(Duration::from_secs(seconds), work)
                .await
                .map_err(|_| ToolError::Timeout {
                    program: program_name.clone(),
                    seconds,
                })??,
            None => work.await?,
        };

        let stderr_lines = stderr_handle.await.unwrap_or_default();
        let stdout_text = stdout_lines.join("\n");
        let stderr_text = stderr_lines.join("\n");

        if let Some(ref path) = self.stdout_file {
            self.write_file(path, stdout_text.as_bytes()).await?;
        }
        if let Some(ref path) = self.log_file {
            let mut log = format!("$ {}\n\n", self.command_line());
            if self.stdout_file.is_none() && !stdout_text.is_empty() {
                log.push_str(&stdout_text);
                log.push('\n');
            }
            if !stderr_text.is_empty() {
                log.push_str(&stderr_text);
                log.push('\n');
            }
            self.write_file(path, log.as_bytes()).await?;
        }

        let elapsed = start.elapsed();
        let exit_code = match status.code() {
            Some(code) => code,
            None => {
                return Err(ToolError::Terminated {
                    program: program_name,
                })
            }
        };
        debug!(
            "{} finished with status {} in {:.2}s",
            program_name,
            exit_code,
            elapsed.as_secs_f64()
        );

        if !self.allow_any_exit && !self.expected_exit_codes.contains(&exit_code) {
            return Err(ToolError::ExitStatus {
                program: program_name,
                code: exit_code,
                log: self.log_file.clone(),
            });
        }

        Ok(ToolOutput {
            exit_code,
            stdout: stdout_text,
            elapsed,
        })
    }

    async fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(bytes).await.map_err(|e| self.io_error(e))?;
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> ToolError {
        ToolError::IoError {
            program: self.program.display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_simple_run_captures_stdout() {
        let output = ToolCommand::new("echo").arg("hello world").run().await.unwrap();
        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout.trim(), "hello world");
    }

    #[tokio::test]
    async fn test_unexpected_exit_code_is_an_error() {
        let result = ToolCommand::new("false").run().await;
        match result {
            Err(ToolError::ExitStatus { code, .. }) => assert_eq!(code, 1),
            other => panic!("expected ExitStatus, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_allow_any_exit() {
        let output = ToolCommand::new("false").allow_any_exit().run().await.unwrap();
        assert_eq!(output.exit_code, 1);
    }

    #[tokio::test]
    async fn test_expected_exit_codes() {
        let output = ToolCommand::new("sh")
            .args(["-c", "exit 3"])
            .expect_exit_codes(vec![0, 3])
            .run()
            .await
            .unwrap();
        assert_eq!(output.exit_code, 3);
    }

    #[tokio::test]
    async fn test_log_and_stdout_files() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("logs/tool.log");
        let out = dir.path().join("result.txt");

        ToolCommand::new("sh")
            .args(["-c", "echo RESULT; echo NOISE >&2"])
            .stdout_to(&out)
            .log_to(&log)
            .run()
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&out).unwrap().trim(), "RESULT");
        let log_text = std::fs::read_to_string(&log).unwrap();
        assert!(log_text.contains("NOISE"));
        assert!(!log_text.contains("RESULT\n$"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let result = ToolCommand::new("sleep")
            .arg("5")
            .timeout_seconds(1)
            .run()
            .await;
        assert!(matches!(result, Err(ToolError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_streaming_observer() {
        let mut seen = Vec::new();
        ToolCommand::new("sh")
            .args(["-c", "echo one; echo two"])
            .run_streaming(|line| seen.push(line.to_string()))
            .await
            .unwrap();
        assert_eq!(seen, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn test_find_binary() {
        assert!(find_binary("sh").is_some());
        assert!(find_binary("definitely-not-a-real-binary-xyz").is_none());
    }
}
