//! Snapshots produced by an external program's stdout.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

use snapkeep_core::{Sink, SnapError, SnapResult, Snapshottee};

/// Stands in for secrets in `Debug` output.
const REDACTED: &str = "***";

/// Connection settings for a `pg_dump` based snapshot.
#[derive(Clone, Serialize, Deserialize)]
pub struct PostgresOptions {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    /// Passed through `PGPASSWORD`, never on the command line.
    #[serde(default)]
    pub password: Option<String>,
    pub database: String,
    /// `pg_dump` executable; defaults to the one on `PATH`.
    #[serde(default = "default_pg_dump")]
    pub program: String,
    /// Extra flags appended after the connection arguments.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl fmt::Debug for PostgresOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .field("database", &self.database)
            .field("program", &self.program)
            .field("extra_args", &self.extra_args)
            .finish()
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_pg_dump() -> String {
    "pg_dump".to_string()
}

/// Runs a program per capture and streams its stdout into the sink.
///
/// A non-zero exit status fails the capture with the program's stderr.
#[derive(Clone)]
pub struct CommandSnapshottee {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    current_dir: Option<PathBuf>,
}

/// Environment values are left out; they carry credentials.
impl fmt::Debug for CommandSnapshottee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self.envs.iter().map(|(key, _)| key.as_str()).collect();
        f.debug_struct("CommandSnapshottee")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env_keys", &env_keys)
            .field("current_dir", &self.current_dir)
            .finish()
    }
}

impl CommandSnapshottee {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
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
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// `pg_dump` of one database in the plain SQL format.
    pub fn pg_dump(options: &PostgresOptions) -> Self {
        let mut cmd = Self::new(&options.program).args([
            "--host".to_string(),
            options.host.clone(),
            "--port".to_string(),
            options.port.to_string(),
            "--username".to_string(),
            options.user.clone(),
            "--no-password".to_string(),
            "--dbname".to_string(),
            options.database.clone(),
        ]);
        cmd = cmd.args(options.extra_args.iter().cloned());
        if let Some(password) = &options.password {
            cmd = cmd.env("PGPASSWORD", password);
        }
        cmd
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl Snapshottee for CommandSnapshottee {
    async fn copy(&self, sink: &mut Sink<'_>) -> SnapResult<()> {
        let mut child = self
            .command()
            .spawn()
            .map_err(|e| SnapError::Frontend(format!("failed to spawn {}: {e}", self.program)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SnapError::Frontend("child stdout not captured".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| SnapError::Frontend("child stderr not captured".into()))?;

        // stdout is moved into the copy so a failing sink closes the pipe
        // and the child cannot block on a full buffer.
        let copy = async {
            let mut stdout = stdout;
            let copied = tokio::io::copy(&mut stdout, &mut *sink).await?;
            sink.flush().await?;
            Ok::<u64, std::io::Error>(copied)
        };
        let collect_stderr = async {
            let mut buf = Vec::new();
            stderr.read_to_end(&mut buf).await.map(|_| buf)
        };
        let (copied, stderr_buf) = tokio::join!(copy, collect_stderr);
        let status = child.wait().await?;

        if !status.success() {
            let stderr_text = stderr_buf
                .map(|buf| String::from_utf8_lossy(&buf).trim().to_string())
                .unwrap_or_default();
            return Err(SnapError::Frontend(format!(
                "{} exited with {status}: {stderr_text}",
                self.program
            )));
        }

        let bytes = copied?;
        debug!(program = %self.program, bytes, "command output captured");
        Ok(())
    }
}
