use std::ffi::OsStr;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Everything a finished subprocess printed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines()
    }
}

/// Run `program args...` to completion, capturing stdout line by line.
///
/// The child is killed if it outlives `timeout`; that case is reported as
/// `io::ErrorKind::TimedOut`.
pub async fn run_captured<S: AsRef<OsStr>>(program: S, args: &[&str], timeout: Duration) -> io::Result<CommandOutput> {
    let program = program.as_ref();
    debug!(program = ?program, ?args, "spawning external tool");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let collect = async move {
        let read_out = async {
            let mut out = String::new();
            if let Some(stdout) = stdout {
                let mut reader = BufReader::new(stdout).lines();
                while let Some(line) = reader.next_line().await? {
                    out.push_str(&line);
                    out.push('\n');
                }
            }
            Ok::<_, io::Error>(out)
        };
        let read_err = async {
            let mut err = String::new();
            if let Some(mut stderr) = stderr {
                stderr.read_to_string(&mut err).await?;
            }
            Ok::<_, io::Error>(err)
        };
        // both pipes at once, or a chatty stderr can block the child
        let (out, err) = tokio::try_join!(read_out, read_err)?;
        let status = child.wait().await?;
        Ok::<_, io::Error>(CommandOutput { exit_code: status.code(), stdout: out, stderr: err })
    };

    match tokio::time::timeout(timeout, collect).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("{} did not finish within {}s", program.to_string_lossy(), timeout.as_secs()),
        )),
    }
}
