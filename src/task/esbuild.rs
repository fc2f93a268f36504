use std::io::Write;
use std::process::{Command, Stdio};

/// Ways an esbuild invocation can fail.
#[derive(Debug)]
pub(crate) enum Failure {
    Io(std::io::Error),
    Exit(String),
}

impl From<std::io::Error> for Failure {
    fn from(e: std::io::Error) -> Self {
        Failure::Io(e)
    }
}

impl From<Failure> for crate::error::StyleError {
    fn from(f: Failure) -> Self {
        match f {
            Failure::Io(e) => Self::Io(e),
            Failure::Exit(msg) => Self::Esbuild(msg),
        }
    }
}

impl From<Failure> for crate::error::ScriptError {
    fn from(f: Failure) -> Self {
        match f {
            Failure::Io(e) => Self::Io(e),
            Failure::Exit(msg) => Self::Esbuild(msg),
        }
    }
}

/// Runs `esbuild` with `args`, feeding `stdin` when given, and returns what
/// it printed to stdout.
///
/// **Note:** esbuild must be available in the system PATH.
pub(crate) fn esbuild(args: &[String], stdin: Option<&[u8]>) -> Result<Vec<u8>, Failure> {
    let mut child = Command::new("esbuild")
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(input) = stdin
        && let Some(mut pipe) = child.stdin.take()
    {
        pipe.write_all(input)?;
    }

    let output = child.wait_with_output()?;

    if !output.status.success() {
        return Err(Failure::Exit(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    Ok(output.stdout)
}

/// `--target=chrome58,safari11` or nothing when no targets are configured.
pub(crate) fn target_arg(targets: &[String]) -> Option<String> {
    if targets.is_empty() {
        None
    } else {
        Some(format!("--target={}", targets.join(",")))
    }
}
