use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use tracing::info;

/// Runs `program` with inherited stdio and waits for it.
///
/// Returns the exit code, or `-1` when the process was terminated by a
/// signal. Only a failure to spawn is an error.
pub fn launch<S: AsRef<str>>(program: impl AsRef<Path>, args: &[S]) -> Result<i32> {
    launch_with(program.as_ref(), args, None)
}

/// Same as [`launch`], with `dir` as the working directory of the child.
pub fn launch_in<S: AsRef<str>>(dir: &Path, program: impl AsRef<Path>, args: &[S]) -> Result<i32> {
    launch_with(program.as_ref(), args, Some(dir))
}

fn launch_with<S: AsRef<str>>(program: &Path, args: &[S], dir: Option<&Path>) -> Result<i32> {
    let line = command_line(program, args);
    info!(cwd = ?dir, "{line}");
    let mut command = Command::new(program);
    command.args(args.iter().map(AsRef::as_ref));
    if let Some(dir) = dir {
        command.current_dir(dir);
    }
    let status = command
        .status()
        .with_context(|| format!("Failed to launch {}", program.display()))?;
    Ok(status.code().unwrap_or(-1))
}

/// Starts `program` without waiting for it. Returns the child's pid.
pub fn spawn<S: AsRef<str>>(program: impl AsRef<Path>, args: &[S]) -> Result<u32> {
    let program = program.as_ref();
    info!("{}", command_line(program, args));
    let child = Command::new(program)
        .args(args.iter().map(AsRef::as_ref))
        .spawn()
        .with_context(|| format!("Failed to launch {}", program.display()))?;
    Ok(child.id())
}

/// Runs `program` and returns its stdout. A non-zero exit is an error.
pub fn capture<S: AsRef<str>>(program: &str, args: &[S], dir: Option<&Path>) -> Result<String> {
    let mut command = Command::new(program);
    command
        .args(args.iter().map(AsRef::as_ref))
        .stdin(Stdio::null())
        .stderr(Stdio::inherit());
    if let Some(dir) = dir {
        command.current_dir(dir);
    }
    let output = command
        .output()
        .with_context(|| format!("Failed to launch {program}"))?;
    if !output.status.success() {
        bail!(
            "{} exited with status {}",
            command_line(Path::new(program), args),
            output.status.code().unwrap_or(-1)
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Printable command line, quoting arguments that contain spaces.
pub fn command_line<S: AsRef<str>>(program: &Path, args: &[S]) -> String {
    let mut parts = vec![quote(&program.to_string_lossy())];
    parts.extend(args.iter().map(|arg| quote(arg.as_ref())));
    parts.join(" ")
}

fn quote(part: &str) -> String {
    if part.contains(' ') && !part.starts_with('"') {
        format!("\"{part}\"")
    } else {
        part.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_quotes_spaced_arguments() {
        let line = command_line(Path::new("Build.bat"), &["Game Editor", "Win64"]);
        assert_eq!(line, "Build.bat \"Game Editor\" Win64");
    }

    #[cfg(unix)]
    #[test]
    fn launch_reports_exit_codes() {
        assert_eq!(launch("sh", &["-c", "exit 3"]).unwrap(), 3);
        assert_eq!(launch("sh", &["-c", "true"]).unwrap(), 0);
        assert!(launch("definitely-not-a-real-program-xyz", &[] as &[&str]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn capture_returns_stdout() {
        let out = capture("sh", &["-c", "echo hello"], None).unwrap();
        assert_eq!(out.trim(), "hello");
        assert!(capture("sh", &["-c", "exit 1"], None).is_err());
    }
}
