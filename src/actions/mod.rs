use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use serde_json::{Map, Value};

use crate::action::{ActionArgs, ActionRegistry};
use crate::error::ActionError;
use crate::process;

pub mod build;
pub mod build_steps;
pub mod cook;
pub mod copy;
pub mod delete;
pub mod git;
pub mod package;
pub mod pak;
pub mod steam_upload;
pub mod version_inc;

pub use build::BuildAction;
pub use build_steps::BuildStepsAction;
pub use cook::CookAction;
pub use copy::CopyAction;
pub use delete::DeleteAction;
pub use git::GitAction;
pub use package::PackageAction;
pub use pak::PakAction;
pub use steam_upload::SteamUploadAction;
pub use version_inc::VersionIncAction;

pub fn register_defaults(registry: &mut ActionRegistry) {
    registry.register("build", build::ARG_DOCS, |args, _| {
        Ok(Box::new(BuildAction::from_args(args)?))
    });
    registry.register("copy", copy::ARG_DOCS, |args, _| {
        Ok(Box::new(CopyAction::from_args(args)?))
    });
    registry.register("delete", delete::ARG_DOCS, |args, _| {
        Ok(Box::new(DeleteAction::from_args(args)?))
    });
    registry.register("git", git::ARG_DOCS, |args, init| {
        Ok(Box::new(GitAction::from_args(args, init)?))
    });
    registry.register("pak", pak::ARG_DOCS, |args, init| {
        Ok(Box::new(PakAction::from_args(args, init)?))
    });
    registry.register("cook", cook::ARG_DOCS, |args, init| {
        Ok(Box::new(CookAction::from_args(args, init)?))
    });
    registry.register("package", package::ARG_DOCS, |args, init| {
        Ok(Box::new(PackageAction::from_args(args, init)?))
    });
    registry.register("steamupload", steam_upload::ARG_DOCS, |args, init| {
        Ok(Box::new(SteamUploadAction::from_args(args, init)?))
    });
    registry.register("versioninc", version_inc::ARG_DOCS, |args, init| {
        Ok(Box::new(VersionIncAction::from_args(args, init)?))
    });
    registry.register("buildsteps", build_steps::ARG_DOCS, |args, _| {
        Ok(Box::new(BuildStepsAction::from_args(args)?))
    });
    registry.alias("runsteps", "buildsteps");
}

/// Runs an engine tool and maps a non-zero exit (or a failed spawn) to
/// `failure`.
pub(crate) fn run_tool<S: AsRef<str>>(
    program: &Path,
    args: &[S],
    dir: Option<&Path>,
    failure: impl Into<String>,
) -> Result<()> {
    let launched = match dir {
        Some(dir) => process::launch_in(dir, program, args),
        None => process::launch(program, args),
    };
    match launched {
        Ok(0) => Ok(()),
        Ok(_) => Err(ActionError::failed(failure).into()),
        Err(err) => Err(ActionError::failed(format!("{} ({err:#})", failure.into())).into()),
    }
}

/// Removes a directory tree, clearing read-only flags when a first attempt
/// is refused. A missing directory is not an error.
pub(crate) fn remove_tree(path: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(_) => {
            make_writable(path)?;
            fs::remove_dir_all(path)
        }
    }
}

/// Removes a single file, clearing its read-only flag when needed.
pub(crate) fn remove_file(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(_) => {
            set_writable(path)?;
            fs::remove_file(path)
        }
    }
}

fn make_writable(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        for entry in fs::read_dir(path)? {
            make_writable(&entry?.path())?;
        }
    }
    set_writable(path)
}

#[allow(clippy::permissions_set_readonly_false)]
fn set_writable(path: &Path) -> std::io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    if permissions.readonly() {
        permissions.set_readonly(false);
        fs::set_permissions(path, permissions)?;
    }
    Ok(())
}

/// Joins `relative` onto `base` unless it is already absolute.
pub(crate) fn project_relative(base: &Path, relative: &str) -> PathBuf {
    let path = Path::new(relative);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

pub(crate) fn take_string(args: &mut ActionArgs, key: &str) -> Option<String> {
    args.remove(key).and_then(|value| match value {
        Value::String(s) => Some(s),
        Value::Null => None,
        other => Some(other.to_string()),
    })
}

pub(crate) fn take_bool(args: &mut ActionArgs, key: &str) -> Result<Option<bool>> {
    match args.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value_as_bool(&value)
            .map(Some)
            .ok_or_else(|| anyhow!("'{key}' must be a boolean, found {value}")),
    }
}

/// A list of strings; a single string is accepted as a one-element list.
pub(crate) fn take_strings(args: &mut ActionArgs, key: &str) -> Result<Vec<String>> {
    match args.remove(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(single)) => Ok(vec![single]),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(anyhow!("'{key}' must only contain strings, found {other}")),
            })
            .collect(),
        Some(other) => Err(anyhow!("'{key}' must be a list of strings, found {other}")),
    }
}

pub(crate) fn take_object(args: &mut ActionArgs, key: &str) -> Result<Map<String, Value>> {
    match args.remove(key) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(anyhow!("'{key}' must be an object, found {other}")),
    }
}

pub(crate) fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(num) => num.as_u64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
