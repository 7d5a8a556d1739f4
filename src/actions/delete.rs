use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use super::{remove_file, remove_tree, take_bool, take_strings};
use crate::action::{Action, ActionArgs, ActionContext, ArgDocs};
use crate::error::ActionError;
use crate::template::resolve_template;

pub const ARG_DOCS: ArgDocs = &[
    ("paths", "Files or folders to delete. Paths may use {name} placeholders."),
    (
        "verify_exist",
        "Fail verification when a path does not exist (default false)",
    ),
];

/// Deletes files and folder trees.
#[derive(Debug, Clone, Default)]
pub struct DeleteAction {
    paths: Vec<String>,
    verify_exist: bool,
    resolved: Vec<PathBuf>,
}

impl DeleteAction {
    pub fn from_args(mut args: ActionArgs) -> Result<Self> {
        Ok(Self {
            paths: take_strings(&mut args, "paths")?,
            verify_exist: take_bool(&mut args, "verify_exist")?.unwrap_or(false),
            resolved: Vec::new(),
        })
    }
}

impl Action for DeleteAction {
    fn name(&self) -> &'static str {
        "delete"
    }

    fn verify(&mut self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        if self.paths.is_empty() {
            return Err(ActionError::invalid("No deletion paths specified!"));
        }
        let mut resolved = Vec::with_capacity(self.paths.len());
        for raw in &self.paths {
            let path = resolve_template(raw, ctx.config, Some(ctx.meta));
            if self.verify_exist && !PathBuf::from(&path).exists() {
                return Err(ActionError::invalid(format!(
                    "Invalid deletion path specified : \"{path}\""
                )));
            }
            resolved.push(PathBuf::from(path));
        }
        self.resolved = resolved;
        Ok(())
    }

    fn run(&mut self, _ctx: &mut ActionContext<'_>) -> Result<()> {
        for path in &self.resolved {
            if path.is_dir() {
                info!(path = %path.display(), "Deleting directory");
                remove_tree(path).map_err(|err| {
                    ActionError::failed(format!(
                        "Unable to delete the directory: {}. Error: {err}. Check that the files in the folder are not open / held by another process and try again.",
                        path.display()
                    ))
                })?;
            } else if path.is_file() {
                info!(path = %path.display(), "Deleting file");
                remove_file(path)
                    .with_context(|| format!("Failed to delete {}", path.display()))?;
            }
        }
        Ok(())
    }
}
