use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::info;

use super::remove_file;
use crate::action::{Action, ActionArgs, ActionContext, ArgDocs};
use crate::error::ActionError;
use crate::template::resolve_template;

pub const ARG_DOCS: ArgDocs = &[(
    "copy",
    "List of [source, destination] file pairs. Both sides may use {name} placeholders.",
)];

/// Copies individual files, replacing whatever is at the destination.
#[derive(Debug, Clone, Default)]
pub struct CopyAction {
    items: Vec<Value>,
    resolved: Vec<(PathBuf, PathBuf)>,
}

impl CopyAction {
    pub fn from_args(mut args: ActionArgs) -> Result<Self> {
        let items = match args.remove("copy") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(other) => return Err(anyhow!("'copy' must be a list of pairs, found {other}")),
        };
        Ok(Self {
            items,
            resolved: Vec::new(),
        })
    }
}

impl Action for CopyAction {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn verify(&mut self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        if self.items.is_empty() {
            return Err(ActionError::invalid("No items to copy!"));
        }
        let mut resolved = Vec::with_capacity(self.items.len());
        for item in &self.items {
            let pair = match item.as_array().map(Vec::as_slice) {
                Some([Value::String(src), Value::String(dst)]) => (src, dst),
                _ => return Err(ActionError::invalid("Invalid copy item found in copy list!")),
            };
            let src = resolve_template(pair.0, ctx.config, Some(ctx.meta));
            let dst = resolve_template(pair.1, ctx.config, Some(ctx.meta));
            if !PathBuf::from(&src).is_file() {
                return Err(ActionError::invalid(format!(
                    "Copy item ({src}) does not exist!"
                )));
            }
            resolved.push((PathBuf::from(src), PathBuf::from(dst)));
        }
        self.resolved = resolved;
        Ok(())
    }

    fn run(&mut self, _ctx: &mut ActionContext<'_>) -> Result<()> {
        for (src, dst) in &self.resolved {
            remove_file(dst)
                .with_context(|| format!("Failed to replace {}", dst.display()))?;
            if let Some(parent) = dst.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            info!("Copying {} to {}", src.display(), dst.display());
            fs::copy(src, dst).with_context(|| {
                format!("Failed to copy {} to {}", src.display(), dst.display())
            })?;
        }
        Ok(())
    }
}
