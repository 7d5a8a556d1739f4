use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info};

use super::{project_relative, remove_tree, run_tool, take_bool, take_string};
use crate::action::{Action, ActionArgs, ActionContext, ActionInit, ArgDocs};
use crate::error::ActionError;
use crate::process;

pub const ARG_DOCS: ArgDocs = &[
    ("branch", "Branch to clone or pull"),
    ("repo", "Repository URL"),
    ("output_folder", "Checkout folder, relative to the project"),
    (
        "rsa_path",
        "Private key relative to the project, installed when the user has no ~/.ssh folder",
    ),
    ("force_repull", "Delete the checkout and clone it again"),
    (
        "disable_strict_hostkey_check",
        "Write an ssh config that trusts github.com without prompting",
    ),
];

const SSH_CONFIG: &str = "Host github.com\nStrictHostKeyChecking no";

/// Clones a repository into the project, or pulls it when already cloned.
#[derive(Debug, Clone, Default)]
pub struct GitAction {
    pub branch: String,
    pub repo: String,
    pub output_folder: String,
    pub rsa_path: String,
    pub force_repull: bool,
    pub disable_strict_hostkey_check: bool,
    checkout_dir: PathBuf,
    branch_switched: bool,
}

impl GitAction {
    pub fn from_args(mut args: ActionArgs, init: &ActionInit<'_>) -> Result<Self> {
        let output_folder = take_string(&mut args, "output_folder").unwrap_or_default();
        Ok(Self {
            branch: take_string(&mut args, "branch").unwrap_or_default(),
            repo: take_string(&mut args, "repo").unwrap_or_default(),
            checkout_dir: project_relative(
                &init.config.uproject_dir_path,
                &init.resolve(&output_folder),
            ),
            output_folder,
            rsa_path: take_string(&mut args, "rsa_path").unwrap_or_default(),
            force_repull: take_bool(&mut args, "force_repull")?.unwrap_or(false),
            disable_strict_hostkey_check: take_bool(&mut args, "disable_strict_hostkey_check")?
                .unwrap_or(false),
            branch_switched: false,
        })
    }

    fn prepare_credentials(&self, ctx: &mut ActionContext<'_>) -> Result<()> {
        let Some(home) = home_dir() else {
            if !self.rsa_path.is_empty() || self.disable_strict_hostkey_check {
                ctx.warning("No user profile directory found; skipping ssh setup");
            }
            return Ok(());
        };
        let ssh_dir = home.join(".ssh");

        if !ssh_dir.exists() && !self.rsa_path.is_empty() {
            let rsa_file = ctx.config.uproject_dir_path.join(&self.rsa_path);
            if !rsa_file.is_file() {
                return Err(ActionError::failed(
                    "No git credentials exists at rsa_path! Check rsa_path is relative to the project path and exists.",
                )
                .into());
            }
            fs::create_dir_all(&ssh_dir)
                .with_context(|| format!("Failed to create {}", ssh_dir.display()))?;
            if let Some(name) = rsa_file.file_name() {
                fs::copy(&rsa_file, ssh_dir.join(name))
                    .with_context(|| format!("Failed to install {}", rsa_file.display()))?;
            }
        }

        let ssh_config = ssh_dir.join("config");
        if self.disable_strict_hostkey_check && !ssh_config.is_file() {
            fs::create_dir_all(&ssh_dir)
                .with_context(|| format!("Failed to create {}", ssh_dir.display()))?;
            fs::write(&ssh_config, SSH_CONFIG)
                .with_context(|| format!("Failed to write {}", ssh_config.display()))?;
        }
        Ok(())
    }

    fn switch_branch(&mut self) -> Result<()> {
        let current = current_branch(&self.checkout_dir);
        debug!(current = ?current, wanted = %self.branch, "Checked out branch");
        if current.as_deref() == Some(self.branch.as_str()) {
            return Ok(());
        }
        info!("Switching '{}' to branch '{}'", self.checkout_dir.display(), self.branch);
        run_tool(
            Path::new("git"),
            &["fetch", "origin", self.branch.as_str()],
            Some(&self.checkout_dir),
            "Git fetch failed!",
        )?;
        run_tool(
            Path::new("git"),
            &["checkout", self.branch.as_str()],
            Some(&self.checkout_dir),
            format!("Git checkout of branch '{}' failed!", self.branch),
        )?;
        self.branch_switched = true;
        Ok(())
    }
}

impl Action for GitAction {
    fn name(&self) -> &'static str {
        "git"
    }

    fn verify(&mut self, _ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        if self.branch.is_empty() {
            return Err(ActionError::invalid("No project branch specified!"));
        }
        if self.repo.is_empty() {
            return Err(ActionError::invalid("Git repo not specified!"));
        }
        if self.output_folder.is_empty() {
            return Err(ActionError::invalid("No output folder specified!"));
        }
        Ok(())
    }

    fn run(&mut self, ctx: &mut ActionContext<'_>) -> Result<()> {
        self.prepare_credentials(ctx)?;

        if self.force_repull && self.checkout_dir.exists() {
            info!("Deleting {} for a complete re-pull", self.checkout_dir.display());
            remove_tree(&self.checkout_dir)
                .with_context(|| format!("Failed to delete {}", self.checkout_dir.display()))?;
        }
        fs::create_dir_all(&self.checkout_dir)
            .with_context(|| format!("Failed to create {}", self.checkout_dir.display()))?;

        if self.checkout_dir.join(".git").is_dir() {
            self.switch_branch()?;
            info!("Pulling from Git '{}' branch '{}'", self.repo, self.branch);
            run_tool(
                Path::new("git"),
                &["pull", "origin", self.branch.as_str()],
                Some(&self.checkout_dir),
                "Git pull failed!",
            )
        } else {
            info!("Cloning from Git '{}' branch '{}'", self.repo, self.branch);
            let dir = self.checkout_dir.to_string_lossy().to_string();
            run_tool(
                Path::new("git"),
                &clone_args(&self.branch, &self.repo, &dir),
                None,
                "Git clone failed!",
            )
        }
    }

    fn output(&self, field: &str) -> Option<Value> {
        match field {
            "branch" => Some(Value::from(self.branch.clone())),
            "branch_switched" => Some(Value::from(self.branch_switched)),
            "output_folder" => Some(Value::from(self.checkout_dir.to_string_lossy().to_string())),
            _ => None,
        }
    }
}

pub fn clone_args(branch: &str, repo: &str, dir: &str) -> Vec<String> {
    ["clone", "-b", branch, repo, dir]
        .iter()
        .map(|part| part.to_string())
        .collect()
}

fn current_branch(dir: &Path) -> Option<String> {
    let output = process::capture("git", &["rev-parse", "--abbrev-ref", "HEAD"], Some(dir)).ok()?;
    let branch = output.trim();
    (!branch.is_empty()).then(|| branch.to_string())
}

fn home_dir() -> Option<PathBuf> {
    ["USERPROFILE", "HOME"]
        .iter()
        .find_map(|key| env::var_os(key).filter(|value| !value.is_empty()))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_names_branch_before_repo() {
        assert_eq!(
            clone_args("release", "git@host:engine.git", "/proj/Engine"),
            vec!["clone", "-b", "release", "git@host:engine.git", "/proj/Engine"]
        );
    }
}
