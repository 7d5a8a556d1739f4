use std::path::PathBuf;

use anyhow::Result;

use super::{project_relative, run_tool, take_string, take_strings};
use crate::action::{Action, ActionArgs, ActionContext, ActionInit, ArgDocs};
use crate::config::ProjectConfig;
use crate::error::ActionError;

pub const ARG_DOCS: ArgDocs = &[
    ("maps", "(optional) List of maps to cook"),
    ("cook_dirs", "(optional) Directories to unconditionally cook"),
    ("cultures", "(optional) List of cultures to cook the content for"),
    ("output_dir", "Cooked asset output directory"),
];

/// Runs the editor's cook commandlet.
#[derive(Debug, Clone, Default)]
pub struct CookAction {
    pub maps: Vec<String>,
    pub cook_dirs: Vec<String>,
    pub cultures: Vec<String>,
    pub output_dir: PathBuf,
}

impl CookAction {
    pub fn from_args(mut args: ActionArgs, init: &ActionInit<'_>) -> Result<Self> {
        Ok(Self {
            maps: take_strings(&mut args, "maps")?,
            cook_dirs: take_strings(&mut args, "cook_dirs")?,
            cultures: take_strings(&mut args, "cultures")?,
            output_dir: take_string(&mut args, "output_dir")
                .map(|dir| project_relative(&init.config.uproject_dir_path, &init.resolve(&dir)))
                .unwrap_or_default(),
        })
    }

    pub fn command_args(&self, config: &ProjectConfig) -> Vec<String> {
        let mut args = vec!["-run=Cook".to_string()];
        args.extend(self.maps.iter().map(|map| format!("-Map={map}")));
        args.extend(self.cook_dirs.iter().map(|dir| format!("-CookDir={dir}")));
        if !self.cultures.is_empty() {
            args.push(format!("-CookCultures={}", self.cultures.join("+")));
        }
        args.push("-NoLogTimes".into());
        args.push(format!("-TargetPlatform={}", config.platform));
        args.push("-Unversioned".into());
        args.push(format!("-output_dir={}", self.output_dir.display()));
        if config.debug {
            args.push("-debug".into());
        }
        args
    }
}

impl Action for CookAction {
    fn name(&self) -> &'static str {
        "cook"
    }

    fn verify(&mut self, _ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        if !self.output_dir.is_dir() {
            return Err(ActionError::invalid("Invalid output directory!"));
        }
        Ok(())
    }

    fn run(&mut self, ctx: &mut ActionContext<'_>) -> Result<()> {
        let editor_cmd = ctx.config.engine.editor_cmd(ctx.config.debug);
        if !editor_cmd.is_file() {
            return Err(ActionError::failed(format!(
                "Unable to resolve path to unreal cmd \"{}\"",
                editor_cmd.display()
            ))
            .into());
        }
        let args = self.command_args(ctx.config);
        run_tool(
            &editor_cmd,
            &args,
            None,
            "Unable to complete cook action. Check output.",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Configuration, Platform};

    #[test]
    fn cook_flags_follow_arguments() {
        let action = CookAction {
            maps: vec!["Arena".into()],
            cook_dirs: vec!["/Game/UI".into()],
            cultures: vec!["en".into(), "fr".into()],
            output_dir: PathBuf::from("/out"),
        };
        let mut config = ProjectConfig::new(Configuration::Shipping, Platform::Linux);
        config.debug = true;
        assert_eq!(
            action.command_args(&config),
            vec![
                "-run=Cook",
                "-Map=Arena",
                "-CookDir=/Game/UI",
                "-CookCultures=en+fr",
                "-NoLogTimes",
                "-TargetPlatform=Linux",
                "-Unversioned",
                "-output_dir=/out",
                "-debug"
            ]
        );
    }
}
