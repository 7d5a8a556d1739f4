pub mod action;
pub mod actions;
pub mod condition;
pub mod config;
pub mod error;
pub mod meta;
pub mod observability;
pub mod orchestrate;
pub mod presets;
pub mod process;
pub mod runner;
pub mod script;
pub mod template;
pub mod tools;
pub mod validation;

pub use action::{Action, ActionContext, ActionRegistry};
pub use config::ProjectConfig;
pub use error::{ActionError, RunnerError};
pub use meta::BuildMeta;
pub use runner::{RunReport, RunRequest, StepOutcome, StepRunner};
pub use script::ProjectScript;
