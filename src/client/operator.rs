//! The person driving an upload

use super::{ClientError, Result};
use crate::diff;

use async_trait::async_trait;
use colored::*;

/// Decisions an upload needs from whoever runs it
#[async_trait]
pub trait Operator: Send + Sync {
	/// Present how the local descriptor differs from the stored one
	async fn show_difference(&self, identity: &str, existing: &str, incoming: &str);

	/// Whether to upload the changed descriptor under a new version
	async fn confirm_new_version(&self, identity: &str) -> Result<bool>;

	/// The version to use, offering `suggested` as default. `None` aborts.
	async fn prompt_version(&self, existing: &str, suggested: &str) -> Result<Option<String>>;

	async fn info(&self, message: &str);

	async fn warn(&self, message: &str);

	async fn error(&self, message: &str);
}

/// Interactive terminal operator
#[derive(Debug, Default, Clone)]
pub struct ConsoleOperator;

impl ConsoleOperator {
	pub fn new() -> Self {
		Self
	}
}

#[async_trait]
impl Operator for ConsoleOperator {
	async fn show_difference(&self, identity: &str, existing: &str, incoming: &str) {
		println!();
		println!(
			"{} {}",
			"Entity already exists with different content:".bright_yellow().bold(),
			identity.bright_cyan()
		);
		println!("{}", "Difference (existing -> incoming):".dimmed());
		for line in diff::lines(existing, incoming) {
			if line.starts_with("- ") {
				println!("{}", line.red());
			} else if line.starts_with("+ ") {
				println!("{}", line.green());
			} else {
				println!("{}", line.dimmed());
			}
		}
		println!();
	}

	async fn confirm_new_version(&self, identity: &str) -> Result<bool> {
		dialoguer::Confirm::new()
			.with_prompt(format!("Upload {identity} under a new version?"))
			.default(true)
			.interact()
			.map_err(|e| ClientError::Interaction(e.to_string()))
	}

	async fn prompt_version(&self, existing: &str, suggested: &str) -> Result<Option<String>> {
		let version: String = dialoguer::Input::new()
			.with_prompt(format!(
				"The existing version is {existing}. Enter the new version"
			))
			.default(suggested.to_string())
			.interact_text()
			.map_err(|e| ClientError::Interaction(e.to_string()))?;

		let version = version.trim();
		if version.is_empty() {
			Ok(None)
		} else {
			Ok(Some(version.to_string()))
		}
	}

	async fn info(&self, message: &str) {
		println!("{} {}", "info:".bright_blue(), message);
	}

	async fn warn(&self, message: &str) {
		eprintln!("{} {}", "warning:".bright_yellow().bold(), message);
	}

	async fn error(&self, message: &str) {
		eprintln!("{} {}", "error:".red().bold(), message);
	}
}
