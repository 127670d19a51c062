use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use entities_service::{
	backend::{get_backend, AuthLevel, ConnectionProvider},
	client::{
		collect_files, BackendRegistryClient, CliConfig, ConsoleOperator, FileFormat,
		HttpRegistryClient, Operator, RegistryClient, UploadOptions, UploadSummary, Uploader,
	},
	config::{default_data_dir, ServiceConfig},
	logging::init_logging,
};
use std::{path::PathBuf, process::ExitCode, sync::Arc};

#[derive(Parser, Debug)]
#[command(
	name = "entities-service",
	version,
	about = "Upload and manage entities in an entities registry"
)]
struct Cli {
	/// Path to the data directory holding configuration and local stores
	#[arg(long, global = true, env = "ENTITIES_SERVICE_DATA_DIR")]
	data_dir: Option<PathBuf>,

	/// Log level for this crate (error, warn, info, debug, trace)
	#[arg(long, global = true, default_value = "warn")]
	log_level: String,

	/// Also append logs to this file
	#[arg(long, global = true)]
	log_file: Option<PathBuf>,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Upload entity files to the registry
	Upload {
		/// Entity file to upload (repeatable)
		#[arg(short = 'f', long = "file")]
		files: Vec<PathBuf>,
		/// Directory searched recursively for entity files (repeatable)
		#[arg(short = 'd', long = "dir")]
		dirs: Vec<PathBuf>,
		/// File format to pick up (repeatable; yaml includes yml)
		#[arg(long = "format")]
		formats: Vec<FileFormat>,
		/// Stop at the first file that fails
		#[arg(long, default_value_t = false)]
		fail_fast: bool,
		/// Write into the local store from the service configuration
		#[arg(long, default_value_t = false)]
		local: bool,
	},
	/// Check that the configured credentials allow uploads
	Login {
		#[arg(short, long, default_value_t = false)]
		quiet: bool,
	},
	/// Client configuration
	#[command(subcommand)]
	Config(ConfigCmd),
}

#[derive(Subcommand, Debug)]
enum ConfigCmd {
	/// Show all configuration
	Show,
	/// Set the registry URL
	SetUrl { url: String },
	/// Set the access token used for uploads
	SetToken { token: String },
}

#[tokio::main]
async fn main() -> ExitCode {
	let cli = Cli::parse();

	if let Err(e) = init_logging(&cli.log_level, cli.log_file.as_deref()) {
		eprintln!("{} {e:#}", "error:".red().bold());
		return ExitCode::FAILURE;
	}

	match run(cli).await {
		Ok(true) => ExitCode::SUCCESS,
		Ok(false) => ExitCode::FAILURE,
		Err(e) => {
			eprintln!("{} {e:#}", "error:".red().bold());
			ExitCode::FAILURE
		}
	}
}

async fn run(cli: Cli) -> Result<bool> {
	let data_dir = match cli.data_dir {
		Some(dir) => dir,
		None => default_data_dir()?,
	};
	let mut config = CliConfig::load(&data_dir)?;

	match cli.command {
		Commands::Upload {
			files,
			dirs,
			formats,
			fail_fast,
			local,
		} => {
			if files.is_empty() && dirs.is_empty() {
				return Err(anyhow!("Nothing to upload: pass --file or --dir"));
			}

			let client = if local {
				local_client(&data_dir).await?
			} else {
				Arc::new(HttpRegistryClient::new(
					config.base_url.clone(),
					config.access_token.clone(),
				)?) as Arc<dyn RegistryClient>
			};
			let operator: Arc<dyn Operator> = Arc::new(ConsoleOperator::new());

			let formats = if formats.is_empty() {
				config.formats()
			} else {
				formats
			};
			let paths = collect_files(&files, &dirs, &formats, operator.as_ref()).await?;
			if paths.is_empty() {
				operator.warn("No files found to upload.").await;
				return Ok(true);
			}

			let summary = Uploader::new(client, operator)
				.with_options(UploadOptions { fail_fast })
				.upload(&paths)
				.await?;
			print_summary(&summary);

			Ok(summary.is_success())
		}
		Commands::Login { quiet } => {
			let client = HttpRegistryClient::new(config.base_url.clone(), config.access_token.clone())?;
			client
				.check_login()
				.await
				.with_context(|| format!("Could not log in to {}", config.base_url))?;
			if !quiet {
				println!("{} {}", "Logged in to".green(), config.base_url.bright_cyan());
			}
			Ok(true)
		}
		Commands::Config(cmd) => {
			match cmd {
				ConfigCmd::Show => {
					println!("{:<16} {}", "base_url".bold(), config.base_url);
					println!(
						"{:<16} {}",
						"access_token".bold(),
						if config.access_token.is_some() { "(set)" } else { "(not set)" }
					);
					println!("{:<16} {}", "default_formats".bold(), config.default_formats.join(", "));
					println!();
					println!("Config file: {}", CliConfig::config_path(&data_dir).display());
				}
				ConfigCmd::SetUrl { url } => {
					config.set_base_url(url, &data_dir)?;
					println!("Set base_url = {}", config.base_url);
				}
				ConfigCmd::SetToken { token } => {
					config.set_access_token(token, &data_dir)?;
					println!("Set access_token");
				}
			}
			Ok(true)
		}
	}
}

async fn local_client(data_dir: &std::path::Path) -> Result<Arc<dyn RegistryClient>> {
	let service = ServiceConfig::load_from(data_dir)?;
	let provider = Arc::new(ConnectionProvider::new(service.database_file()));
	let backend = get_backend(service.backend_settings(AuthLevel::Write), provider);
	backend.initialize().await?;

	Ok(Arc::new(BackendRegistryClient::new(
		backend,
		service.max_entities_in_errors,
	)))
}

fn print_summary(summary: &UploadSummary) {
	let entities = |n: usize| if n == 1 { "entity" } else { "entities" };

	if !summary.uploaded.is_empty() {
		println!(
			"{}",
			format!(
				"Successfully uploaded {} {}:",
				summary.uploaded.len(),
				entities(summary.uploaded.len())
			)
			.green()
			.bold()
		);
		for path in &summary.uploaded {
			println!("  {}", path.display());
		}
	}
	if !summary.skipped.is_empty() {
		println!(
			"{}",
			format!(
				"Skipped {} {}:",
				summary.skipped.len(),
				entities(summary.skipped.len())
			)
			.yellow()
		);
		for path in &summary.skipped {
			println!("  {}", path.display());
		}
	}
	if !summary.failed.is_empty() {
		println!(
			"{}",
			format!(
				"Failed to upload {} {}:",
				summary.failed.len(),
				entities(summary.failed.len())
			)
			.red()
			.bold()
		);
		for path in &summary.failed {
			println!("  {}", path.display());
		}
	}
}
