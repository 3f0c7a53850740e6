use std::process::ExitCode;

use chrono::Utc;
use clap::{Parser, ValueEnum};
use pgp_expiration::{Config, Mode, Probe};
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "pgp_expiration", version, about = "Munin plugin reporting days until OpenPGP keys published via WKD expire")]
struct Cli {
	/// Plugin mode; munin calls `config` first, then no argument.
	#[arg(value_enum, default_value_t = Command::Fetch)]
	mode: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Command {
	/// Declare the graph and its fields
	Config,
	/// Look keys up and print values
	Fetch,
	/// Same as fetch
	Cron,
}

impl From<Command> for Mode {
	fn from(command: Command) -> Self {
		match command {
			Command::Config => Mode::Config,
			Command::Fetch | Command::Cron => Mode::Fetch,
		}
	}
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
	// stdout carries the report, so logs go to stderr.
	let log_level = std::env::var("RUST_LOG")
		.ok()
		.and_then(|s| s.parse::<Level>().ok())
		.unwrap_or(Level::WARN);
	let subscriber = FmtSubscriber::builder()
		.with_max_level(log_level)
		.with_writer(std::io::stderr)
		.finish();
	if tracing::subscriber::set_global_default(subscriber).is_err() {
		eprintln!("failed to set the log subscriber");
	}

	let cli = Cli::parse();

	let config = match Config::from_env() {
		Ok(config) => config,
		Err(e) => {
			error!("configuration error: {e}");
			return ExitCode::FAILURE;
		},
	};

	let probe = Probe::new(config);
	let mut stdout = std::io::stdout().lock();
	match probe.run(cli.mode.into(), Utc::now(), &mut stdout).await {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			error!("{e}");
			ExitCode::FAILURE
		},
	}
}
