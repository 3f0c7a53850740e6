//! Probe configuration.

use std::env;
use std::time::Duration;

use tracing::warn;

use crate::fetch::Limits;
use crate::report::Thresholds;
use crate::wkd::{EmailAddress, ErrorAddress};

/// The environment variable holding the whitespace-separated address list.
pub const EMAILS_VAR: &str = "emails";

/// Everything a run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
	/// Addresses in configured order, without duplicates.
	pub addresses: Vec<EmailAddress>,
	pub thresholds: Thresholds,
	pub limits: Limits,
	/// Lookups in flight at once.
	pub concurrency: usize,
}

impl Config {
	/// Reads [`EMAILS_VAR`].
	pub fn from_env() -> Result<Self, ErrorConfig> {
		match env::var(EMAILS_VAR) {
			Ok(list) => Self::from_list(&list),
			Err(env::VarError::NotPresent) => Err(ErrorConfig::Missing(EMAILS_VAR)),
			Err(env::VarError::NotUnicode(_)) => Err(ErrorConfig::NotUnicode(EMAILS_VAR)),
		}
	}

	/// Parses a whitespace-separated address list. An empty list is valid.
	pub fn from_list(list: &str) -> Result<Self, ErrorConfig> {
		let mut addresses: Vec<EmailAddress> = Vec::new();
		for entry in list.split_whitespace() {
			let address = EmailAddress::parse(entry)
				.map_err(|source| ErrorConfig::InvalidAddress { address: entry.to_owned(), source })?;
			if addresses.contains(&address) {
				warn!(%address, "ignoring duplicate address");
				continue;
			}
			addresses.push(address);
		}
		Ok(Self { addresses, ..Self::default() })
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.limits.timeout = timeout;
		self
	}

	pub fn with_concurrency(mut self, concurrency: usize) -> Self {
		self.concurrency = concurrency.max(1);
		self
	}
}

impl Default for Config {
	fn default() -> Self {
		Self {
			addresses: Vec::new(),
			thresholds: Thresholds::default(),
			limits: Limits::default(),
			concurrency: 4,
		}
	}
}

/// Fatal configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorConfig {
	#[error("environment variable '{0}' is not set")]
	Missing(&'static str),
	#[error("environment variable '{0}' is not valid unicode")]
	NotUnicode(&'static str),
	#[error("invalid address '{address}': {source}")]
	InvalidAddress { address: String, source: ErrorAddress },
}
