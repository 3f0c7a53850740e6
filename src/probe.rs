//! The probe: lookup, parse and evaluate every configured address, then report.

use std::future::Future;
use std::io::{self, Write};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::expiration::{evaluate, ExpirationResult};
use crate::fetch::Transport;
use crate::keys;
use crate::report::{emit_config, emit_values, field_names};
use crate::resolve::{Lookup, Resolver};
use crate::wkd::EmailAddress;

/// Where key material comes from.
pub trait KeySource {
	fn lookup(&self, email: &EmailAddress) -> impl Future<Output = Lookup>;
}

impl<T: Transport> KeySource for Resolver<T> {
	fn lookup(&self, email: &EmailAddress) -> impl Future<Output = Lookup> { self.resolve(email) }
}

/// Plugin invocation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
	/// Declare the fields. No network access.
	Config,
	/// Look keys up and print values.
	#[default]
	Fetch,
}

/// Runs the pipeline for one address.
///
/// Every failure is logged and ends in `None`; nothing here aborts a run.
pub async fn check<S: KeySource>(source: &S, email: &EmailAddress, now: DateTime<Utc>) -> Option<ExpirationResult> {
	let material = match source.lookup(email).await {
		Lookup::Found(material) => material,
		Lookup::NotFound => {
			info!(%email, "no key published");
			return None;
		},
		Lookup::Failed(e) => {
			warn!(%email, error = %e, "key lookup failed");
			return None;
		},
	};
	let key = match keys::parse_all(&material) {
		Ok(certs) => keys::select(certs, email)?,
		Err(e) => {
			warn!(%email, error = %e, "malformed key material");
			return None;
		},
	};
	for subkey in key.subkeys() {
		debug!(%email, fingerprint = %subkey.fingerprint, expiration = ?subkey.expiration, revoked = subkey.revoked, "subkey");
	}

	let result = evaluate(&key, now);
	match result {
		ExpirationResult::Expires(days) => debug!(%email, fingerprint = %key.fingerprint(), days, "key expires"),
		ExpirationResult::NeverExpires => info!(%email, fingerprint = %key.fingerprint(), "key never expires"),
		ExpirationResult::Revoked => info!(%email, fingerprint = %key.fingerprint(), "key is revoked"),
	}
	Some(result)
}

/// A configured probe.
pub struct Probe<S = Resolver> {
	config: Config,
	source: S,
}

impl Probe<Resolver> {
	/// A probe looking keys up over WKD.
	pub fn new(config: Config) -> Self {
		let source = Resolver::new(config.limits);
		Self { config, source }
	}
}

impl<S: KeySource> Probe<S> {
	pub fn with_source(config: Config, source: S) -> Self { Self { config, source } }

	/// Checks every address, at most [`Config::concurrency`] at a time.
	///
	/// Results come back in configured order, paired with their field names.
	pub async fn results(&self, now: DateTime<Utc>) -> Vec<(String, Option<ExpirationResult>)> {
		let results: Vec<_> = stream::iter(&self.config.addresses)
			.map(|email| check(&self.source, email, now))
			.buffered(self.config.concurrency.max(1))
			.collect()
			.await;
		field_names(&self.config.addresses).into_iter().zip(results).collect()
	}

	/// Writes the report for a mode.
	pub async fn run(&self, mode: Mode, now: DateTime<Utc>, out: &mut impl Write) -> Result<(), ErrorRun> {
		match mode {
			Mode::Config => emit_config(out, &self.config.addresses, &self.config.thresholds)?,
			Mode::Fetch => {
				let results = self.results(now).await;
				let reported = results.iter().filter(|(_, result)| result.and_then(ExpirationResult::days).is_some()).count();
				info!(addresses = results.len(), reported, "fetch complete");
				emit_values(out, &results)?;
			},
		}
		out.flush()?;
		Ok(())
	}
}

/// [`Probe::run`] error.
#[derive(Debug, thiserror::Error)]
pub enum ErrorRun {
	#[error("failed to write report: {0}")]
	Output(#[from] io::Error),
}
