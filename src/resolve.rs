//! WKD key resolution.

use tracing::{debug, info};

use crate::fetch::{ErrorFetch, Https, Limits, Transport};
use crate::wkd::{EmailAddress, WkdQuery};

/// Raw key material, binary or armored, as served.
pub type KeyMaterial = Vec<u8>;

/// Outcome of a WKD lookup.
#[derive(Debug)]
pub enum Lookup {
	Found(KeyMaterial),
	/// Every method answered, none with a key.
	NotFound,
	/// The last method tried failed below HTTP; carries that failure.
	Failed(ErrorFetch),
}

/// Resolves addresses over a [`Transport`], HTTPS by default.
#[derive(Debug, Clone, Default)]
pub struct Resolver<T = Https> {
	pub limits: Limits,
	transport: T,
}

impl Resolver<Https> {
	pub fn new(limits: Limits) -> Self { Self { limits, transport: Https } }
}

impl<T: Transport> Resolver<T> {
	pub fn with_transport(limits: Limits, transport: T) -> Self { Self { limits, transport } }

	/// Tries the advanced method, then the direct one.
	///
	/// Any transport failure, non-2xx status, or empty body moves on to the next method.
	pub async fn resolve(&self, email: &EmailAddress) -> Lookup {
		let query = WkdQuery::new(email);
		let mut outcome = Lookup::NotFound;
		for url in query.urls() {
			match self.transport.get(&url, &self.limits).await {
				Ok(response) if response.is_success() && !response.body().is_empty() => {
					debug!(%email, %url, status = response.status, "WKD key found");
					return Lookup::Found(response.into_body());
				},
				Ok(response) => {
					info!(%email, %url, status = response.status, "WKD miss");
					outcome = Lookup::NotFound;
				},
				Err(e) => {
					info!(%email, %url, error = %e, "WKD fetch failed");
					outcome = Lookup::Failed(e);
				},
			}
		}
		outcome
	}
}
