//! Reports how many days remain before the OpenPGP keys of a list of addresses expire.
//!
//! Keys are looked up through the Web Key Directory ([`resolve`]), parsed in-process
//! ([`keys`]), [evaluated](expiration::evaluate) against the current time, and reported in
//! munin plugin format ([`report`]). [`Probe`] ties it together.

pub mod wkd;
pub mod fetch;
pub mod resolve;
pub mod armor;
pub mod parse;
pub mod keys;
pub mod expiration;
pub mod report;
pub mod config;
pub mod probe;

pub use config::{Config, ErrorConfig};
pub use expiration::{evaluate, ExpirationResult};
pub use keys::ParsedKey;
pub use probe::{KeySource, Mode, Probe};
pub use resolve::{Lookup, Resolver};
pub use wkd::EmailAddress;

/// Parses the first certificate in binary or armored key material.
pub fn parse(data: &[u8]) -> Result<ParsedKey, parse::ErrorParse> {
	keys::parse(data)
}
