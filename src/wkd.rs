//! Web Key Directory addressing.
//!
//! An [`EmailAddress`] maps to a [`WkdQuery`], which yields the [advanced](Method::Advanced)
//! and [direct](Method::Direct) lookup URLs.

use std::fmt;

use sha1::{Digest, Sha1};

/// The z-base-32 alphabet.
const ZBASE32: &[u8; 32] = b"ybndrfg8ejkmcpqxot1uwisza345h769";

/// A validated `local-part@domain` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmailAddress {
	address: String,
	at: usize,
}

impl EmailAddress {
	/// Validates an address.
	///
	/// The split happens at the last `@`. The domain must be a plausible DNS name in ASCII:
	/// an internationalised domain is rejected and must be configured in its `xn--` form.
	pub fn parse(address: &str) -> Result<Self, ErrorAddress> {
		let at = address.rfind('@').ok_or(ErrorAddress::MissingAt)?;
		let (local, domain) = (&address[..at], &address[at + 1..]);
		if local.is_empty() { return Err(ErrorAddress::EmptyLocalPart); }
		if local.chars().any(|c| c.is_whitespace() || c.is_control()) {
			return Err(ErrorAddress::InvalidLocalPart);
		}
		let valid_domain = !domain.is_empty()
			&& domain.split('.').all(|label| {
				!label.is_empty()
					&& !label.starts_with('-')
					&& !label.ends_with('-')
					&& label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
			});
		if !valid_domain { return Err(ErrorAddress::InvalidDomain(domain.to_owned())); }
		Ok(Self { address: address.to_owned(), at })
	}

	/// The local part, as configured.
	pub fn local_part(&self) -> &str { &self.address[..self.at] }
	/// The domain, as configured.
	pub fn domain(&self) -> &str { &self.address[self.at + 1..] }
	/// The whole address, as configured.
	pub fn as_str(&self) -> &str { &self.address }
}

impl fmt::Display for EmailAddress {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.address) }
}

impl std::str::FromStr for EmailAddress {
	type Err = ErrorAddress;
	fn from_str(s: &str) -> Result<Self, Self::Err> { Self::parse(s) }
}

/// [`EmailAddress::parse`] error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorAddress {
	#[error("missing '@'")]
	MissingAt,
	#[error("empty local part")]
	EmptyLocalPart,
	#[error("local part contains whitespace or control characters")]
	InvalidLocalPart,
	#[error("invalid domain '{0}'")]
	InvalidDomain(String),
}

/// WKD lookup method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
	/// `openpgpkey.<domain>` subdomain.
	Advanced,
	/// The mail domain itself.
	Direct,
}

impl Method {
	/// Methods in the order they are tried.
	pub const ORDER: [Method; 2] = [Method::Advanced, Method::Direct];
}

/// The WKD view of an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WkdQuery {
	/// ASCII-lowercased local part.
	pub local: String,
	/// Lowercased domain.
	pub domain: String,
	/// z-base-32 SHA-1 of [`local`](Self::local).
	pub hash: String,
	/// Percent-encoded local part in its original case, for the `l=` parameter.
	pub l: String,
}

impl WkdQuery {
	pub fn new(email: &EmailAddress) -> Self {
		let local = email.local_part().to_ascii_lowercase();
		let hash = zbase32(&Sha1::digest(local.as_bytes()));
		Self {
			hash,
			domain: email.domain().to_ascii_lowercase(),
			l: percent_encode(email.local_part()),
			local,
		}
	}

	/// The lookup URL for a method.
	pub fn url(&self, method: Method) -> WkdUrl {
		let (host, path) = match method {
			Method::Advanced => (
				format!("openpgpkey.{}", self.domain),
				format!("/.well-known/openpgpkey/{}/hu/{}?l={}", self.domain, self.hash, self.l),
			),
			Method::Direct => (
				self.domain.clone(),
				format!("/.well-known/openpgpkey/hu/{}?l={}", self.hash, self.l),
			),
		};
		WkdUrl { method, host, path }
	}

	/// The URLs in the order they are tried.
	pub fn urls(&self) -> [WkdUrl; 2] { Method::ORDER.map(|method| self.url(method)) }
}

/// An `https://` lookup URL, split into what a request needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WkdUrl {
	pub method: Method,
	pub host: String,
	/// Path and query string.
	pub path: String,
}

impl fmt::Display for WkdUrl {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "https://{}{}", self.host, self.path)
	}
}

/// z-base-32 encodes data, without padding.
pub fn zbase32(data: &[u8]) -> String {
	let mut out = String::with_capacity((data.len() * 8 + 4) / 5);
	let mut buffer = 0u16;
	let mut bits = 0;
	for &byte in data {
		buffer = (buffer << 8) | u16::from(byte);
		bits += 8;
		while bits >= 5 {
			bits -= 5;
			out.push(ZBASE32[usize::from((buffer >> bits) & 0x1f)] as char);
		}
		buffer &= (1 << bits) - 1;
	}
	if bits > 0 {
		out.push(ZBASE32[usize::from((buffer << (5 - bits)) & 0x1f)] as char);
	}
	out
}

/// Escapes everything outside the RFC 3986 unreserved set.
fn percent_encode(s: &str) -> String {
	use std::fmt::Write;
	let mut out = String::with_capacity(s.len());
	for b in s.bytes() {
		if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
			out.push(b as char);
		} else {
			let _ = write!(out, "%{b:02X}");
		}
	}
	out
}
