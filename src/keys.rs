//! Certificates: [`ParsedKey`] and its [`Component`]s.
//!
//! Signatures are not verified cryptographically. A signature counts as a self-signature when
//! its issuer, if stated, is the primary key. The key itself comes over authenticated HTTPS
//! from the address's own domain.

use std::fmt;

use chrono::{DateTime, Utc};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use tracing::debug;

use crate::parse::{ErrorParse, KeyPacket, Packet, Packets, SignaturePacket, SignatureType, TAG_PUBLIC_KEY, TAG_PUBLIC_SUBKEY};
use crate::wkd::EmailAddress;

/// A key fingerprint.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
	fn of(key: &KeyPacket) -> Result<Self, ErrorParse> {
		Ok(Self(match key.version {
			4 => {
				let len = u16::try_from(key.body.len()).map_err(|_| ErrorParse::Malformed("v4 key too long"))?;
				let mut hasher = Sha1::new();
				hasher.update([0x99u8]);
				hasher.update(len.to_be_bytes());
				hasher.update(key.body);
				hasher.finalize().to_vec()
			},
			_ => {
				let len = u32::try_from(key.body.len()).map_err(|_| ErrorParse::Malformed("v6 key too long"))?;
				let mut hasher = Sha256::new();
				hasher.update([0x9bu8]);
				hasher.update(len.to_be_bytes());
				hasher.update(key.body);
				hasher.finalize().to_vec()
			},
		}))
	}

	pub fn as_bytes(&self) -> &[u8] { &self.0 }

	/// The 8-octet key ID: the low end of a v4 fingerprint, the high end of a v6 one.
	pub fn key_id(&self) -> [u8; 8] {
		let mut id = [0; 8];
		match self.0.len() {
			20 => id.copy_from_slice(&self.0[12..]),
			_ => id.copy_from_slice(&self.0[..8]),
		}
		id
	}
}

impl fmt::Display for Fingerprint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.iter().try_for_each(|b| write!(f, "{b:02X}"))
	}
}

impl fmt::Debug for Fingerprint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Fingerprint({self})") }
}

/// Whether a component is the primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
	Primary,
	Subkey,
}

/// A primary key or subkey with its effective expiration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
	pub role: Role,
	pub fingerprint: Fingerprint,
	pub created: DateTime<Utc>,
	/// `None` when the key never expires.
	pub expiration: Option<DateTime<Utc>>,
	pub revoked: bool,
}

/// A parsed certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
	pub user_ids: Vec<String>,
	/// The primary key first, then bound subkeys in packet order.
	pub components: Vec<Component>,
}

impl ParsedKey {
	pub fn primary(&self) -> &Component { &self.components[0] }
	pub fn fingerprint(&self) -> &Fingerprint { &self.primary().fingerprint }
	pub fn created(&self) -> DateTime<Utc> { self.primary().created }
	pub fn is_revoked(&self) -> bool { self.primary().revoked }
	pub fn subkeys(&self) -> &[Component] { &self.components[1..] }

	/// Whether a user ID names the address, ignoring case.
	pub fn has_address(&self, email: &EmailAddress) -> bool {
		let wanted = email.as_str().to_lowercase();
		self.user_ids.iter().any(|uid| {
			let uid = uid.to_lowercase();
			uid == wanted || uid.contains(&format!("<{wanted}>"))
		})
	}
}

/// Parses the first certificate in binary or armored key material.
pub fn parse(data: &[u8]) -> Result<ParsedKey, ErrorParse> {
	parse_all(data)?.into_iter().next().ok_or(ErrorParse::NoPrimaryKey)
}

/// Parses every certificate in binary or armored key material.
pub fn parse_all(data: &[u8]) -> Result<Vec<ParsedKey>, ErrorParse> {
	if crate::armor::is_armored(data) {
		let binary = crate::armor::dearmor(data).map_err(|e| ErrorParse::Armor(e.to_string()))?;
		return parse_binary(&binary);
	}
	parse_binary(data)
}

/// Picks the certificate for an address: one with a matching user ID, otherwise the first.
pub fn select(keys: Vec<ParsedKey>, email: &EmailAddress) -> Option<ParsedKey> {
	match keys.iter().position(|key| key.has_address(email)) {
		Some(i) => keys.into_iter().nth(i),
		None => keys.into_iter().next(),
	}
}

/// Parses every certificate in a binary packet stream.
///
/// A certificate that cannot be used is skipped, and its error is returned only when no
/// certificate remains. Framing errors reject the whole stream.
fn parse_binary(data: &[u8]) -> Result<Vec<ParsedKey>, ErrorParse> {
	let mut keys = Vec::new();
	let mut rejected = None;
	let mut current: Option<CertBuilder> = None;
	let mut section = Section::Ignored;
	// Inside a secret key or an unsupported key, up to the next public key.
	let mut skipping = false;

	for packet in Packets::new(data) {
		match packet? {
			Packet::PublicKey(key) => {
				if let Some(builder) = current.take() { finish(builder, &mut keys, &mut rejected); }
				match CertBuilder::new(&key) {
					Ok(builder) => {
						current = Some(builder);
						section = Section::Primary;
						skipping = false;
					},
					Err(e) => {
						debug!(error = %e, "skipping certificate");
						rejected.get_or_insert(e);
						section = Section::Ignored;
						skipping = true;
					},
				}
			},
			Packet::SecretKey => {
				debug!("skipping secret key");
				if let Some(builder) = current.take() { finish(builder, &mut keys, &mut rejected); }
				section = Section::Ignored;
				skipping = true;
			},
			Packet::Unsupported { tag: TAG_PUBLIC_KEY, version } => {
				debug!(version, "skipping certificate with unsupported key version");
				if let Some(builder) = current.take() { finish(builder, &mut keys, &mut rejected); }
				rejected.get_or_insert(ErrorParse::UnsupportedVersion { packet: "key", version });
				section = Section::Ignored;
				skipping = true;
			},
			Packet::Unsupported { tag: TAG_PUBLIC_SUBKEY, version } => {
				debug!(version, "skipping subkey with unsupported key version");
				section = Section::Ignored;
			},
			Packet::Unsupported { tag, version } => debug!(tag, version, "skipping packet with unsupported version"),
			Packet::UserId(uid) => {
				let Some(builder) = current.as_mut() else {
					if skipping { continue; }
					return Err(ErrorParse::Orphan("user ID"));
				};
				builder.user_ids.push(UserIdBuilder::new(uid));
				section = Section::UserId(builder.user_ids.len() - 1);
			},
			Packet::PublicSubkey(key) => {
				let Some(builder) = current.as_mut() else {
					if skipping { continue; }
					return Err(ErrorParse::Orphan("subkey"));
				};
				match SubkeyBuilder::new(&key) {
					Ok(subkey) => {
						builder.subkeys.push(subkey);
						section = Section::Subkey(builder.subkeys.len() - 1);
					},
					Err(e) => {
						debug!(error = %e, "skipping subkey");
						section = Section::Ignored;
					},
				}
			},
			Packet::UserAttribute | Packet::SecretSubkey => section = Section::Ignored,
			Packet::Signature(signature) => {
				let Some(builder) = current.as_mut() else { continue };
				builder.signature(section, signature);
			},
			Packet::Trust => {},
			Packet::Other { tag, .. } => debug!(tag, "skipping packet"),
		}
	}
	if let Some(builder) = current { finish(builder, &mut keys, &mut rejected); }
	if keys.is_empty() { return Err(rejected.unwrap_or(ErrorParse::NoPrimaryKey)); }
	Ok(keys)
}

/// Builds a certificate, keeping the first failure.
fn finish(builder: CertBuilder, keys: &mut Vec<ParsedKey>, rejected: &mut Option<ErrorParse>) {
	let fingerprint = builder.fingerprint.clone();
	match builder.build() {
		Ok(key) => keys.push(key),
		Err(e) => {
			debug!(%fingerprint, error = %e, "skipping certificate");
			rejected.get_or_insert(e);
		},
	}
}

/// Where signatures currently attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
	Primary,
	UserId(usize),
	Subkey(usize),
	Ignored,
}

/// The parts of a self-signature that matter for expiration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Binding {
	created: u32,
	key_expiration: Option<u32>,
}

impl Binding {
	fn of(signature: &SignaturePacket) -> Option<Self> {
		Some(Self { created: signature.created?, key_expiration: signature.key_expiration })
	}
}

/// The latest binding wins; among equal times, the later one in the stream.
fn latest(bindings: impl IntoIterator<Item = Binding>) -> Option<Binding> {
	bindings.into_iter().max_by_key(|binding| binding.created)
}

fn timestamp(seconds: i64) -> Result<DateTime<Utc>, ErrorParse> {
	DateTime::from_timestamp(seconds, 0).ok_or(ErrorParse::Malformed("timestamp out of range"))
}

/// Absolute expiration of a key created at `created` under a binding.
fn expiration(created: u32, binding: Binding) -> Result<Option<DateTime<Utc>>, ErrorParse> {
	match binding.key_expiration {
		None | Some(0) => Ok(None),
		Some(offset) => timestamp(i64::from(created) + i64::from(offset)).map(Some),
	}
}

struct UserIdBuilder {
	name: String,
	certifications: Vec<Binding>,
	revoked: bool,
}

impl UserIdBuilder {
	fn new(uid: &[u8]) -> Self {
		Self { name: String::from_utf8_lossy(uid).into_owned(), certifications: Vec::new(), revoked: false }
	}
}

struct SubkeyBuilder {
	fingerprint: Fingerprint,
	created: u32,
	bindings: Vec<Binding>,
	revoked: bool,
}

impl SubkeyBuilder {
	fn new(key: &KeyPacket) -> Result<Self, ErrorParse> {
		Ok(Self { fingerprint: Fingerprint::of(key)?, created: key.created, bindings: Vec::new(), revoked: false })
	}

	fn build(self) -> Result<Option<Component>, ErrorParse> {
		let Some(binding) = latest(self.bindings) else {
			debug!(fingerprint = %self.fingerprint, "skipping subkey without binding signature");
			return Ok(None);
		};
		Ok(Some(Component {
			role: Role::Subkey,
			expiration: expiration(self.created, binding)?,
			created: timestamp(self.created.into())?,
			fingerprint: self.fingerprint,
			revoked: self.revoked,
		}))
	}
}

struct CertBuilder {
	fingerprint: Fingerprint,
	key_id: [u8; 8],
	created: u32,
	direct: Vec<Binding>,
	revoked: bool,
	user_ids: Vec<UserIdBuilder>,
	subkeys: Vec<SubkeyBuilder>,
}

impl CertBuilder {
	fn new(key: &KeyPacket) -> Result<Self, ErrorParse> {
		let fingerprint = Fingerprint::of(key)?;
		Ok(Self {
			key_id: fingerprint.key_id(),
			fingerprint,
			created: key.created,
			direct: Vec::new(),
			revoked: false,
			user_ids: Vec::new(),
			subkeys: Vec::new(),
		})
	}

	fn signature(&mut self, section: Section, signature: SignaturePacket) {
		if !signature.issued_by(self.fingerprint.as_bytes(), &self.key_id) { return; }
		let Some(kind) = signature.kind else { return };
		let binding = Binding::of(&signature);
		match (section, kind) {
			(_, SignatureType::KeyRevocation) => self.revoked = true,
			(Section::Primary | Section::UserId(_), SignatureType::DirectKey) => self.direct.extend(binding),
			(Section::UserId(i), SignatureType::Certification) => self.user_ids[i].certifications.extend(binding),
			(Section::UserId(i), SignatureType::CertificationRevocation) => self.user_ids[i].revoked = true,
			(Section::Subkey(i), SignatureType::SubkeyBinding) => self.subkeys[i].bindings.extend(binding),
			(Section::Subkey(i), SignatureType::SubkeyRevocation) => self.subkeys[i].revoked = true,
			(section, kind) => debug!(?section, ?kind, "ignoring signature"),
		}
	}

	fn build(self) -> Result<ParsedKey, ErrorParse> {
		let live_user_ids = self.user_ids.iter().filter(|uid| !uid.revoked);
		let self_signatures = self.direct.iter().copied()
			.chain(live_user_ids.flat_map(|uid| uid.certifications.iter().copied()));
		let binding = match latest(self_signatures) {
			Some(binding) => binding,
			// A revocation is still meaningful without any other self-signature.
			None if self.revoked => Binding { created: self.created, key_expiration: None },
			None => return Err(ErrorParse::NoSelfSignature),
		};

		let mut components = vec![Component {
			role: Role::Primary,
			expiration: expiration(self.created, binding)?,
			created: timestamp(self.created.into())?,
			fingerprint: self.fingerprint,
			revoked: self.revoked,
		}];
		for subkey in self.subkeys {
			components.extend(subkey.build()?);
		}
		Ok(ParsedKey {
			user_ids: self.user_ids.into_iter().map(|uid| uid.name).collect(),
			components,
		})
	}
}

#[cfg(test)]
mod test {
	use super::*;

	const CREATED: u32 = 1_704_067_200;
	const DAY: u32 = 86_400;

	fn packet(tag: u8, body: &[u8]) -> Vec<u8> {
		assert!(body.len() < 192);
		let mut packet = vec![0xc0 | tag, body.len() as u8];
		packet.extend_from_slice(body);
		packet
	}

	fn key_body(seed: u8) -> Vec<u8> {
		let mut body = vec![4];
		body.extend_from_slice(&CREATED.to_be_bytes());
		body.push(22);
		body.extend_from_slice(&[seed; 8]);
		body
	}

	fn signature(kind: u8, created: u32, expiration: Option<u32>) -> Vec<u8> {
		signature_by(kind, created, expiration, None)
	}

	fn signature_by(kind: u8, created: u32, expiration: Option<u32>, issuer: Option<[u8; 8]>) -> Vec<u8> {
		let mut hashed = vec![5, 2];
		hashed.extend_from_slice(&created.to_be_bytes());
		if let Some(expiration) = expiration {
			hashed.extend_from_slice(&[5, 9]);
			hashed.extend_from_slice(&expiration.to_be_bytes());
		}
		if let Some(issuer) = issuer {
			hashed.extend_from_slice(&[9, 16]);
			hashed.extend_from_slice(&issuer);
		}
		let mut body = vec![4, kind, 22, 8, 0, hashed.len() as u8];
		body.extend_from_slice(&hashed);
		body.extend_from_slice(&[0, 0, 0xab, 0xcd]);
		packet(2, &body)
	}

	fn cert(parts: &[Vec<u8>]) -> Vec<u8> {
		let mut data = packet(6, &key_body(1));
		parts.iter().for_each(|part| data.extend_from_slice(part));
		data
	}

	fn uid(name: &str) -> Vec<u8> { packet(13, name.as_bytes()) }

	#[test]
	fn test_latest_self_signature_wins() {
		let data = cert(&[
			uid("Alice <alice@example.com>"),
			signature(0x13, CREATED + 10 * DAY, Some(400 * DAY)),
			signature(0x13, CREATED, Some(100 * DAY)),
		]);
		let key = parse(&data).unwrap();
		assert_eq!(key.primary().expiration, Some(timestamp((CREATED + 400 * DAY).into()).unwrap()));
		assert_eq!(key.user_ids, ["Alice <alice@example.com>"]);
	}

	#[test]
	fn test_later_direct_key_signature_removes_expiration() {
		let data = cert(&[
			signature(0x1f, CREATED + DAY, Some(0)),
			uid("Alice <alice@example.com>"),
			signature(0x13, CREATED, Some(100 * DAY)),
		]);
		assert_eq!(parse(&data).unwrap().primary().expiration, None);
	}

	#[test]
	fn test_revoked_user_id_ignored() {
		let data = cert(&[
			uid("old <old@example.com>"),
			signature(0x13, CREATED + DAY, Some(30 * DAY)),
			signature(0x30, CREATED + 2 * DAY, None),
			uid("Alice <alice@example.com>"),
			signature(0x13, CREATED, Some(100 * DAY)),
		]);
		let key = parse(&data).unwrap();
		assert_eq!(key.primary().expiration, Some(timestamp((CREATED + 100 * DAY).into()).unwrap()));
	}

	#[test]
	fn test_key_revocation() {
		let data = cert(&[
			signature(0x20, CREATED + DAY, None),
			uid("Alice <alice@example.com>"),
			signature(0x13, CREATED, Some(100 * DAY)),
		]);
		assert!(parse(&data).unwrap().is_revoked());
	}

	#[test]
	fn test_subkeys() {
		let data = cert(&[
			uid("Alice <alice@example.com>"),
			signature(0x13, CREATED, None),
			packet(14, &key_body(2)),
			signature(0x18, CREATED, Some(10 * DAY)),
			packet(14, &key_body(3)),
			packet(14, &key_body(4)),
			signature(0x18, CREATED, None),
			signature(0x28, CREATED + DAY, None),
		]);
		let key = parse(&data).unwrap();
		assert_eq!(key.primary().expiration, None);
		// The second subkey has no binding.
		let subkeys = key.subkeys();
		assert_eq!(subkeys.len(), 2);
		assert_eq!(subkeys[0].role, Role::Subkey);
		assert_eq!(subkeys[0].expiration, Some(timestamp((CREATED + 10 * DAY).into()).unwrap()));
		assert!(!subkeys[0].revoked);
		assert!(subkeys[1].revoked);
	}

	#[test]
	fn test_third_party_certification_ignored() {
		let data = cert(&[
			uid("Alice <alice@example.com>"),
			signature(0x13, CREATED, None),
			signature_by(0x10, CREATED + DAY, Some(DAY), Some([9; 8])),
		]);
		assert_eq!(parse(&data).unwrap().primary().expiration, None);
	}

	#[test]
	fn test_no_self_signature() {
		let data = cert(&[uid("Alice <alice@example.com>")]);
		assert_eq!(parse(&data), Err(ErrorParse::NoSelfSignature));
	}

	#[test]
	fn test_orphan_user_id() {
		assert_eq!(parse(&uid("nobody")), Err(ErrorParse::Orphan("user ID")));
	}

	#[test]
	fn test_empty() {
		assert_eq!(parse(b""), Err(ErrorParse::NoPrimaryKey));
	}

	#[test]
	fn test_select_by_user_id() {
		let mut data = cert(&[uid("Bob <bob@example.com>"), signature(0x13, CREATED, None)]);
		data.extend(packet(6, &key_body(7)));
		data.extend(uid("Alice <Alice@Example.com>"));
		data.extend(signature(0x13, CREATED, Some(DAY)));

		let keys = parse_all(&data).unwrap();
		assert_eq!(keys.len(), 2);
		let alice = select(keys.clone(), &"alice@example.com".parse().unwrap()).unwrap();
		assert_eq!(alice.user_ids, ["Alice <Alice@Example.com>"]);
		let fallback = select(keys, &"carol@example.com".parse().unwrap()).unwrap();
		assert_eq!(fallback.user_ids, ["Bob <bob@example.com>"]);
	}

	/// A v5 signature or key body; only its version octet is read.
	fn v5(tag: u8) -> Vec<u8> { packet(tag, &[5, 0x10, 22, 10, 0, 0, 0, 0, 0, 0, 0, 0, 0xab, 0xcd]) }

	#[test]
	fn test_unsupported_signature_ignored() {
		let data = cert(&[
			uid("Alice <alice@example.com>"),
			signature(0x13, CREATED, Some(100 * DAY)),
			v5(2),
		]);
		let key = parse(&data).unwrap();
		assert_eq!(key.primary().expiration, Some(timestamp((CREATED + 100 * DAY).into()).unwrap()));
	}

	#[test]
	fn test_unsupported_certificate_skipped() {
		let mut data = cert(&[uid("Alice <alice@example.com>"), signature(0x13, CREATED, None)]);
		data.extend(v5(6));
		data.extend(uid("Bob <bob@example.com>"));
		data.extend(signature(0x13, CREATED, None));

		let keys = parse_all(&data).unwrap();
		assert_eq!(keys.len(), 1);
		assert_eq!(keys[0].user_ids, ["Alice <alice@example.com>"]);
		assert_eq!(parse(&v5(6)), Err(ErrorParse::UnsupportedVersion { packet: "key", version: 5 }));
	}

	#[test]
	fn test_unsupported_subkey_binding_not_attached() {
		let data = cert(&[
			uid("Alice <alice@example.com>"),
			signature(0x13, CREATED, None),
			packet(14, &key_body(2)),
			signature(0x18, CREATED, Some(10 * DAY)),
			v5(14),
			signature(0x18, CREATED + DAY, None),
		]);
		let key = parse(&data).unwrap();
		assert_eq!(key.subkeys().len(), 1);
		assert_eq!(key.subkeys()[0].expiration, Some(timestamp((CREATED + 10 * DAY).into()).unwrap()));
	}

	#[test]
	fn test_unusable_certificate_skipped() {
		let mut data = cert(&[uid("nobody <nobody@example.com>")]);
		data.extend(packet(6, &key_body(2)));
		data.extend(uid("Alice <alice@example.com>"));
		data.extend(signature(0x13, CREATED, Some(DAY)));

		let keys = parse_all(&data).unwrap();
		assert_eq!(keys.len(), 1);
		assert_eq!(keys[0].user_ids, ["Alice <alice@example.com>"]);
	}

	#[test]
	fn test_v6_fingerprint() {
		let mut body = vec![6];
		body.extend_from_slice(&CREATED.to_be_bytes());
		body.push(27);
		body.extend_from_slice(&32u32.to_be_bytes());
		body.extend_from_slice(&[0x42; 32]);
		let data = packet(6, &body);
		let key = crate::parse::Packets::new(&data).next().unwrap().unwrap();
		let crate::parse::Packet::PublicKey(key) = key else { panic!("not a public key") };
		let fingerprint = Fingerprint::of(&key).unwrap();
		assert_eq!(fingerprint.as_bytes().len(), 32);
		assert_eq!(fingerprint.key_id(), fingerprint.as_bytes()[..8]);
		assert_eq!(fingerprint.to_string(), "DCAC354505DD51022CF52654AE4BD3B1D920B9C49409EC435730E8FDD5B54D45");
	}
}
