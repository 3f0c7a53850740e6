//! OpenPGP packet parsing.
//!
//! [`Packets`] walks a binary packet stream and yields each packet decoded into a [`Packet`]
//! variant. Bodies borrow from the input; nothing is copied.

/// A packet, tagged by type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet<'a> {
	PublicKey(KeyPacket<'a>),
	PublicSubkey(KeyPacket<'a>),
	/// Secret key material is never needed here, so secret keys are not decoded.
	SecretKey,
	SecretSubkey,
	UserId(&'a [u8]),
	UserAttribute,
	Signature(SignaturePacket),
	Trust,
	/// A key or signature packet of a version this crate does not read.
	Unsupported { tag: u8, version: u8 },
	/// Any other tag, body untouched.
	Other { tag: u8, body: &'a [u8] },
}

impl<'a> Packet<'a> {
	/// Decodes a packet body according to its tag.
	///
	/// An unknown key or signature version is not an error: it decodes to
	/// [`Packet::Unsupported`] and the caller decides what to skip.
	pub fn decode(tag: u8, body: &'a [u8]) -> Result<Self, ErrorParse> {
		let packet = match tag {
			TAG_SIGNATURE => SignaturePacket::decode(body).map(Packet::Signature),
			TAG_SECRET_KEY => Ok(Packet::SecretKey),
			TAG_PUBLIC_KEY => KeyPacket::decode(body).map(Packet::PublicKey),
			TAG_SECRET_SUBKEY => Ok(Packet::SecretSubkey),
			TAG_TRUST => Ok(Packet::Trust),
			TAG_USER_ID => Ok(Packet::UserId(body)),
			TAG_PUBLIC_SUBKEY => KeyPacket::decode(body).map(Packet::PublicSubkey),
			TAG_USER_ATTRIBUTE => Ok(Packet::UserAttribute),
			tag => Ok(Packet::Other { tag, body }),
		};
		match packet {
			Err(ErrorParse::UnsupportedVersion { version, .. }) => Ok(Packet::Unsupported { tag, version }),
			packet => packet,
		}
	}
}

pub const TAG_SIGNATURE: u8 = 2;
pub const TAG_SECRET_KEY: u8 = 5;
pub const TAG_PUBLIC_KEY: u8 = 6;
pub const TAG_SECRET_SUBKEY: u8 = 7;
pub const TAG_TRUST: u8 = 12;
pub const TAG_USER_ID: u8 = 13;
pub const TAG_PUBLIC_SUBKEY: u8 = 14;
pub const TAG_USER_ATTRIBUTE: u8 = 17;

/// A parsing iterator over a packet stream.
///
/// Stops after the first error.
pub struct Packets<'a> {
	data: &'a [u8],
	offset: usize,
	failed: bool,
}

impl<'a> Packets<'a> {
	/// Creates a new [`Packets`] parser.
	#[inline] pub fn new(data: &'a [u8]) -> Self { Self { data, offset: 0, failed: false } }

	/// Splits the next packet off into `(tag, body)`.
	fn frame(&mut self) -> Result<(u8, &'a [u8]), ErrorParse> {
		let offset = self.offset;
		let mut reader = Reader::new(&self.data[offset..]);
		let ctb = reader.u8()?;
		if ctb & 0x80 == 0 { return Err(ErrorParse::InvalidHeader { offset }); }
		let (tag, len) = if ctb & 0x40 != 0 {
			let tag = ctb & 0x3f;
			let first = reader.u8()?;
			let len = match first {
				0..=191 => usize::from(first),
				192..=223 => ((usize::from(first) - 192) << 8) + usize::from(reader.u8()?) + 192,
				255 => reader.u32()? as usize,
				// Partial body lengths only appear in data packets, never in keys.
				_ => return Err(ErrorParse::PartialLength { offset }),
			};
			(tag, len)
		} else {
			let tag = (ctb >> 2) & 0x0f;
			let len = match ctb & 0x03 {
				0 => usize::from(reader.u8()?),
				1 => usize::from(reader.u16()?),
				2 => reader.u32()? as usize,
				_ => reader.remaining(),
			};
			(tag, len)
		};
		let body = reader.take(len).map_err(|_| ErrorParse::Truncated { offset })?;
		self.offset = offset + reader.position();
		Ok((tag, body))
	}
}

impl<'a> From<&'a [u8]> for Packets<'a> { #[inline] fn from(data: &'a [u8]) -> Self { Self::new(data) } }

impl<'a> Iterator for Packets<'a> {
	type Item = Result<Packet<'a>, ErrorParse>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.failed || self.offset >= self.data.len() { return None; }
		let packet = self.frame().and_then(|(tag, body)| Packet::decode(tag, body));
		self.failed = packet.is_err();
		Some(packet)
	}
}

/// A public key or subkey packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPacket<'a> {
	pub version: u8,
	/// Seconds since the epoch.
	pub created: u32,
	pub algorithm: u8,
	/// The whole packet body; fingerprints hash it.
	pub body: &'a [u8],
}

impl<'a> KeyPacket<'a> {
	fn decode(body: &'a [u8]) -> Result<Self, ErrorParse> {
		let mut reader = Reader::new(body);
		let version = reader.u8()?;
		match version {
			4 | 6 => {},
			v => return Err(ErrorParse::UnsupportedVersion { packet: "key", version: v }),
		}
		let created = reader.u32()?;
		let algorithm = reader.u8()?;
		if version == 6 {
			let material = reader.u32()? as usize;
			if material != reader.remaining() { return Err(ErrorParse::Malformed("v6 key material length")); }
		}
		Ok(Self { version, created, algorithm, body })
	}
}

/// Signature types this crate cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureType {
	/// 0x10 to 0x13: certification of a user ID.
	Certification,
	/// 0x18
	SubkeyBinding,
	/// 0x1F
	DirectKey,
	/// 0x20
	KeyRevocation,
	/// 0x28
	SubkeyRevocation,
	/// 0x30
	CertificationRevocation,
	Other(u8),
}

impl From<u8> for SignatureType {
	fn from(value: u8) -> Self {
		match value {
			0x10..=0x13 => Self::Certification,
			0x18 => Self::SubkeyBinding,
			0x1f => Self::DirectKey,
			0x20 => Self::KeyRevocation,
			0x28 => Self::SubkeyRevocation,
			0x30 => Self::CertificationRevocation,
			other => Self::Other(other),
		}
	}
}

/// The metadata of a signature packet. The cryptographic part is not kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignaturePacket {
	pub version: u8,
	pub kind: Option<SignatureType>,
	/// Signature creation time (hashed subpacket 2).
	pub created: Option<u32>,
	/// Key expiration offset in seconds from key creation (hashed subpacket 9).
	pub key_expiration: Option<u32>,
	/// Issuer key ID (subpacket 16, either area).
	pub issuer: Option<[u8; 8]>,
	/// Issuer fingerprint without its version octet (subpacket 33, either area).
	pub issuer_fingerprint: Option<Vec<u8>>,
}

impl SignaturePacket {
	fn decode(body: &[u8]) -> Result<Self, ErrorParse> {
		let mut reader = Reader::new(body);
		let version = reader.u8()?;
		let mut signature = Self { version, ..Self::default() };
		match version {
			// v3 signatures carry no subpackets and cannot set a key expiration.
			3 => {
				let _hashed_len = reader.u8()?;
				signature.kind = Some(reader.u8()?.into());
				signature.created = Some(reader.u32()?);
				signature.issuer = Some(reader.array()?);
			},
			4 | 6 => {
				signature.kind = Some(reader.u8()?.into());
				let _public_key_algorithm = reader.u8()?;
				let _hash_algorithm = reader.u8()?;
				let hashed_len = if version == 4 { usize::from(reader.u16()?) } else { reader.u32()? as usize };
				signature.read_subpackets(reader.take(hashed_len)?, true)?;
				let unhashed_len = if version == 4 { usize::from(reader.u16()?) } else { reader.u32()? as usize };
				signature.read_subpackets(reader.take(unhashed_len)?, false)?;
			},
			v => return Err(ErrorParse::UnsupportedVersion { packet: "signature", version: v }),
		}
		Ok(signature)
	}

	/// Only the hashed area is trusted for times.
	fn read_subpackets(&mut self, area: &[u8], hashed: bool) -> Result<(), ErrorParse> {
		for subpacket in Subpackets::new(area) {
			let (kind, data) = subpacket?;
			let mut reader = Reader::new(data);
			match kind {
				SUBPACKET_SIGNATURE_CREATION if hashed => self.created = Some(reader.u32()?),
				SUBPACKET_KEY_EXPIRATION if hashed => self.key_expiration = Some(reader.u32()?),
				SUBPACKET_ISSUER => self.issuer = Some(reader.array()?),
				SUBPACKET_ISSUER_FINGERPRINT => {
					let _version = reader.u8()?;
					self.issuer_fingerprint = Some(reader.rest().to_vec());
				},
				_ => {},
			}
		}
		Ok(())
	}

	/// Whether the issuer, when stated, is the key with this fingerprint.
	///
	/// `key_id` is the fingerprint's key ID.
	pub fn issued_by(&self, fingerprint: &[u8], key_id: &[u8; 8]) -> bool {
		match (&self.issuer_fingerprint, &self.issuer) {
			(Some(issuer), _) => issuer == fingerprint,
			(None, Some(issuer)) => issuer == key_id,
			(None, None) => true,
		}
	}
}

const SUBPACKET_SIGNATURE_CREATION: u8 = 2;
const SUBPACKET_KEY_EXPIRATION: u8 = 9;
const SUBPACKET_ISSUER: u8 = 16;
const SUBPACKET_ISSUER_FINGERPRINT: u8 = 33;

/// Iterates `(type, data)` over a subpacket area. The critical bit is masked off.
struct Subpackets<'a> {
	reader: Reader<'a>,
}

impl<'a> Subpackets<'a> {
	fn new(area: &'a [u8]) -> Self { Self { reader: Reader::new(area) } }

	fn read(&mut self) -> Result<(u8, &'a [u8]), ErrorParse> {
		let first = self.reader.u8()?;
		let len = match first {
			0..=191 => usize::from(first),
			192..=254 => ((usize::from(first) - 192) << 8) + usize::from(self.reader.u8()?) + 192,
			255 => self.reader.u32()? as usize,
		};
		if len == 0 { return Err(ErrorParse::Malformed("empty subpacket")); }
		let data = self.reader.take(len)?;
		Ok((data[0] & 0x7f, &data[1..]))
	}
}

impl<'a> Iterator for Subpackets<'a> {
	type Item = Result<(u8, &'a [u8]), ErrorParse>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.reader.remaining() == 0 { return None; }
		let subpacket = self.read();
		if subpacket.is_err() { self.reader.skip_rest(); }
		Some(subpacket)
	}
}

/// Big-endian cursor over a byte slice.
struct Reader<'a> {
	data: &'a [u8],
	position: usize,
}

impl<'a> Reader<'a> {
	fn new(data: &'a [u8]) -> Self { Self { data, position: 0 } }

	fn position(&self) -> usize { self.position }
	fn remaining(&self) -> usize { self.data.len() - self.position }
	fn skip_rest(&mut self) { self.position = self.data.len(); }

	fn rest(&mut self) -> &'a [u8] {
		let rest = &self.data[self.position..];
		self.skip_rest();
		rest
	}

	fn take(&mut self, len: usize) -> Result<&'a [u8], ErrorParse> {
		if len > self.remaining() { return Err(ErrorParse::UnexpectedEnd); }
		let taken = &self.data[self.position..self.position + len];
		self.position += len;
		Ok(taken)
	}

	fn array<const N: usize>(&mut self) -> Result<[u8; N], ErrorParse> {
		let mut array = [0; N];
		array.copy_from_slice(self.take(N)?);
		Ok(array)
	}

	fn u8(&mut self) -> Result<u8, ErrorParse> { Ok(self.array::<1>()?[0]) }
	fn u16(&mut self) -> Result<u16, ErrorParse> { Ok(u16::from_be_bytes(self.array()?)) }
	fn u32(&mut self) -> Result<u32, ErrorParse> { Ok(u32::from_be_bytes(self.array()?)) }
}

/// Error when parsing key material.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorParse {
	#[error("invalid packet header at offset {offset}")]
	InvalidHeader { offset: usize },
	#[error("partial body length at offset {offset}")]
	PartialLength { offset: usize },
	#[error("packet at offset {offset} runs past the end of the input")]
	Truncated { offset: usize },
	#[error("unexpected end of packet")]
	UnexpectedEnd,
	#[error("unsupported {packet} packet version {version}")]
	UnsupportedVersion { packet: &'static str, version: u8 },
	#[error("malformed packet: {0}")]
	Malformed(&'static str),
	#[error("armor: {0}")]
	Armor(String),
	#[error("no public key packet")]
	NoPrimaryKey,
	#[error("{0} appears before any primary key")]
	Orphan(&'static str),
	#[error("no valid self-signature on the primary key")]
	NoSelfSignature,
}
