//! ASCII armor.
//!
//! WKD serves binary keys, but armored ones show up in the wild.

use base64::{engine::general_purpose::STANDARD, Engine as _};

const BEGIN: &[u8] = b"-----BEGIN PGP ";
const END: &[u8] = b"-----END PGP ";

/// Whether the data looks armored.
pub fn is_armored(data: &[u8]) -> bool {
	let start = data.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(data.len());
	data[start..].starts_with(BEGIN)
}

/// Decodes the first armored block.
pub fn dearmor(data: &[u8]) -> Result<Vec<u8>, ErrorArmor> {
	use memchr::memmem;

	let begin = memmem::find(data, BEGIN).ok_or(ErrorArmor::MissingBegin)?;
	let data = &data[begin..];
	let first_line = memchr::memchr(b'\n', data).ok_or(ErrorArmor::MissingEnd)? + 1;
	let end = memmem::find(&data[first_line..], END).ok_or(ErrorArmor::MissingEnd)? + first_line;
	let text = std::str::from_utf8(&data[first_line..end]).map_err(|_| ErrorArmor::NotText)?;

	let mut encoded = String::with_capacity(text.len());
	let mut checksum = None;
	let mut in_headers = true;
	for line in text.lines().map(str::trim) {
		if in_headers {
			if line.is_empty() || line.contains(':') { continue; }
			in_headers = false;
		}
		if line.is_empty() { continue; }
		if let Some(crc) = line.strip_prefix('=') {
			checksum = Some(crc);
			break;
		}
		encoded.push_str(line);
	}

	let decoded = STANDARD.decode(encoded.as_bytes()).map_err(ErrorArmor::Base64)?;
	if let Some(crc) = checksum {
		let crc = STANDARD.decode(crc).map_err(ErrorArmor::Base64)?;
		let expected = match crc[..] {
			[a, b, c] => u32::from_be_bytes([0, a, b, c]),
			_ => return Err(ErrorArmor::Checksum),
		};
		if crc24(&decoded) != expected { return Err(ErrorArmor::Checksum); }
	}
	Ok(decoded)
}

/// The OpenPGP CRC-24.
fn crc24(data: &[u8]) -> u32 {
	const INIT: u32 = 0xB7_04CE;
	const POLY: u32 = 0x186_4CFB;
	let mut crc = INIT;
	for &byte in data {
		crc ^= u32::from(byte) << 16;
		for _ in 0..8 {
			crc <<= 1;
			if crc & 0x100_0000 != 0 { crc ^= POLY; }
		}
	}
	crc & 0xFF_FFFF
}

/// [`dearmor`] error.
#[derive(Debug, thiserror::Error)]
pub enum ErrorArmor {
	#[error("missing armor header line")]
	MissingBegin,
	#[error("missing armor tail line")]
	MissingEnd,
	#[error("armor is not text")]
	NotText,
	#[error("invalid base64: {0}")]
	Base64(base64::DecodeError),
	#[error("armor checksum mismatch")]
	Checksum,
}
