//! Munin-style plugin output.
//!
//! `config` declares one field per address; a fetch prints `<field>.value <days>` for every
//! address whose key expires.

use std::collections::HashSet;
use std::io::{self, Write};

use crate::expiration::ExpirationResult;
use crate::wkd::EmailAddress;

/// Lower bounds, in days, under which a field alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
	pub warning: u32,
	pub critical: u32,
}

impl Default for Thresholds {
	fn default() -> Self { Self { warning: 14, critical: 7 } }
}

/// Replaces characters a field name can't hold with `_`.
///
/// The first character must match `[A-Za-z_]`, the rest `[A-Za-z0-9_]`.
pub fn clean_fieldname(text: &str) -> String {
	text.chars()
		.enumerate()
		.map(|(i, c)| match c {
			'A'..='Z' | 'a'..='z' | '_' => c,
			'0'..='9' if i > 0 => c,
			_ => '_',
		})
		.collect()
}

/// Field names for the addresses, in order.
///
/// Addresses that clean to the same name get `_2`, `_3` and so on, in order of appearance.
pub fn field_names(addresses: &[EmailAddress]) -> Vec<String> {
	let mut taken = HashSet::with_capacity(addresses.len());
	addresses.iter()
		.map(|address| {
			let base = clean_fieldname(address.as_str());
			let mut name = base.clone();
			let mut n = 1;
			while !taken.insert(name.clone()) {
				n += 1;
				name = format!("{base}_{n}");
			}
			name
		})
		.collect()
}

/// Writes the graph and field declarations.
pub fn emit_config(out: &mut impl Write, addresses: &[EmailAddress], thresholds: &Thresholds) -> io::Result<()> {
	writeln!(out, "graph_title OpenPGP key expiration")?;
	writeln!(out, "graph_vlabel days to expiration")?;
	writeln!(out, "graph_category security")?;
	writeln!(out, "graph_args --base 1000")?;
	for (field, address) in field_names(addresses).iter().zip(addresses) {
		writeln!(out, "{field}.label {address}")?;
		writeln!(out, "{field}.warning {}:", thresholds.warning)?;
		writeln!(out, "{field}.critical {}:", thresholds.critical)?;
	}
	Ok(())
}

/// Writes a value line for every result that has a day count.
pub fn emit_values(out: &mut impl Write, results: &[(String, Option<ExpirationResult>)]) -> io::Result<()> {
	for (field, result) in results {
		if let Some(days) = result.and_then(ExpirationResult::days) {
			writeln!(out, "{field}.value {days}")?;
		}
	}
	Ok(())
}
