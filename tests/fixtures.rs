//! Keys exported by GnuPG with a faked clock of 2024-01-01T00:00:00Z.

use chrono::{DateTime, TimeZone, Utc};
use pgp_expiration::keys::{self, Role};
use pgp_expiration::{evaluate, ExpirationResult};

static ALICE: &[u8] = include_bytes!("fixtures/alice.pgp");
static BOB: &[u8] = include_bytes!("fixtures/bob.pgp");
static BOB_ARMORED: &[u8] = include_bytes!("fixtures/bob.asc");
static CAROL: &[u8] = include_bytes!("fixtures/carol.pgp");
static DAVE: &[u8] = include_bytes!("fixtures/dave.pgp");

fn at(seconds: i64) -> DateTime<Utc> { Utc.timestamp_opt(seconds, 0).unwrap() }

#[test]
fn alice_primary_and_subkey() {
	let key = keys::parse(ALICE).unwrap();
	assert_eq!(key.fingerprint().to_string(), "179C26EA2066A40BF038CFDEA023DE83D3B72642");
	assert_eq!(key.created(), at(1_704_067_200));
	assert_eq!(key.user_ids, ["Alice <alice@example.com>"]);
	// Extended on 2024-03-01 to 2026-01-01T12:00:00Z.
	assert_eq!(key.primary().expiration, Some(at(1_767_268_800)));
	assert!(!key.is_revoked());

	let subkeys = key.subkeys();
	assert_eq!(subkeys.len(), 1);
	assert_eq!(subkeys[0].role, Role::Subkey);
	assert_eq!(subkeys[0].fingerprint.to_string(), "B0B71B92DD436C4CCFF65195E1741E6BE20F6BDD");
	assert_eq!(subkeys[0].expiration, Some(at(1_717_243_200)));
}

#[test]
fn subkey_expiration_is_not_reported() {
	let key = keys::parse(ALICE).unwrap();
	// The subkey expired long before; only the primary counts.
	let now = at(1_767_268_800 - 100 * 86_400);
	assert_eq!(evaluate(&key, now), ExpirationResult::Expires(100));
}

#[test]
fn bob_never_expires() {
	let key = keys::parse(BOB).unwrap();
	assert_eq!(key.fingerprint().to_string(), "CAB189BB7F6867E2975AA112E9269411B9104CF3");
	assert_eq!(key.primary().expiration, None);
	assert_eq!(evaluate(&key, at(1_800_000_000)), ExpirationResult::NeverExpires);
}

#[test]
fn armored_matches_binary() {
	assert_eq!(keys::parse(BOB_ARMORED).unwrap(), keys::parse(BOB).unwrap());
}

#[test]
fn carol_rsa_old_format_packets() {
	let key = keys::parse(CAROL).unwrap();
	assert_eq!(key.fingerprint().to_string(), "8E278188731DBE92FCAB945300A34146FE59E4DD");
	assert_eq!(key.primary().expiration, Some(at(1_719_835_200)));
	// 2024-06-01T00:00:00Z, 30.5 days before.
	assert_eq!(evaluate(&key, at(1_717_200_000)), ExpirationResult::Expires(30));
	// Half a day after expiry.
	assert_eq!(evaluate(&key, at(1_719_878_400)), ExpirationResult::Expires(-1));
}

#[test]
fn dave_revoked() {
	let key = keys::parse(DAVE).unwrap();
	assert_eq!(key.fingerprint().to_string(), "65DCFC4E88253791146C5998BB1E26E8931B9FDB");
	assert!(key.is_revoked());
	assert_eq!(key.primary().expiration, Some(at(1_798_804_800)));
	assert_eq!(evaluate(&key, at(1_704_067_200)), ExpirationResult::Revoked);
}

#[test]
fn keyring_selects_by_address() {
	let ring = [ALICE, BOB].concat();
	let all = keys::parse_all(&ring).unwrap();
	assert_eq!(all.len(), 2);
	let bob = keys::select(all, &"Bob@Example.org".parse().unwrap()).unwrap();
	assert_eq!(bob.fingerprint().to_string(), "CAB189BB7F6867E2975AA112E9269411B9104CF3");
}

#[test]
fn truncated_key_is_an_error() {
	assert!(keys::parse(&ALICE[..ALICE.len() - 10]).is_err());
	assert!(keys::parse(b"<html>not found</html>").is_err());
}

/// A v5 third-party certification, new-format signature packet.
const V5_SIGNATURE: [u8; 16] = [0xc2, 14, 5, 0x10, 22, 10, 0, 0, 0, 0, 0, 0, 0, 0, 0xab, 0xcd];

#[test]
fn unsupported_signature_version_is_skipped() {
	let data = [ALICE, &V5_SIGNATURE[..]].concat();
	assert_eq!(keys::parse(&data).unwrap(), keys::parse(ALICE).unwrap());
}

#[test]
fn unsupported_certificate_in_keyring_is_skipped() {
	// A v5 public key packet, then Bob.
	let v5_key = [0xc6, 6, 5, 0x65, 0x92, 0x00, 0x80, 22];
	let ring = [ALICE, &v5_key[..], BOB].concat();
	let all = keys::parse_all(&ring).unwrap();
	assert_eq!(all.len(), 2);
	let alice = keys::select(all, &"alice@example.com".parse().unwrap()).unwrap();
	assert_eq!(alice.fingerprint().to_string(), "179C26EA2066A40BF038CFDEA023DE83D3B72642");
}
