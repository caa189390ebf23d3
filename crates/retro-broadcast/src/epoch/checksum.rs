use sha2::{Digest, Sha256};

/// Keyed hash over the ISO-8601 serialization of T₀
pub fn sign_epoch(secret: &str, iso: &str) -> String {
	let mut hasher = Sha256::new();
	hasher.update(secret.as_bytes());
	hasher.update(b":");
	hasher.update(iso.as_bytes());
	hex::encode(hasher.finalize())
}

pub fn verify_epoch(secret: &str, iso: &str, checksum: &str) -> bool {
	sign_epoch(secret, iso).eq_ignore_ascii_case(checksum)
}
