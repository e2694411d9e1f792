//! Key derivation and passphrase validation for the standard security
//! handler (ISO 32000-1 §7.6.3, ISO 32000-2 §7.6.4 for R6).

use md5::{Digest, Md5};
use sha2::{Sha256, Sha384, Sha512};

use super::aes;

/// Padding string used in legacy key derivation (Algorithm 2, step 1).
pub(crate) const PADDING: &[u8; 32] = b"\x28\xBF\x4E\x5E\x4E\x75\x8A\x41\
                              \x64\x00\x4E\x56\xFF\xFA\x01\x08\
                              \x2E\x2E\x00\xB6\xD0\x68\x3E\x80\
                              \x2F\x0C\xA9\xFE\x64\x53\x69\x7A";

/// Compute the legacy (R2-R4) encryption key from a passphrase
/// (Algorithm 2).
pub fn compute_encryption_key(
    password: &[u8],
    owner_key: &[u8],
    permissions: i32,
    file_id: &[u8],
    revision: u32,
    key_length: usize,
    encrypt_metadata: bool,
) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(pad_password(password));
    hasher.update(owner_key);
    hasher.update(permissions.to_le_bytes());
    hasher.update(file_id);
    if revision >= 4 && !encrypt_metadata {
        hasher.update([0xFF, 0xFF, 0xFF, 0xFF]);
    }
    let mut hash = hasher.finalize().to_vec();

    if revision >= 3 {
        for _ in 0..50 {
            let mut hasher = Md5::new();
            hasher.update(&hash[..key_length]);
            hash = hasher.finalize().to_vec();
        }
    }

    hash[..key_length].to_vec()
}

/// Pad or truncate a passphrase to 32 bytes with the standard padding.
pub fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let pass_len = password.len().min(32);
    padded[..pass_len].copy_from_slice(&password[..pass_len]);
    padded[pass_len..].copy_from_slice(&PADDING[..(32 - pass_len)]);
    padded
}

/// Authenticate a user passphrase for R2-R4 (Algorithms 4/5), returning
/// the file key on success.
pub fn authenticate_user_password(
    password: &[u8],
    user_key: &[u8],
    owner_key: &[u8],
    permissions: i32,
    file_id: &[u8],
    revision: u32,
    key_length: usize,
    encrypt_metadata: bool,
) -> Option<Vec<u8>> {
    let key = compute_encryption_key(
        password,
        owner_key,
        permissions,
        file_id,
        revision,
        key_length,
        encrypt_metadata,
    );

    let expected = if revision >= 3 {
        compute_user_key_r3(&key, file_id)
    } else {
        compute_user_key_r2(&key)
    };

    if user_key.len() >= 16 && constant_time_compare(&user_key[..16], &expected[..16]) {
        Some(key)
    } else {
        None
    }
}

/// Authenticate a user passphrase for R5/R6, returning the 32-byte file
/// key decrypted from `/UE` on success.
///
/// `/U` is 48 bytes: 32-byte hash, 8-byte validation salt, 8-byte key salt.
pub fn authenticate_user_password_r6(
    password: &[u8],
    user_key: &[u8],
    user_encryption: &[u8],
    revision: u32,
) -> Option<Vec<u8>> {
    if user_key.len() < 48 || user_encryption.len() < 32 {
        return None;
    }
    // SASLprep is out of scope; truncate to 127 bytes per spec
    let password = &password[..password.len().min(127)];
    let validation_salt = &user_key[32..40];
    let key_salt = &user_key[40..48];

    let hash = hash_r6(password, validation_salt, &[], revision);
    if !constant_time_compare(&hash, &user_key[..32]) {
        return None;
    }

    let intermediate = hash_r6(password, key_salt, &[], revision);
    aes::aes_cbc_decrypt_no_pad(&intermediate, &[0u8; 16], &user_encryption[..32]).ok()
}

/// Hardened hash of ISO 32000-2 Algorithm 2.B (plain SHA-256 for R5).
fn hash_r6(password: &[u8], salt: &[u8], udata: &[u8], revision: u32) -> Vec<u8> {
    let mut k: Vec<u8> = {
        let mut h = Sha256::new();
        h.update(password);
        h.update(salt);
        h.update(udata);
        h.finalize().to_vec()
    };

    if revision == 5 {
        return k;
    }

    let mut round: usize = 0;
    loop {
        // K1 = (password || K || udata) x 64
        let mut unit = Vec::with_capacity(password.len() + k.len() + udata.len());
        unit.extend_from_slice(password);
        unit.extend_from_slice(&k);
        unit.extend_from_slice(udata);
        let mut k1 = Vec::with_capacity(unit.len() * 64);
        for _ in 0..64 {
            k1.extend_from_slice(&unit);
        }

        let e = aes::aes_cbc_encrypt_no_pad(&k[..16], &k[16..32], &k1)
            .expect("block-aligned input");

        let modulo = e[..16].iter().map(|&b| b as u32).sum::<u32>() % 3;
        k = match modulo {
            0 => Sha256::digest(&e).to_vec(),
            1 => Sha384::digest(&e).to_vec(),
            _ => Sha512::digest(&e).to_vec(),
        };

        if round >= 63 && (*e.last().unwrap_or(&0) as usize) <= round - 32 {
            break;
        }
        round += 1;
    }

    k.truncate(32);
    k
}

/// User key hash for R=2 (Algorithm 4).
fn compute_user_key_r2(key: &[u8]) -> Vec<u8> {
    super::rc4::rc4_crypt(key, PADDING)
}

/// User key hash for R>=3 (Algorithm 5).
fn compute_user_key_r3(key: &[u8], file_id: &[u8]) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(PADDING);
    hasher.update(file_id);
    let mut hash = hasher.finalize().to_vec();

    for i in 0..20 {
        let modified_key: Vec<u8> = key.iter().map(|b| b ^ i as u8).collect();
        hash = super::rc4::rc4_crypt(&modified_key, &hash);
    }

    hash.extend_from_slice(&[0u8; 16]);
    hash
}

/// Constant-time byte comparison.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_password() {
        let padded = pad_password(b"test");
        assert_eq!(&padded[..4], b"test");
        assert_eq!(&padded[4..], &PADDING[..28]);
    }

    #[test]
    fn test_pad_password_long() {
        let long = b"this is a very long password that exceeds 32 bytes";
        assert_eq!(&pad_password(long)[..], &long[..32]);
    }

    #[test]
    fn test_compute_encryption_key_length() {
        let key = compute_encryption_key(b"user", &[0u8; 32], -1, b"id", 2, 5, true);
        assert_eq!(key.len(), 5);
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(b"abcd", b"abcd"));
        assert!(!constant_time_compare(b"abcd", b"abce"));
        assert!(!constant_time_compare(b"ab", b"abc"));
    }

    #[test]
    fn test_r2_auth_round_trip() {
        // Build a /U value from a known key and check authentication accepts it
        let password = b"owner-pass";
        let owner_key = [0x11u8; 32];
        let file_id = b"fid";
        let key = compute_encryption_key(password, &owner_key, -4, file_id, 2, 5, true);
        let user_key = compute_user_key_r2(&key);

        let authed =
            authenticate_user_password(password, &user_key, &owner_key, -4, file_id, 2, 5, true);
        assert_eq!(authed, Some(key));

        let wrong =
            authenticate_user_password(b"wrong", &user_key, &owner_key, -4, file_id, 2, 5, true);
        assert!(wrong.is_none());
    }

    #[test]
    fn test_r6_hash_is_deterministic() {
        let a = hash_r6(b"pw", b"saltsalt", &[], 6);
        let b = hash_r6(b"pw", b"saltsalt", &[], 6);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }
}
