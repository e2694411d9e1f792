//! AES-CBC encryption/decryption.
//!
//! PDF uses AES in CBC mode with PKCS#7 padding; the ciphertext carries a
//! 16-byte IV prefix (handled by the caller). AES-128 serves AESV2 (V=4),
//! AES-256 serves AESV3 (V=5).

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes256};
use cbc::{Decryptor, Encryptor};

type Aes128CbcEnc = Encryptor<Aes128>;
type Aes128CbcDec = Decryptor<Aes128>;
type Aes256CbcEnc = Encryptor<Aes256>;
type Aes256CbcDec = Decryptor<Aes256>;

/// Encrypt with AES-CBC and PKCS#7 padding. Key must be 16 or 32 bytes.
pub fn aes_cbc_encrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, &'static str> {
    if iv.len() != 16 {
        return Err("IV must be 16 bytes");
    }

    let mut padded = data.to_vec();
    let padding_len = 16 - (data.len() % 16);
    padded.extend(std::iter::repeat(padding_len as u8).take(padding_len));
    let len = padded.len();

    match key.len() {
        16 => {
            let cipher = Aes128CbcEnc::new(key.into(), iv.into());
            cipher
                .encrypt_padded_mut::<NoPadding>(&mut padded, len)
                .map_err(|_| "AES-128 encryption failed")?;
        },
        32 => {
            let cipher = Aes256CbcEnc::new(key.into(), iv.into());
            cipher
                .encrypt_padded_mut::<NoPadding>(&mut padded, len)
                .map_err(|_| "AES-256 encryption failed")?;
        },
        _ => return Err("AES key must be 16 or 32 bytes"),
    }

    Ok(padded)
}

/// Decrypt AES-CBC data and strip PKCS#7 padding.
pub fn aes_cbc_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, &'static str> {
    if iv.len() != 16 {
        return Err("IV must be 16 bytes");
    }
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if data.len() % 16 != 0 {
        return Err("Encrypted data length must be multiple of 16");
    }

    let mut buffer = data.to_vec();
    let decrypted_len = match key.len() {
        16 => {
            let cipher = Aes128CbcDec::new(key.into(), iv.into());
            cipher
                .decrypt_padded_mut::<NoPadding>(&mut buffer)
                .map_err(|_| "AES-128 decryption failed")?
                .len()
        },
        32 => {
            let cipher = Aes256CbcDec::new(key.into(), iv.into());
            cipher
                .decrypt_padded_mut::<NoPadding>(&mut buffer)
                .map_err(|_| "AES-256 decryption failed")?
                .len()
        },
        _ => return Err("AES key must be 16 or 32 bytes"),
    };
    buffer.truncate(decrypted_len);

    let padding_len = *buffer.last().ok_or("empty plaintext")? as usize;
    if padding_len == 0 || padding_len > 16 || padding_len > buffer.len() {
        return Err("Invalid PKCS#7 padding");
    }
    buffer.truncate(buffer.len() - padding_len);
    Ok(buffer)
}

/// Raw AES-CBC encryption without padding (key-wrap steps of the R6 hash).
pub fn aes_cbc_encrypt_no_pad(
    key: &[u8],
    iv: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, &'static str> {
    if data.len() % 16 != 0 {
        return Err("NoPadding data length must be multiple of 16");
    }
    let mut buffer = data.to_vec();
    let len = buffer.len();
    match key.len() {
        16 => {
            let cipher = Aes128CbcEnc::new(key.into(), iv.into());
            cipher
                .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
                .map_err(|_| "AES-128 encryption failed")?;
        },
        32 => {
            let cipher = Aes256CbcEnc::new(key.into(), iv.into());
            cipher
                .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
                .map_err(|_| "AES-256 encryption failed")?;
        },
        _ => return Err("AES key must be 16 or 32 bytes"),
    }
    Ok(buffer)
}

/// Raw AES-CBC decryption without padding (file-key unwrap for R5/R6).
pub fn aes_cbc_decrypt_no_pad(
    key: &[u8],
    iv: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, &'static str> {
    if data.len() % 16 != 0 {
        return Err("NoPadding data length must be multiple of 16");
    }
    let mut buffer = data.to_vec();
    match key.len() {
        16 => {
            let cipher = Aes128CbcDec::new(key.into(), iv.into());
            cipher
                .decrypt_padded_mut::<NoPadding>(&mut buffer)
                .map_err(|_| "AES-128 decryption failed")?;
        },
        32 => {
            let cipher = Aes256CbcDec::new(key.into(), iv.into());
            cipher
                .decrypt_padded_mut::<NoPadding>(&mut buffer)
                .map_err(|_| "AES-256 decryption failed")?;
        },
        _ => return Err("AES key must be 16 or 32 bytes"),
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aes128_round_trip() {
        let key = [0x42u8; 16];
        let iv = [0x24u8; 16];
        let plaintext = b"form field title";
        let ciphertext = aes_cbc_encrypt(&key, &iv, plaintext).unwrap();
        assert_eq!(ciphertext.len() % 16, 0);
        let decrypted = aes_cbc_decrypt(&key, &iv, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_aes256_round_trip() {
        let key = [7u8; 32];
        let iv = [9u8; 16];
        let plaintext = b"exactly sixteen!"; // block-aligned input still pads
        let ciphertext = aes_cbc_encrypt(&key, &iv, plaintext).unwrap();
        assert_eq!(ciphertext.len(), 32);
        let decrypted = aes_cbc_decrypt(&key, &iv, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_bad_key_length() {
        assert!(aes_cbc_encrypt(&[0u8; 7], &[0u8; 16], b"x").is_err());
    }
}
