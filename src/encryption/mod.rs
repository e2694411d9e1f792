//! PDF encryption support (standard security handler).
//!
//! Supported profiles:
//! - RC4 40/128-bit (V=1/V=2, R=2/R=3)
//! - AES-128 CBC (V=4 with /CF AESV2, R=4)
//! - AES-256 CBC (V=5 with AESV3, R=5/R=6)
//!
//! Strings and streams are decrypted when objects are loaded; the same
//! handler re-encrypts the strings an incremental update writes back into
//! an encrypted file. Certificate-based (public key) security handlers
//! are not supported.

use crate::error::{Error, Result};
use crate::object::Object;

mod aes;
mod algorithms;
mod rc4;

pub use rc4::rc4_crypt;

/// Encryption algorithm used in the PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// RC4 with 40-bit key (V=1, R=2)
    Rc4_40,
    /// RC4 with up to 128-bit key (V=2, R=3)
    Rc4_128,
    /// AES-128 in CBC mode (V=4, R=4)
    Aes128,
    /// AES-256 in CBC mode (V=5, R=5/6)
    Aes256,
}

impl Algorithm {
    /// Key length in bytes.
    pub fn key_length(&self) -> usize {
        match self {
            Algorithm::Rc4_40 => 5,
            Algorithm::Rc4_128 => 16,
            Algorithm::Aes128 => 16,
            Algorithm::Aes256 => 32,
        }
    }

    /// Whether this algorithm is an AES profile.
    pub fn is_aes(&self) -> bool {
        matches!(self, Algorithm::Aes128 | Algorithm::Aes256)
    }
}

/// Parsed `/Encrypt` dictionary.
#[derive(Debug, Clone)]
pub struct EncryptDict {
    /// Filter name (must be "Standard")
    pub filter: String,
    /// Algorithm version (V)
    pub version: u32,
    /// Revision number (R)
    pub revision: u32,
    /// Key length in bits (Length), defaults to 40
    pub length: u32,
    /// Owner passphrase hash (O)
    pub owner_key: Vec<u8>,
    /// User passphrase hash (U)
    pub user_key: Vec<u8>,
    /// User encryption key (UE, R5/R6 only)
    pub user_encryption: Option<Vec<u8>>,
    /// Permission bits (P)
    pub permissions: i32,
    /// Whether metadata streams are encrypted
    pub encrypt_metadata: bool,
}

impl EncryptDict {
    /// Parse the `/Encrypt` dictionary object.
    pub fn from_object(obj: &Object) -> Result<Self> {
        let dict = obj
            .as_dict()
            .ok_or_else(|| Error::Encrypted("/Encrypt is not a dictionary".to_string()))?;

        let filter = dict
            .get("Filter")
            .and_then(|o| o.as_name())
            .unwrap_or("")
            .to_string();
        if filter != "Standard" {
            return Err(Error::Encrypted(format!(
                "unsupported security handler '{}'",
                filter
            )));
        }

        let get_int = |key: &str| dict.get(key).and_then(|o| o.as_integer());
        let get_str =
            |key: &str| dict.get(key).and_then(|o| o.as_string()).map(|s| s.to_vec());

        Ok(Self {
            filter,
            version: get_int("V").unwrap_or(0) as u32,
            revision: get_int("R").unwrap_or(2) as u32,
            length: get_int("Length").unwrap_or(40) as u32,
            owner_key: get_str("O").unwrap_or_default(),
            user_key: get_str("U").unwrap_or_default(),
            user_encryption: get_str("UE"),
            permissions: get_int("P").unwrap_or(-1) as i32,
            encrypt_metadata: dict
                .get("EncryptMetadata")
                .and_then(|o| o.as_bool())
                .unwrap_or(true),
        })
    }

    /// Resolve the algorithm from V/R and the crypt filter.
    ///
    /// For V=4 the `/CF` sub-dictionary names the method; AESV2 is assumed
    /// when absent since that is what V=4 writers emit in practice.
    pub fn algorithm(&self, encrypt_obj: &Object) -> Result<Algorithm> {
        match self.version {
            1 => Ok(Algorithm::Rc4_40),
            2 => Ok(Algorithm::Rc4_128),
            4 => {
                let cfm = encrypt_obj
                    .as_dict()
                    .and_then(|d| d.get("CF"))
                    .and_then(|o| o.as_dict())
                    .and_then(|cf| cf.get("StdCF"))
                    .and_then(|o| o.as_dict())
                    .and_then(|std| std.get("CFM"))
                    .and_then(|o| o.as_name());
                match cfm {
                    Some("V2") => Ok(Algorithm::Rc4_128),
                    Some("AESV2") | None => Ok(Algorithm::Aes128),
                    Some(other) => {
                        Err(Error::Encrypted(format!("unsupported crypt filter '{}'", other)))
                    },
                }
            },
            5 => Ok(Algorithm::Aes256),
            other => Err(Error::Encrypted(format!("unsupported encryption V={}", other))),
        }
    }
}

/// Authenticated encryption state for one document.
#[derive(Debug, Clone)]
pub struct EncryptionHandler {
    dict: EncryptDict,
    algorithm: Algorithm,
    file_key: Vec<u8>,
}

impl EncryptionHandler {
    /// Build a handler from the trailer's `/Encrypt` object and the first
    /// `/ID` element, authenticating the caller-supplied passphrase.
    ///
    /// An empty passphrase is tried when none is supplied, since many
    /// "encrypted" PDFs use the empty user passphrase.
    pub fn authenticate(
        encrypt_obj: &Object,
        file_id: &[u8],
        passphrase: Option<&str>,
    ) -> Result<Self> {
        let dict = EncryptDict::from_object(encrypt_obj)?;
        let algorithm = dict.algorithm(encrypt_obj)?;
        let password = passphrase.unwrap_or("").as_bytes();

        log::info!(
            "Document is encrypted: V={} R={} ({:?})",
            dict.version,
            dict.revision,
            algorithm
        );

        let file_key = if dict.revision >= 5 {
            algorithms::authenticate_user_password_r6(
                password,
                &dict.user_key,
                dict.user_encryption.as_deref().unwrap_or(&[]),
                dict.revision,
            )
        } else {
            let key_length = if dict.version == 1 {
                5
            } else {
                (dict.length as usize / 8).clamp(5, 16)
            };
            algorithms::authenticate_user_password(
                password,
                &dict.user_key,
                &dict.owner_key,
                dict.permissions,
                file_id,
                dict.revision,
                key_length,
                dict.encrypt_metadata,
            )
        };

        match file_key {
            Some(file_key) => Ok(Self {
                dict,
                algorithm,
                file_key,
            }),
            None => Err(Error::Encrypted(if passphrase.is_some() {
                "passphrase rejected".to_string()
            } else {
                "document requires a passphrase".to_string()
            })),
        }
    }

    /// The negotiated algorithm.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Decrypt string or stream bytes belonging to object `(num, gen)`.
    pub fn decrypt(&self, data: &[u8], obj_num: u32, gen_num: u16) -> Result<Vec<u8>> {
        match self.algorithm {
            Algorithm::Rc4_40 | Algorithm::Rc4_128 => {
                let key = self.object_key(obj_num, gen_num);
                Ok(rc4::rc4_crypt(&key, data))
            },
            Algorithm::Aes128 | Algorithm::Aes256 => {
                if data.len() < 16 {
                    return Err(Error::Encrypted("AES data shorter than IV".to_string()));
                }
                let key = if self.algorithm == Algorithm::Aes256 {
                    self.file_key.clone()
                } else {
                    self.object_key(obj_num, gen_num)
                };
                let (iv, ciphertext) = data.split_at(16);
                aes::aes_cbc_decrypt(&key, iv, ciphertext)
                    .map_err(|e| Error::Encrypted(format!("AES decryption failed: {}", e)))
            },
        }
    }

    /// Encrypt string or stream bytes for object `(num, gen)`.
    ///
    /// AES output is IV-prefixed; the IV is derived from the object id and
    /// a digest of the plaintext so serialization stays deterministic.
    pub fn encrypt(&self, data: &[u8], obj_num: u32, gen_num: u16) -> Result<Vec<u8>> {
        match self.algorithm {
            Algorithm::Rc4_40 | Algorithm::Rc4_128 => {
                let key = self.object_key(obj_num, gen_num);
                Ok(rc4::rc4_crypt(&key, data))
            },
            Algorithm::Aes128 | Algorithm::Aes256 => {
                let key = if self.algorithm == Algorithm::Aes256 {
                    self.file_key.clone()
                } else {
                    self.object_key(obj_num, gen_num)
                };
                let iv = deterministic_iv(data, obj_num, gen_num);
                let mut out = iv.to_vec();
                let ciphertext = aes::aes_cbc_encrypt(&key, &iv, data)
                    .map_err(|e| Error::Encrypted(format!("AES encryption failed: {}", e)))?;
                out.extend_from_slice(&ciphertext);
                Ok(out)
            },
        }
    }

    /// Per-object key (Algorithm 1); AES-256 uses the file key directly.
    fn object_key(&self, obj_num: u32, gen_num: u16) -> Vec<u8> {
        use md5::{Digest, Md5};

        let mut hasher = Md5::new();
        hasher.update(&self.file_key);
        hasher.update(&obj_num.to_le_bytes()[..3]);
        hasher.update(&gen_num.to_le_bytes()[..2]);
        if self.algorithm.is_aes() {
            hasher.update(b"sAlT");
        }
        let hash = hasher.finalize();

        let key_len = (self.file_key.len() + 5).min(16);
        hash[..key_len].to_vec()
    }

    /// Permission bits from the encryption dictionary.
    pub fn permissions(&self) -> i32 {
        self.dict.permissions
    }
}

/// IV derived from the object id and plaintext digest.
fn deterministic_iv(data: &[u8], obj_num: u32, gen_num: u16) -> [u8; 16] {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(obj_num.to_le_bytes());
    hasher.update(gen_num.to_le_bytes());
    hasher.update(data);
    let digest = hasher.finalize();
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&digest[..16]);
    iv
}
