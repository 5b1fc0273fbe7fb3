//! Credential one-way functions (OWFs) and the response keys derived from them.


use std::fmt;

use crate::crypto::{self, HASH_SIZE};
use crate::error::{Error, Result};

#[cfg(windows)]
use crate::encoding_windows::rust_string_to_oem;

#[cfg(not(windows))]
use crate::encoding_ascii::rust_string_to_oem;


/// The fixed plaintext encrypted by both halves of the LM password.
const LM_MAGIC: [u8; 8] = *b"KGS!@#$%";

/// The length of the OEM-encoded password taken by the LM one-way function.
const LM_PASSWORD_LEN: usize = 14;


/// The NTLM protocol version whose one-way functions produced a set of keys.
///
/// The LM and NTLM versions are not negotiated; they are configured on both sides beforehand.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ProtocolVersion {
    V1,
    V2,
}


/// Encodes the string as UTF-16 in little-endian byte order, without a Byte Order Mark.
pub(crate) fn utf16_le_bytes(s: &str) -> Vec<u8> {
    s.encode_utf16()
        .flat_map(|w| w.to_le_bytes())
        .collect()
}

/// Derives the NT response key from a password according to the NTLMv1 scheme.
///
/// The NTLMv1 scheme encodes the password as UTF-16 in little-endian byte order and hashes it using
/// MD4. The domain and username do not take part; they are only accepted for symmetry with
/// [`ntowf_v2`].
pub fn ntowf_v1(_domain: &str, _username: &str, password: &str) -> [u8; HASH_SIZE] {
    crypto::md4(&utf16_le_bytes(password))
}

/// Derives the LM response key from a password according to the LMv1 scheme.
///
/// ```plain
///            ┌────────────┐  ┌───────────────┐  ┌─────────────┐
/// password ──┤ convert to ├──┤ encode using  ├──┤  must be    ├──┐
///            │ uppercase  │  │ OEM codepage  │  │ exactly 14 B│  │
///            └────────────┘  └───────────────┘  └─────────────┘  │
///           ┌────────────────────────────────────────────────────┘
///           │┌───────┐
///           └┤ split │           "KGS!@#$%"
///            └─┬───┬─┘               │ input
///         0..7 │   │ 7..14    key ┌──┴──┐ output
///              │   └──────────────┤ DES ├────────────┐
///              │                  └─────┘            │ 8..16
///              │                                  ┌──┴───┐
///              │                 "KGS!@#$%"       │ join ├──── key
///              │                     │ input      └──┬───┘
///              │              key ┌──┴──┐ output     │ 0..8
///              └──────────────────┤ DES ├────────────┘
///                                 └─────┘
/// ```
///
/// The caller zero-pads the password to 14 bytes by appending NUL characters;
/// [`ResponseKeys::v1`] does so before calling this function.
///
/// # Errors
///
/// Returns [`Error::Encoding`] if the uppercased password cannot be represented in the OEM code
/// page or is not exactly 14 bytes long once encoded. Passwords longer than that cannot be handled
/// by the LM scheme; callers should fall back to extended session security or NTLMv2.
pub fn lmowf_v1(_domain: &str, _username: &str, password: &str) -> Result<[u8; HASH_SIZE]> {
    let uppercase_password = password.to_uppercase();
    let password_bytes = rust_string_to_oem(&uppercase_password)
        .ok_or(Error::Encoding { what: "LM password", reason: "not representable in the OEM code page" })?;
    if password_bytes.len() != LM_PASSWORD_LEN {
        return Err(Error::Encoding { what: "LM password", reason: "not exactly 14 bytes once encoded" });
    }

    let key0: [u8; 7] = crypto::exact("LM password half", &password_bytes[0..7])?;
    let key1: [u8; 7] = crypto::exact("LM password half", &password_bytes[7..14])?;

    let mut output = [0; HASH_SIZE];
    let (half0, half1) = output.split_at_mut(8);
    half0.copy_from_slice(&crypto::des(&key0, &LM_MAGIC));
    half1.copy_from_slice(&crypto::des(&key1, &LM_MAGIC));
    Ok(output)
}

/// Appends NUL characters until the uppercased, OEM-encoded password fills 14 bytes.
///
/// Passwords that are already too long or not representable are returned unchanged, leaving
/// [`lmowf_v1`] to reject them.
fn pad_lm_password(password: &str) -> String {
    let encoded_len = match rust_string_to_oem(&password.to_uppercase()) {
        Some(bytes) => bytes.len(),
        None => return password.to_owned(),
    };
    let mut padded = password.to_owned();
    padded.extend(std::iter::repeat('\0').take(LM_PASSWORD_LEN.saturating_sub(encoded_len)));
    padded
}

/// Derives the NT response key from a password according to the NTLMv2 scheme.
///
/// The NTLMv2 scheme is a HMAC-MD5 scheme whose key is the [`ntowf_v1`] output and whose plaintext
/// is the uppercase username followed by the unchanged-case domain, each encoded as UTF-16 in
/// little-endian byte order.
pub fn ntowf_v2(domain: &str, username: &str, password: &str) -> [u8; HASH_SIZE] {
    let nt_hash = ntowf_v1(domain, username, password);
    ntowf_v2_from_hash(domain, username, &nt_hash)
}

fn ntowf_v2_from_hash(domain: &str, username: &str, nt_hash: &[u8; HASH_SIZE]) -> [u8; HASH_SIZE] {
    let upper_user_bytes = utf16_le_bytes(&username.to_uppercase());
    let dom_bytes = utf16_le_bytes(domain);
    crypto::hmac_md5(nt_hash, &[upper_user_bytes.as_slice(), dom_bytes.as_slice()])
}

/// Derives the LM response key according to the NTLMv2 scheme, which is identical to [`ntowf_v2`].
pub fn lmowf_v2(domain: &str, username: &str, password: &str) -> [u8; HASH_SIZE] {
    ntowf_v2(domain, username, password)
}


/// The response keys derived from a credential.
///
/// They do not depend on any handshake, so one value can be cached and reused for every
/// authentication attempt with the same credential.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct ResponseKeys {
    version: ProtocolVersion,
    response_key_nt: [u8; HASH_SIZE],
    response_key_lm: Option<[u8; HASH_SIZE]>,
    empty_password: bool,
}
impl ResponseKeys {
    /// Derives the NTLMv1 response keys from a password.
    ///
    /// The password is zero-padded to 14 bytes for [`lmowf_v1`]. If it cannot be run through
    /// that function, no LM key is stored. Only the extended-session-security path works with such
    /// keys.
    pub fn v1(domain: &str, username: &str, password: &str) -> Self {
        let response_key_nt = ntowf_v1(domain, username, password);
        let response_key_lm = match lmowf_v1(domain, username, &pad_lm_password(password)) {
            Ok(k) => Some(k),
            Err(e) => {
                tracing::debug!(error = %e, "LM response key unavailable");
                None
            },
        };
        Self {
            version: ProtocolVersion::V1,
            response_key_nt,
            response_key_lm,
            empty_password: password.is_empty(),
        }
    }

    /// Wraps precomputed NTLMv1 hashes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedInput`] unless each hash is exactly 16 bytes long.
    pub fn v1_from_hashes(nt_hash: &[u8], lm_hash: Option<&[u8]>) -> Result<Self> {
        let response_key_nt = crypto::exact("NT hash", nt_hash)?;
        let response_key_lm = match lm_hash {
            Some(lm) => Some(crypto::exact("LM hash", lm)?),
            None => None,
        };
        Ok(Self {
            version: ProtocolVersion::V1,
            response_key_nt,
            response_key_lm,
            empty_password: false,
        })
    }

    /// Derives the NTLMv2 response keys from a password.
    pub fn v2(domain: &str, username: &str, password: &str) -> Self {
        Self {
            version: ProtocolVersion::V2,
            response_key_nt: ntowf_v2(domain, username, password),
            response_key_lm: Some(lmowf_v2(domain, username, password)),
            empty_password: password.is_empty(),
        }
    }

    /// Derives the NTLMv2 response keys from a precomputed NT hash (the [`ntowf_v1`] output).
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedInput`] unless the hash is exactly 16 bytes long.
    pub fn v2_from_nt_hash(domain: &str, username: &str, nt_hash: &[u8]) -> Result<Self> {
        let nt_hash: [u8; HASH_SIZE] = crypto::exact("NT hash", nt_hash)?;
        let key = ntowf_v2_from_hash(domain, username, &nt_hash);
        Ok(Self {
            version: ProtocolVersion::V2,
            response_key_nt: key,
            response_key_lm: Some(key),
            empty_password: false,
        })
    }

    /// The protocol version these keys belong to.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// The NT response key (`ResponseKeyNT`).
    pub fn response_key_nt(&self) -> &[u8; HASH_SIZE] {
        &self.response_key_nt
    }

    /// The LM response key (`ResponseKeyLM`), if one could be derived.
    pub fn response_key_lm(&self) -> Option<&[u8; HASH_SIZE]> {
        self.response_key_lm.as_ref()
    }

    /// Returns the LM response key or fails if it could not be derived.
    pub(crate) fn require_lm(&self) -> Result<&[u8; HASH_SIZE]> {
        self.response_key_lm.as_ref()
            .ok_or_else(|| Error::malformed("LM response key", HASH_SIZE, 0))
    }

    /// Whether the keys were derived from an empty password.
    pub fn is_empty_password(&self) -> bool {
        self.empty_password
    }
}
impl fmt::Debug for ResponseKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseKeys")
            .field("version", &self.version)
            .field("response_key_nt", &"<redacted>")
            .field("response_key_lm", &self.response_key_lm.map(|_| "<redacted>"))
            .field("empty_password", &self.empty_password)
            .finish()
    }
}
