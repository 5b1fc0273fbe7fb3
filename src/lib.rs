//! NTLM challenge responses and session key derivation for Rust.
//!
//! This crate computes what an NTLM client (or a server verifying one) derives from a credential
//! during a handshake: the LM and NT challenge responses, the session base key and the key exchange
//! key. NTLMv1, NTLMv1 with extended session security, and NTLMv2 are supported. Encoding the
//! handshake messages and signing or sealing with the resulting key are left to the caller.
//!
//! Sample usage:
//! ```
//! use ntlmsession::{ConnectionRole, Flags, Identity, NtlmSession, ResponseKeys, ResponseOptions};
//!
//! // response keys only depend on the credential; they may be cached
//! let keys = ResponseKeys::v2("Domain", "User", "Password");
//! let identity = Identity::new("User", "Domain", "COMPUTER");
//! let mut session = NtlmSession::new(ConnectionRole::Client, identity, keys, ResponseOptions::default());
//!
//! // taken from the Challenge message
//! let negotiated = Flags::NEGOTIATE_UNICODE
//!     | Flags::NEGOTIATE_NTLM
//!     | Flags::NEGOTIATE_EXTENDED_SESSION_SECURITY
//!     | Flags::NEGOTIATE_TARGET_INFO;
//! let server_challenge = [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef];
//! let target_info = [0x00, 0x00, 0x00, 0x00];
//!
//! session.set_negotiated_flags(negotiated)
//!     .expect("flags set twice");
//! let client_challenge = ntlmsession::ClientChallenge::random();
//! let response = session.compute_responses(
//!     &server_challenge,
//!     client_challenge.as_bytes(),
//!     None,
//!     Some(&target_info[..]),
//! ).expect("failed to compute responses");
//! assert_eq!(response.lm_response.len(), 24);
//!
//! // hand this to the signing and sealing layer
//! let key_exchange_key = session.compute_key_exchange_key()
//!     .expect("failed to compute key exchange key");
//! assert_eq!(key_exchange_key.len(), 16);
//! ```


#[cfg(windows)]
mod encoding_windows;

#[cfg(not(windows))]
mod encoding_ascii;

mod config;
pub mod crypto;
pub mod engine;
mod error;
pub mod owf;
mod session;
pub mod target_info;


use bitflags::bitflags;
use chrono::Utc;
use rand::{CryptoRng, RngCore};
use rand::rngs::OsRng;

pub use crate::config::ResponseOptions;
pub use crate::engine::{KeyDerivation, Variant};
pub use crate::error::{Error, Result};
pub use crate::owf::{lmowf_v1, lmowf_v2, ntowf_v1, ntowf_v2, ProtocolVersion, ResponseKeys};
pub use crate::session::{ConnectionRole, Identity, NtlmSession, OsVersion};


bitflags! {
    /// NTLM negotiation flags.
    ///
    /// The flags are negotiated by the Negotiate and Challenge messages; key derivation only reads
    /// them.
    #[derive(Clone, Copy, Debug, Default, Hash, Eq, Ord, PartialEq, PartialOrd)]
    pub struct Flags: u32 {
        const NEGOTIATE_UNICODE = 0x0000_0001;
        const NEGOTIATE_OEM = 0x0000_0002;
        const REQUEST_TARGET = 0x0000_0004;
        const UNKNOWN_8 = 0x0000_0008;
        const NEGOTIATE_SIGN = 0x0000_0010;
        const NEGOTIATE_SEAL = 0x0000_0020;
        const NEGOTIATE_DATAGRAM = 0x0000_0040;
        const NEGOTIATE_LM_KEY = 0x0000_0080;
        const NEGOTIATE_NETWARE = 0x0000_0100;
        const NEGOTIATE_NTLM = 0x0000_0200;
        const UNKNOWN_400 = 0x0000_0400;
        const NEGOTIATE_ANONYMOUS = 0x0000_0800;
        const NEGOTIATE_DOMAIN_SUPPLIED = 0x0000_1000;
        const NEGOTIATE_WORKSTATION_SUPPLIED = 0x0000_2000;
        const NEGOTIATE_LOCAL_CALL = 0x0000_4000;
        const NEGOTIATE_ALWAYS_SIGN = 0x0000_8000;
        const TARGET_TYPE_DOMAIN = 0x0001_0000;
        const TARGET_TYPE_SERVER = 0x0002_0000;
        const TARGET_TYPE_SHARE = 0x0004_0000;
        const NEGOTIATE_EXTENDED_SESSION_SECURITY = 0x0008_0000;
        const REQUEST_INIT_RESPONSE = 0x0010_0000;
        const REQUEST_ACCEPT_RESPONSE = 0x0020_0000;
        const REQUEST_NON_NT_SESSION_KEY = 0x0040_0000;
        const NEGOTIATE_TARGET_INFO = 0x0080_0000;
        const UNKNOWN_1000000 = 0x0100_0000;
        const NEGOTIATE_VERSION = 0x0200_0000;
        const UNKNOWN_4000000 = 0x0400_0000;
        const UNKNOWN_8000000 = 0x0800_0000;
        const UNKNOWN_10000000 = 0x1000_0000;
        const NEGOTIATE_128BIT = 0x2000_0000;
        const NEGOTIATE_KEY_EXCHANGE = 0x4000_0000;
        const NEGOTIATE_56BIT = 0x8000_0000;
    }
}


/// The responses to an NTLM challenge, as placed into the Authenticate message.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ChallengeResponse {
    /// The LanManager (LM) response. For NTLMv1 with extended session security, this carries the
    /// client challenge.
    pub lm_response: Vec<u8>,

    /// The NT response. Empty for anonymous authentication and in LM authentication mode.
    pub nt_response: Vec<u8>,
}


/// An 8-byte challenge generated by the client.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ClientChallenge([u8; crypto::CHALLENGE_SIZE]);
impl ClientChallenge {
    /// Generates a client challenge using the operating system's random number generator.
    pub fn random() -> Self {
        Self::from_rng(&mut OsRng)
    }

    /// Generates a client challenge using the given cryptographically secure generator.
    pub fn from_rng<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut challenge = [0u8; crypto::CHALLENGE_SIZE];
        rng.fill_bytes(&mut challenge);
        Self(challenge)
    }

    pub fn as_bytes(&self) -> &[u8; crypto::CHALLENGE_SIZE] {
        &self.0
    }
}
impl From<[u8; crypto::CHALLENGE_SIZE]> for ClientChallenge {
    fn from(value: [u8; crypto::CHALLENGE_SIZE]) -> Self {
        Self(value)
    }
}


/// Seconds between the Windows epoch (1601-01-01) and the Unix epoch (1970-01-01).
const WINDOWS_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;

/// Obtains the current NTLM timestamp.
///
/// The format is a Windows file time: tenths of a microsecond since 1601-01-01T00:00:00Z.
pub fn ntlm_time_now() -> u64 {
    let unix_micros = Utc::now().timestamp_micros();
    let windows_micros = unix_micros + WINDOWS_EPOCH_OFFSET_SECS * 1_000_000;
    u64::try_from(windows_micros).unwrap_or(0) * 10
}
