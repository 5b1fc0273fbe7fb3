//! Version-specific response and key derivation.
//!
//! The protocol version and the negotiated flags pick one [`Variant`] per handshake; its engine
//! implements [`KeyDerivation`]. Nothing outside of this module branches on the protocol version.


mod v1;
mod v2;


pub use crate::engine::v1::{NtlmV1, NtlmV1Extended};
pub use crate::engine::v2::NtlmV2;

use crate::Flags;
use crate::config::ResponseOptions;
use crate::crypto::{CHALLENGE_SIZE, HASH_SIZE};
use crate::error::Result;
use crate::owf::{ProtocolVersion, ResponseKeys};


/// The inputs to a challenge response computation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ResponseInput<'a> {
    /// Whether the user is anonymous (empty username and empty password).
    pub anonymous: bool,

    /// The negotiated flags.
    pub flags: Flags,

    /// The challenge sent by the server.
    pub server_challenge: &'a [u8; CHALLENGE_SIZE],

    /// The challenge generated by the client.
    pub client_challenge: &'a [u8; CHALLENGE_SIZE],

    /// The NTLMv2 timestamp as a Windows file time; `None` picks one automatically.
    pub timestamp: Option<u64>,

    /// The target information from the Challenge message.
    pub target_info: Option<&'a [u8]>,
}

/// The values derived from a challenge.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Responses {
    pub nt_response: Vec<u8>,
    pub lm_response: Vec<u8>,
    pub session_base_key: [u8; HASH_SIZE],
}
impl std::fmt::Debug for Responses {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responses")
            .field("nt_response", &self.nt_response)
            .field("lm_response", &self.lm_response)
            .field("session_base_key", &"<redacted>")
            .finish()
    }
}

/// The inputs to a key exchange key computation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct KeyExchangeInput<'a> {
    pub flags: Flags,
    pub server_challenge: &'a [u8; CHALLENGE_SIZE],
    pub lm_response: &'a [u8],
    pub session_base_key: &'a [u8; HASH_SIZE],
}

/// The client-chosen values that a server recovers from the responses it received.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ClientInput<'a> {
    /// `None` if the responses do not depend on a client challenge.
    pub client_challenge: Option<[u8; CHALLENGE_SIZE]>,
    pub timestamp: Option<u64>,
    pub target_info: Option<&'a [u8]>,
}


/// Derives challenge responses and keys for one variant of the protocol.
pub trait KeyDerivation {
    /// The variant implemented by this engine.
    fn variant(&self) -> Variant;

    /// Computes the NT and LM challenge responses and the session base key.
    fn compute_responses(&self, input: &ResponseInput<'_>) -> Result<Responses>;

    /// Computes the key exchange key from the responses and the session base key.
    fn compute_key_exchange_key(&self, input: &KeyExchangeInput<'_>) -> Result<[u8; HASH_SIZE]>;

    /// Extracts the values chosen by the client from the responses it sent, so that a server can
    /// recompute and compare them.
    fn recover_client_input<'r>(
        &self,
        anonymous: bool,
        lm_response: &'r [u8],
        nt_response: &'r [u8],
    ) -> Result<ClientInput<'r>>;
}


/// The variant of the protocol used for a handshake.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Variant {
    /// NTLMv1 or LM authentication.
    V1,

    /// NTLMv1 with extended session security (NTLM2 session response).
    V1ExtendedSecurity,

    /// NTLMv2.
    V2,
}
impl Variant {
    /// Picks the variant for the given keys, negotiated flags and local options.
    ///
    /// LM authentication mode overrides extended session security.
    pub fn select(version: ProtocolVersion, flags: Flags, options: &ResponseOptions) -> Self {
        match version {
            ProtocolVersion::V2 => Variant::V2,
            ProtocolVersion::V1 => {
                if flags.contains(Flags::NEGOTIATE_EXTENDED_SESSION_SECURITY) && !options.lm_authentication {
                    Variant::V1ExtendedSecurity
                } else {
                    Variant::V1
                }
            },
        }
    }
}


/// The engine for a selected variant.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Engine<'k> {
    V1(NtlmV1<'k>),
    V1Extended(NtlmV1Extended<'k>),
    V2(NtlmV2<'k>),
}
impl<'k> Engine<'k> {
    pub(crate) fn new(variant: Variant, keys: &'k ResponseKeys, options: ResponseOptions) -> Self {
        match variant {
            Variant::V1 => Engine::V1(NtlmV1::new(keys, options)),
            Variant::V1ExtendedSecurity => Engine::V1Extended(NtlmV1Extended::new(keys)),
            Variant::V2 => Engine::V2(NtlmV2::new(keys)),
        }
    }

    fn as_derivation(&self) -> &dyn KeyDerivation {
        match self {
            Engine::V1(e) => e,
            Engine::V1Extended(e) => e,
            Engine::V2(e) => e,
        }
    }
}
impl KeyDerivation for Engine<'_> {
    fn variant(&self) -> Variant {
        self.as_derivation().variant()
    }

    fn compute_responses(&self, input: &ResponseInput<'_>) -> Result<Responses> {
        self.as_derivation().compute_responses(input)
    }

    fn compute_key_exchange_key(&self, input: &KeyExchangeInput<'_>) -> Result<[u8; HASH_SIZE]> {
        self.as_derivation().compute_key_exchange_key(input)
    }

    fn recover_client_input<'r>(
        &self,
        anonymous: bool,
        lm_response: &'r [u8],
        nt_response: &'r [u8],
    ) -> Result<ClientInput<'r>> {
        self.as_derivation().recover_client_input(anonymous, lm_response, nt_response)
    }
}


/// Anonymous authentication sends an empty NT response and a single zero byte as the LM response.
fn anonymous_responses(session_base_key: [u8; HASH_SIZE]) -> Responses {
    Responses {
        nt_response: Vec::new(),
        lm_response: vec![0x00],
        session_base_key,
    }
}
