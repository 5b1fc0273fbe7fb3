//! The per-handshake session that drives response and key derivation.


use std::fmt;

use tracing::instrument;

use crate::{ChallengeResponse, Flags};
use crate::config::ResponseOptions;
use crate::crypto::{self, CHALLENGE_SIZE, HASH_SIZE};
use crate::engine::{Engine, KeyDerivation, KeyExchangeInput, ResponseInput, Variant};
use crate::error::{Error, Result};
use crate::owf::ResponseKeys;


/// The NTLMSSP revision implemented by Windows Server 2003 and later.
const NTLMSSP_REVISION_W2K3: u8 = 15;


/// Which side of the handshake a session is on.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ConnectionRole {
    /// Computes responses to a server's challenge.
    Client,

    /// Verifies the responses received from a client.
    Server,
}


/// Operating system version information, as announced in NTLM messages.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct OsVersion {
    pub major_version: u8,
    pub minor_version: u8,
    pub build_number: u16,
    pub reserved: [u8; 3],
    pub ntlm_revision: u8,
}
impl OsVersion {
    pub fn new(major_version: u8, minor_version: u8, build_number: u16) -> Self {
        Self {
            major_version,
            minor_version,
            build_number,
            reserved: [0, 0, 0],
            ntlm_revision: NTLMSSP_REVISION_W2K3,
        }
    }

    /// Serializes the OS version structure into bytes.
    pub fn to_bytes(&self) -> [u8; 8] {
        let build = self.build_number.to_le_bytes();
        [
            self.major_version, self.minor_version, build[0], build[1],
            self.reserved[0], self.reserved[1], self.reserved[2], self.ntlm_revision,
        ]
    }
}
impl Default for OsVersion {
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}
impl TryFrom<&[u8]> for OsVersion {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self> {
        let bytes: [u8; 8] = crypto::exact("OS version", value)?;
        Ok(OsVersion {
            major_version: bytes[0],
            minor_version: bytes[1],
            build_number: u16::from_le_bytes([bytes[2], bytes[3]]),
            reserved: [bytes[4], bytes[5], bytes[6]],
            ntlm_revision: bytes[7],
        })
    }
}


/// Who is authenticating, and from where.
///
/// The password is not part of the identity; it only enters a session through its
/// [`ResponseKeys`].
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Identity {
    /// The username. Empty for anonymous authentication.
    pub username: String,

    /// The domain. In credentials without a domain, the domain is an empty string.
    pub domain: String,

    /// The NT hostname of the client.
    pub hostname: String,

    /// Version information about the client's operating system.
    pub os_version: OsVersion,
}
impl Identity {
    pub fn new(username: &str, domain: &str, hostname: &str) -> Self {
        Self {
            username: username.to_owned(),
            domain: domain.to_owned(),
            hostname: hostname.to_owned(),
            os_version: OsVersion::default(),
        }
    }
}


/// A value that can be written exactly once.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
struct WriteOnce<T> {
    value: Option<T>,
    unset: &'static str,
    already_set: &'static str,
}
impl<T> WriteOnce<T> {
    fn new(unset: &'static str, already_set: &'static str) -> Self {
        Self {
            value: None,
            unset,
            already_set,
        }
    }

    fn is_set(&self) -> bool {
        self.value.is_some()
    }

    fn set(&mut self, operation: &'static str, value: T) -> Result<()> {
        if self.value.is_some() {
            return Err(Error::sequence(operation, self.already_set));
        }
        self.value = Some(value);
        Ok(())
    }

    fn get(&self, operation: &'static str) -> Result<&T> {
        self.value.as_ref()
            .ok_or_else(|| Error::sequence(operation, self.unset))
    }
}


/// Everything a handshake has established so far.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
struct HandshakeState {
    negotiated_flags: WriteOnce<Flags>,
    variant: WriteOnce<Variant>,
    server_challenge: WriteOnce<[u8; CHALLENGE_SIZE]>,
    client_challenge: WriteOnce<[u8; CHALLENGE_SIZE]>,
    nt_response: WriteOnce<Vec<u8>>,
    lm_response: WriteOnce<Vec<u8>>,
    session_base_key: WriteOnce<[u8; HASH_SIZE]>,
    key_exchange_key: WriteOnce<[u8; HASH_SIZE]>,
}
impl HandshakeState {
    fn new() -> Self {
        Self {
            negotiated_flags: WriteOnce::new(
                "negotiated flags have not been set", "negotiated flags have already been set",
            ),
            variant: WriteOnce::new(
                "negotiated flags have not been set", "negotiated flags have already been set",
            ),
            server_challenge: WriteOnce::new(
                "no server challenge has been processed", "a server challenge has already been processed",
            ),
            client_challenge: WriteOnce::new(
                "no client challenge has been used", "a client challenge has already been used",
            ),
            nt_response: WriteOnce::new(
                "responses have not been computed", "responses have already been computed",
            ),
            lm_response: WriteOnce::new(
                "responses have not been computed", "responses have already been computed",
            ),
            session_base_key: WriteOnce::new(
                "responses have not been computed", "responses have already been computed",
            ),
            key_exchange_key: WriteOnce::new(
                "the key exchange key has not been computed", "the key exchange key has already been computed",
            ),
        }
    }
}


/// The key derivation side of one NTLM handshake.
///
/// A session is used for exactly one handshake: negotiated flags, challenges, responses and keys
/// can each be set once. Create a new session (reusing the [`ResponseKeys`]) for the next attempt.
#[derive(Clone)]
pub struct NtlmSession {
    role: ConnectionRole,
    identity: Identity,
    keys: ResponseKeys,
    options: ResponseOptions,
    state: HandshakeState,
}
impl NtlmSession {
    pub fn new(role: ConnectionRole, identity: Identity, keys: ResponseKeys, options: ResponseOptions) -> Self {
        Self {
            role,
            identity,
            keys,
            options,
            state: HandshakeState::new(),
        }
    }

    pub fn role(&self) -> ConnectionRole {
        self.role
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn keys(&self) -> &ResponseKeys {
        &self.keys
    }

    pub fn options(&self) -> &ResponseOptions {
        &self.options
    }

    /// Anonymous authentication uses an empty username and an empty password.
    pub fn is_anonymous(&self) -> bool {
        self.identity.username.is_empty() && self.keys.is_empty_password()
    }

    /// Stores the flags negotiated by the Negotiate and Challenge messages and picks the variant of
    /// the protocol accordingly.
    #[instrument(level = "debug", skip_all, fields(role = ?self.role))]
    pub fn set_negotiated_flags(&mut self, flags: Flags) -> Result<()> {
        const OPERATION: &str = "set_negotiated_flags";

        if self.state.negotiated_flags.is_set() {
            return Err(Error::sequence(OPERATION, "negotiated flags have already been set"));
        }
        let variant = Variant::select(self.keys.version(), flags, &self.options);
        tracing::debug!(?variant, ?flags, "variant selected");

        self.state.negotiated_flags.set(OPERATION, flags)?;
        self.state.variant.set(OPERATION, variant)?;
        Ok(())
    }

    fn engine(&self, operation: &'static str) -> Result<(Engine<'_>, Flags)> {
        let variant = *self.state.variant.get(operation)?;
        let flags = *self.state.negotiated_flags.get(operation)?;
        Ok((Engine::new(variant, &self.keys, self.options), flags))
    }

    fn require_role(&self, operation: &'static str, role: ConnectionRole) -> Result<()> {
        if self.role != role {
            let reason = match role {
                ConnectionRole::Client => "only a client session can do this",
                ConnectionRole::Server => "only a server session can do this",
            };
            return Err(Error::sequence(operation, reason));
        }
        Ok(())
    }

    fn require_no_responses(&self, operation: &'static str) -> Result<()> {
        if self.state.nt_response.is_set() {
            return Err(Error::sequence(operation, "responses have already been computed"));
        }
        Ok(())
    }

    /// Computes the responses to the server's challenge.
    ///
    /// `timestamp` is only used by NTLMv2; if it is `None`, the timestamp from the target
    /// information is used, or the current time if the server did not send one. `target_info` is
    /// required for NTLMv2 and ignored otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sequence`] if this is not a client session, the flags have not been set yet
    /// or responses have already been computed, and [`Error::MalformedInput`] if a challenge is not
    /// exactly 8 bytes long. Nothing is stored if an error is returned.
    #[instrument(level = "debug", skip_all, fields(role = ?self.role))]
    pub fn compute_responses(
        &mut self,
        server_challenge: &[u8],
        client_challenge: &[u8],
        timestamp: Option<u64>,
        target_info: Option<&[u8]>,
    ) -> Result<ChallengeResponse> {
        const OPERATION: &str = "compute_responses";

        self.require_role(OPERATION, ConnectionRole::Client)?;
        self.require_no_responses(OPERATION)?;
        let server_challenge: [u8; CHALLENGE_SIZE] = crypto::exact("server challenge", server_challenge)?;
        let client_challenge: [u8; CHALLENGE_SIZE] = crypto::exact("client challenge", client_challenge)?;

        let (engine, flags) = self.engine(OPERATION)?;
        let input = ResponseInput {
            anonymous: self.is_anonymous(),
            flags,
            server_challenge: &server_challenge,
            client_challenge: &client_challenge,
            timestamp,
            target_info,
        };
        let responses = engine.compute_responses(&input)?;
        tracing::debug!(
            variant = ?engine.variant(),
            anonymous = input.anonymous,
            nt_len = responses.nt_response.len(),
            lm_len = responses.lm_response.len(),
            "responses computed"
        );

        let challenge_response = ChallengeResponse {
            lm_response: responses.lm_response.clone(),
            nt_response: responses.nt_response.clone(),
        };
        self.state.server_challenge.set(OPERATION, server_challenge)?;
        self.state.client_challenge.set(OPERATION, client_challenge)?;
        self.state.nt_response.set(OPERATION, responses.nt_response)?;
        self.state.lm_response.set(OPERATION, responses.lm_response)?;
        self.state.session_base_key.set(OPERATION, responses.session_base_key)?;
        Ok(challenge_response)
    }

    /// Verifies the responses a client sent to this server's challenge.
    ///
    /// The client's challenge (and for NTLMv2 its timestamp and target information) is taken from
    /// the responses; the responses are then recomputed from this session's keys and compared.
    /// Returns `false` on a mismatch, leaving the session untouched so that it may be retried with
    /// other responses. On a match, the responses and the session base key are stored as if they
    /// had been computed by [`NtlmSession::compute_responses`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sequence`] if this is not a server session, the flags have not been set yet
    /// or responses have already been verified, and [`Error::MalformedInput`] if the challenge or
    /// the responses are too short to be taken apart.
    #[instrument(level = "debug", skip_all, fields(role = ?self.role))]
    pub fn verify_responses(
        &mut self,
        server_challenge: &[u8],
        lm_response: &[u8],
        nt_response: &[u8],
    ) -> Result<bool> {
        const OPERATION: &str = "verify_responses";

        self.require_role(OPERATION, ConnectionRole::Server)?;
        self.require_no_responses(OPERATION)?;
        let server_challenge: [u8; CHALLENGE_SIZE] = crypto::exact("server challenge", server_challenge)?;

        let anonymous = self.is_anonymous();
        let (engine, flags) = self.engine(OPERATION)?;
        let client_input = engine.recover_client_input(anonymous, lm_response, nt_response)?;
        let client_challenge = client_input.client_challenge.unwrap_or([0u8; CHALLENGE_SIZE]);
        let input = ResponseInput {
            anonymous,
            flags,
            server_challenge: &server_challenge,
            client_challenge: &client_challenge,
            timestamp: client_input.timestamp,
            target_info: client_input.target_info,
        };
        let expected = engine.compute_responses(&input)?;

        let nt_matches = crypto::constant_time_eq(&expected.nt_response, nt_response);
        let lm_matches = crypto::constant_time_eq(&expected.lm_response, lm_response);
        if !(nt_matches && lm_matches) {
            tracing::debug!(variant = ?engine.variant(), "responses do not match");
            return Ok(false);
        }
        tracing::debug!(variant = ?engine.variant(), anonymous, "responses verified");

        self.state.server_challenge.set(OPERATION, server_challenge)?;
        if let Some(cc) = client_input.client_challenge {
            self.state.client_challenge.set(OPERATION, cc)?;
        }
        self.state.nt_response.set(OPERATION, expected.nt_response)?;
        self.state.lm_response.set(OPERATION, expected.lm_response)?;
        self.state.session_base_key.set(OPERATION, expected.session_base_key)?;
        Ok(true)
    }

    /// Computes the key exchange key, which the signing and sealing layer derives its keys from.
    ///
    /// Calling this again returns the same key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sequence`] if the responses have not been computed or verified yet.
    #[instrument(level = "debug", skip_all, fields(role = ?self.role))]
    pub fn compute_key_exchange_key(&mut self) -> Result<[u8; HASH_SIZE]> {
        const OPERATION: &str = "compute_key_exchange_key";

        if let Some(key) = self.state.key_exchange_key.value {
            return Ok(key);
        }

        let session_base_key = *self.state.session_base_key.get(OPERATION)?;
        let (engine, flags) = self.engine(OPERATION)?;
        let input = KeyExchangeInput {
            flags,
            server_challenge: self.state.server_challenge.get(OPERATION)?,
            lm_response: self.state.lm_response.get(OPERATION)?,
            session_base_key: &session_base_key,
        };
        let key = engine.compute_key_exchange_key(&input)?;
        tracing::debug!(variant = ?engine.variant(), "key exchange key computed");

        self.state.key_exchange_key.set(OPERATION, key)?;
        Ok(key)
    }

    /// The variant of the protocol selected by the negotiated flags.
    pub fn variant(&self) -> Result<Variant> {
        self.state.variant.get("variant").copied()
    }

    pub fn negotiated_flags(&self) -> Result<Flags> {
        self.state.negotiated_flags.get("negotiated_flags").copied()
    }

    pub fn server_challenge(&self) -> Result<&[u8; CHALLENGE_SIZE]> {
        self.state.server_challenge.get("server_challenge")
    }

    /// The client challenge. A server only learns it from responses that contain it.
    pub fn client_challenge(&self) -> Result<&[u8; CHALLENGE_SIZE]> {
        self.state.client_challenge.get("client_challenge")
    }

    pub fn nt_response(&self) -> Result<&[u8]> {
        self.state.nt_response.get("nt_response")
            .map(|r| r.as_slice())
    }

    pub fn lm_response(&self) -> Result<&[u8]> {
        self.state.lm_response.get("lm_response")
            .map(|r| r.as_slice())
    }

    pub fn session_base_key(&self) -> Result<&[u8; HASH_SIZE]> {
        self.state.session_base_key.get("session_base_key")
    }

    pub fn key_exchange_key(&self) -> Result<&[u8; HASH_SIZE]> {
        self.state.key_exchange_key.get("key_exchange_key")
    }
}
impl fmt::Debug for NtlmSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // the handshake state holds key material
        f.debug_struct("NtlmSession")
            .field("role", &self.role)
            .field("identity", &self.identity)
            .field("keys", &self.keys)
            .field("options", &self.options)
            .field("variant", &self.state.variant.value)
            .finish_non_exhaustive()
    }
}
