//! NTLMv1, with and without extended session security.


use crate::Flags;
use crate::config::ResponseOptions;
use crate::crypto::{self, CHALLENGE_SIZE, HASH_SIZE};
use crate::engine::{
    anonymous_responses, ClientInput, KeyDerivation, KeyExchangeInput,
    ResponseInput, Responses, Variant,
};
use crate::error::Result;
use crate::owf::ResponseKeys;


/// Fills the second DES key of the `NEGOTIATE_LM_KEY` key exchange key.
const LM_KEY_PAD: u8 = 0xBD;


/// The NTLMv1 session base key is the MD4 hash of the NT response key.
fn session_base_key(keys: &ResponseKeys) -> [u8; HASH_SIZE] {
    crypto::md4(keys.response_key_nt())
}

/// The NTLM2 session response: the NT response answers a hash of both challenges and the LM
/// response carries the client challenge.
fn extended_responses(keys: &ResponseKeys, input: &ResponseInput<'_>) -> Responses {
    let challenge_hash = crypto::md5(&crypto::concat(&[input.server_challenge, input.client_challenge]));
    let mut session_hash = [0u8; CHALLENGE_SIZE];
    session_hash.copy_from_slice(&challenge_hash[0..CHALLENGE_SIZE]);

    let nt_response = crypto::des_long(keys.response_key_nt(), &session_hash).to_vec();
    let lm_response = crypto::concat(&[input.client_challenge, &crypto::zero_fill(16)]);
    Responses {
        nt_response,
        lm_response,
        session_base_key: session_base_key(keys),
    }
}

/// The NTLMv1 key exchange key, shared by both engines.
///
/// Extended session security is checked first since LM authentication mode may run with the flag
/// negotiated. Anonymous sessions take the same branches as everyone else.
fn key_exchange_key(keys: &ResponseKeys, input: &KeyExchangeInput<'_>) -> Result<[u8; HASH_SIZE]> {
    if input.flags.contains(Flags::NEGOTIATE_EXTENDED_SESSION_SECURITY) {
        tracing::trace!("key exchange key from extended session security");
        let lm_head = crypto::slice("LM challenge response", input.lm_response, 0, CHALLENGE_SIZE)?;
        return Ok(crypto::hmac_md5(input.session_base_key, &[input.server_challenge, lm_head]));
    }

    if input.flags.contains(Flags::NEGOTIATE_LM_KEY) {
        tracing::trace!("key exchange key from LM key");
        let lm_key = keys.require_lm()?;
        let lm_head: [u8; CHALLENGE_SIZE] = crypto::exact(
            "LM challenge response prefix",
            crypto::slice("LM challenge response", input.lm_response, 0, CHALLENGE_SIZE)?,
        )?;

        let key0: [u8; 7] = crypto::exact("LM key half", &lm_key[0..7])?;
        let key1: [u8; 7] = [lm_key[7], LM_KEY_PAD, LM_KEY_PAD, LM_KEY_PAD, LM_KEY_PAD, LM_KEY_PAD, LM_KEY_PAD];

        let mut kxkey = [0u8; HASH_SIZE];
        let (half0, half1) = kxkey.split_at_mut(8);
        half0.copy_from_slice(&crypto::des(&key0, &lm_head));
        half1.copy_from_slice(&crypto::des(&key1, &lm_head));
        return Ok(kxkey);
    }

    if input.flags.contains(Flags::REQUEST_NON_NT_SESSION_KEY) {
        tracing::trace!("key exchange key from non-NT session key");
        let lm_key = keys.require_lm()?;
        let mut kxkey = [0u8; HASH_SIZE];
        kxkey[0..8].copy_from_slice(&lm_key[0..8]);
        return Ok(kxkey);
    }

    Ok(*input.session_base_key)
}


/// NTLMv1 without extended session security, including LM authentication mode.
#[derive(Clone, Copy, Debug)]
pub struct NtlmV1<'k> {
    keys: &'k ResponseKeys,
    options: ResponseOptions,
}
impl<'k> NtlmV1<'k> {
    pub fn new(keys: &'k ResponseKeys, options: ResponseOptions) -> Self {
        Self {
            keys,
            options,
        }
    }
}
impl KeyDerivation for NtlmV1<'_> {
    fn variant(&self) -> Variant {
        Variant::V1
    }

    fn compute_responses(&self, input: &ResponseInput<'_>) -> Result<Responses> {
        if input.anonymous {
            tracing::trace!("anonymous NTLMv1 responses");
            return Ok(anonymous_responses(session_base_key(self.keys)));
        }

        if self.options.lm_authentication {
            tracing::trace!("LM authentication responses");
            let lm_response = crypto::des_long(self.keys.require_lm()?, input.server_challenge);
            return Ok(Responses {
                nt_response: Vec::new(),
                lm_response: lm_response.to_vec(),
                session_base_key: session_base_key(self.keys),
            });
        }

        if input.flags.contains(Flags::NEGOTIATE_EXTENDED_SESSION_SECURITY) {
            return Ok(extended_responses(self.keys, input));
        }

        let nt_response = crypto::des_long(self.keys.response_key_nt(), input.server_challenge).to_vec();
        let lm_response = if self.options.no_lm_response_ntlm_v1 {
            nt_response.clone()
        } else {
            crypto::des_long(self.keys.require_lm()?, input.server_challenge).to_vec()
        };
        Ok(Responses {
            nt_response,
            lm_response,
            session_base_key: session_base_key(self.keys),
        })
    }

    fn compute_key_exchange_key(&self, input: &KeyExchangeInput<'_>) -> Result<[u8; HASH_SIZE]> {
        key_exchange_key(self.keys, input)
    }

    fn recover_client_input<'r>(
        &self,
        _anonymous: bool,
        _lm_response: &'r [u8],
        _nt_response: &'r [u8],
    ) -> Result<ClientInput<'r>> {
        // only the server challenge goes into these responses
        Ok(ClientInput {
            client_challenge: None,
            timestamp: None,
            target_info: None,
        })
    }
}


/// NTLMv1 with extended session security (the NTLM2 session response).
#[derive(Clone, Copy, Debug)]
pub struct NtlmV1Extended<'k> {
    keys: &'k ResponseKeys,
}
impl<'k> NtlmV1Extended<'k> {
    pub fn new(keys: &'k ResponseKeys) -> Self {
        Self {
            keys,
        }
    }
}
impl KeyDerivation for NtlmV1Extended<'_> {
    fn variant(&self) -> Variant {
        Variant::V1ExtendedSecurity
    }

    fn compute_responses(&self, input: &ResponseInput<'_>) -> Result<Responses> {
        if input.anonymous {
            tracing::trace!("anonymous NTLMv1 responses");
            return Ok(anonymous_responses(session_base_key(self.keys)));
        }
        Ok(extended_responses(self.keys, input))
    }

    fn compute_key_exchange_key(&self, input: &KeyExchangeInput<'_>) -> Result<[u8; HASH_SIZE]> {
        key_exchange_key(self.keys, input)
    }

    fn recover_client_input<'r>(
        &self,
        anonymous: bool,
        lm_response: &'r [u8],
        _nt_response: &'r [u8],
    ) -> Result<ClientInput<'r>> {
        let client_challenge = if anonymous {
            None
        } else {
            let prefix = crypto::slice("LM challenge response", lm_response, 0, CHALLENGE_SIZE)?;
            Some(crypto::exact("client challenge", prefix)?)
        };
        Ok(ClientInput {
            client_challenge,
            timestamp: None,
            target_info: None,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    const SERVER_CHALLENGE: [u8; 8] = [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef];
    const CLIENT_CHALLENGE: [u8; 8] = [0xaa; 8];

    const SESSION_BASE_KEY: [u8; 16] = [
        0xd8, 0x72, 0x62, 0xb0, 0xcd, 0xe4, 0xb1, 0xcb, 0x74, 0x99, 0xbe, 0xcc, 0xcd, 0xf1, 0x07, 0x84,
    ];
    const NTLMV1_RESPONSE: [u8; 24] = [
        0x67, 0xc4, 0x30, 0x11, 0xf3, 0x02, 0x98, 0xa2, 0xad, 0x35, 0xec, 0xe6,
        0x4f, 0x16, 0x33, 0x1c, 0x44, 0xbd, 0xbe, 0xd9, 0x27, 0x84, 0x1f, 0x94,
    ];
    const LMV1_RESPONSE: [u8; 24] = [
        0x98, 0xde, 0xf7, 0xb8, 0x7f, 0x88, 0xaa, 0x5d, 0xaf, 0xe2, 0xdf, 0x77,
        0x96, 0x88, 0xa1, 0x72, 0xde, 0xf1, 0x1c, 0x7d, 0x5c, 0xcd, 0xef, 0x13,
    ];

    fn keys() -> ResponseKeys {
        ResponseKeys::v1("Domain", "User", "Password")
    }

    fn response_input(flags: Flags) -> ResponseInput<'static> {
        ResponseInput {
            anonymous: false,
            flags,
            server_challenge: &SERVER_CHALLENGE,
            client_challenge: &CLIENT_CHALLENGE,
            timestamp: None,
            target_info: None,
        }
    }

    fn kx_input<'a>(flags: Flags, lm_response: &'a [u8], session_base_key: &'a [u8; 16]) -> KeyExchangeInput<'a> {
        KeyExchangeInput {
            flags,
            server_challenge: &SERVER_CHALLENGE,
            lm_response,
            session_base_key,
        }
    }

    #[test]
    fn default_responses_copy_nt_into_lm() {
        let keys = keys();
        let engine = NtlmV1::new(&keys, ResponseOptions::default());
        let responses = engine.compute_responses(&response_input(Flags::NEGOTIATE_NTLM)).unwrap();
        assert_eq!(responses.nt_response, NTLMV1_RESPONSE.to_vec());
        assert_eq!(responses.lm_response, NTLMV1_RESPONSE.to_vec());
        assert_eq!(responses.session_base_key, SESSION_BASE_KEY);
    }

    #[test]
    fn lm_response_when_requested() {
        let keys = keys();
        let options = ResponseOptions::default().with_no_lm_response_ntlm_v1(false);
        let engine = NtlmV1::new(&keys, options);
        let responses = engine.compute_responses(&response_input(Flags::NEGOTIATE_NTLM)).unwrap();
        assert_eq!(responses.nt_response, NTLMV1_RESPONSE.to_vec());
        assert_eq!(responses.lm_response, LMV1_RESPONSE.to_vec());
    }

    #[test]
    fn lm_authentication_sends_only_lm() {
        let keys = keys();
        let options = ResponseOptions::default().with_lm_authentication(true);
        let engine = NtlmV1::new(&keys, options);
        let flags = Flags::NEGOTIATE_NTLM | Flags::NEGOTIATE_EXTENDED_SESSION_SECURITY;
        let responses = engine.compute_responses(&response_input(flags)).unwrap();
        assert!(responses.nt_response.is_empty());
        assert_eq!(responses.lm_response, LMV1_RESPONSE.to_vec());
    }

    #[test]
    fn lm_authentication_needs_lm_key() {
        let keys = ResponseKeys::v1("Domain", "User", "a password beyond fourteen bytes");
        let options = ResponseOptions::default().with_lm_authentication(true);
        let engine = NtlmV1::new(&keys, options);
        let err = engine.compute_responses(&response_input(Flags::NEGOTIATE_NTLM)).unwrap_err();
        assert!(err.is_malformed_input());
    }

    #[test]
    fn extended_responses_known_vector() {
        // MS-NLMP 4.2.3.2.2
        let keys = keys();
        let engine = NtlmV1Extended::new(&keys);
        let flags = Flags::NEGOTIATE_NTLM | Flags::NEGOTIATE_EXTENDED_SESSION_SECURITY;
        let responses = engine.compute_responses(&response_input(flags)).unwrap();
        assert_eq!(
            responses.nt_response,
            vec![
                0x75, 0x37, 0xf8, 0x03, 0xae, 0x36, 0x71, 0x28, 0xca, 0x45, 0x82, 0x04,
                0xbd, 0xe7, 0xca, 0xf8, 0x1e, 0x97, 0xed, 0x26, 0x83, 0x26, 0x72, 0x32,
            ],
        );
        let mut lm = vec![0xaa; 8];
        lm.extend_from_slice(&[0x00; 16]);
        assert_eq!(responses.lm_response, lm);
        assert_eq!(responses.session_base_key, SESSION_BASE_KEY);

        // plain v1 with the flag negotiated takes the same path
        let plain = NtlmV1::new(&keys, ResponseOptions::default());
        assert_eq!(plain.compute_responses(&response_input(flags)).unwrap(), responses);
    }

    #[test]
    fn extended_key_exchange_key() {
        // MS-NLMP 4.2.3.1.2
        let keys = keys();
        let engine = NtlmV1Extended::new(&keys);
        let lm = crypto::concat(&[&CLIENT_CHALLENGE, &[0u8; 16]]);
        let flags = Flags::NEGOTIATE_EXTENDED_SESSION_SECURITY;
        assert_eq!(
            engine.compute_key_exchange_key(&kx_input(flags, &lm, &SESSION_BASE_KEY)).unwrap(),
            [
                0xeb, 0x93, 0x42, 0x9a, 0x8b, 0xd9, 0x52, 0xf8, 0xb8, 0x9c, 0x55, 0xb8, 0x7f, 0x47, 0x5e, 0xdc,
            ],
        );
    }

    #[test]
    fn lm_key_exchange_key() {
        // MS-NLMP 4.2.2.1.3
        let keys = keys();
        let engine = NtlmV1::new(&keys, ResponseOptions::default());
        let kxkey = engine.compute_key_exchange_key(&kx_input(Flags::NEGOTIATE_LM_KEY, &LMV1_RESPONSE, &SESSION_BASE_KEY))
            .unwrap();
        assert_eq!(
            kxkey,
            [
                0xb0, 0x9e, 0x37, 0x9f, 0x7f, 0xbe, 0xcb, 0x1e, 0xaf, 0x0a, 0xfd, 0xcb, 0x03, 0x83, 0xc8, 0xa0,
            ],
        );
    }

    #[test]
    fn non_nt_session_key_exchange_key() {
        let keys = keys();
        let engine = NtlmV1::new(&keys, ResponseOptions::default());
        let kxkey = engine.compute_key_exchange_key(
            &kx_input(Flags::REQUEST_NON_NT_SESSION_KEY, &NTLMV1_RESPONSE, &SESSION_BASE_KEY),
        ).unwrap();
        assert_eq!(
            kxkey,
            [
                0xe5, 0x2c, 0xac, 0x67, 0x41, 0x9a, 0x9a, 0x22, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            ],
        );
    }

    #[test]
    fn lm_key_takes_precedence_over_non_nt_session_key() {
        let keys = keys();
        let engine = NtlmV1::new(&keys, ResponseOptions::default());
        let both = Flags::NEGOTIATE_LM_KEY | Flags::REQUEST_NON_NT_SESSION_KEY;
        assert_eq!(
            engine.compute_key_exchange_key(&kx_input(both, &LMV1_RESPONSE, &SESSION_BASE_KEY)).unwrap(),
            engine.compute_key_exchange_key(&kx_input(Flags::NEGOTIATE_LM_KEY, &LMV1_RESPONSE, &SESSION_BASE_KEY))
                .unwrap(),
        );
    }

    #[test]
    fn plain_key_exchange_key_is_session_base_key() {
        let keys = keys();
        let engine = NtlmV1::new(&keys, ResponseOptions::default());
        let kxkey = engine.compute_key_exchange_key(&kx_input(Flags::NEGOTIATE_NTLM, &NTLMV1_RESPONSE, &SESSION_BASE_KEY))
            .unwrap();
        assert_eq!(kxkey, SESSION_BASE_KEY);
    }

    #[test]
    fn short_lm_response_is_rejected() {
        let keys = keys();
        let engine = NtlmV1Extended::new(&keys);
        let err = engine.compute_key_exchange_key(
            &kx_input(Flags::NEGOTIATE_EXTENDED_SESSION_SECURITY, &[0xaa; 4], &SESSION_BASE_KEY),
        ).unwrap_err();
        assert!(err.is_malformed_input());
    }

    #[test]
    fn anonymous_v1() {
        let keys = ResponseKeys::v1("", "", "");
        let engine = NtlmV1::new(&keys, ResponseOptions::default());
        let mut input = response_input(Flags::NEGOTIATE_NTLM);
        input.anonymous = true;
        let responses = engine.compute_responses(&input).unwrap();
        assert!(responses.nt_response.is_empty());
        assert_eq!(responses.lm_response, vec![0x00]);
        assert_eq!(responses.session_base_key, crypto::md4(&ntowf_of_empty()));

        // no flags: the key exchange key is the session base key
        let kx = kx_input(Flags::NEGOTIATE_NTLM, &responses.lm_response, &responses.session_base_key);
        assert_eq!(engine.compute_key_exchange_key(&kx).unwrap(), responses.session_base_key);

        // the single-byte LM response cannot feed the LM key
        let kx = kx_input(Flags::NEGOTIATE_LM_KEY, &responses.lm_response, &responses.session_base_key);
        assert!(engine.compute_key_exchange_key(&kx).unwrap_err().is_malformed_input());
    }

    fn ntowf_of_empty() -> [u8; 16] {
        crate::owf::ntowf_v1("", "", "")
    }

    #[test]
    fn extended_recovers_client_challenge() {
        let keys = keys();
        let engine = NtlmV1Extended::new(&keys);
        let lm = crypto::concat(&[&CLIENT_CHALLENGE, &[0u8; 16]]);
        let recovered = engine.recover_client_input(false, &lm, &[]).unwrap();
        assert_eq!(recovered.client_challenge, Some(CLIENT_CHALLENGE));
        assert!(engine.recover_client_input(false, &[0x00], &[]).is_err());
        assert_eq!(engine.recover_client_input(true, &[0x00], &[]).unwrap().client_challenge, None);
    }
}
