//! NTLMv2.


use crate::crypto::{self, CHALLENGE_SIZE, HASH_SIZE};
use crate::engine::{
    anonymous_responses, ClientInput, KeyDerivation, KeyExchangeInput,
    ResponseInput, Responses, Variant,
};
use crate::error::{Error, Result};
use crate::ntlm_time_now;
use crate::owf::ResponseKeys;
use crate::target_info::find_timestamp;


/// The response version and highest understood response version at the start of the blob.
const BLOB_SIGNATURE: [u8; 2] = [0x01, 0x01];

// offsets into the NT response, which starts with the 16-byte proof
const TIMESTAMP_OFFSET: usize = HASH_SIZE + 8;
const CLIENT_CHALLENGE_OFFSET: usize = TIMESTAMP_OFFSET + 8;
const TARGET_INFO_OFFSET: usize = CLIENT_CHALLENGE_OFFSET + CHALLENGE_SIZE + 4;

/// Length of the trailing zero padding after the target info.
const BLOB_TRAILER_LEN: usize = 4;


/// Assembles the client blob (`temp` in MS-NLMP 3.3.2) which follows the proof in the NT response.
fn client_blob(timestamp: u64, client_challenge: &[u8; CHALLENGE_SIZE], target_info: &[u8]) -> Vec<u8> {
    crypto::concat(&[
        &BLOB_SIGNATURE,
        &crypto::zero_fill(6),
        &timestamp.to_le_bytes(),
        client_challenge,
        &crypto::zero_fill(4),
        target_info,
        &crypto::zero_fill(BLOB_TRAILER_LEN),
    ])
}


/// NTLMv2.
#[derive(Clone, Copy, Debug)]
pub struct NtlmV2<'k> {
    keys: &'k ResponseKeys,
}
impl<'k> NtlmV2<'k> {
    pub fn new(keys: &'k ResponseKeys) -> Self {
        Self {
            keys,
        }
    }
}
impl KeyDerivation for NtlmV2<'_> {
    fn variant(&self) -> Variant {
        Variant::V2
    }

    fn compute_responses(&self, input: &ResponseInput<'_>) -> Result<Responses> {
        if input.anonymous {
            tracing::trace!("anonymous NTLMv2 responses");
            return Ok(anonymous_responses([0u8; HASH_SIZE]));
        }

        let target_info = input.target_info
            .ok_or_else(|| Error::malformed("target info", 4, 0))?;
        let lm_key = self.keys.require_lm()?;
        let server_timestamp = find_timestamp(target_info)?;
        let timestamp = input.timestamp
            .or(server_timestamp)
            .unwrap_or_else(ntlm_time_now);

        let blob = client_blob(timestamp, input.client_challenge, target_info);
        let nt_proof = crypto::hmac_md5(self.keys.response_key_nt(), &[input.server_challenge, &blob]);
        let nt_response = crypto::concat(&[&nt_proof, &blob]);

        // a client that got a timestamp from the server leaves the LMv2 response empty
        let lm_response = if server_timestamp.is_some() {
            tracing::trace!("server sent a timestamp; zeroing LMv2 response");
            crypto::zero_fill(24)
        } else {
            let lm_proof = crypto::hmac_md5(lm_key, &[input.server_challenge, input.client_challenge]);
            crypto::concat(&[&lm_proof, input.client_challenge])
        };

        let session_base_key = crypto::hmac_md5(self.keys.response_key_nt(), &[&nt_proof]);
        Ok(Responses {
            nt_response,
            lm_response,
            session_base_key,
        })
    }

    fn compute_key_exchange_key(&self, input: &KeyExchangeInput<'_>) -> Result<[u8; HASH_SIZE]> {
        Ok(*input.session_base_key)
    }

    fn recover_client_input<'r>(
        &self,
        anonymous: bool,
        _lm_response: &'r [u8],
        nt_response: &'r [u8],
    ) -> Result<ClientInput<'r>> {
        if anonymous {
            return Ok(ClientInput {
                client_challenge: None,
                timestamp: None,
                target_info: None,
            });
        }

        let minimum = TARGET_INFO_OFFSET + BLOB_TRAILER_LEN;
        if nt_response.len() < minimum {
            return Err(Error::malformed("NTLMv2 response", minimum, nt_response.len()));
        }

        let timestamp: [u8; 8] = crypto::exact(
            "NTLMv2 timestamp",
            crypto::slice("NTLMv2 response", nt_response, TIMESTAMP_OFFSET, 8)?,
        )?;
        let client_challenge: [u8; CHALLENGE_SIZE] = crypto::exact(
            "client challenge",
            crypto::slice("NTLMv2 response", nt_response, CLIENT_CHALLENGE_OFFSET, CHALLENGE_SIZE)?,
        )?;
        let target_info_len = nt_response.len() - minimum;
        let target_info = crypto::slice("NTLMv2 response", nt_response, TARGET_INFO_OFFSET, target_info_len)?;

        Ok(ClientInput {
            client_challenge: Some(client_challenge),
            timestamp: Some(u64::from_le_bytes(timestamp)),
            target_info: Some(target_info),
        })
    }
}
