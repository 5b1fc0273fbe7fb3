//! Primitive cryptographic transforms and byte buffer helpers.
//!
//! Everything in here is stateless; the actual algorithms are provided by the RustCrypto crates.


use cipher::{BlockEncrypt, KeyInit};
use cipher::generic_array::GenericArray;
use des::Des;
use digest::Digest;
use hmac::{Hmac, Mac};
use md4::Md4;
use md5::Md5;

use crate::error::{Error, Result};


/// The length of every MD4, MD5 and HMAC-MD5 digest.
pub const HASH_SIZE: usize = 16;

/// The length of a server or client challenge.
pub const CHALLENGE_SIZE: usize = 8;

/// The length of a DESL output.
pub const DESL_SIZE: usize = 24;


/// Calculates the MD4 digest of the given data.
pub fn md4(data: &[u8]) -> [u8; HASH_SIZE] {
    let mut md4_state = <Md4 as Digest>::new();
    md4_state.update(data);
    let mut ret = [0u8; HASH_SIZE];
    ret.copy_from_slice(md4_state.finalize().as_slice());
    ret
}

/// Calculates the MD5 digest of the given data.
pub fn md5(data: &[u8]) -> [u8; HASH_SIZE] {
    let mut md5_state = <Md5 as Digest>::new();
    md5_state.update(data);
    let mut ret = [0u8; HASH_SIZE];
    ret.copy_from_slice(md5_state.finalize().as_slice());
    ret
}

/// Calculates the HMAC-MD5 of the concatenation of `parts`, keyed with `key`.
///
/// Taking the message in parts saves the caller from concatenating into a temporary buffer.
pub fn hmac_md5(key: &[u8], parts: &[&[u8]]) -> [u8; HASH_SIZE] {
    let mut hmac_md5: Hmac<Md5> = <Hmac<Md5> as Mac>::new_from_slice(key)
        .expect("HMAC accepts keys of any length");
    for part in parts {
        hmac_md5.update(part);
    }
    let mut ret = [0u8; HASH_SIZE];
    ret.copy_from_slice(hmac_md5.finalize().into_bytes().as_slice());
    ret
}

/// Spreads a 7-byte key over the 8 bytes expected by DES.
///
/// Each output byte carries 7 key bits in its upper bits; the lowest bit is set for odd parity
/// (DES itself ignores it).
fn expand_des_key(key7: &[u8; 7]) -> [u8; 8] {
    let mut key8 = [
        key7[0] >> 1,
        ((key7[0] & 0x01) << 6) | (key7[1] >> 2),
        ((key7[1] & 0x03) << 5) | (key7[2] >> 3),
        ((key7[2] & 0x07) << 4) | (key7[3] >> 4),
        ((key7[3] & 0x0F) << 3) | (key7[4] >> 5),
        ((key7[4] & 0x1F) << 2) | (key7[5] >> 6),
        ((key7[5] & 0x3F) << 1) | (key7[6] >> 7),
        key7[6] & 0x7F,
    ];
    for b in &mut key8 {
        *b <<= 1;
        if b.count_ones() % 2 == 0 {
            *b |= 0x01;
        }
    }
    key8
}

/// Encrypts a single 8-byte block with DES, keyed by a 7-byte key.
pub fn des(key: &[u8; 7], block: &[u8; CHALLENGE_SIZE]) -> [u8; CHALLENGE_SIZE] {
    let key8 = expand_des_key(key);
    let des_state = Des::new(GenericArray::from_slice(&key8));
    let mut buf = GenericArray::clone_from_slice(block);
    des_state.encrypt_block(&mut buf);
    let mut ret = [0u8; CHALLENGE_SIZE];
    ret.copy_from_slice(buf.as_slice());
    ret
}

/// Performs the NTLMv1 DES encryption (DESL) to calculate the response value to the challenge.
///
/// The 16-byte key is split into three 7-byte DES keys: bytes 0..7, bytes 7..14, and the last two
/// bytes followed by five zero bytes. Each encrypts `data`; the three outputs are concatenated.
pub fn des_long(key: &[u8; HASH_SIZE], data: &[u8; CHALLENGE_SIZE]) -> [u8; DESL_SIZE] {
    let key0: [u8; 7] = [key[0], key[1], key[2], key[3], key[4], key[5], key[6]];
    let key1: [u8; 7] = [key[7], key[8], key[9], key[10], key[11], key[12], key[13]];
    let key2: [u8; 7] = [key[14], key[15], 0, 0, 0, 0, 0];

    let mut ret = [0u8; DESL_SIZE];
    let (slice0, ret2) = ret.split_at_mut(8);
    let (slice1, slice2) = ret2.split_at_mut(8);
    slice0.copy_from_slice(&des(&key0, data));
    slice1.copy_from_slice(&des(&key1, data));
    slice2.copy_from_slice(&des(&key2, data));

    ret
}


// buffer helpers


/// Concatenates the given byte slices into a new buffer.
pub fn concat(parts: &[&[u8]]) -> Vec<u8> {
    let total = parts.iter().map(|p| p.len()).sum();
    let mut ret = Vec::with_capacity(total);
    for part in parts {
        ret.extend_from_slice(part);
    }
    ret
}

/// Returns a buffer of `n` zero bytes (`Z(n)` in MS-NLMP notation).
pub fn zero_fill(n: usize) -> Vec<u8> {
    vec![0u8; n]
}

/// Returns the `len` bytes of `bytes` starting at `offset`, failing if the range does not fit.
pub fn slice<'a>(what: &'static str, bytes: &'a [u8], offset: usize, len: usize) -> Result<&'a [u8]> {
    let end = offset.checked_add(len)
        .ok_or_else(|| Error::malformed(what, usize::MAX, bytes.len()))?;
    bytes.get(offset..end)
        .ok_or_else(|| Error::malformed(what, end, bytes.len()))
}

/// Copies `bytes` into a fixed-size array, failing unless the length matches exactly.
pub fn exact<const N: usize>(what: &'static str, bytes: &[u8]) -> Result<[u8; N]> {
    bytes.try_into()
        .map_err(|_| Error::malformed(what, N, bytes.len()))
}

/// Compares two byte strings without stopping at the first difference. Only the lengths leak.
pub fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right.iter())
        .fold(0u8, |acc, (l, r)| acc | (l ^ r)) == 0
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md4_of_empty_input() {
        assert_eq!(
            md4(b""),
            [
                0x31, 0xd6, 0xcf, 0xe0, 0xd1, 0x6a, 0xe9, 0x31, 0xb7, 0x3c, 0x59, 0xd7, 0xe0, 0xc0, 0x89, 0xc0,
            ],
        );
    }

    #[test]
    fn md5_of_abc() {
        assert_eq!(
            md5(b"abc"),
            [
                0x90, 0x01, 0x50, 0x98, 0x3c, 0xd2, 0x4f, 0xb0, 0xd6, 0x96, 0x3f, 0x7d, 0x28, 0xe1, 0x7f, 0x72,
            ],
        );
    }

    #[test]
    fn hmac_md5_parts_equal_concatenation() {
        let key = [0x0bu8; 16];
        assert_eq!(
            hmac_md5(&key, &[&b"Hi "[..], &b"There"[..]]),
            hmac_md5(&key, &[&b"Hi There"[..]]),
        );
        // RFC 2104 test case 1
        assert_eq!(
            hmac_md5(&key, &[&b"Hi There"[..]]),
            [
                0x92, 0x94, 0x72, 0x7a, 0x36, 0x38, 0xbb, 0x1c, 0x13, 0xf4, 0x8e, 0xf8, 0x15, 0x8b, 0xfc, 0x9d,
            ],
        );
    }

    #[test]
    fn expanded_keys_have_odd_parity() {
        let key8 = expand_des_key(&[0x50, 0x41, 0x53, 0x53, 0x57, 0x4f, 0x52]);
        for b in key8 {
            assert_eq!(b.count_ones() % 2, 1);
        }
    }

    #[test]
    fn des_long_of_ntowf_password() {
        // MS-NLMP 4.2.2.2.1
        let key = [
            0xa4, 0xf4, 0x9c, 0x40, 0x65, 0x10, 0xbd, 0xca, 0xb6, 0x82, 0x4e, 0xe7, 0xc3, 0x0f, 0xd8, 0x52,
        ];
        let challenge = [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef];
        assert_eq!(
            des_long(&key, &challenge),
            [
                0x67, 0xc4, 0x30, 0x11, 0xf3, 0x02, 0x98, 0xa2, 0xad, 0x35, 0xec, 0xe6,
                0x4f, 0x16, 0x33, 0x1c, 0x44, 0xbd, 0xbe, 0xd9, 0x27, 0x84, 0x1f, 0x94,
            ],
        );
    }

    #[test]
    fn des_long_is_three_independent_des_blocks() {
        let key: [u8; 16] = core::array::from_fn(|i| (i as u8).wrapping_mul(37));
        let data = *b"KGS!@#$%";
        let out = des_long(&key, &data);

        let key2 = [key[14], key[15], 0, 0, 0, 0, 0];
        assert_eq!(&out[16..24], &des(&key2, &data));
        assert_eq!(&out[0..8], &des(&exact::<7>("k", &key[0..7]).unwrap(), &data));
    }

    #[test]
    fn buffer_helpers() {
        assert_eq!(concat(&[&b"ab"[..], &b""[..], &b"cd"[..]]), b"abcd".to_vec());
        assert_eq!(zero_fill(3), vec![0, 0, 0]);

        assert_eq!(slice("buf", b"abcdef", 2, 3).unwrap(), b"cde");
        assert_eq!(slice("buf", b"abcdef", 6, 0).unwrap(), b"");
        assert_eq!(
            slice("buf", b"abcdef", 4, 3),
            Err(Error::MalformedInput { what: "buf", expected: 7, obtained: 6 }),
        );
        assert!(slice("buf", b"abcdef", usize::MAX, 2).is_err());

        assert_eq!(exact::<2>("pair", b"xy").unwrap(), *b"xy");
        assert_eq!(
            exact::<8>("server challenge", &[0; 7]),
            Err(Error::MalformedInput { what: "server challenge", expected: 8, obtained: 7 }),
        );
    }

    #[test]
    fn constant_time_comparison() {
        assert!(constant_time_eq(b"", b""));
        assert!(constant_time_eq(b"response", b"response"));
        assert!(!constant_time_eq(b"response", b"responsE"));
        assert!(!constant_time_eq(b"Response", b"response"));
        assert!(!constant_time_eq(b"response", b"respons"));
        assert!(!constant_time_eq(&[0x00], b""));
    }
}
