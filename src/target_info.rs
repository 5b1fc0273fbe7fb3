//! Target information (AV_PAIR lists) as carried by the Challenge message and NTLMv2 responses.
//!
//! Only as much is implemented as key derivation needs: walking the list and building it for tests
//! and callers that assemble their own challenges.


use crate::crypto;
use crate::error::{Error, Result};
use crate::owf::utf16_le_bytes;


/// The type of an entry of target information.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum TargetInfoType {
    Terminator,
    NtServer,
    NtDomain,
    DnsServer,
    DnsDomain,
    DnsForest,
    Flags,
    Timestamp,
    SingleHost,
    TargetName,
    ChannelBindings,
    Unknown(u16),
}
/// The AV_PAIR identifiers (`MsvAv*`) assigned by MS-NLMP 2.2.2.1.
const KNOWN_TYPES: [(TargetInfoType, u16); 11] = [
    (TargetInfoType::Terminator, 0x0000),
    (TargetInfoType::NtServer, 0x0001),
    (TargetInfoType::NtDomain, 0x0002),
    (TargetInfoType::DnsServer, 0x0003),
    (TargetInfoType::DnsDomain, 0x0004),
    (TargetInfoType::DnsForest, 0x0005),
    (TargetInfoType::Flags, 0x0006),
    (TargetInfoType::Timestamp, 0x0007),
    (TargetInfoType::SingleHost, 0x0008),
    (TargetInfoType::TargetName, 0x0009),
    (TargetInfoType::ChannelBindings, 0x000A),
];

impl From<TargetInfoType> for u16 {
    fn from(t: TargetInfoType) -> Self {
        if let TargetInfoType::Unknown(id) = t {
            return id;
        }
        // every named variant is in the table
        KNOWN_TYPES.iter()
            .find(|(known, _)| *known == t)
            .map_or(0xFFFF, |(_, id)| *id)
    }
}
impl From<u16> for TargetInfoType {
    fn from(id: u16) -> Self {
        KNOWN_TYPES.iter()
            .find(|(_, known)| *known == id)
            .map_or(TargetInfoType::Unknown(id), |(t, _)| *t)
    }
}

/// An entry of target information.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TargetInfoEntry {
    pub entry_type: TargetInfoType,
    pub data: Vec<u8>,
}
impl TargetInfoEntry {
    /// Serializes the target info entry into bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let entry_type_u16: u16 = self.entry_type.into();
        let bytes_len: u16 = self.data.len().try_into()
            .map_err(|_| Error::malformed("target info entry", usize::from(u16::MAX), self.data.len()))?;

        let mut ret = Vec::with_capacity(4 + self.data.len());
        ret.extend_from_slice(&entry_type_u16.to_le_bytes());
        ret.extend_from_slice(&bytes_len.to_le_bytes());
        ret.extend_from_slice(&self.data);
        Ok(ret)
    }

    /// Attempts to deserialize a target info entry from the given byte slice. If successful,
    /// returns the deserialized entry as well as the bytes following it.
    pub fn try_from_bytes(bytes: &[u8]) -> Result<(Self, &[u8])> {
        let header = crypto::slice("target info entry header", bytes, 0, 4)?;
        let entry_type: TargetInfoType = u16::from_le_bytes([header[0], header[1]]).into();
        let length = usize::from(u16::from_le_bytes([header[2], header[3]]));

        let data = Vec::from(crypto::slice("target info entry", bytes, 4, length)?);
        let entry = Self {
            entry_type,
            data,
        };
        let rest = &bytes[4+length..];
        Ok((entry, rest))
    }

    /// Creates a target info entry from an entry type and a string.
    pub fn from_string(entry_type: TargetInfoType, string: &str) -> Self {
        // always Unicode, regardless of the negotiated encoding
        Self {
            entry_type,
            data: utf16_le_bytes(string),
        }
    }

    /// Creates a timestamp entry from a Windows file time.
    pub fn timestamp(file_time: u64) -> Self {
        Self {
            entry_type: TargetInfoType::Timestamp,
            data: Vec::from(file_time.to_le_bytes()),
        }
    }

    /// The list terminator (`MsvAvEOL`).
    pub fn terminator() -> Self {
        Self {
            entry_type: TargetInfoType::Terminator,
            data: Vec::new(),
        }
    }
}

/// Parses a target information blob up to and including its terminator.
///
/// A blob that ends without a terminator is accepted as long as every entry is complete.
pub fn parse_target_info(mut bytes: &[u8]) -> Result<Vec<TargetInfoEntry>> {
    let mut entries = Vec::new();
    while bytes.len() > 0 {
        let (entry, next) = TargetInfoEntry::try_from_bytes(bytes)?;
        let done = entry.entry_type == TargetInfoType::Terminator;
        entries.push(entry);
        if done {
            break;
        }
        bytes = next;
    }
    Ok(entries)
}

/// Serializes a list of target information entries, appending a terminator if it is missing.
pub fn target_info_to_bytes(entries: &[TargetInfoEntry]) -> Result<Vec<u8>> {
    let mut ret = Vec::new();
    for entry in entries {
        ret.extend_from_slice(&entry.to_bytes()?);
    }
    let terminated = entries.last()
        .map(|e| e.entry_type == TargetInfoType::Terminator)
        .unwrap_or(false);
    if !terminated {
        ret.extend_from_slice(&TargetInfoEntry::terminator().to_bytes()?);
    }
    Ok(ret)
}

/// Returns the server's timestamp (`MsvAvTimestamp`) from a target information blob, if present.
pub fn find_timestamp(target_info: &[u8]) -> Result<Option<u64>> {
    for entry in parse_target_info(target_info)? {
        if entry.entry_type == TargetInfoType::Timestamp {
            let ts: [u8; 8] = crypto::exact("target info timestamp", &entry.data)?;
            return Ok(Some(u64::from_le_bytes(ts)));
        }
    }
    Ok(None)
}


#[cfg(test)]
mod tests {
    use super::*;

    // MS-NLMP 4.2.4: MsvAvNbDomainName "Domain", MsvAvNbComputerName "Server", MsvAvEOL
    const TARGET_INFO: [u8; 36] = [
        0x02, 0x00, 0x0c, 0x00, 0x44, 0x00, 0x6f, 0x00, 0x6d, 0x00, 0x61, 0x00, 0x69, 0x00, 0x6e, 0x00,
        0x01, 0x00, 0x0c, 0x00, 0x53, 0x00, 0x65, 0x00, 0x72, 0x00, 0x76, 0x00, 0x65, 0x00, 0x72, 0x00,
        0x00, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn type_identifiers() {
        for (t, id) in KNOWN_TYPES {
            assert_eq!(u16::from(t), id);
            assert_eq!(TargetInfoType::from(id), t);
        }
        assert_eq!(u16::from(TargetInfoType::Timestamp), 0x0007);
        assert_eq!(TargetInfoType::from(0x000A), TargetInfoType::ChannelBindings);
        assert_eq!(TargetInfoType::from(0x000B), TargetInfoType::Unknown(0x000B));
        assert_eq!(u16::from(TargetInfoType::Unknown(0x1234)), 0x1234);
    }

    #[test]
    fn builds_ms_nlmp_target_info() {
        let entries = [
            TargetInfoEntry::from_string(TargetInfoType::NtDomain, "Domain"),
            TargetInfoEntry::from_string(TargetInfoType::NtServer, "Server"),
        ];
        assert_eq!(target_info_to_bytes(&entries).unwrap(), TARGET_INFO.to_vec());
    }

    #[test]
    fn parses_ms_nlmp_target_info() {
        let entries = parse_target_info(&TARGET_INFO).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], TargetInfoEntry::from_string(TargetInfoType::NtDomain, "Domain"));
        assert_eq!(entries[1].entry_type, TargetInfoType::NtServer);
        assert_eq!(entries[2], TargetInfoEntry::terminator());
        assert_eq!(find_timestamp(&TARGET_INFO).unwrap(), None);
    }

    #[test]
    fn finds_timestamp() {
        let entries = [
            TargetInfoEntry::from_string(TargetInfoType::NtDomain, "Domain"),
            TargetInfoEntry::timestamp(0x01d0_2b4c_9d4b_e400),
        ];
        let bytes = target_info_to_bytes(&entries).unwrap();
        assert_eq!(find_timestamp(&bytes).unwrap(), Some(0x01d0_2b4c_9d4b_e400));
    }

    #[test]
    fn stops_at_terminator() {
        let mut bytes = TARGET_INFO.to_vec();
        bytes.extend_from_slice(&[0xff, 0xff, 0xff, 0xff]);
        assert_eq!(parse_target_info(&bytes).unwrap().len(), 3);
    }

    #[test]
    fn rejects_truncated_entries() {
        let err = parse_target_info(&TARGET_INFO[..10]).unwrap_err();
        assert_eq!(err, Error::MalformedInput { what: "target info entry", expected: 16, obtained: 10 });

        assert!(parse_target_info(&[0x07, 0x00]).is_err());
    }

    #[test]
    fn rejects_odd_sized_timestamps() {
        let entries = [TargetInfoEntry { entry_type: TargetInfoType::Timestamp, data: vec![1, 2, 3] }];
        let bytes = target_info_to_bytes(&entries).unwrap();
        assert!(find_timestamp(&bytes).unwrap_err().is_malformed_input());
    }
}
