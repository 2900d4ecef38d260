//! Activation identifiers

use std::fmt;
use std::str::FromStr;

use ah_core::error::RegistryError;
use bytemuck::Zeroable;

/// 16-byte activation identifier, laid out as the component runtime expects
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Zeroable)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

const _: () = assert!(std::mem::size_of::<Guid>() == 16);

impl Guid {
    /// Build an identifier from its four fields
    pub const fn from_fields(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }

    /// Parse the braced hyphenated form, e.g. `{AABBCCDD-EEFF-0011-2233-445566778899}`
    pub fn parse(text: &str) -> Result<Self, RegistryError> {
        let malformed = || RegistryError::MalformedId(text.to_string());

        let inner = text
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .ok_or_else(malformed)?;

        let groups: Vec<&str> = inner.split('-').collect();
        let lengths = [8, 4, 4, 4, 12];
        if groups.len() != lengths.len()
            || groups
                .iter()
                .zip(lengths)
                .any(|(group, len)| group.len() != len || !group.bytes().all(|b| b.is_ascii_hexdigit()))
        {
            return Err(malformed());
        }

        // Digits were validated above, so radix parsing cannot fail
        let hex32 = |s: &str| u32::from_str_radix(s, 16).map_err(|_| malformed());
        let hex16 = |s: &str| u16::from_str_radix(s, 16).map_err(|_| malformed());
        let hex8 = |s: &str| u8::from_str_radix(s, 16).map_err(|_| malformed());

        let tail = format!("{}{}", groups[3], groups[4]);
        let mut data4 = [0u8; 8];
        for (i, byte) in data4.iter_mut().enumerate() {
            *byte = hex8(&tail[i * 2..i * 2 + 2])?;
        }

        Ok(Self {
            data1: hex32(groups[0])?,
            data2: hex16(groups[1])?,
            data3: hex16(groups[2])?,
            data4,
        })
    }
}

impl FromStr for Guid {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}}}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self)
    }
}
