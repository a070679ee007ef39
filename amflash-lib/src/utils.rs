use crate::sector_map::{AddressRange, CHIP_SIZE, SECTOR_COUNT};
use crate::{Error, Result};
use crc::{CRC_32_ISO_HDLC, Crc};
use std::num::ParseIntError;

pub struct Utils;
impl Utils {
    /// Parse a number given on the command line or in a config file.
    ///
    /// Accepts decimal, `0x` hex, `0b` binary and `0o` octal. Non-hex values
    /// may carry a `k`/`K` (KiB) or `m`/`M` (MiB) suffix.
    pub fn str_to_u32(s: &str) -> std::result::Result<u32, ParseIntError> {
        let s = s.trim();

        let is_hex = s.starts_with("0x") || s.starts_with("0X");
        let (num_str, multiplier) = match s.chars().last() {
            _ if is_hex => (s, 1),
            Some('k') | Some('K') => (&s[..s.len() - 1], 1024u32),
            Some('m') | Some('M') => (&s[..s.len() - 1], 1024 * 1024u32),
            _ => (s, 1),
        };

        let unsigned: u32 = if let Some(hex) = num_str
            .strip_prefix("0x")
            .or_else(|| num_str.strip_prefix("0X"))
        {
            u32::from_str_radix(hex, 16)?
        } else if let Some(bin) = num_str.strip_prefix("0b") {
            u32::from_str_radix(bin, 2)?
        } else if let Some(oct) = num_str.strip_prefix("0o") {
            u32::from_str_radix(oct, 8)?
        } else {
            num_str.parse()?
        };

        Ok(unsigned.saturating_mul(multiplier))
    }

    /// Parse and validate a `<start> <size>` pair.
    pub fn parse_range(start: &str, size: &str) -> Result<AddressRange> {
        let start_value = Self::str_to_u32(start)
            .map_err(|e| Error::invalid_input(format!("Invalid start '{}': {}", start, e)))?;
        let size_value = Self::str_to_u32(size)
            .map_err(|e| Error::invalid_input(format!("Invalid size '{}': {}", size, e)))?;

        if start_value >= CHIP_SIZE {
            return Err(Error::invalid_input(format!(
                "start must be in range 0x00000..=0x{:05X}",
                CHIP_SIZE - 1
            )));
        }
        AddressRange::new(start_value, size_value).map_err(|_| {
            Error::invalid_input(format!(
                "size must be in range 0x1..=0x{:05X} when starting at 0x{:05X}",
                CHIP_SIZE - start_value,
                start_value
            ))
        })
    }

    /// Parse a sector index (`3`, `SA3` or `sa3`).
    pub fn parse_sector(sector: &str) -> Result<usize> {
        let trimmed = sector.trim();
        let digits = trimmed
            .strip_prefix("SA")
            .or_else(|| trimmed.strip_prefix("sa"))
            .unwrap_or(trimmed);
        let index: usize = digits
            .parse()
            .map_err(|e| Error::invalid_input(format!("Invalid sector '{}': {}", sector, e)))?;
        if index >= SECTOR_COUNT {
            return Err(Error::SectorIndexOutOfRange(index));
        }
        Ok(index)
    }

    /// CRC-32 (the zlib/PNG one) of an image, for comparing dumps.
    pub fn crc32(data: &[u8]) -> u32 {
        const CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);
        CRC.checksum(data)
    }
}
