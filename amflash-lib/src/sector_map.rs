//! Sector address tables of the two supported chip variants, and the
//! address-range/chunk arithmetic every transfer is built on.

use crate::{Error, Result};
use strum::{Display, EnumIter};

/// 512 KiB, identical for both variants.
pub const CHIP_SIZE: u32 = 0x80000;

/// Largest transfer the interface firmware buffers per command.
pub const CHUNK_SIZE: u32 = 32;

pub const SECTOR_COUNT: usize = 11;

const TOP_BOOT_SECTORS: [u32; SECTOR_COUNT] = [
    0x00000, 0x10000, 0x20000, 0x30000, 0x40000, 0x50000, 0x60000, 0x70000, 0x78000, 0x7A000,
    0x7C000,
];

const BOTTOM_BOOT_SECTORS: [u32; SECTOR_COUNT] = [
    0x00000, 0x04000, 0x06000, 0x08000, 0x10000, 0x20000, 0x30000, 0x40000, 0x50000, 0x60000,
    0x70000,
];

/// Chip sub-model, selected by the device ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum Variant {
    /// AM29F400BT, device ID 0x23. Boot sectors at the top of the array.
    #[strum(serialize = "AM29F400BT")]
    #[cfg_attr(feature = "cli", clap(name = "t"))]
    TopBoot,
    /// AM29F400BB, device ID 0xAB. Boot sectors at the bottom of the array.
    #[strum(serialize = "AM29F400BB")]
    #[cfg_attr(feature = "cli", clap(name = "b"))]
    BottomBoot,
}

impl Variant {
    pub const fn device_id(self) -> u8 {
        match self {
            Variant::TopBoot => 0x23,
            Variant::BottomBoot => 0xAB,
        }
    }

    pub fn from_device_id(device_id: u8) -> Option<Self> {
        match device_id {
            0x23 => Some(Variant::TopBoot),
            0xAB => Some(Variant::BottomBoot),
            _ => None,
        }
    }
}

/// A validated byte range of the chip: non-empty and inside `CHIP_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressRange {
    start: u32,
    size: u32,
}

impl AddressRange {
    pub fn new(start: u32, size: u32) -> Result<Self> {
        let in_bounds = start
            .checked_add(size)
            .is_some_and(|end| end <= CHIP_SIZE);
        if size == 0 || !in_bounds {
            return Err(Error::InvalidRange { start, size });
        }
        Ok(Self { start, size })
    }

    pub const fn full_chip() -> Self {
        Self {
            start: 0,
            size: CHIP_SIZE,
        }
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Exclusive end address.
    pub fn end(&self) -> u32 {
        self.start + self.size
    }

    pub fn byte_len(&self) -> usize {
        self.size as usize
    }

    pub fn is_full_chip(&self) -> bool {
        *self == Self::full_chip()
    }

    /// Split into `CHUNK_SIZE` pieces in ascending order; the last one may be
    /// shorter.
    pub fn chunks(&self) -> Chunks {
        Chunks {
            start: self.start,
            next: self.start,
            end: self.end(),
        }
    }
}

/// One command's worth of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub address: u32,
    pub len: u8,
    /// Offset of `address` from the start of the enclosing range.
    pub offset: usize,
}

impl Chunk {
    pub fn span(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len as usize
    }
}

#[derive(Debug, Clone)]
pub struct Chunks {
    start: u32,
    next: u32,
    end: u32,
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.next >= self.end {
            return None;
        }
        let len = CHUNK_SIZE.min(self.end - self.next);
        let chunk = Chunk {
            address: self.next,
            len: len as u8,
            offset: (self.next - self.start) as usize,
        };
        self.next += len;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.end.saturating_sub(self.next)).div_ceil(CHUNK_SIZE) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Chunks {}

/// Sector base addresses of `variant`, ascending.
pub fn layout(variant: Variant) -> &'static [u32; SECTOR_COUNT] {
    match variant {
        Variant::TopBoot => &TOP_BOOT_SECTORS,
        Variant::BottomBoot => &BOTTOM_BOOT_SECTORS,
    }
}

/// Byte range of sector `index` (SA0..SA10).
pub fn range(variant: Variant, index: usize) -> Result<AddressRange> {
    let bases = layout(variant);
    let start = *bases
        .get(index)
        .ok_or(Error::SectorIndexOutOfRange(index))?;
    let end = bases.get(index + 1).copied().unwrap_or(CHIP_SIZE);
    Ok(AddressRange {
        start,
        size: end - start,
    })
}

pub fn all_sectors(variant: Variant) -> impl Iterator<Item = AddressRange> {
    let bases = layout(variant);
    bases.iter().enumerate().map(|(index, &start)| {
        let end = bases.get(index + 1).copied().unwrap_or(CHIP_SIZE);
        AddressRange {
            start,
            size: end - start,
        }
    })
}

/// Index of the sector holding `address`, `None` past the end of the chip.
pub fn sector_of(variant: Variant, address: u32) -> Option<usize> {
    if address >= CHIP_SIZE {
        return None;
    }
    layout(variant)
        .iter()
        .rposition(|&base| base <= address)
}
