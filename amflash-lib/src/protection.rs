use crate::command::{FlashCommand, Opcode, encode_address};
use crate::progress::{ProgressOperation, ProgressStatus};
use crate::sector_map::{self, AddressRange, SECTOR_COUNT, Variant};
use crate::{Error, FlashTool, Result};

/// Status byte the interface returns for a protected sector.
pub const PROTECTED_MARKER: u8 = 0x01;

/// Protection state of one sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorProtection {
    pub index: usize,
    pub range: AddressRange,
    pub protected: bool,
}

pub struct ProtectionOps;

impl ProtectionOps {
    /// Query the protection flag of the sector starting at `address`.
    pub fn is_protected<C>(channel: &mut C, address: u32) -> Result<bool>
    where
        C: FlashCommand + ?Sized,
    {
        let payload = channel.execute(Opcode::QueryProtection, &encode_address(address))?;
        let Some(&status) = payload.first() else {
            return Err(Error::ShortPayload {
                opcode: Opcode::QueryProtection,
                expected: 1,
                actual: 0,
            });
        };

        tracing::trace!("sector 0x{:05X} protection status 0x{:02X}", address, status);
        Ok(status == PROTECTED_MARKER)
    }

    /// Protection state of every sector of `variant`, SA0 first.
    pub fn report<T>(tool: &mut T, variant: Variant) -> Result<Vec<SectorProtection>>
    where
        T: FlashTool + ?Sized,
    {
        let progress = tool.progress();
        let progress_bar = progress.create_bar(
            SECTOR_COUNT as u64,
            ProgressOperation::QueryProtection {
                count: SECTOR_COUNT,
            },
        );

        let mut states = Vec::with_capacity(SECTOR_COUNT);
        for (index, range) in sector_map::all_sectors(variant).enumerate() {
            let protected = Self::is_protected(tool, range.start())?;
            states.push(SectorProtection {
                index,
                range,
                protected,
            });
            progress_bar.inc(1);
        }

        progress_bar.finish(ProgressStatus::Success);
        Ok(states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Answers every command with the same payload.
    struct Canned(Vec<u8>);

    impl FlashCommand for Canned {
        fn execute(&mut self, opcode: Opcode, args: &[u8]) -> Result<Vec<u8>> {
            assert_eq!(opcode, Opcode::QueryProtection);
            assert_eq!(args, [0x00, 0x07, 0xC0, 0x00]);
            Ok(self.0.clone())
        }
    }

    #[test]
    fn only_the_first_byte_decides() {
        assert!(ProtectionOps::is_protected(&mut Canned(vec![0x01, 0x00]), 0x7C000).unwrap());
        assert!(ProtectionOps::is_protected(&mut Canned(vec![0x01]), 0x7C000).unwrap());
        assert!(!ProtectionOps::is_protected(&mut Canned(vec![0x02]), 0x7C000).unwrap());
        assert!(!ProtectionOps::is_protected(&mut Canned(vec![0x00, 0x01]), 0x7C000).unwrap());
    }

    #[test]
    fn empty_status_is_a_short_payload() {
        let err = ProtectionOps::is_protected(&mut Canned(Vec::new()), 0x7C000).unwrap_err();
        assert!(matches!(
            err,
            Error::ShortPayload {
                opcode: Opcode::QueryProtection,
                expected: 1,
                actual: 0
            }
        ));
    }
}
