use crate::command::{Opcode, encode_address};
use crate::progress::{ProgressOperation, ProgressStatus};
use crate::protection::ProtectionOps;
use crate::sector_map::{self, AddressRange, Variant};
use crate::{FlashTool, Result};

/// Sectors to erase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseTarget {
    AllSectors,
    /// Sector index, SA0..SA10.
    Sector(usize),
}

/// Outcome of an erase run.
///
/// Protected sectors do not make the erase fail: the command is still sent
/// and the chip silently keeps their contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErasureReport {
    pub any_protected: bool,
    /// Indices of the sectors that reported protection.
    pub protected_sectors: Vec<usize>,
    /// Number of erase commands issued.
    pub erased: usize,
}

/// Sector erase.
pub struct EraseOps;

impl EraseOps {
    pub fn erase<T>(tool: &mut T, variant: Variant, target: EraseTarget) -> Result<ErasureReport>
    where
        T: FlashTool + ?Sized,
    {
        let sectors = Self::resolve(variant, target)?;

        let progress = tool.progress();
        let progress_bar = progress.create_bar(
            sectors.len() as u64,
            ProgressOperation::EraseSectors {
                count: sectors.len(),
            },
        );

        let mut report = ErasureReport::default();
        for (index, sector) in sectors {
            if ProtectionOps::is_protected(tool, sector.start())? {
                tracing::warn!("sector SA{} (0x{:05X}) is protected", index, sector.start());
                report.protected_sectors.push(index);
            }

            // Sent even for protected sectors; the chip ignores it there.
            tool.execute(Opcode::EraseSector, &encode_address(sector.start()))?;
            report.erased += 1;

            tracing::debug!("erased sector SA{} at 0x{:05X}", index, sector.start());
            progress_bar.inc(1);
            tool.pace();
        }
        report.any_protected = !report.protected_sectors.is_empty();

        progress_bar.finish(ProgressStatus::Success);
        Ok(report)
    }

    fn resolve(variant: Variant, target: EraseTarget) -> Result<Vec<(usize, AddressRange)>> {
        match target {
            EraseTarget::AllSectors => Ok(sector_map::all_sectors(variant).enumerate().collect()),
            EraseTarget::Sector(index) => Ok(vec![(index, sector_map::range(variant, index)?)]),
        }
    }
}
