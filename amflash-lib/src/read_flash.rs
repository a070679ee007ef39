use crate::command::{Opcode, chunk_args};
use crate::progress::{ProgressOperation, ProgressStatus};
use crate::sector_map::AddressRange;
use crate::{Error, FlashTool, Result};
use std::io::Write;

/// Chunked flash reads.
pub struct FlashReader;

impl FlashReader {
    /// Read `range` into `sink`, one chunk per command.
    ///
    /// On failure, the chunks received so far have already been written to
    /// `sink`.
    pub fn read_range<T, W>(tool: &mut T, range: AddressRange, sink: &mut W) -> Result<()>
    where
        T: FlashTool + ?Sized,
        W: Write + ?Sized,
    {
        Self::transfer(tool, range, sink, false)
    }

    /// Read the whole chip into `sink`.
    ///
    /// An image made only of `0x00` bytes is reported as
    /// [`Error::SuspiciousEmptyRead`]: the interface answers with zeros when
    /// it never actually talked to the chip.
    pub fn read_full<T, W>(tool: &mut T, sink: &mut W) -> Result<()>
    where
        T: FlashTool + ?Sized,
        W: Write + ?Sized,
    {
        Self::transfer(tool, AddressRange::full_chip(), sink, true)
    }

    fn transfer<T, W>(
        tool: &mut T,
        range: AddressRange,
        sink: &mut W,
        reject_empty: bool,
    ) -> Result<()>
    where
        T: FlashTool + ?Sized,
        W: Write + ?Sized,
    {
        let progress = tool.progress();
        let progress_bar = progress.create_bar(
            range.size() as u64,
            ProgressOperation::ReadFlash {
                address: range.start(),
                size: range.size(),
            },
        );

        tracing::debug!(
            "reading 0x{:05X} bytes from 0x{:05X}",
            range.size(),
            range.start()
        );

        let mut all_zero = true;
        for chunk in range.chunks() {
            let data = tool.execute(Opcode::Read, &chunk_args(chunk.address, chunk.len))?;
            if data.len() != chunk.len as usize {
                return Err(Error::ShortPayload {
                    opcode: Opcode::Read,
                    expected: chunk.len as usize,
                    actual: data.len(),
                });
            }

            sink.write_all(&data)?;
            all_zero &= data.iter().all(|&b| b == 0x00);

            tracing::trace!(
                "read 0x{:05X}/0x{:05X}",
                chunk.offset + data.len(),
                range.size()
            );
            progress_bar.inc(data.len() as u64);
            tool.pace();
        }
        sink.flush()?;

        if reject_empty && all_zero {
            progress_bar.finish(ProgressStatus::Failed("only zero bytes received".into()));
            return Err(Error::SuspiciousEmptyRead);
        }

        progress_bar.finish(ProgressStatus::Success);
        Ok(())
    }
}
