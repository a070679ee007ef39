use crate::command::{Opcode, chunk_args};
use crate::progress::{ProgressOperation, ProgressStatus};
use crate::sector_map::{AddressRange, CHUNK_SIZE};
use crate::{Error, FlashTool, Result};

/// Chunked flash programming.
///
/// Cells are only programmed, never erased here: the target range must
/// already be blank unless the caller knowingly overlays data. Nothing is
/// read back afterwards.
pub struct FlashWriter;

impl FlashWriter {
    pub fn write_range<T>(tool: &mut T, range: AddressRange, source: &[u8]) -> Result<()>
    where
        T: FlashTool + ?Sized,
    {
        if source.len() != range.byte_len() {
            return Err(Error::SizeMismatch {
                expected: range.byte_len(),
                actual: source.len(),
            });
        }

        let progress = tool.progress();
        let progress_bar = progress.create_bar(
            range.size() as u64,
            ProgressOperation::WriteFlash {
                address: range.start(),
                size: range.size(),
            },
        );

        tracing::debug!(
            "writing 0x{:05X} bytes to 0x{:05X}",
            range.size(),
            range.start()
        );

        let mut args = Vec::with_capacity(5 + CHUNK_SIZE as usize);
        for chunk in range.chunks() {
            args.clear();
            args.extend_from_slice(&chunk_args(chunk.address, chunk.len));
            args.extend_from_slice(&source[chunk.span()]);

            tool.execute(Opcode::Write, &args)?;

            tracing::trace!(
                "wrote 0x{:05X}/0x{:05X}",
                chunk.offset + chunk.len as usize,
                range.size()
            );
            progress_bar.inc(chunk.len as u64);
            tool.pace();
        }

        progress_bar.finish(ProgressStatus::Success);
        Ok(())
    }
}
