//! Host-side driver for AM29F400B parallel NOR flash chips sitting behind
//! a serial interface firmware.
//!
//! A [`FlashSession`] owns the serial link for its whole lifetime. Opening it
//! waits for the interface to announce itself, resets it and identifies the
//! chip; after that the read, write, erase and protection operations can be
//! issued in any order.

pub mod command;
pub mod erase_flash;
pub mod error;
pub mod ident;
pub mod progress;
pub mod protection;
pub mod read_flash;
pub mod sector_map;
pub mod transport;
pub mod utils;
pub mod write_flash;

pub use crate::command::{CommandChannel, FlashCommand, Opcode};
pub use crate::erase_flash::{EraseOps, EraseTarget, ErasureReport};
pub use crate::error::{Error, IdentificationError, Result};
pub use crate::ident::DeviceIdentity;
pub use crate::protection::{ProtectionOps, SectorProtection};
pub use crate::read_flash::FlashReader;
pub use crate::sector_map::{AddressRange, CHIP_SIZE, CHUNK_SIZE, SECTOR_COUNT, Variant};
pub use crate::transport::{SerialTransport, Transport};
pub use crate::write_flash::FlashWriter;

use crate::progress::{ProgressCallbackArc, ProgressHelper, ProgressOperation, ProgressStatus};
use std::io::Write;
use std::time::Duration;

/// Session-wide tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Delay after every chunk or sector command. The interface firmware has
    /// no flow control, so commands must not arrive faster than it can
    /// drive the flash.
    pub pacing: Duration,
}

impl SessionConfig {
    pub const DEFAULT_PACING: Duration = Duration::from_millis(50);

    pub fn with_pacing(pacing: Duration) -> Self {
        Self { pacing }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pacing: Self::DEFAULT_PACING,
        }
    }
}

/// What the engines need from whoever drives them.
pub trait FlashTool: FlashCommand {
    fn config(&self) -> &SessionConfig;

    fn progress(&self) -> ProgressHelper;

    /// Sleep for the configured pacing delay.
    fn pace(&self) {
        let pacing = self.config().pacing;
        if !pacing.is_zero() {
            std::thread::sleep(pacing);
        }
    }
}

/// One connection to the interface firmware and the chip behind it.
pub struct FlashSession<T: Transport> {
    channel: CommandChannel<T>,
    identity: DeviceIdentity,
    config: SessionConfig,
    progress: ProgressHelper,
}

impl<T: Transport> FlashSession<T> {
    /// Wait for the interface's ready marker, send the init command and
    /// identify the chip.
    pub fn connect(
        mut transport: T,
        config: SessionConfig,
        callback: ProgressCallbackArc,
    ) -> Result<Self> {
        let progress = ProgressHelper::new(callback, 0);

        let spinner = progress.create_spinner(ProgressOperation::WaitForInterface);
        crate::transport::wait_for_ready(&mut transport)?;
        spinner.finish(ProgressStatus::Success);

        let mut channel = CommandChannel::new(transport);

        let spinner = progress.create_spinner(ProgressOperation::Init);
        channel.execute(Opcode::Init, &[])?;
        spinner.finish(ProgressStatus::Success);

        let spinner = progress.create_spinner(ProgressOperation::Identify);
        let identity = match ident::identify(&mut channel) {
            Ok(identity) => identity,
            Err(e) => {
                spinner.finish(ProgressStatus::Failed(e.to_string()));
                return Err(e);
            }
        };
        spinner.set_message(format!(
            "Manufacturer ID 0x{:02X}, device ID 0x{:02X} ({})",
            identity.manufacturer_id,
            identity.device_id,
            identity.variant()
        ));
        spinner.finish(ProgressStatus::Success);

        Ok(Self {
            channel,
            identity,
            config,
            progress,
        })
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    pub fn variant(&self) -> Variant {
        self.identity.variant()
    }

    pub fn read<W: Write + ?Sized>(&mut self, range: AddressRange, sink: &mut W) -> Result<()> {
        FlashReader::read_range(self, range, sink)
    }

    /// Dump the whole chip, rejecting an image that is entirely zero.
    pub fn read_full<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<()> {
        FlashReader::read_full(self, sink)
    }

    pub fn read_sector<W: Write + ?Sized>(&mut self, index: usize, sink: &mut W) -> Result<()> {
        let range = sector_map::range(self.variant(), index)?;
        FlashReader::read_range(self, range, sink)
    }

    pub fn write(&mut self, range: AddressRange, source: &[u8]) -> Result<()> {
        FlashWriter::write_range(self, range, source)
    }

    pub fn erase(&mut self, target: EraseTarget) -> Result<ErasureReport> {
        let variant = self.variant();
        EraseOps::erase(self, variant, target)
    }

    pub fn is_protected(&mut self, address: u32) -> Result<bool> {
        ProtectionOps::is_protected(self, address)
    }

    pub fn protection_report(&mut self) -> Result<Vec<SectorProtection>> {
        let variant = self.variant();
        ProtectionOps::report(self, variant)
    }

    /// Close the session and hand the transport back.
    pub fn into_transport(self) -> T {
        self.channel.into_inner()
    }
}

impl<T: Transport> FlashCommand for FlashSession<T> {
    fn execute(&mut self, opcode: Opcode, args: &[u8]) -> Result<Vec<u8>> {
        self.channel.execute(opcode, args)
    }
}

impl<T: Transport> FlashTool for FlashSession<T> {
    fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn progress(&self) -> ProgressHelper {
        self.progress.clone()
    }
}
