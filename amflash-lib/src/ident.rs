use crate::command::{FlashCommand, Opcode};
use crate::error::IdentificationError;
use crate::sector_map::Variant;
use crate::Result;

/// Manufacturer ID reported by AMD parts.
pub const AMD_MANUFACTURER_ID: u8 = 0x01;

/// Identity of the attached chip, validated against the supported variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub manufacturer_id: u8,
    pub device_id: u8,
    variant: Variant,
}

impl DeviceIdentity {
    /// Check an identify payload and build the identity from it.
    pub fn from_payload(payload: &[u8]) -> std::result::Result<Self, IdentificationError> {
        let [manufacturer_id, device_id, ..] = *payload else {
            return Err(IdentificationError::MissingResponse(payload.len()));
        };

        if manufacturer_id != AMD_MANUFACTURER_ID {
            return Err(IdentificationError::UnexpectedManufacturer(manufacturer_id));
        }
        let variant = Variant::from_device_id(device_id)
            .ok_or(IdentificationError::UnexpectedDevice(device_id))?;

        Ok(Self {
            manufacturer_id,
            device_id,
            variant,
        })
    }

    /// Variant selected by the device ID; picks the sector table.
    pub fn variant(&self) -> Variant {
        self.variant
    }
}

/// Ask the interface for the chip's manufacturer and device ID.
pub fn identify<C: FlashCommand + ?Sized>(channel: &mut C) -> Result<DeviceIdentity> {
    let payload = channel.execute(Opcode::Identify, &[])?;
    tracing::debug!("identify payload: {:02X?}", payload);

    let identity = DeviceIdentity::from_payload(&payload)?;
    tracing::info!(
        "manufacturer ID 0x{:02X}, device ID 0x{:02X} ({})",
        identity.manufacturer_id,
        identity.device_id,
        identity.variant()
    );
    Ok(identity)
}
