#![allow(dead_code)]

use amflash_lib::command::decode_address;
use amflash_lib::progress::no_op_progress_callback;
use amflash_lib::sector_map::{self, CHIP_SIZE, Variant};
use amflash_lib::transport::READY_MARKER;
use amflash_lib::{FlashSession, Opcode, Result, SessionConfig, Transport};
use std::collections::VecDeque;
use std::time::Duration;

/// In-memory stand-in for the interface firmware and the flash behind it.
///
/// Programming follows NOR rules (bits can only go from 1 to 0) and
/// protected sectors ignore erase and write commands.
pub struct FakeDevice {
    pub memory: Vec<u8>,
    pub manufacturer_id: u8,
    pub device_id: u8,
    pub protected: Vec<usize>,
    /// Answer every read with this byte instead of the memory contents.
    pub read_fill: Option<u8>,
    /// Answer requests with opcode `.0` using the response opcode `.1`.
    pub mismatch: Option<(Opcode, u8)>,
    /// Drop the last payload byte of read answers.
    pub truncate_reads: bool,
    /// Every request received, as `(opcode, args)`.
    pub requests: Vec<(u8, Vec<u8>)>,
    incoming: Vec<u8>,
    outgoing: VecDeque<u8>,
}

impl FakeDevice {
    pub fn new(variant: Variant) -> Self {
        Self {
            memory: vec![0xFF; CHIP_SIZE as usize],
            manufacturer_id: 0x01,
            device_id: variant.device_id(),
            protected: Vec::new(),
            read_fill: None,
            mismatch: None,
            truncate_reads: false,
            requests: Vec::new(),
            incoming: Vec::new(),
            outgoing: VecDeque::from([READY_MARKER]),
        }
    }

    /// Bytes the interface prints before its ready marker.
    pub fn with_boot_noise(mut self, noise: &[u8]) -> Self {
        let mut outgoing: VecDeque<u8> = noise.iter().copied().collect();
        outgoing.extend(self.outgoing.drain(..));
        self.outgoing = outgoing;
        self
    }

    pub fn variant(&self) -> Variant {
        Variant::from_device_id(self.device_id).unwrap_or(Variant::TopBoot)
    }

    pub fn requests_with(&self, opcode: Opcode) -> Vec<&Vec<u8>> {
        self.requests
            .iter()
            .filter(|(op, _)| *op == opcode.code())
            .map(|(_, args)| args)
            .collect()
    }

    /// Requests issued after the init and identify handshake.
    pub fn operation_requests(&self) -> &[(u8, Vec<u8>)] {
        let handshake = self
            .requests
            .iter()
            .take_while(|(op, _)| *op == Opcode::Init.code() || *op == Opcode::Identify.code())
            .count();
        &self.requests[handshake..]
    }

    fn sector_index(&self, address: u32) -> Option<usize> {
        sector_map::sector_of(self.variant(), address)
    }

    fn is_protected(&self, address: u32) -> bool {
        self.sector_index(address)
            .is_some_and(|index| self.protected.contains(&index))
    }

    fn respond(&mut self, opcode: u8, payload: &[u8]) {
        let response_opcode = match self.mismatch {
            Some((requested, answer)) if requested.code() == opcode => answer,
            _ => opcode,
        };
        self.outgoing.push_back(response_opcode);
        self.outgoing.push_back(payload.len() as u8);
        self.outgoing.extend(payload.iter().copied());
    }

    fn handle(&mut self, opcode: u8, args: Vec<u8>) {
        self.requests.push((opcode, args.clone()));

        let address = || decode_address([args[0], args[1], args[2], args[3]]);
        match Opcode::from_repr(opcode) {
            Some(Opcode::Init) => self.respond(opcode, &[]),
            Some(Opcode::Identify) => {
                let payload = [self.manufacturer_id, self.device_id];
                self.respond(opcode, &payload)
            }
            Some(Opcode::Read) => {
                let start = address() as usize;
                let len = args[4] as usize;
                let mut data = match self.read_fill {
                    Some(fill) => vec![fill; len],
                    None => self.memory[start..start + len].to_vec(),
                };
                if self.truncate_reads {
                    data.pop();
                }
                self.respond(opcode, &data)
            }
            Some(Opcode::EraseSector) => {
                let address = address();
                if !self.is_protected(address) {
                    if let Some(index) = self.sector_index(address) {
                        let range = sector_map::range(self.variant(), index).unwrap();
                        self.memory[range.start() as usize..range.end() as usize].fill(0xFF);
                    }
                }
                self.respond(opcode, &[])
            }
            Some(Opcode::Write) => {
                let start = address();
                let len = args[4] as usize;
                assert_eq!(args.len(), 5 + len, "write carries exactly len data bytes");
                if !self.is_protected(start) {
                    for (i, byte) in args[5..].iter().enumerate() {
                        self.memory[start as usize + i] &= byte;
                    }
                }
                self.respond(opcode, &[])
            }
            Some(Opcode::QueryProtection) => {
                let status = u8::from(self.is_protected(address()));
                self.respond(opcode, &[status])
            }
            None => panic!("unknown opcode 0x{:02X}", opcode),
        }
    }
}

impl Transport for FakeDevice {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.incoming.extend_from_slice(data);
        while self.incoming.len() >= 2 {
            let argc = self.incoming[1] as usize;
            if self.incoming.len() < 2 + argc {
                break;
            }
            let frame: Vec<u8> = self.incoming.drain(..2 + argc).collect();
            self.handle(frame[0], frame[2..].to_vec());
        }
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.outgoing.len() < buf.len() {
            // a real device would leave the host waiting forever
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "fake device has nothing more to say",
            )
            .into());
        }
        for slot in buf.iter_mut() {
            *slot = self.outgoing.pop_front().unwrap_or_default();
        }
        Ok(())
    }
}

pub fn unpaced() -> SessionConfig {
    SessionConfig::with_pacing(Duration::ZERO)
}

pub fn connect(device: FakeDevice) -> FlashSession<FakeDevice> {
    FlashSession::connect(device, unpaced(), no_op_progress_callback())
        .expect("session should connect to fake device")
}
