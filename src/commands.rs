//! Typed IPMI commands issued through [`Ipmb::execute`](crate::Ipmb::execute).

use std::sync::atomic::{AtomicU16, Ordering};

use crate::error::{Error, Result};
use crate::ipmb::Ipmb;
use crate::types::{Channel, DeviceId, Message, cmd, netfn};

/// A typed IPMI command (single request/response) carried over IPMB.
pub trait Command {
    /// Parsed output type.
    type Output;

    /// Network Function (NetFn) for the request.
    const NETFN: u8;

    /// Command number.
    const CMD: u8;

    /// Encode request payload bytes (excluding NetFn/Cmd framing).
    fn request_data(&self) -> Vec<u8>;

    /// Parse the response message into the typed output.
    fn parse_response(&self, response: &Message) -> Result<Self::Output>;
}

fn ok_data(response: &Message) -> Result<&[u8]> {
    if response.completion_code != 0x00 {
        return Err(Error::CompletionCode {
            completion_code: response.completion_code,
        });
    }
    Ok(&response.data)
}

/// `Get Device ID` (App NetFn, cmd 0x01).
#[derive(Debug, Clone, Copy)]
pub struct GetDeviceId;

impl Command for GetDeviceId {
    type Output = DeviceId;
    const NETFN: u8 = netfn::APP_REQ;
    const CMD: u8 = cmd::APP_GET_DEVICE_ID;

    fn request_data(&self) -> Vec<u8> {
        Vec::new()
    }

    fn parse_response(&self, response: &Message) -> Result<Self::Output> {
        parse_device_id(ok_data(response)?)
    }
}

/// Sensor event carried by a system event SEL record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelEvent {
    /// Sensor type code.
    pub sensor_type: u8,
    /// Sensor number.
    pub sensor_number: u8,
    /// Event/reading type code (bit 7 set for deassertion).
    pub event_type: u8,
    /// Event data bytes 1-3.
    pub event_data: [u8; 3],
}

const SYSTEM_EVENT_RECORD: u8 = 0x02;
const EVENT_MSG_FORMAT_VERSION: u8 = 0x04;

static NEXT_RECORD_ID: AtomicU16 = AtomicU16::new(1);

/// `Add SEL Entry` (Storage NetFn, cmd 0x44) for a system event record.
///
/// The timestamp is left zero for the SEL owner to fill in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddSelEntry {
    /// Record ID proposed by the generator.
    pub record_id: u16,
    /// 7-bit address of the generating controller.
    pub generator_addr: u8,
    /// Event payload.
    pub event: SelEvent,
}

impl AddSelEntry {
    /// Build an entry using the next record ID from this process's counter.
    pub fn next(generator_addr: u8, event: SelEvent) -> Self {
        Self {
            record_id: NEXT_RECORD_ID.fetch_add(1, Ordering::Relaxed),
            generator_addr,
            event,
        }
    }
}

impl Command for AddSelEntry {
    /// Record ID assigned by the SEL owner.
    type Output = u16;
    const NETFN: u8 = netfn::STORAGE_REQ;
    const CMD: u8 = cmd::STORAGE_ADD_SEL;

    fn request_data(&self) -> Vec<u8> {
        let [id_lo, id_hi] = self.record_id.to_le_bytes();
        let e = &self.event;
        vec![
            id_lo,
            id_hi,
            SYSTEM_EVENT_RECORD,
            0x00, // timestamp
            0x00,
            0x00,
            0x00,
            self.generator_addr << 1, // generator id
            0x00,
            EVENT_MSG_FORMAT_VERSION,
            e.sensor_type,
            e.sensor_number,
            e.event_type,
            e.event_data[0],
            e.event_data[1],
            e.event_data[2],
        ]
    }

    fn parse_response(&self, response: &Message) -> Result<Self::Output> {
        let data = ok_data(response)?;
        if data.len() < 2 {
            return Err(Error::Protocol("Add SEL Entry response too short"));
        }
        Ok(u16::from_le_bytes([data[0], data[1]]))
    }
}

impl Ipmb {
    /// Log `event` in the SEL of the controller behind `target`.
    ///
    /// The generator ID is this controller's address on that bus.
    pub fn add_sel_event(&self, target: Channel, event: SelEvent) -> Result<u16> {
        let index = self
            .bus_index(target)
            .ok_or(Error::Unsupported("no bus serves the SEL target"))?;
        let generator = self
            .bus_config(index)
            .map(|config| config.self_addr)
            .ok_or(Error::UnknownBus(index))?;

        self.execute(index, &AddSelEntry::next(generator, event))
    }
}

pub(crate) fn parse_device_id(data: &[u8]) -> Result<DeviceId> {
    if data.len() < 11 {
        return Err(Error::Protocol("Get Device ID response too short"));
    }

    Ok(DeviceId {
        device_id: data[0],
        device_revision: data[1] & 0x0F,
        firmware_major: data[2] & 0x7F,
        firmware_minor: data[3],
        ipmi_version: data[4],
        manufacturer_id: u32::from(data[6]) | (u32::from(data[7]) << 8) | (u32::from(data[8]) << 16),
        product_id: u16::from(data[9]) | (u16::from(data[10]) << 8),
    })
}
