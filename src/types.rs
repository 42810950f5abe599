//! Message, channel and protocol constant definitions.

use core::fmt;

use arrayvec::ArrayVec;

use crate::error::{Error, Result};

/// Maximum IPMI payload carried by one message.
pub const IPMI_DATA_MAX_LENGTH: usize = 520;
/// Request header length: responder address through cmd.
pub const IPMB_REQ_HEADER_LENGTH: usize = 6;
/// Response header length (adds the completion code).
pub const IPMB_RESP_HEADER_LENGTH: usize = 7;
/// Capacity of `Message::data`. Decoded payloads are capped at
/// [`IPMI_DATA_MAX_LENGTH`], which leaves room for the 7-byte bridge header.
pub const IPMI_MSG_MAX_LENGTH: usize = IPMI_DATA_MAX_LENGTH + IPMB_RESP_HEADER_LENGTH;

/// Meta's IANA enterprise number, used as the OEM 1S command prefix.
pub const IANA_ID: u32 = 0x00A015;

/// IANA prefix bytes, least-significant byte first.
pub(crate) const IANA_BYTES: [u8; 3] = [
    (IANA_ID & 0xFF) as u8,
    ((IANA_ID >> 8) & 0xFF) as u8,
    ((IANA_ID >> 16) & 0xFF) as u8,
];

/// Network function codes. Requests are even, responses are `request + 1`.
pub mod netfn {
    /// Chassis request.
    pub const CHASSIS_REQ: u8 = 0x00;
    /// Bridge request.
    pub const BRIDGE_REQ: u8 = 0x02;
    /// Sensor/event request.
    pub const SENSOR_REQ: u8 = 0x04;
    /// Application request.
    pub const APP_REQ: u8 = 0x06;
    /// Application response.
    pub const APP_RES: u8 = 0x07;
    /// Firmware request.
    pub const FIRMWARE_REQ: u8 = 0x08;
    /// Storage request.
    pub const STORAGE_REQ: u8 = 0x0A;
    /// Transport request.
    pub const TRANSPORT_REQ: u8 = 0x0C;
    /// DCMI request.
    pub const DCMI_REQ: u8 = 0x2C;
    /// Node manager request.
    pub const NM_REQ: u8 = 0x2E;
    /// OEM request.
    pub const OEM_REQ: u8 = 0x30;
    /// OEM 1S request (IANA-prefixed vendor commands, bridging).
    pub const OEM_1S_REQ: u8 = 0x38;
    /// OEM 1S response.
    pub const OEM_1S_RES: u8 = 0x39;
}

/// Command codes referenced by the transport itself.
pub mod cmd {
    /// App: Get Device ID.
    pub const APP_GET_DEVICE_ID: u8 = 0x01;
    /// Storage: Add SEL Entry.
    pub const STORAGE_ADD_SEL: u8 = 0x44;
    /// OEM: node manager sensor read (served locally when it comes from the ME).
    pub const OEM_NM_SENSOR_READ: u8 = 0xE2;
    /// OEM 1S: bridged message in.
    pub const OEM_1S_MSG_IN: u8 = 0x01;
    /// OEM 1S: bridged message out.
    pub const OEM_1S_MSG_OUT: u8 = 0x02;
    /// OEM 1S: firmware update.
    pub const OEM_1S_FW_UPDATE: u8 = 0x09;
    /// OEM 1S: reset BMC.
    pub const OEM_1S_RESET_BMC: u8 = 0x16;
    /// OEM 1S: get BIC status.
    pub const OEM_1S_GET_BIC_STATUS: u8 = 0x31;
    /// OEM 1S: reset BIC.
    pub const OEM_1S_RESET_BIC: u8 = 0x32;
}

/// IPMI completion codes.
pub mod cc {
    /// Command completed normally.
    pub const SUCCESS: u8 = 0x00;
    /// OEM: invalid IANA prefix.
    pub const INVALID_IANA: u8 = 0x84;
    /// OEM: bridged message could not be queued.
    pub const BRIDGE_MSG_ERR: u8 = 0x82;
    /// Node busy.
    pub const NODE_BUSY: u8 = 0xC0;
    /// Invalid command.
    pub const INVALID_CMD: u8 = 0xC1;
    /// Timeout while processing command.
    pub const TIMEOUT: u8 = 0xC3;
    /// Out of space.
    pub const OUT_OF_SPACE: u8 = 0xC4;
    /// Request data length invalid.
    pub const INVALID_LENGTH: u8 = 0xC7;
    /// Cannot return the number of requested data bytes / cannot respond.
    pub const CAN_NOT_RESPOND: u8 = 0xCE;
    /// Command not supported in present state.
    pub const NOT_SUPP_IN_CURR_STATE: u8 = 0xD5;
    /// Unspecified error.
    pub const UNSPECIFIED_ERROR: u8 = 0xFF;
}

/// Logical interface a message came from or is bound for.
///
/// Channels are a firmware-internal routing concept and never appear on the wire.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Channel(pub u8);

impl Channel {
    /// The controller itself.
    pub const SELF: Channel = Channel(0x00);
    /// Management engine IPMB.
    pub const ME_IPMB: Channel = Channel(0x01);
    /// BMC IPMB.
    pub const BMC_IPMB: Channel = Channel(0x02);
    /// Host KCS.
    pub const HOST_KCS: Channel = Channel(0x03);
    /// Server board IPMB.
    pub const SERVER_IPMB: Channel = Channel(0x04);
    /// First expansion board IPMB.
    pub const EXP1_IPMB: Channel = Channel(0x05);
    /// Slot 1 bridge IC.
    pub const SLOT1_BIC: Channel = Channel(0x07);
    /// Slot 3 bridge IC.
    pub const SLOT3_BIC: Channel = Channel(0x08);
    /// Baseboard IPMB.
    pub const BB_IPMB: Channel = Channel(0x10);
    /// Second expansion board IPMB.
    pub const EXP2_IPMB: Channel = Channel(0x15);
    /// Companion bridge IC IPMB.
    pub const CL_BIC_IPMB: Channel = Channel(0x16);
    /// Peer BMC IPMB.
    pub const PEER_BMC_IPMB: Channel = Channel(0x1A);
    /// BMC over USB.
    pub const BMC_USB: Channel = Channel(0x20);
    /// IPMI-over-PLDM.
    pub const PLDM: Channel = Channel(0x40);
    /// Reserved / unknown source.
    pub const RESERVED: Channel = Channel(0x41);

    /// Raw channel number.
    pub fn as_u8(self) -> u8 {
        self.0
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            Channel::SELF => "SELF",
            Channel::ME_IPMB => "ME_IPMB",
            Channel::BMC_IPMB => "BMC_IPMB",
            Channel::HOST_KCS => "HOST_KCS",
            Channel::SERVER_IPMB => "SERVER_IPMB",
            Channel::EXP1_IPMB => "EXP1_IPMB",
            Channel::SLOT1_BIC => "SLOT1_BIC",
            Channel::SLOT3_BIC => "SLOT3_BIC",
            Channel::BB_IPMB => "BB_IPMB",
            Channel::EXP2_IPMB => "EXP2_IPMB",
            Channel::CL_BIC_IPMB => "CL_BIC_IPMB",
            Channel::PEER_BMC_IPMB => "PEER_BMC_IPMB",
            Channel::BMC_USB => "BMC_USB",
            Channel::PLDM => "PLDM",
            Channel::RESERVED => "RESERVED",
            _ => return None,
        })
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "Channel({:#04x})", self.0),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<u8> for Channel {
    fn from(value: u8) -> Self {
        Channel(value)
    }
}

/// Physical interface a bus is wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interface {
    /// I2C (the only interface the engines drive today).
    I2c,
    /// I3C.
    I3c,
    /// Placeholder entry in a platform table.
    Reserved,
}

/// Bounded IPMI payload.
pub type Payload = ArrayVec<u8, IPMI_MSG_MAX_LENGTH>;

/// A decoded IPMB message plus the routing metadata used for bridging.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Destination address (7-bit form as handed to the link).
    pub dest_addr: u8,
    /// Network function (6 bits).
    pub netfn: u8,
    /// Destination LUN.
    pub dest_lun: u8,
    /// Connection header checksum as seen on the wire.
    pub hdr_chksum: u8,
    /// Source address (8-bit form).
    pub src_addr: u8,
    /// Sequence number on the wire.
    pub seq: u8,
    /// Source LUN.
    pub src_lun: u8,
    /// Command.
    pub cmd: u8,
    /// Completion code, only meaningful for responses.
    pub completion_code: u8,
    /// Payload bytes after the header (and completion code).
    pub data: Payload,
    /// Message checksum as seen on the wire.
    pub msg_chksum: u8,
    /// Sequence number used by the original requester.
    pub seq_source: u8,
    /// Sequence number this controller assigned on the outbound hop.
    pub seq_target: u8,
    /// Interface the request originated from.
    pub inf_source: Channel,
    /// Interface the request is bound for.
    pub inf_target: Channel,
    /// Tick count when the message entered the pending-request ledger.
    pub timestamp: u32,
}

impl Message {
    /// Build a request addressed by netFn/cmd with the given payload.
    pub fn request(netfn: u8, cmd: u8, data: &[u8]) -> Result<Self> {
        let mut msg = Message {
            netfn,
            cmd,
            ..Default::default()
        };
        msg.set_data(data)?;
        Ok(msg)
    }

    /// Whether this message is a response (odd netFn).
    pub fn is_response(&self) -> bool {
        self.netfn & 0x01 != 0
    }

    /// Replace the payload, enforcing the protocol maximum.
    pub fn set_data(&mut self, data: &[u8]) -> Result<()> {
        self.data.clear();
        self.data
            .try_extend_from_slice(data)
            .map_err(|_| Error::InvalidArgument("payload exceeds IPMI_MSG_MAX_LENGTH"))
    }

    /// Number of valid payload bytes.
    pub fn data_len(&self) -> usize {
        self.data.len()
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("netfn", &format_args!("{:#04x}", self.netfn))
            .field("cmd", &format_args!("{:#04x}", self.cmd))
            .field("seq", &self.seq)
            .field(
                "completion_code",
                &format_args!("{:#04x}", self.completion_code),
            )
            .field("data_len", &self.data.len())
            .field("inf_source", &self.inf_source)
            .field("inf_target", &self.inf_target)
            .field("seq_source", &self.seq_source)
            .field("seq_target", &self.seq_target)
            .finish()
    }
}

/// Parsed response for the `Get Device ID` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceId {
    /// Device ID (controller-defined).
    pub device_id: u8,
    /// Device revision (lower 4 bits).
    pub device_revision: u8,
    /// Firmware major revision (7 bits).
    pub firmware_major: u8,
    /// Firmware minor revision (BCD).
    pub firmware_minor: u8,
    /// IPMI version as BCD (e.g. 0x02 for 2.0).
    pub ipmi_version: u8,
    /// Manufacturer ID (24-bit, least-significant byte first on the wire).
    pub manufacturer_id: u32,
    /// Product ID.
    pub product_id: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_netfn_is_response() {
        let req = Message::request(netfn::APP_REQ, cmd::APP_GET_DEVICE_ID, &[]).expect("msg");
        assert!(!req.is_response());

        let resp = Message {
            netfn: netfn::APP_RES,
            ..Default::default()
        };
        assert!(resp.is_response());
    }

    #[test]
    fn payload_is_bounded() {
        let too_big = vec![0u8; IPMI_MSG_MAX_LENGTH + 1];
        let err = Message::request(netfn::OEM_REQ, 0x01, &too_big).expect_err("too long");
        assert!(matches!(err, Error::InvalidArgument(_)));

        let max = vec![0u8; IPMI_MSG_MAX_LENGTH];
        let msg = Message::request(netfn::OEM_REQ, 0x01, &max).expect("fits");
        assert_eq!(msg.data_len(), IPMI_MSG_MAX_LENGTH);
    }

    #[test]
    fn channel_debug_uses_names() {
        assert_eq!(format!("{:?}", Channel::HOST_KCS), "HOST_KCS");
        assert_eq!(format!("{:?}", Channel(0x33)), "Channel(0x33)");
    }

    #[test]
    fn iana_bytes_are_little_endian() {
        assert_eq!(IANA_BYTES, [0x15, 0xA0, 0x00]);
    }
}
