//! IPMB frame codec.
//!
//! Frame layout (byte 0 is the responder address in 7-bit form; the link
//! carries it in the I2C address phase):
//!
//! ```text
//! rsSA | netFn<<2|rsLUN | hdr chk | rqSA | seq<<2|rqLUN | cmd | [cc] | data.. | msg chk
//! ```
//!
//! Both checksums start from the 8-bit form of byte 0 and run over every
//! byte before the checksum position, so the message checksum covers the
//! header as well.

use arrayvec::ArrayVec;

use crate::error::{Error, Result};
use crate::types::{
    IPMB_REQ_HEADER_LENGTH, IPMB_RESP_HEADER_LENGTH, IPMI_DATA_MAX_LENGTH, IPMI_MSG_MAX_LENGTH,
    Message, Payload,
};

/// Index of the header checksum (and number of bytes it covers).
pub(crate) const IPMI_HEADER_CHECKSUM_POSITION: usize = 2;

const IPMB_NETFN_MASK: u8 = 0xFC;
const IPMB_DEST_LUN_MASK: u8 = 0x03;
const IPMB_SEQ_MASK: u8 = 0xFC;
const IPMB_SRC_LUN_MASK: u8 = 0x03;

/// Largest encoded frame: address byte, response header, payload and checksum.
pub const IPMB_FRAME_MAX_LENGTH: usize = 1 + IPMB_RESP_HEADER_LENGTH + IPMI_MSG_MAX_LENGTH;

/// A bounded, encoded IPMB frame.
pub type Frame = ArrayVec<u8, IPMB_FRAME_MAX_LENGTH>;

/// Compute the IPMB checksum over `bytes`.
///
/// The first byte is a 7-bit address, doubled to its 8-bit form before it
/// enters the two's complement sum.
pub fn checksum(bytes: &[u8]) -> u8 {
    let Some((&addr, rest)) = bytes.split_first() else {
        return 0;
    };
    rest.iter()
        .fold(0u8.wrapping_sub(addr << 1), |acc, &b| acc.wrapping_sub(b))
}

/// Recompute both checksums of a raw frame.
///
/// Returns [`Error::HeaderChecksum`] when the connection header is corrupt and
/// [`Error::MessageChecksum`] when only the trailing checksum disagrees.
pub fn validate_checksum(frame: &[u8]) -> Result<()> {
    if frame.len() <= IPMI_HEADER_CHECKSUM_POSITION + 1 {
        return Err(Error::Protocol("IPMB frame too short"));
    }

    let header_chksum = frame[IPMI_HEADER_CHECKSUM_POSITION];
    if header_chksum != checksum(&frame[..IPMI_HEADER_CHECKSUM_POSITION]) {
        return Err(Error::HeaderChecksum);
    }

    let last = frame.len() - 1;
    if frame[last] != checksum(&frame[..last]) {
        return Err(Error::MessageChecksum);
    }

    Ok(())
}

/// Encode a message into an IPMB frame.
///
/// The completion code is emitted only when the netFn marks a response.
pub fn encode(msg: &Message) -> Result<Frame> {
    let mut frame = Frame::new();

    frame.push(msg.dest_addr);
    frame.push(((msg.netfn << 2) & IPMB_NETFN_MASK) | (msg.dest_lun & IPMB_DEST_LUN_MASK));
    frame.push(checksum(&frame[..IPMI_HEADER_CHECKSUM_POSITION]));
    frame.push(msg.src_addr);
    frame.push(((msg.seq << 2) & IPMB_SEQ_MASK) | (msg.src_lun & IPMB_SRC_LUN_MASK));
    frame.push(msg.cmd);
    if msg.is_response() {
        frame.push(msg.completion_code);
    }

    frame
        .try_extend_from_slice(&msg.data)
        .map_err(|_| Error::InvalidArgument("payload does not fit in an IPMB frame"))?;

    let chksum = checksum(&frame);
    frame
        .try_push(chksum)
        .map_err(|_| Error::InvalidArgument("payload does not fit in an IPMB frame"))?;

    Ok(frame)
}

/// Decode an IPMB frame whose byte 0 is already in 7-bit form.
///
/// Checksums are carried over verbatim; call [`validate_checksum`] first.
pub fn decode(frame: &[u8]) -> Result<Message> {
    if frame.len() < IPMB_REQ_HEADER_LENGTH + 1 {
        return Err(Error::Protocol("IPMB frame too short"));
    }

    let mut msg = Message {
        dest_addr: frame[0],
        netfn: frame[1] >> 2,
        dest_lun: frame[1] & IPMB_DEST_LUN_MASK,
        hdr_chksum: frame[2],
        src_addr: frame[3],
        seq: frame[4] >> 2,
        src_lun: frame[4] & IPMB_SRC_LUN_MASK,
        cmd: frame[5],
        ..Default::default()
    };

    let mut consumed = IPMB_REQ_HEADER_LENGTH;
    if msg.is_response() {
        if frame.len() < IPMB_RESP_HEADER_LENGTH + 1 {
            return Err(Error::Protocol("IPMB response frame too short"));
        }
        msg.completion_code = frame[consumed];
        consumed += 1;
    }

    let data_len = frame.len().saturating_sub(consumed + 1);
    // Inbound payloads stay within IPMI_DATA_MAX_LENGTH so a bridged
    // response can still prepend its own header.
    if data_len > IPMI_DATA_MAX_LENGTH {
        return Err(Error::Protocol("IPMB payload exceeds IPMI_DATA_MAX_LENGTH"));
    }
    let mut data = Payload::new();
    data.try_extend_from_slice(&frame[consumed..consumed + data_len])
        .map_err(|_| Error::Protocol("IPMB payload exceeds IPMI_MSG_MAX_LENGTH"))?;
    msg.data = data;
    msg.msg_chksum = frame[frame.len() - 1];

    Ok(msg)
}

/// Bytes handed to the link for transmission: the frame without its address byte.
pub(crate) fn wire_payload(frame: &Frame) -> &[u8] {
    &frame[1..]
}

/// Copy a frame read from the link, converting the 8-bit address in byte 0
/// to the 7-bit form the codec works with.
pub(crate) fn normalize_inbound(raw: &[u8]) -> Result<Frame> {
    let mut frame = Frame::new();
    frame
        .try_extend_from_slice(raw)
        .map_err(|_| Error::Protocol("inbound IPMB frame too long"))?;
    if let Some(addr) = frame.first_mut() {
        *addr >>= 1;
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{cmd, netfn};

    fn get_device_id_request() -> Message {
        Message {
            dest_addr: 0x20,
            netfn: netfn::APP_REQ,
            src_addr: 0x10,
            seq: 5,
            cmd: cmd::APP_GET_DEVICE_ID,
            ..Default::default()
        }
    }

    #[test]
    fn encode_get_device_id_no_data() {
        let frame = encode(&get_device_id_request()).expect("encode");
        assert_eq!(
            frame.as_slice(),
            &[0x20, 0x18, 0xA8, 0x10, 0x14, 0x01, 0xDB]
        );
        assert_eq!(wire_payload(&frame).len(), IPMB_REQ_HEADER_LENGTH);
    }

    #[test]
    fn decode_get_device_id_request() {
        let msg = decode(&[0x20, 0x18, 0xA8, 0x10, 0x14, 0x01, 0xDB]).expect("decode");
        assert_eq!(msg.netfn, netfn::APP_REQ);
        assert_eq!(msg.cmd, cmd::APP_GET_DEVICE_ID);
        assert_eq!(msg.seq, 5);
        assert_eq!(msg.hdr_chksum, 0xA8);
        assert_eq!(msg.msg_chksum, 0xDB);
        assert!(!msg.is_response());
        assert!(msg.data.is_empty());
    }

    #[test]
    fn response_carries_completion_code() {
        let frame = [
            0x08, 0x1C, 0xD4, // rsSA (7-bit), netfn/lun, header checksum
            0x40, 0x14, 0x01, // rqSA, seq/lun, cmd
            0x00, // completion code
            0x20, 0x01, // data
            0x8A, // message checksum
        ];
        validate_checksum(&frame).expect("checksum");

        let msg = decode(&frame).expect("decode");
        assert!(msg.is_response());
        assert_eq!(msg.netfn, netfn::APP_RES);
        assert_eq!(msg.completion_code, 0x00);
        assert_eq!(msg.data.as_slice(), &[0x20, 0x01]);

        let reencoded = encode(&msg).expect("encode");
        assert_eq!(reencoded.as_slice(), &frame);
    }

    #[test]
    fn header_corruption_is_reported_as_header_error() {
        let mut frame = encode(&get_device_id_request()).expect("encode");
        frame[1] ^= 0x04;
        assert!(matches!(
            validate_checksum(&frame),
            Err(Error::HeaderChecksum)
        ));
    }

    #[test]
    fn body_corruption_is_reported_as_message_error() {
        let mut frame = encode(&get_device_id_request()).expect("encode");
        frame[4] ^= 0x80;
        assert!(matches!(
            validate_checksum(&frame),
            Err(Error::MessageChecksum)
        ));
    }

    #[test]
    fn short_frames_are_rejected() {
        assert!(matches!(
            decode(&[0x20, 0x18, 0xA8, 0x10]),
            Err(Error::Protocol(_))
        ));
        // A response netFn needs room for the completion code as well.
        assert!(matches!(
            decode(&[0x08, 0x1C, 0xD4, 0x40, 0x14, 0x01, 0x00]),
            Err(Error::Protocol(_))
        ));
        assert!(validate_checksum(&[0x20, 0x18]).is_err());
    }

    #[test]
    fn decode_caps_payload_at_data_max() {
        let mut msg = get_device_id_request();
        msg.set_data(&[0x5A; IPMI_DATA_MAX_LENGTH]).expect("data");
        let frame = encode(&msg).expect("encode");
        assert_eq!(
            decode(&frame).expect("decode").data.len(),
            IPMI_DATA_MAX_LENGTH
        );

        // Fits in a message, but leaves no room to wrap it for a bridge.
        msg.set_data(&[0x5A; IPMI_DATA_MAX_LENGTH + 1]).expect("data");
        let frame = encode(&msg).expect("encode");
        assert!(matches!(decode(&frame), Err(Error::Protocol(_))));
    }

    #[test]
    fn inbound_address_is_shifted_to_seven_bits() {
        let frame = normalize_inbound(&[0x40, 0x18, 0xA8]).expect("normalize");
        assert_eq!(frame.as_slice(), &[0x20, 0x18, 0xA8]);
    }

    #[test]
    fn lun_bits_survive_round_trip() {
        let mut msg = get_device_id_request();
        msg.dest_lun = 0x02;
        msg.src_lun = 0x03;
        let decoded = decode(&encode(&msg).expect("encode")).expect("decode");
        assert_eq!(decoded.dest_lun, 0x02);
        assert_eq!(decoded.src_lun, 0x03);
        assert_eq!(decoded.seq, 5);
    }
}
