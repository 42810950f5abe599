use ipmb::protocol::{checksum, decode, encode, validate_checksum};
use ipmb::types::{cmd, netfn};
use ipmb::{Error, Message};
use rand::Rng;

fn get_device_id() -> Message {
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
fn get_device_id_frame_is_bit_exact() {
    let frame = encode(&get_device_id()).expect("encode");
    assert_eq!(
        frame.as_slice(),
        &[0x20, 0x18, 0xA8, 0x10, 0x14, 0x01, 0xDB]
    );
    // Everything after the address byte goes out in the data phase.
    assert_eq!(frame[1..].len(), 6);
}

#[test]
fn checksum_doubles_the_address_byte() {
    assert_eq!(checksum(&[0x20, 0x18]), 0xA8);
    assert_eq!(checksum(&[]), 0);
    assert_eq!(checksum(&[0x80]), 0x00);
}

#[test]
fn encoded_frames_validate_and_decode() {
    let mut rng = rand::rng();
    for _ in 0..64 {
        let len = rng.random_range(0..64);
        let data: Vec<u8> = (0..len).map(|_| rng.random()).collect();
        let mut msg = Message {
            dest_addr: rng.random_range(0..0x80),
            netfn: rng.random_range(0..0x40),
            dest_lun: rng.random_range(0..4),
            src_addr: rng.random(),
            seq: rng.random_range(0..0x40),
            src_lun: rng.random_range(0..4),
            cmd: rng.random(),
            ..Default::default()
        };
        if msg.is_response() {
            msg.completion_code = rng.random();
        }
        msg.set_data(&data).expect("data");

        let frame = encode(&msg).expect("encode");
        validate_checksum(&frame).expect("valid");

        let back = decode(&frame).expect("decode");
        assert_eq!(back.netfn, msg.netfn);
        assert_eq!(back.seq, msg.seq);
        assert_eq!(back.cmd, msg.cmd);
        assert_eq!(back.completion_code, msg.completion_code);
        assert_eq!(back.data.as_slice(), data.as_slice());
    }
}

#[test]
fn single_bit_flip_in_header_is_a_header_error() {
    let mut rng = rand::rng();
    for _ in 0..32 {
        let mut frame = encode(&get_device_id()).expect("encode");
        let bit = rng.random_range(0..8);
        // Byte 0 is doubled into the sum, so its top bit is invisible.
        let idx = rng.random_range(1..3);
        frame[idx] ^= 1 << bit;
        assert!(matches!(
            validate_checksum(&frame),
            Err(Error::HeaderChecksum)
        ));
    }
}

#[test]
fn single_bit_flip_in_body_is_a_message_error() {
    let mut rng = rand::rng();
    let mut msg = get_device_id();
    msg.set_data(&[1, 2, 3, 4]).expect("data");

    for _ in 0..32 {
        let mut frame = encode(&msg).expect("encode");
        let idx = rng.random_range(3..frame.len());
        frame[idx] ^= 1 << rng.random_range(0..8);
        assert!(matches!(
            validate_checksum(&frame),
            Err(Error::MessageChecksum)
        ));
    }
}
