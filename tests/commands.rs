mod common;

use ipmb::commands::{AddSelEntry, Command, GetDeviceId, SelEvent};
use ipmb::transport::memory::MemoryLink;
use ipmb::types::{cc, cmd, netfn};
use ipmb::{BusConfig, Channel, Dispatcher, Error, Ipmb, Message};

use common::timing;

const DEVICE_ID: [u8; 15] = [
    0x20, 0x01, 0x02, 0x43, 0x02, 0x00, 0xA2, 0x02, 0x00, 0x00, 0x01, 0x00, 0x06, 0x2B, 0x2B,
];

fn response(completion_code: u8, data: &[u8]) -> Message {
    let mut msg = Message {
        netfn: netfn::APP_RES,
        cmd: cmd::APP_GET_DEVICE_ID,
        completion_code,
        ..Default::default()
    };
    msg.set_data(data).expect("data");
    msg
}

/// A BIC and a BMC joined by one bus, with a dispatcher on the BMC side.
fn pair(handler: impl Fn(&mut Message) + Send + Sync + 'static) -> (Ipmb, Ipmb) {
    let (bic_link, bmc_link) = MemoryLink::pair(0x10, 0x20);
    let bic = Ipmb::builder()
        .bus(BusConfig::new(0, Channel::BMC_IPMB, 1, 0x10, 0x20), bic_link)
        .timing(timing())
        .build()
        .expect("bic");
    let bmc = Ipmb::builder()
        .bus(BusConfig::new(0, Channel::SLOT1_BIC, 1, 0x20, 0x10), bmc_link)
        .timing(timing())
        .build()
        .expect("bmc");
    Dispatcher::spawn(bmc.clone(), handler).expect("dispatcher");
    (bic, bmc)
}

#[test]
fn get_device_id_parses_response() {
    let parsed = GetDeviceId
        .parse_response(&response(0x00, &DEVICE_ID))
        .expect("parse");
    assert_eq!(parsed.device_id, 0x20);
    assert_eq!(parsed.device_revision, 0x01);
    assert_eq!(parsed.firmware_major, 0x02);
    assert_eq!(parsed.firmware_minor, 0x43);
    assert_eq!(parsed.ipmi_version, 0x02);
    assert_eq!(parsed.manufacturer_id, 0x0000_02A2);
    assert_eq!(parsed.product_id, 0x0100);
}

#[test]
fn completion_code_is_reported() {
    let err = GetDeviceId
        .parse_response(&response(0xC1, &[0xAA, 0xBB]))
        .expect_err("expected error");
    assert!(matches!(
        err,
        Error::CompletionCode {
            completion_code: 0xC1
        }
    ));
}

#[test]
fn execute_get_device_id_over_the_bus() {
    let (bic, bmc) = pair(|msg: &mut Message| {
        if msg.netfn == netfn::APP_REQ && msg.cmd == cmd::APP_GET_DEVICE_ID {
            msg.set_data(&DEVICE_ID).expect("data");
            msg.completion_code = cc::SUCCESS;
        }
    });

    let id = bic.execute(0, &GetDeviceId).expect("execute");
    assert_eq!(id.device_id, 0x20);
    assert_eq!(id.product_id, 0x0100);

    bic.shutdown();
    bmc.shutdown();
}

#[test]
fn execute_surfaces_remote_completion_code() {
    let (bic, bmc) = pair(|_: &mut Message| {});

    let err = bic.execute(0, &GetDeviceId).expect_err("expected error");
    assert!(matches!(
        err,
        Error::CompletionCode {
            completion_code: cc::INVALID_CMD
        }
    ));

    bic.shutdown();
    bmc.shutdown();
}

#[test]
fn sel_event_is_logged_with_the_generator_address() {
    let (bic, bmc) = pair(|msg: &mut Message| {
        if msg.netfn == netfn::STORAGE_REQ && msg.cmd == cmd::STORAGE_ADD_SEL {
            assert_eq!(msg.data.len(), 16);
            assert_eq!(msg.data[7], 0x10 << 1);
            assert_eq!(&msg.data[10..13], &[0x01, 0x42, 0x6F]);
            msg.set_data(&[0x34, 0x12]).expect("data");
            msg.completion_code = cc::SUCCESS;
        }
    });

    let event = SelEvent {
        sensor_type: 0x01,
        sensor_number: 0x42,
        event_type: 0x6F,
        event_data: [0x01, 0xFF, 0xFF],
    };
    assert_eq!(
        bic.add_sel_event(Channel::BMC_IPMB, event).expect("add sel"),
        0x1234
    );
    assert!(matches!(
        bic.add_sel_event(Channel::EXP1_IPMB, event),
        Err(Error::Unsupported(_))
    ));

    bic.shutdown();
    bmc.shutdown();
}

#[test]
fn add_sel_entry_carries_storage_netfn() {
    assert_eq!(AddSelEntry::NETFN, netfn::STORAGE_REQ);
    assert_eq!(AddSelEntry::CMD, cmd::STORAGE_ADD_SEL);
    assert_eq!(GetDeviceId.request_data(), Vec::<u8>::new());
}
