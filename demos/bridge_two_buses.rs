use std::time::{Duration, Instant};

use ipmb::protocol;
use ipmb::transport::Link;
use ipmb::transport::memory::MemoryLink;
use ipmb::types::{cc, cmd, netfn};
use ipmb::{BusConfig, Channel, Dispatcher, Ipmb, Message};

const BIC: u8 = 0x10;
const BMC: u8 = 0x20;
const EXPANSION: u8 = 0x30;

fn wait_frame(link: &MemoryLink) -> Result<Message, Box<dyn std::error::Error>> {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if let Some(mut raw) = link.read()? {
            raw[0] >>= 1;
            protocol::validate_checksum(&raw)?;
            return Ok(protocol::decode(&raw)?);
        }
        if Instant::now() > deadline {
            return Err("timed out waiting for a frame".into());
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn send(link: &MemoryLink, msg: &Message) -> Result<(), Box<dyn std::error::Error>> {
    let frame = protocol::encode(msg)?;
    link.write(msg.dest_addr, &frame[1..])?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Example:
    //   cargo run --example bridge_two_buses
    //
    // The BMC asks the BIC to forward Get Device ID to an expansion board
    // with OEM "message out", then reads the wrapped answer.
    let (bmc_side, bmc) = MemoryLink::pair(BIC, BMC);
    let (exp_side, expansion) = MemoryLink::pair(BIC, EXPANSION);

    let bic = Ipmb::builder()
        .bus(BusConfig::new(0, Channel::BMC_IPMB, 1, BIC, BMC), bmc_side)
        .bus(BusConfig::new(1, Channel::EXP1_IPMB, 2, BIC, EXPANSION), exp_side)
        .build()?;
    Dispatcher::spawn(bic.clone(), |_: &mut Message| {})?;

    let mut request = Message {
        dest_addr: BIC,
        netfn: netfn::OEM_1S_REQ,
        src_addr: BMC << 1,
        seq: 1,
        cmd: cmd::OEM_1S_MSG_OUT,
        ..Default::default()
    };
    request.set_data(&[
        0x15,
        0xA0,
        0x00,
        Channel::EXP1_IPMB.as_u8(),
        netfn::APP_REQ << 2,
        cmd::APP_GET_DEVICE_ID,
    ])?;
    send(&bmc, &request)?;

    let forwarded = wait_frame(&expansion)?;
    println!("expansion board got: {forwarded:?}");

    let mut answer = Message {
        dest_addr: forwarded.src_addr >> 1,
        netfn: forwarded.netfn + 1,
        src_addr: EXPANSION << 1,
        seq: forwarded.seq,
        cmd: forwarded.cmd,
        completion_code: cc::SUCCESS,
        ..Default::default()
    };
    answer.set_data(&[0x30, 0x01, 0x02, 0x00, 0x02])?;
    send(&expansion, &answer)?;

    let wrapped = wait_frame(&bmc)?;
    println!("BMC got: {wrapped:?}");
    println!("payload: {:02x?}", wrapped.data.as_slice());

    bic.shutdown();
    Ok(())
}
