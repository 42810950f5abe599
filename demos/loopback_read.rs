use ipmb::commands::GetDeviceId;
use ipmb::transport::memory::MemoryLink;
use ipmb::types::{cc, cmd, netfn};
use ipmb::{BusConfig, Channel, Dispatcher, Ipmb, Message};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Example:
    //   cargo run --example loopback_read
    //   IPMB_DEBUG=1 cargo run --example loopback_read
    let (bic_link, bmc_link) = MemoryLink::pair(0x10, 0x20);

    let bic = Ipmb::builder()
        .bus(BusConfig::new(0, Channel::BMC_IPMB, 1, 0x10, 0x20), bic_link)
        .build()?;
    let bmc = Ipmb::builder()
        .bus(BusConfig::new(0, Channel::SLOT1_BIC, 1, 0x20, 0x10), bmc_link)
        .build()?;

    Dispatcher::spawn(bmc.clone(), |msg: &mut Message| {
        if msg.netfn == netfn::APP_REQ && msg.cmd == cmd::APP_GET_DEVICE_ID {
            let _ = msg.set_data(&[
                0x20, 0x81, 0x01, 0x10, 0x02, 0x00, 0x15, 0xA0, 0x00, 0x01, 0x00,
            ]);
            msg.completion_code = cc::SUCCESS;
        }
    })?;

    let device = bic.execute(0, &GetDeviceId)?;
    println!("Device ID: {device:?}");

    bic.shutdown();
    bmc.shutdown();
    Ok(())
}
