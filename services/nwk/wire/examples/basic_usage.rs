//! Basic usage example for the network frame header and commands.

use bytes::BytesMut;
use nwk_wire::{
    AckCommand, Command, Endpoints, FrameHeader, MacHeader, NwkFlags, NwkHeader, HEADER_SIZE,
    MAC_FCF_ACK_REQUEST, MAC_FCF_DATA,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Network Frame Example ===\n");

    // 1. A data frame from 0x0001 to 0x0003, first hop 0x0002
    let header = FrameHeader {
        mac: MacHeader {
            fcf: MAC_FCF_DATA | MAC_FCF_ACK_REQUEST,
            seq: 17,
            dst_pan_id: 0x1234,
            dst_addr: 0x0002,
            src_addr: 0x0001,
        },
        nwk: NwkHeader {
            flags: NwkFlags::ACK_REQUEST,
            seq: 42,
            src_addr: 0x0001,
            dst_addr: 0x0003,
            endpoints: Endpoints::new(1, 1)?,
        },
    };

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + 5);
    header.encode(&mut buf);
    buf.extend_from_slice(b"hello");
    println!("1. Data frame ({} bytes): {:02x?}", buf.len(), &buf[..]);

    // 2. Decode it again
    let decoded = FrameHeader::decode(&mut &buf[..])?;
    println!(
        "2. nwk {:#06x} -> {:#06x}, seq {}, flags {:?}, payload {:?}",
        decoded.nwk.src_addr,
        decoded.nwk.dst_addr,
        decoded.nwk.seq,
        decoded.nwk.flags,
        String::from_utf8_lossy(&buf[HEADER_SIZE..])
    );

    // 3. The acknowledgment the destination sends back on endpoint 0
    let ack = Command::Ack(AckCommand {
        seq: decoded.nwk.seq,
        control: 0,
    });
    let mut payload = BytesMut::with_capacity(ack.encoded_size());
    ack.encode(&mut payload);
    println!("3. ACK payload: {:02x?}", &payload[..]);
    println!("   Decoded: {:?}", Command::decode(&payload)?);

    Ok(())
}
