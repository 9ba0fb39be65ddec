//! Socket-level exercises of the host: a real client connects, speaks the
//! command scheme, and observes the reply frames.

use bridle::channel::Scheme;
use bridle::host::{Host, HostEvent};
use bridle::magic::{decode_magic, encode_magic, MessageMagic};
use bridle::scramble::RollingCode;
use bridle::shared::ClientId;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};
use stirrup::logging;

const PUMP_TIMEOUT: Duration = Duration::from_millis(10);
const DEADLINE: Duration = Duration::from_secs(5);

fn pump_until<F: FnMut(&mut Vec<HostEvent>) -> bool>(host: &mut Host, mut done: F) -> Vec<HostEvent> {
    let start = Instant::now();
    let mut collected = Vec::new();

    loop {
        host.sync(Instant::now(), PUMP_TIMEOUT);
        collected.extend(host.drain_events());

        if done(&mut collected) {
            return collected;
        }

        if start.elapsed() > DEADLINE {
            panic!("Timed out waiting for host events; got {:?}", collected);
        }
    }
}

/// Builds a command-scheme frame the way the legacy client would.
fn client_frame(id: u16, payload: &[u8], code: &mut RollingCode) -> Vec<u8> {
    let length = (payload.len() + 4) as u16;
    let mut frame = encode_magic(MessageMagic { id, length }).to_le_bytes().to_vec();

    let mut scrambled = payload.to_vec();
    code.apply(&mut scrambled);
    if !scrambled.is_empty() {
        code.roll();
    }

    frame.extend_from_slice(&scrambled);
    frame
}

#[test]
fn test_connect_send_receive_disconnect() {
    let log = logging::discard();
    let mut host = Host::bind("127.0.0.1:0", Scheme::Command, &log).unwrap();
    let addr = host.local_addr().unwrap();

    let mut client = TcpStream::connect(addr).unwrap();

    let events = pump_until(&mut host, |events| {
        events.iter().any(|e| matches!(e, HostEvent::Connected(_)))
    });
    let client_id = match events.iter().find(|e| matches!(e, HostEvent::Connected(_))) {
        Some(HostEvent::Connected(id)) => *id,
        _ => unreachable!(),
    };

    // The client's scramble state mirrors the server's initial code.
    let mut code = RollingCode::initial();
    client
        .write_all(&client_frame(0x0042, &[0xDE, 0xAD, 0xBE, 0xEF], &mut code))
        .unwrap();

    let events = pump_until(&mut host, |events| {
        events.iter().any(|e| matches!(e, HostEvent::Frame(..)))
    });

    match events.iter().find(|e| matches!(e, HostEvent::Frame(..))) {
        Some(HostEvent::Frame(id, frame)) => {
            assert_eq!(*id, client_id);
            assert_eq!(frame.id, 0x0042);
            assert_eq!(frame.payload, vec![0xDE, 0xAD, 0xBE, 0xEF]);
        }
        _ => unreachable!(),
    }

    // Reply on the shared rolling state (which advanced past our frame).
    host.queue_frame(client_id, 0x0043, &mut |sink| sink.write_u32(0x0102_0304));
    host.sync(Instant::now(), PUMP_TIMEOUT);

    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();

    let mut reply = [0u8; 8];
    read_exact_retrying(&mut client, &mut host, &mut reply);

    let magic = decode_magic(u32::from_le_bytes([reply[0], reply[1], reply[2], reply[3]]));
    assert_eq!(magic.id, 0x0043);
    assert_eq!(magic.length, 8);

    let mut payload = [reply[4], reply[5], reply[6], reply[7]];
    code.apply(&mut payload);
    assert_eq!(payload, [0x04, 0x03, 0x02, 0x01]);

    // Dropping the client surfaces a disconnect.
    drop(client);
    let events = pump_until(&mut host, |events| {
        events.iter().any(|e| matches!(e, HostEvent::Disconnected(_)))
    });
    assert!(events
        .iter()
        .any(|e| matches!(e, HostEvent::Disconnected(id) if *id == client_id)));
}

/// Keeps the host pumping while blocking-reading the client side, so the
/// reply cannot be stuck in the host's write buffer.
fn read_exact_retrying(client: &mut TcpStream, host: &mut Host, out: &mut [u8]) {
    client.set_nonblocking(true).unwrap();

    let start = Instant::now();
    let mut filled = 0;

    while filled < out.len() {
        host.sync(Instant::now(), PUMP_TIMEOUT);
        host.drain_events();

        match client.read(&mut out[filled..]) {
            Ok(0) => panic!("Server closed the connection early"),
            Ok(count) => filled += count,
            Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(err) => panic!("Client read error: {}", err),
        }

        if start.elapsed() > DEADLINE {
            panic!("Timed out reading reply");
        }
    }
}

#[test]
fn test_frame_split_across_writes() {
    let log = logging::discard();
    let mut host = Host::bind("127.0.0.1:0", Scheme::Command, &log).unwrap();
    let addr = host.local_addr().unwrap();

    let mut client = TcpStream::connect(addr).unwrap();
    pump_until(&mut host, |events| {
        events.iter().any(|e| matches!(e, HostEvent::Connected(_)))
    });

    let mut code = RollingCode::initial();
    let frame = client_frame(0x0007, b"split-me\0", &mut code);

    // Dribble the frame one byte at a time.
    for &byte in &frame {
        client.write_all(&[byte]).unwrap();
        host.sync(Instant::now(), PUMP_TIMEOUT);
    }

    let events = pump_until(&mut host, |events| {
        events.iter().any(|e| matches!(e, HostEvent::Frame(..)))
    });

    let frames: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, HostEvent::Frame(..)))
        .collect();
    assert_eq!(frames.len(), 1);

    match frames[0] {
        HostEvent::Frame(_, frame) => {
            assert_eq!(frame.id, 0x0007);
            assert_eq!(frame.payload, b"split-me\0");
        }
        _ => unreachable!(),
    }
}

#[test]
fn test_garbage_magic_drops_connection() {
    let log = logging::discard();
    let mut host = Host::bind("127.0.0.1:0", Scheme::Command, &log).unwrap();
    let addr = host.local_addr().unwrap();

    let mut client = TcpStream::connect(addr).unwrap();
    pump_until(&mut host, |events| {
        events.iter().any(|e| matches!(e, HostEvent::Connected(_)))
    });

    // Frame-present bit unset decodes to a zero length, which is out of
    // bounds and fatal.
    client.write_all(&[0u8; 16]).unwrap();

    let events = pump_until(&mut host, |events| {
        events.iter().any(|e| matches!(e, HostEvent::Disconnected(_)))
    });

    assert!(events
        .iter()
        .all(|e| !matches!(e, HostEvent::Frame(..))));
}

#[test]
fn test_client_ids_are_monotonic() {
    let log = logging::discard();
    let mut host = Host::bind("127.0.0.1:0", Scheme::Command, &log).unwrap();
    let addr = host.local_addr().unwrap();

    let _first = TcpStream::connect(addr).unwrap();
    let _second = TcpStream::connect(addr).unwrap();

    let events = pump_until(&mut host, |events| {
        events
            .iter()
            .filter(|e| matches!(e, HostEvent::Connected(_)))
            .count()
            >= 2
    });

    let ids: Vec<ClientId> = events
        .iter()
        .filter_map(|e| match e {
            HostEvent::Connected(id) => Some(*id),
            _ => None,
        })
        .collect();

    assert_eq!(ids.len(), 2);
    assert!(ids[1] > ids[0]);
}
