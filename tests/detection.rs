mod common;

use std::time::Duration;

use zaber_serial::device::Motion;
use zaber_serial::io::{Framing, ScriptedStream};
use zaber_serial::protocol::{Protocol, ProtocolKind, DETECTION_REQUEST};

use common::{ascii_chain, ascii_requests, binary_chain, catalog};

#[test]
fn text_chain_is_detected_then_enumerated() {
    let rows = [
        (1, 0, "get deviceid", "OK IDLE -- 50081"),
        (1, 0, "get version", "OK IDLE -- 6.28"),
        (1, 0, "get pos", "OK IDLE -- 0"),
        (4, 0, "get deviceid", "OK IDLE -- 50081"),
        (4, 0, "get version", "OK IDLE -- 6.30"),
        (4, 0, "get pos", "OK IDLE -- 0"),
    ];
    let stream = ascii_chain(&rows);
    let log = stream.log();

    let protocol = Protocol::detect_with(stream, Duration::ZERO).unwrap().unwrap();
    assert_eq!(protocol.kind(), ProtocolKind::Ascii);
    assert_eq!(log.borrow()[0], DETECTION_REQUEST[..5].to_vec());

    // Leftover replies to detection must not confuse enumeration
    let devices = protocol.enumerate_devices(&catalog()).unwrap();
    let addresses: Vec<u8> = devices.iter().map(|d| d.info().address).collect();
    assert_eq!(addresses, vec![1, 4]);
    assert!(ascii_requests(&log).iter().any(|r| r.ends_with("get deviceid")));
}

#[test]
fn binary_chain_is_detected_then_enumerated() {
    let rows = [
        (1, 50, None, "6210"),
        (1, 51, None, "612"),
        (2, 50, None, "6210"),
        (2, 51, None, "612"),
    ];
    let stream = binary_chain(&rows, false);
    let log = stream.log();

    let protocol = Protocol::detect_with(stream, Duration::ZERO).unwrap().unwrap();
    assert_eq!(protocol.kind(), ProtocolKind::Binary);
    assert_eq!(log.borrow()[0], DETECTION_REQUEST.to_vec());

    let devices = protocol.enumerate_devices(&catalog()).unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[1].info().name, "T-LSR150B");
}

#[test]
fn nothing_answers() {
    let stream = ScriptedStream::silent(Framing::Line);
    assert!(Protocol::detect_with(stream, Duration::ZERO).unwrap().is_none());
}

#[test]
fn noise_is_not_a_protocol() {
    let stream = ScriptedStream::new(Framing::Fixed(6), |_| b"\xff\xfe\xfd\xfc\xfb\xfa\xf9".to_vec());
    assert!(Protocol::detect_with(stream, Duration::ZERO).unwrap().is_none());
}
