mod common;

use zaber_serial::device::IoPort;
use zaber_serial::errors::{Error, ValidationError};
use zaber_serial::protocol::Protocol;

use common::{ascii_chain, ascii_requests, binary_chain, binary_requests, catalog};

fn ascii_rows() -> Vec<(u8, u8, &'static str, &'static str)> {
    vec![
        (1, 0, "get deviceid", "OK IDLE -- 30341"),
        (1, 0, "get version", "OK IDLE -- 7.25"),
        (1, 0, "io info", "OK IDLE -- 1 2 3 4"),
        (1, 0, "io get ai 2", "OK IDLE -- 4.75"),
        (1, 0, "io get ao 1", "OK IDLE -- 2.5"),
        (1, 0, "io set ao 1 2.5", "OK IDLE -- 0"),
        (1, 0, "io get di port", "OK IDLE -- 0 1 1 0"),
        (1, 0, "io get do 3", "OK IDLE -- 1"),
        (1, 0, "io set do port 1 0 1", "OK IDLE -- 0"),
        (1, 0, "io set do 2 1", "OK IDLE -- 0"),
        (1, 0, "io set do 3 0", "OK IDLE -- 0"),
    ]
}

fn binary_rows() -> Vec<(u8, u8, Option<i32>, &'static str)> {
    vec![
        (1, 50, None, "6210"),
        (1, 51, None, "612"),
        (1, 67, None, "4"),
        (1, 69, None, "4"),
        (1, 72, None, "2"),
        (1, 74, None, "0"),
        (1, 68, Some(0), "5"),
        (1, 68, Some(2), "0"),
        (1, 73, Some(1), "25000"),
        (1, 70, Some(0), "3"),
        (1, 71, None, "0"),
    ]
}

#[test]
fn text_analog_channels() {
    let devices = Protocol::ascii(ascii_chain(&ascii_rows()))
        .enumerate_devices(&catalog())
        .unwrap();
    let io = devices[0].io().unwrap();

    assert_eq!(io.read_analog_input(2).unwrap(), 4.75);
    io.write_analog_output(1, 2.5).unwrap();
    assert_eq!(io.read_analog_output(1).unwrap(), 2.5);
}

#[test]
fn text_digital_channels() {
    let stream = ascii_chain(&ascii_rows());
    let log = stream.log();
    let devices = Protocol::ascii(stream).enumerate_devices(&catalog()).unwrap();
    let io = devices[0].io().unwrap();

    assert_eq!(io.read_digital_input(None).unwrap(), vec![false, true, true, false]);
    assert_eq!(io.read_digital_output(Some(3)).unwrap(), vec![true]);

    log.borrow_mut().clear();
    io.write_digital_output(1, &[true, false, true]).unwrap();
    io.write_digital_output(2, &[true, false]).unwrap();
    assert_eq!(
        ascii_requests(&log),
        vec!["/1 0 io set do port 1 0 1", "/1 0 io set do 2 1", "/1 0 io set do 3 0"]
    );
}

#[test]
fn channel_numbers_are_checked_before_sending() {
    let stream = ascii_chain(&ascii_rows());
    let log = stream.log();
    let devices = Protocol::ascii(stream).enumerate_devices(&catalog()).unwrap();
    let io = devices[0].io().unwrap();
    log.borrow_mut().clear();

    assert!(matches!(
        io.read_analog_input(3),
        Err(Error::Validation(ValidationError::IndexOutOfRange { index: 3, count: 2 }))
    ));
    assert!(io.read_digital_input(Some(0)).is_err());
    assert!(io.write_digital_output(3, &[true, true]).is_err());
    assert!(log.borrow().is_empty());
}

#[test]
fn binary_channels() {
    let stream = binary_chain(&binary_rows(), false);
    let log = stream.log();
    let devices = Protocol::binary(stream).enumerate_devices(&catalog()).unwrap();
    let io = devices[0].io().unwrap();

    let counts = io.counts();
    assert_eq!((counts.digital_inputs, counts.analog_inputs, counts.analog_outputs), (4, 2, 0));

    assert_eq!(io.read_digital_input(None).unwrap(), vec![true, false, true, false]);
    assert_eq!(io.read_digital_input(Some(2)).unwrap(), vec![false]);
    assert!((io.read_analog_input(1).unwrap() - 2.5).abs() < 1e-9);

    log.borrow_mut().clear();
    io.write_digital_output(1, &[false, true, true, false]).unwrap();
    io.write_digital_output(3, &[true]).unwrap();
    assert_eq!(binary_requests(&log), vec![(1, 71, 6), (1, 70, 0), (1, 71, 7)]);
}

#[test]
fn binary_has_no_analog_outputs() {
    let devices = Protocol::binary(binary_chain(&binary_rows(), false))
        .enumerate_devices(&catalog())
        .unwrap();
    let io = devices[0].io().unwrap();

    assert!(matches!(io.write_analog_output(1, 1.0), Err(Error::Unsupported(_))));
    assert!(matches!(io.read_analog_output(1), Err(Error::Unsupported(_))));
}
