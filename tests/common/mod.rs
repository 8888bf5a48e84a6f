//! Scripted device chains for driving the library without hardware.
#![allow(dead_code)]

use std::collections::{BTreeSet, VecDeque};

use zaber_serial::catalog::TableCatalog;
use zaber_serial::io::{FrameLog, Framing, ScriptedStream};
use zaber_serial::message::AsciiMessage;

pub const CATALOG: &str = r#"
    [[device]]
    device_id = 30341
    name = "X-MCB2"

    [[device.peripheral]]
    peripheral_id = 43211
    name = "LSQ150B-T4"
    position_scale = 1000.0
    motion_type = "linear"
    resolution_dependent = true

    [[device]]
    device_id = 50081
    name = "X-RSW60A"

    [[device.peripheral]]
    peripheral_id = 0
    position_scale = 100.0
    motion_type = "rotary"

    [[device]]
    device_id = 6210
    name = "T-LSR150B"

    [[device.peripheral]]
    peripheral_id = 0
    position_scale = 2000.0
    motion_type = "linear"
    resolution_dependent = true
"#;

pub fn catalog() -> TableCatalog {
    TableCatalog::from_toml_str(CATALOG).unwrap()
}

fn next_reply(replies: &mut VecDeque<String>) -> String {
    // The last scripted reply repeats forever
    if replies.len() > 1 {
        replies.pop_front().unwrap_or_default()
    } else {
        replies.front().cloned().unwrap_or_default()
    }
}

/// A text protocol chain answering from a table of
/// `(address, axis, command, replies)` rows.
///
/// `replies` is the reply after the address and axis, for example
/// `OK IDLE -- 0`. Several replies separated by `|` are sent in turn. Only the
/// first matching row of each address answers. A command with no row gets `RJ`
/// from a known address and silence otherwise.
pub fn ascii_chain(rows: &[(u8, u8, &str, &str)]) -> ScriptedStream {
    let mut table: Vec<(u8, u8, String, VecDeque<String>)> = rows
        .iter()
        .map(|(address, axis, command, replies)| {
            (*address, *axis, command.to_string(), replies.split('|').map(str::to_string).collect())
        })
        .collect();
    let addresses: BTreeSet<u8> = rows.iter().map(|row| row.0).collect();

    ScriptedStream::new(Framing::Line, move |frame| {
        // Devices ignore anything before the request prefix
        let text = String::from_utf8_lossy(frame);
        let text = match text.find('/') {
            Some(start) => &text[start..],
            None => return Vec::new(),
        };

        // A bare "/" is an empty request to everyone
        if text.trim() == "/" {
            return addresses
                .iter()
                .map(|address| format!("@{:02} 0 OK IDLE -- 0\r\n", address))
                .collect::<String>()
                .into_bytes();
        }

        let request = match AsciiMessage::decode(text) {
            Ok(request) => request,
            Err(_) => return Vec::new(),
        };
        let command = format!("{} {}", request.command(), request.data_text()).trim().to_string();
        let (address, axis) = (request.address(), request.axis());

        // The first matching row for each address wins
        let mut out = String::new();
        let mut answered = BTreeSet::new();
        for row in table.iter_mut() {
            if (address == 0 || row.0 == address) && row.1 == axis && row.2 == command && answered.insert(row.0) {
                out.push_str(&format!("@{:02} {} {}\r\n", row.0, row.1, next_reply(&mut row.3)));
            }
        }
        if answered.is_empty() && addresses.contains(&address) {
            out.push_str(&format!("@{:02} {} RJ IDLE -- BADCOMMAND\r\n", address, axis));
        }
        out.into_bytes()
    })
}

fn packet(address: u8, code: u8, data: i32, id: Option<u8>) -> Vec<u8> {
    let bytes = data.to_le_bytes();
    match id {
        Some(id) => vec![address, code, bytes[0], bytes[1], bytes[2], id],
        None => vec![address, code, bytes[0], bytes[1], bytes[2], bytes[3]],
    }
}

/// A binary protocol chain answering from a table of
/// `(address, command, request data, replies)` rows.
///
/// `replies` holds data values separated by `|`, sent in turn; `E<code>`
/// sends an error reply instead and an empty reply sends nothing. A row with `None` request data matches any
/// data. Echo requests are answered by every device. A command with no row
/// gets error 64 from a known address and silence otherwise.
pub fn binary_chain(rows: &[(u8, u8, Option<i32>, &str)], message_ids: bool) -> ScriptedStream {
    let mut table: Vec<(u8, u8, Option<i32>, VecDeque<String>)> = rows
        .iter()
        .map(|(address, command, data, replies)| {
            (*address, *command, *data, replies.split('|').map(str::to_string).collect())
        })
        .collect();
    let addresses: BTreeSet<u8> = rows.iter().map(|row| row.0).collect();

    ScriptedStream::new(Framing::Fixed(6), move |frame| {
        let (address, command) = (frame[0], frame[1]);
        let (data, id) = if message_ids {
            let raw = u32::from_le_bytes([frame[2], frame[3], frame[4], 0]);
            (((raw << 8) as i32) >> 8, Some(frame[5]))
        } else {
            (i32::from_le_bytes([frame[2], frame[3], frame[4], frame[5]]), None)
        };

        let mut out = Vec::new();

        if command == 55 {
            for target in addresses.iter().filter(|a| address == 0 || **a == address) {
                out.extend(packet(*target, 55, data, id));
            }
            return out;
        }

        let mut answered = BTreeSet::new();
        for row in table.iter_mut() {
            let data_matches = row.2.map_or(true, |expected| expected == data);
            if (address == 0 || row.0 == address) && row.1 == command && data_matches && answered.insert(row.0) {
                let reply = next_reply(&mut row.3);
                if reply.is_empty() {
                    // The device heard the request and stays silent
                } else if let Some(code) = reply.strip_prefix('E') {
                    out.extend(packet(row.0, 255, code.parse().unwrap(), id));
                } else {
                    out.extend(packet(row.0, command, reply.parse().unwrap(), id));
                }
            }
        }
        if answered.is_empty() && addresses.contains(&address) {
            out.extend(packet(address, 255, 64, id));
        }
        out
    })
}

/// The text requests written so far, without checksums.
pub fn ascii_requests(log: &FrameLog) -> Vec<String> {
    log.borrow()
        .iter()
        .filter_map(|frame| {
            let text = String::from_utf8_lossy(frame);
            let start = text.find('/')?;
            AsciiMessage::decode(&text[start..]).ok().map(|m| m.to_string())
        })
        .collect()
}

/// The `(address, command, data)` of every binary request written so far.
pub fn binary_requests(log: &FrameLog) -> Vec<(u8, u8, i32)> {
    log.borrow()
        .iter()
        .map(|frame| (frame[0], frame[1], i32::from_le_bytes([frame[2], frame[3], frame[4], frame[5]])))
        .collect()
}
