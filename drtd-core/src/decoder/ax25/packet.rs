//! AX.25 frame parsing
//!
//! Frame layout (flags and FCS handled upstream):
//!
//! ```text
//! | Address field      | Control | (PID) | (Data)   | FCS     |
//! | 112..560 bits      | 8 bits  | 8 bit | n*8 bits | 16 bits |
//! ```
//!
//! Address field: destination, source, then up to eight repeaters, each
//! seven bytes; the HDLC extension bit of an SSID byte ends the field.
//! Control bit 0 = 0 is an Information frame, bits 0..1 = 01 Supervisory,
//! 11 Unnumbered. The FCS is not verified and remains as the final two
//! payload bytes (APRS gear frequently omits it, so rejecting on mismatch
//! would drop valid traffic).

use log::warn;

use super::address::{Address, AddressKind};
use crate::text::escape_ascii;

const MAX_REPEATERS: usize = 8;
const MIN_PACKET_SIZE: usize = 15;
const PID_ESCAPE: u8 = 0xFF;
const POLL_MASK: u8 = 0x10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameContents {
    Information {
        pid: &'static str,
        send_sequence: u8,
        receive_sequence: u8,
    },
    Supervisory {
        receive_kind: &'static str,
        receive_sequence: u8,
    },
    Unnumbered {
        control_kind: &'static str,
        pid: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct Packet {
    source: Address,
    destination: Address,
    repeaters: Vec<Address>,
    control: u8,
    poll: bool,
    data: Vec<u8>,
    contents: FrameContents,
}

fn pid_name(byte: u8) -> &'static str {
    match byte {
        0x01 => "ISO 8208/CCITT X.25 PLP",
        0x06 => "Compressed TCP/IP packet (RFC 1144)",
        0x07 => "Uncompressed TCP/IP packet (RFC 1144)",
        0x08 => "Segmentation fragment",
        0xC3 => "TEXNET datagram protocol",
        0xC4 => "Link Quality Protocol",
        0xCA => "Appletalk",
        0xCB => "Appletalk ARP",
        0xCC => "ARPA Internet Protocol",
        0xCD => "ARPA Address resolution",
        0xCE => "FlexNet",
        0xCF => "NET/ROM",
        0xF0 => "No layer 3 protocol implemented",
        0xDD => "AX.25 layer 3 implemented",
        _ => "Unknown/Not yet implemented",
    }
}

fn receive_kind_name(kind: u8) -> &'static str {
    match kind {
        0 => "Receive ready",
        1 => "Receive not ready",
        2 => "Reject",
        _ => "Unknown",
    }
}

fn control_kind_name(kind: u8) -> &'static str {
    match kind {
        0x0F => "Set asynchronous balanced mode extended",
        0x07 => "Set asynchronous balanced mode",
        0x08 => "Disconnect",
        0x03 => "Disconnected mode",
        0x0C => "Unnumbered acknowledge",
        0x11 => "Frame reject",
        0x00 => "Unnumbered information",
        0x1C => "Test",
        0x17 => "Exchange identifications",
        _ => "Unknown control type",
    }
}

fn unnumbered_carries_data(kind: u8) -> bool {
    matches!(kind, 0x11 | 0x00 | 0x1C | 0x17 | 0xFF)
}

impl Packet {
    pub const FLAG: u8 = 0x7E;

    /// Parse a de-stuffed frame. `bytes[0]` is a remnant of the opening
    /// flag produced by the delayed de-stuffing path and is skipped.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < MIN_PACKET_SIZE {
            warn!("packet too short ({} bytes)", bytes.len());
            return None;
        }

        let mut offset = 1;
        let destination = Address::parse(AddressKind::Destination, bytes, offset).or_else(|| {
            warn!("could not parse destination address");
            None
        })?;
        offset += Address::BLOCK_SIZE;

        let source = Address::parse(AddressKind::Source, bytes, offset).or_else(|| {
            warn!("could not parse source address");
            None
        })?;
        offset += Address::BLOCK_SIZE;

        let mut repeaters = Vec::new();
        if !source.is_end_byte() {
            for _ in 0..MAX_REPEATERS {
                let repeater = Address::parse(AddressKind::Repeater, bytes, offset).or_else(|| {
                    warn!("invalid repeater address block");
                    None
                })?;
                offset += Address::BLOCK_SIZE;
                let done = repeater.is_end_byte();
                repeaters.push(repeater);
                if done {
                    break;
                }
            }
        }

        let control = bytes[offset];
        offset += 1;
        let poll = control & POLL_MASK != 0;

        if control & 1 == 0 {
            let mut pid = bytes[offset];
            offset += 1;
            if pid == PID_ESCAPE {
                pid = bytes.get(offset).copied()?;
                offset += 1;
            }

            Some(Self {
                source,
                destination,
                repeaters,
                control,
                poll,
                data: bytes[offset..].to_vec(),
                contents: FrameContents::Information {
                    pid: pid_name(pid),
                    receive_sequence: control >> 5 & 0x7,
                    send_sequence: control >> 1 & 0x7,
                },
            })
        } else if control & 2 == 0 {
            Some(Self {
                source,
                destination,
                repeaters,
                control,
                poll,
                data: Vec::new(),
                contents: FrameContents::Supervisory {
                    receive_kind: receive_kind_name(control >> 2 & 0x3),
                    receive_sequence: control >> 5 & 0x7,
                },
            })
        } else {
            let modifier = control >> 2;
            let control_kind = (modifier & 0x34) >> 1 | (modifier & 0x3);
            let pid = if control_kind == 0 {
                // Unnumbered information carries a PID
                let mut pid = bytes.get(offset).copied()?;
                offset += 1;
                if pid == PID_ESCAPE {
                    pid = bytes.get(offset).copied()?;
                    offset += 1;
                }
                pid_name(pid)
            } else {
                "Packet has no PID"
            };

            let data = if unnumbered_carries_data(control_kind) {
                bytes[offset..].to_vec()
            } else {
                Vec::new()
            };

            Some(Self {
                source,
                destination,
                repeaters,
                control,
                poll,
                data,
                contents: FrameContents::Unnumbered {
                    control_kind: control_kind_name(control_kind),
                    pid,
                },
            })
        }
    }

    pub fn source(&self) -> &Address {
        &self.source
    }

    pub fn destination(&self) -> &Address {
        &self.destination
    }

    pub fn repeaters(&self) -> &[Address] {
        &self.repeaters
    }

    pub fn contents(&self) -> &FrameContents {
        &self.contents
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_poll(&self) -> bool {
        self.poll
    }

    /// Multi-line human-readable record.
    pub fn format(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let _ = writeln!(
            out,
            "Received at {}",
            chrono::Local::now().format("%a %b %e %H:%M:%S %Y")
        );

        match &self.contents {
            FrameContents::Information {
                pid,
                send_sequence,
                receive_sequence,
            } => {
                let _ = writeln!(out, "Type: Information");
                let _ = write!(
                    out,
                    "Pid: {pid}, SSN: {send_sequence:#x}, RSN: {receive_sequence:#x}"
                );
            }
            FrameContents::Supervisory {
                receive_kind,
                receive_sequence,
            } => {
                let _ = writeln!(out, "Type: Supervisory");
                let _ = write!(out, "Receive type: {receive_kind}, RSN: {receive_sequence:#x}");
            }
            FrameContents::Unnumbered { control_kind, pid } => {
                let _ = writeln!(out, "Type: Unnumbered");
                let _ = write!(out, "{control_kind}, Pid: {pid}");
            }
        }

        let _ = write!(out, " ({:#x})", self.control);
        if self.poll {
            let _ = write!(out, " [Poll]");
        }

        let _ = write!(out, "\n{}->", self.source.display());
        for repeater in &self.repeaters {
            let _ = write!(out, "\n{}->", repeater.display());
        }
        let _ = writeln!(out, "\n{}", self.destination.display());

        let _ = writeln!(out, ">>>");
        if self.data.is_empty() {
            let _ = write!(out, "[Packet has no data field]");
        } else {
            for &byte in &self.data {
                let _ = write!(out, "{}", escape_ascii(byte));
            }
        }
        let _ = write!(out, "\n<<<\n\n");
        out
    }
}
