//! POCSAG message assembly and formatting

use crate::text::escape_ascii;

use super::data::{Codeword, CodewordKind, DATA_BITS};

/// Which payload interpretations a finished record shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    None,
    Numeric,
    AlphaNumeric,
    Both,
}

impl ContentType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "alpha" => Some(Self::AlphaNumeric),
            "numeric" => Some(Self::Numeric),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Numeric => 1,
            Self::AlphaNumeric => 2,
            Self::Both => 3,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::None,
            1 => Self::Numeric,
            3 => Self::Both,
            _ => Self::AlphaNumeric,
        }
    }
}

const NUMERIC_MAP: [char; 16] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', '*', 'U', ' ', '-', ')', '(',
];

/// Accumulates the codewords of one transmission. Alphanumeric content is
/// 7-bit ASCII sent LSB-first, packed across word boundaries; numeric
/// content is five 4-bit nibbles per data word.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    alpha: String,
    numeric: String,
    address: Option<(u32, u8)>,
    has_invalid_codeword: bool,
    partial_bits: u8,
    partial_count: u8,
    valid: bool,
    has_data: bool,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn valid(&self) -> bool {
        self.valid
    }

    pub fn mark_invalid_codeword(&mut self) {
        self.has_invalid_codeword = true;
    }

    pub fn append(&mut self, codeword: &Codeword) {
        match codeword.kind() {
            CodewordKind::Address => {
                self.address = Some((codeword.contents(), codeword.function_bits()));
                self.valid = true;
            }
            CodewordKind::Idle => {}
            CodewordKind::Data => {
                self.has_data = true;
                self.valid = true;

                let mut contents = codeword.contents();
                for _ in 0..DATA_BITS {
                    if contents == 0 {
                        break;
                    }
                    self.partial_bits >>= 1;
                    if contents & Codeword::data_msb_mask() != 0 {
                        self.partial_bits |= 0x40;
                    }
                    if self.partial_count >= 6 {
                        self.alpha.push_str(&escape_ascii(self.partial_bits));
                        self.partial_count = 0;
                        self.partial_bits = 0;
                    } else {
                        self.partial_count += 1;
                    }
                    contents <<= 1;
                }

                let contents = codeword.contents();
                for shift in (0..DATA_BITS).step_by(4).rev() {
                    self.numeric
                        .push(NUMERIC_MAP[((contents >> shift) & 0xF) as usize]);
                }
            }
        }
    }

    pub fn build(self, content_type: ContentType, baud_rate: u16) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let _ = writeln!(
            out,
            "Received at {}",
            chrono::Local::now().format("%a %b %e %H:%M:%S %Y")
        );
        let _ = write!(out, "POCSAG{baud_rate} | Address: ");
        match self.address {
            Some((address, _)) => {
                let _ = write!(out, "{address}");
            }
            None => out.push('-'),
        }
        let _ = write!(out, " | Function: ");
        match self.address {
            Some((_, function)) => {
                let _ = write!(out, "{function}");
            }
            None => out.push('-'),
        }

        if self.has_invalid_codeword {
            let _ = write!(out, " | Errors detected!");
        }

        if self.has_data {
            if matches!(content_type, ContentType::AlphaNumeric | ContentType::Both) {
                let _ = write!(out, "\n\tAlphanumeric: {}", self.alpha);
            }
            if matches!(content_type, ContentType::Numeric | ContentType::Both) {
                let _ = write!(out, "\n\tNumeric: {}", self.numeric);
            }
        } else {
            let _ = write!(out, " (No data)");
        }

        out.push_str("\n\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pack ASCII text into 20-bit data payloads the way a POCSAG
    /// transmitter does: 7 bits per character, LSB transmitted first,
    /// characters packed MSB-of-payload-first.
    pub(crate) fn pack_alpha(text: &str) -> Vec<u32> {
        let mut bits: Vec<bool> = Vec::new();
        for byte in text.bytes() {
            for i in 0..7 {
                bits.push(byte & (1 << i) != 0);
            }
        }
        while bits.len() % DATA_BITS as usize != 0 {
            bits.push(false);
        }

        bits.chunks(DATA_BITS as usize)
            .map(|chunk| {
                chunk
                    .iter()
                    .fold(0u32, |word, &bit| (word << 1) | u32::from(bit))
            })
            .collect()
    }

    fn data_codeword(payload: u32) -> Codeword {
        Codeword::from_corrected(0, (0x10_0000 | payload) << 10)
    }

    #[test]
    fn decodes_packed_alphanumeric_text() {
        let mut builder = MessageBuilder::new();
        for payload in pack_alpha("TEST") {
            builder.append(&data_codeword(payload));
        }
        let record = builder.build(ContentType::AlphaNumeric, 1200);
        assert!(record.contains("Alphanumeric: TEST"), "{record}");
    }

    #[test]
    fn decodes_numeric_nibbles() {
        // 0x12345: nibbles 1 2 3 4 5
        let mut builder = MessageBuilder::new();
        builder.append(&data_codeword(0x12345));
        let record = builder.build(ContentType::Numeric, 512);
        assert!(record.contains("Numeric: 12345"), "{record}");
        assert!(record.contains("POCSAG512"), "{record}");
    }

    #[test]
    fn address_only_messages_report_no_data() {
        let mut builder = MessageBuilder::new();
        builder.append(&Codeword::from_corrected(14, (1_234_567u32 >> 3) << 12));
        assert!(builder.valid());
        let record = builder.build(ContentType::Both, 2400);
        assert!(record.contains("Address: 1234567"), "{record}");
        assert!(record.contains("(No data)"), "{record}");
    }

    #[test]
    fn invalid_codewords_flag_the_record() {
        let mut builder = MessageBuilder::new();
        builder.append(&data_codeword(0x12345));
        builder.mark_invalid_codeword();
        let record = builder.build(ContentType::Numeric, 1200);
        assert!(record.contains("Errors detected!"));
    }
}
