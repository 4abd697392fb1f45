/// MIPI-DSI packet encoding for the command FIFOs
///
/// Short packets carry the data id and two parameter bytes in the header
/// word. Long packets push their payload into the payload FIFO first (four
/// bytes per word, little-endian) and then a header carrying the 16-bit word
/// count.

// Processor to peripheral data types
pub const GENERIC_SHORT_WRITE_0_PARAM: u8 = 0x03;
pub const GENERIC_SHORT_WRITE_1_PARAM: u8 = 0x13;
pub const GENERIC_SHORT_WRITE_2_PARAM: u8 = 0x23;
pub const GENERIC_READ_REQUEST_0_PARAM: u8 = 0x04;
pub const GENERIC_READ_REQUEST_1_PARAM: u8 = 0x14;
pub const GENERIC_READ_REQUEST_2_PARAM: u8 = 0x24;
pub const DCS_SHORT_WRITE: u8 = 0x05;
pub const DCS_SHORT_WRITE_PARAM: u8 = 0x15;
pub const DCS_READ: u8 = 0x06;
pub const SET_MAXIMUM_RETURN_PACKET_SIZE: u8 = 0x37;
pub const COMPRESSION_MODE: u8 = 0x07;
pub const COLOR_MODE_OFF: u8 = 0x02;
pub const COLOR_MODE_ON: u8 = 0x12;
pub const SHUTDOWN_PERIPHERAL: u8 = 0x22;
pub const TURN_ON_PERIPHERAL: u8 = 0x32;
pub const GENERIC_LONG_WRITE: u8 = 0x29;
pub const DCS_LONG_WRITE: u8 = 0x39;
pub const PICTURE_PARAMETER_SET: u8 = 0x0a;

// Peripheral to processor data types
pub const RX_ACKNOWLEDGE_AND_ERROR_REPORT: u8 = 0x02;
pub const RX_END_OF_TRANSMISSION: u8 = 0x08;
pub const RX_GENERIC_SHORT_READ_RESPONSE_1BYTE: u8 = 0x11;
pub const RX_GENERIC_SHORT_READ_RESPONSE_2BYTE: u8 = 0x12;
pub const RX_GENERIC_LONG_READ_RESPONSE: u8 = 0x1a;
pub const RX_DCS_LONG_READ_RESPONSE: u8 = 0x1c;
pub const RX_DCS_SHORT_READ_RESPONSE_1BYTE: u8 = 0x21;
pub const RX_DCS_SHORT_READ_RESPONSE_2BYTE: u8 = 0x22;

// DCS commands that update the partial-update window
pub const DCS_SET_COLUMN_ADDRESS: u8 = 0x2a;
pub const DCS_SET_PAGE_ADDRESS: u8 = 0x2b;

/// Largest payload a long packet header can describe
pub const MAX_LONG_PAYLOAD: usize = u16::MAX as usize;

/// How a data id is put on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketClass {
    /// Header only, up to two parameter bytes
    Short,
    /// Header only, followed by a bus turn-around
    ReadRequest,
    /// Payload words followed by a header with the word count
    Long,
}

impl PacketClass {
    /// Classify a processor-to-peripheral data id. `None` for ids the
    /// transport does not send.
    pub fn of(data_id: u8) -> Option<Self> {
        match data_id {
            GENERIC_SHORT_WRITE_0_PARAM
            | GENERIC_SHORT_WRITE_1_PARAM
            | GENERIC_SHORT_WRITE_2_PARAM
            | DCS_SHORT_WRITE
            | DCS_SHORT_WRITE_PARAM
            | SET_MAXIMUM_RETURN_PACKET_SIZE
            | COMPRESSION_MODE
            | COLOR_MODE_OFF
            | COLOR_MODE_ON
            | SHUTDOWN_PERIPHERAL
            | TURN_ON_PERIPHERAL => Some(PacketClass::Short),
            GENERIC_READ_REQUEST_0_PARAM
            | GENERIC_READ_REQUEST_1_PARAM
            | GENERIC_READ_REQUEST_2_PARAM
            | DCS_READ => Some(PacketClass::ReadRequest),
            GENERIC_LONG_WRITE | DCS_LONG_WRITE | PICTURE_PARAMETER_SET => Some(PacketClass::Long),
            _ => None,
        }
    }
}

/// Data id used for a write when the caller does not name one
pub fn default_write_type(len: usize) -> Option<u8> {
    match len {
        0 => None,
        1 => Some(DCS_SHORT_WRITE),
        2 => Some(DCS_SHORT_WRITE_PARAM),
        _ => Some(DCS_LONG_WRITE),
    }
}

/// Packet header word: data id in bits 0-7, then the two header bytes
pub fn header_word(data_id: u8, d0: u8, d1: u8) -> u32 {
    u32::from(data_id) | u32::from(d0) << 8 | u32::from(d1) << 16
}

/// Header word of a long packet carrying `len` payload bytes
pub fn long_header_word(data_id: u8, len: u16) -> u32 {
    let [lo, hi] = len.to_le_bytes();
    header_word(data_id, lo, hi)
}

/// Split a header word back into `(data_id, d0, d1)`
pub fn decode_header(word: u32) -> (u8, u8, u8) {
    let [id, d0, d1, _] = word.to_le_bytes();
    (id, d0, d1)
}

/// Word count of a long packet header
pub fn long_header_len(word: u32) -> u16 {
    let (_, lo, hi) = decode_header(word);
    u16::from_le_bytes([lo, hi])
}

/// Payload FIFO words for a long packet. The last word is zero padded.
pub fn pack_payload(payload: &[u8]) -> impl Iterator<Item = u32> + '_ {
    payload.chunks(4).map(|chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        u32::from_le_bytes(word)
    })
}

/// Commands that have to see the header FIFO drained before returning:
/// reads, and the partial-update window setters.
pub fn needs_fifo_drain(data_id: u8, d0: u8) -> bool {
    data_id == DCS_READ || d0 == DCS_SET_COLUMN_ADDRESS || d0 == DCS_SET_PAGE_ADDRESS
}

/// Error bits of an acknowledge and error report
pub const ACK_ERROR_NAMES: [&str; 16] = [
    "SoT error",
    "SoT sync error",
    "EoT sync error",
    "escape mode entry command error",
    "LP transmit sync error",
    "HS receive timeout error",
    "false control error",
    "contention detected",
    "ECC error, single-bit",
    "ECC error, multi-bit",
    "checksum error",
    "DSI data type not recognized",
    "DSI VC ID invalid",
    "invalid transmission length",
    "reserved",
    "DSI protocol violation",
];

/// Names of the bits set in an error report
pub fn ack_error_names(errors: u16) -> impl Iterator<Item = &'static str> {
    ACK_ERROR_NAMES
        .iter()
        .enumerate()
        .filter(move |(bit, _)| errors & (1 << bit) != 0)
        .map(|(_, name)| *name)
}

/// First word of a peripheral response, classified by its type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxPacket {
    /// Acknowledge with the 16-bit error field (0 = plain ack)
    AckError(u16),
    EndOfTransmission,
    /// Short read response with one or two valid bytes
    Short { data: [u8; 2], len: usize },
    /// Long read response header; `len` payload bytes follow in the FIFO
    Long { len: u16 },
}

impl RxPacket {
    /// Classify an RX FIFO header word. Returns the unknown type byte on
    /// failure.
    pub fn parse(word: u32) -> Result<Self, u8> {
        let [ty, b0, b1, _] = word.to_le_bytes();
        match ty {
            RX_ACKNOWLEDGE_AND_ERROR_REPORT => Ok(RxPacket::AckError(u16::from_le_bytes([b0, b1]))),
            RX_END_OF_TRANSMISSION => Ok(RxPacket::EndOfTransmission),
            RX_DCS_SHORT_READ_RESPONSE_1BYTE | RX_GENERIC_SHORT_READ_RESPONSE_1BYTE => {
                Ok(RxPacket::Short { data: [b0, 0], len: 1 })
            }
            RX_DCS_SHORT_READ_RESPONSE_2BYTE | RX_GENERIC_SHORT_READ_RESPONSE_2BYTE => {
                Ok(RxPacket::Short { data: [b0, b1], len: 2 })
            }
            RX_DCS_LONG_READ_RESPONSE | RX_GENERIC_LONG_READ_RESPONSE => {
                Ok(RxPacket::Long { len: u16::from_le_bytes([b0, b1]) })
            }
            other => Err(other),
        }
    }
}
