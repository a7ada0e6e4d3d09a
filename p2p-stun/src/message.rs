
use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, BytesMut};
use rand::Rng;
use shared::error::*;
use std::fmt;

use crate::attributes::*;

// MAGIC_COOKIE is fixed value that aids in distinguishing STUN packets
// from packets of other protocols when STUN is multiplexed with those
// other protocols on the same Port.
//
// The magic cookie field MUST contain the fixed value 0x2112A442 in
// network byte order.
//
// Defined in "STUN Message Structure", section 6.
pub const MAGIC_COOKIE: u32 = 0x2112A442;
pub const ATTRIBUTE_HEADER_SIZE: usize = 4;
pub const MESSAGE_HEADER_SIZE: usize = 20;

// TRANSACTION_ID_SIZE is length of transaction id array (in bytes).
pub const TRANSACTION_ID_SIZE: usize = 12; // 96 bit

/// is_message returns true if b looks like STUN message.
/// Useful for multiplexing. is_message does not guarantee
/// that decoding will be successful.
pub fn is_message(b: &[u8]) -> bool {
    b.len() >= MESSAGE_HEADER_SIZE
        && b[0] & 0xc0 == 0
        && BigEndian::read_u32(&b[4..8]) == MAGIC_COOKIE
}

/// TransactionId is the 96-bit identifier correlating requests and responses.
#[derive(PartialEq, Eq, Hash, Copy, Clone, Default, Debug, PartialOrd, Ord)]
pub struct TransactionId(pub [u8; TRANSACTION_ID_SIZE]);

impl TransactionId {
    /// new returns new random transaction ID using crypto/rand
    /// as source.
    pub fn new() -> Self {
        let mut b = [0u8; TRANSACTION_ID_SIZE];
        rand::rng().fill(&mut b[..]);
        TransactionId(b)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// MessageClass is 8-bit representation of 2-bit class of STUN Message Class.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
pub enum MessageClass {
    #[default]
    Request,
    Indication,
    SuccessResponse,
    ErrorResponse,
}

impl MessageClass {
    fn value(&self) -> u16 {
        match self {
            MessageClass::Request => 0x00,
            MessageClass::Indication => 0x01,
            MessageClass::SuccessResponse => 0x02,
            MessageClass::ErrorResponse => 0x03,
        }
    }

    fn from_value(v: u16) -> Self {
        match v & 0x03 {
            0x00 => MessageClass::Request,
            0x01 => MessageClass::Indication,
            0x02 => MessageClass::SuccessResponse,
            _ => MessageClass::ErrorResponse,
        }
    }

    /// Returns true for success and error responses.
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            MessageClass::SuccessResponse | MessageClass::ErrorResponse
        )
    }
}

impl fmt::Display for MessageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageClass::Request => "request",
            MessageClass::Indication => "indication",
            MessageClass::SuccessResponse => "success response",
            MessageClass::ErrorResponse => "error response",
        };
        write!(f, "{s}")
    }
}

/// Method is uint16 representation of 12-bit STUN method.
#[derive(Default, PartialEq, Eq, Hash, Debug, Copy, Clone)]
pub struct Method(pub u16);

pub const METHOD_BINDING: Method = Method(0x001);

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            METHOD_BINDING => write!(f, "Binding"),
            Method(v) => write!(f, "0x{v:x}"),
        }
    }
}

// MessageType is STUN Message Type Field.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy)]
pub struct MessageType {
    pub method: Method,
    pub class: MessageClass,
}

// BINDING_REQUEST is message type for Binding request.
pub const BINDING_REQUEST: MessageType = MessageType {
    method: METHOD_BINDING,
    class: MessageClass::Request,
};
// BINDING_SUCCESS is message type for Binding success response.
pub const BINDING_SUCCESS: MessageType = MessageType {
    method: METHOD_BINDING,
    class: MessageClass::SuccessResponse,
};
// BINDING_ERROR is message type for Binding error response.
pub const BINDING_ERROR: MessageType = MessageType {
    method: METHOD_BINDING,
    class: MessageClass::ErrorResponse,
};

const METHOD_ABITS: u16 = 0xf; // 0b0000000000001111
const METHOD_BBITS: u16 = 0x70; // 0b0000000001110000
const METHOD_DBITS: u16 = 0xf80; // 0b0000111110000000

const METHOD_BSHIFT: u16 = 1;
const METHOD_DSHIFT: u16 = 2;

const FIRST_BIT: u16 = 0x1;
const SECOND_BIT: u16 = 0x2;

const C0BIT: u16 = FIRST_BIT;
const C1BIT: u16 = SECOND_BIT;

const CLASS_C0SHIFT: u16 = 4;
const CLASS_C1SHIFT: u16 = 7;

impl MessageType {
    pub const fn new(method: Method, class: MessageClass) -> Self {
        MessageType { method, class }
    }

    /// value returns bit representation of messageType.
    pub fn value(&self) -> u16 {
        //	 0                 1
        //	 2  3  4 5 6 7 8 9 0 1 2 3 4 5
        //	+--+--+-+-+-+-+-+-+-+-+-+-+-+-+
        //	|M |M |M|M|M|C|M|M|M|C|M|M|M|M|
        //	|11|10|9|8|7|1|6|5|4|0|3|2|1|0|
        //	+--+--+-+-+-+-+-+-+-+-+-+-+-+-+
        // Figure 3: Format of STUN Message Type Field

        // Warning: Abandon all hope ye who enter here.
        // Splitting M into A(M0-M3), B(M4-M6), D(M7-M11).
        let method = self.method.0;
        let a = method & METHOD_ABITS; // A = M * 0b0000000000001111 (right 4 bits)
        let b = method & METHOD_BBITS; // B = M * 0b0000000001110000 (3 bits after A)
        let d = method & METHOD_DBITS; // D = M * 0b0000111110000000 (5 bits after B)

        // Shifting to add "holes" for C0 (at 4 bit) and C1 (8 bit).
        let method = a + (b << METHOD_BSHIFT) + (d << METHOD_DSHIFT);

        // C0 is zero bit of C, C1 is first bit.
        // C0 = C * 0b01, C1 = (C * 0b10) >> 1
        // Ct = C0 << 4 + C1 << 8.
        // Optimizations: "((C * 0b10) >> 1) << 8" as "(C * 0b10) << 7"
        // We need C0 shifted by 4, and C1 by 8 to fit "11" and "7" positions
        // (see figure 3).
        let c = self.class.value();
        let c0 = (c & C0BIT) << CLASS_C0SHIFT;
        let c1 = (c & C1BIT) << CLASS_C1SHIFT;
        let class = c0 + c1;

        method + class
    }

    /// read_value decodes uint16 into MessageType.
    pub fn read_value(value: u16) -> Self {
        // Decoding class.
        // We are taking first bit from v >> 4 and second from v >> 7.
        let c0 = (value >> CLASS_C0SHIFT) & C0BIT;
        let c1 = (value >> CLASS_C1SHIFT) & C1BIT;
        let class = MessageClass::from_value(c0 + c1);

        // Decoding method.
        let a = value & METHOD_ABITS; // A(M0-M3)
        let b = (value >> METHOD_BSHIFT) & METHOD_BBITS; // B(M4-M6)
        let d = (value >> METHOD_DSHIFT) & METHOD_DBITS; // D(M7-M11)
        let method = Method(a + b + d);

        MessageType { method, class }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.class)
    }
}

/// Message represents a single STUN packet.
///
/// Attributes are kept in the order they were added or decoded, and
/// [Message::get] returns the first attribute of the requested type.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub typ: MessageType,
    pub transaction_id: TransactionId,
    pub attributes: Vec<RawAttribute>,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} l={} attrs={} id={}",
            self.typ,
            self.length(),
            self.attributes.len(),
            self.transaction_id
        )
    }
}

impl Message {
    /// new returns an empty message of the given type with a fresh transaction id.
    pub fn new(typ: MessageType) -> Self {
        Message {
            typ,
            transaction_id: TransactionId::new(),
            attributes: vec![],
        }
    }

    /// new_response returns an empty message of the given type that answers `request`.
    pub fn new_response(typ: MessageType, request: &Message) -> Self {
        Message {
            typ,
            transaction_id: request.transaction_id,
            attributes: vec![],
        }
    }

    /// build applies setters to message in order.
    pub fn build(&mut self, setters: &[&dyn Setter]) -> Result<()> {
        for s in setters {
            s.add_to(self)?;
        }
        Ok(())
    }

    /// add appends new attribute to message.
    ///
    /// Value of attribute is copied to internal buffer so
    /// it is safe to reuse v.
    pub fn add(&mut self, t: AttrType, v: &[u8]) {
        self.attributes.push(RawAttribute {
            typ: t,
            length: v.len() as u16,
            value: v.to_vec(),
        });
    }

    /// get returns byte slice that represents attribute value,
    /// if there is no attribute with such type,
    /// ErrAttributeNotFound is returned.
    pub fn get(&self, t: AttrType) -> Result<&[u8]> {
        self.attributes
            .iter()
            .find(|a| a.typ == t)
            .map(|a| a.value.as_slice())
            .ok_or(Error::ErrAttributeNotFound)
    }

    /// contains return true if message contain t attribute.
    pub fn contains(&self, t: AttrType) -> bool {
        self.attributes.iter().any(|a| a.typ == t)
    }

    /// length of the attribute section, including padding.
    pub fn length(&self) -> usize {
        self.attributes
            .iter()
            .map(|a| ATTRIBUTE_HEADER_SIZE + nearest_padded_value_length(a.value.len()))
            .sum()
    }

    /// marshal encodes the header and every attribute into a new buffer.
    pub fn marshal(&self) -> BytesMut {
        let length = self.length();
        let mut buf = BytesMut::with_capacity(MESSAGE_HEADER_SIZE + length);
        buf.put_u16(self.typ.value());
        buf.put_u16(length as u16);
        buf.put_u32(MAGIC_COOKIE);
        buf.put_slice(&self.transaction_id.0);
        for a in &self.attributes {
            buf.put_u16(a.typ.value());
            buf.put_u16(a.length);
            buf.put_slice(&a.value);
            let padding = nearest_padded_value_length(a.value.len()) - a.value.len();
            buf.put_bytes(0, padding);
        }
        buf
    }

    /// unmarshal decodes a complete STUN message from `buf`.
    pub fn unmarshal(buf: &[u8]) -> Result<Self> {
        if buf.len() < MESSAGE_HEADER_SIZE {
            return Err(Error::ErrUnexpectedHeaderEof);
        }

        let t = BigEndian::read_u16(&buf[0..2]); // first 2 bytes
        let size = BigEndian::read_u16(&buf[2..4]) as usize; // second 2 bytes
        let cookie = BigEndian::read_u32(&buf[4..8]); // last 4 bytes
        let full_size = MESSAGE_HEADER_SIZE + size;

        if cookie != MAGIC_COOKIE {
            return Err(Error::ErrInvalidMagicCookie(cookie));
        }
        if buf.len() < full_size {
            return Err(Error::ErrBufferLengthMismatch(buf.len(), full_size));
        }

        let mut transaction_id = TransactionId::default();
        transaction_id
            .0
            .copy_from_slice(&buf[8..MESSAGE_HEADER_SIZE]);

        let mut m = Message {
            typ: MessageType::read_value(t),
            transaction_id,
            attributes: vec![],
        };

        let mut b = &buf[MESSAGE_HEADER_SIZE..full_size];
        while !b.is_empty() {
            if b.len() < ATTRIBUTE_HEADER_SIZE {
                return Err(Error::ErrUnexpectedHeaderEof);
            }

            let typ = AttrType(BigEndian::read_u16(&b[0..2])); // first 2 bytes
            let length = BigEndian::read_u16(&b[2..4]); // second 2 bytes
            let a_l = length as usize; // attribute length
            let a_buff_l = nearest_padded_value_length(a_l); // expected buffer length (with padding)

            b = &b[ATTRIBUTE_HEADER_SIZE..]; // slicing again to simplify value read
            if b.len() < a_l {
                return Err(Error::ErrAttributeSizeOverflow);
            }

            m.attributes.push(RawAttribute {
                typ,
                length,
                value: b[..a_l].to_vec(),
            });

            // The last attribute is allowed to omit its padding.
            b = &b[a_buff_l.min(b.len())..];
        }

        Ok(m)
    }
}
