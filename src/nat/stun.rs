//! Minimal STUN message codec (RFC 5389 header, RFC 5780 attributes)
//!
//! Only what behavior discovery needs is implemented: Binding Requests with an
//! optional CHANGE-REQUEST attribute, and Binding Response decoding with
//! address extraction.
//!
//! # Message Layout
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |0 0|     STUN Message Type     |         Message Length        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Magic Cookie                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Transaction ID (96 bits)                  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use super::types::MappedEndpoint;
use bytes::{BufMut, BytesMut};
use rand::RngCore;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use thiserror::Error;

/// STUN magic cookie
pub(crate) const MAGIC_COOKIE: u32 = 0x2112_A442;

/// Fixed STUN header size
pub(crate) const HEADER_SIZE: usize = 20;

pub(crate) const BINDING_REQUEST: u16 = 0x0001;
pub(crate) const BINDING_SUCCESS: u16 = 0x0101;
pub(crate) const BINDING_ERROR: u16 = 0x0111;

pub(crate) const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
pub(crate) const ATTR_CHANGE_REQUEST: u16 = 0x0003;
pub(crate) const ATTR_CHANGED_ADDRESS: u16 = 0x0005;
pub(crate) const ATTR_ERROR_CODE: u16 = 0x0009;
pub(crate) const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;
pub(crate) const ATTR_OTHER_ADDRESS: u16 = 0x802C;

const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

/// CHANGE-REQUEST flag asking for a reply from the alternate IP
const CHANGE_IP_FLAG: u32 = 0x04;
/// CHANGE-REQUEST flag asking for a reply from the alternate port
const CHANGE_PORT_FLAG: u32 = 0x02;

/// 96-bit STUN transaction identifier
pub type TransactionId = [u8; 12];

/// Errors while encoding a STUN message
#[derive(Debug, Error)]
pub enum StunError {
    /// Attribute value does not fit the 16-bit length field
    #[error("Attribute 0x{attr_type:04X} value too long: {len} bytes")]
    AttributeTooLong {
        /// Attribute type
        attr_type: u16,
        /// Value length in bytes
        len: usize,
    },

    /// Attribute section does not fit the 16-bit message length field
    #[error("Message body too long: {0} bytes")]
    MessageTooLong(usize),
}

/// Errors while decoding a STUN message
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Buffer shorter than the fixed header
    #[error("Message too short: {0} bytes")]
    TooShort(usize),

    /// Leading bits are not zero, so this is not STUN
    #[error("Not a STUN message (type 0x{0:04X})")]
    NotStun(u16),

    /// Magic cookie mismatch
    #[error("Invalid magic cookie: 0x{0:08X}")]
    BadMagicCookie(u32),

    /// Declared length is larger than the buffer
    #[error("Declared length {declared} exceeds available {available} bytes")]
    LengthMismatch {
        /// Length from the header
        declared: usize,
        /// Bytes after the header
        available: usize,
    },

    /// Declared length is not a multiple of four
    #[error("Message length {0} is not 4-byte aligned")]
    UnalignedLength(usize),

    /// An attribute runs past the end of the message
    #[error("Attribute 0x{attr_type:04X} truncated at offset {offset}")]
    TruncatedAttribute {
        /// Attribute type
        attr_type: u16,
        /// Offset of the attribute header
        offset: usize,
    },

    /// Server answered with a Binding Error Response
    #[error("Server returned error response (code {code:?})")]
    ErrorResponse {
        /// ERROR-CODE value when present
        code: Option<u16>,
    },

    /// Message type other than a Binding Response
    #[error("Unexpected message type: 0x{0:04X}")]
    UnexpectedType(u16),
}

/// CHANGE-REQUEST flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeRequest {
    /// Reply from the alternate IP address
    pub change_ip: bool,
    /// Reply from the alternate port
    pub change_port: bool,
}

impl ChangeRequest {
    /// Ask for a reply from both the alternate IP and the alternate port
    pub fn ip_and_port() -> Self {
        Self {
            change_ip: true,
            change_port: true,
        }
    }

    fn flags(&self) -> u32 {
        let mut flags = 0;
        if self.change_ip {
            flags |= CHANGE_IP_FLAG;
        }
        if self.change_port {
            flags |= CHANGE_PORT_FLAG;
        }
        flags
    }
}

/// A raw STUN attribute (type + value, without padding)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StunAttribute {
    /// Attribute type
    pub attr_type: u16,
    /// Attribute value
    pub value: Vec<u8>,
}

impl StunAttribute {
    /// Build a CHANGE-REQUEST attribute
    pub fn change_request(request: ChangeRequest) -> Self {
        Self {
            attr_type: ATTR_CHANGE_REQUEST,
            value: request.flags().to_be_bytes().to_vec(),
        }
    }

    /// Build an XOR-MAPPED-ADDRESS attribute for the given transaction
    pub fn xor_mapped_address(addr: SocketAddr, transaction_id: &TransactionId) -> Self {
        let port = addr.port() ^ (MAGIC_COOKIE >> 16) as u16;
        let key = xor_key(transaction_id);
        let ip = match addr.ip() {
            IpAddr::V4(ip) => xor_bytes(&ip.octets(), &key),
            IpAddr::V6(ip) => xor_bytes(&ip.octets(), &key),
        };
        Self {
            attr_type: ATTR_XOR_MAPPED_ADDRESS,
            value: encode_address_value(addr.ip(), port, &ip),
        }
    }

    /// Build a plain address attribute (MAPPED-ADDRESS, OTHER-ADDRESS, CHANGED-ADDRESS)
    pub fn address(attr_type: u16, addr: SocketAddr) -> Self {
        let ip = match addr.ip() {
            IpAddr::V4(ip) => ip.octets().to_vec(),
            IpAddr::V6(ip) => ip.octets().to_vec(),
        };
        Self {
            attr_type,
            value: encode_address_value(addr.ip(), addr.port(), &ip),
        }
    }
}

/// An encoded Binding Request ready to send
#[derive(Debug, Clone)]
pub struct BindingRequest {
    /// Random transaction ID carried in the header
    pub transaction_id: TransactionId,
    /// Wire bytes
    pub bytes: Vec<u8>,
}

/// Build a Binding Request with a fresh random transaction ID
pub fn build_binding_request(extra: &[StunAttribute]) -> Result<BindingRequest, StunError> {
    let mut transaction_id = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut transaction_id);

    let bytes = encode_message(BINDING_REQUEST, &transaction_id, extra)?;
    Ok(BindingRequest {
        transaction_id,
        bytes,
    })
}

/// Encode a STUN message with the given type, transaction ID and attributes
pub fn encode_message(
    message_type: u16,
    transaction_id: &TransactionId,
    attributes: &[StunAttribute],
) -> Result<Vec<u8>, StunError> {
    let mut body = BytesMut::new();
    for attr in attributes {
        let len = u16::try_from(attr.value.len()).map_err(|_| StunError::AttributeTooLong {
            attr_type: attr.attr_type,
            len: attr.value.len(),
        })?;
        body.put_u16(attr.attr_type);
        body.put_u16(len);
        body.put_slice(&attr.value);
        body.put_bytes(0, padding(attr.value.len()));
    }

    let body_len = u16::try_from(body.len()).map_err(|_| StunError::MessageTooLong(body.len()))?;

    let mut message = BytesMut::with_capacity(HEADER_SIZE + body.len());
    message.put_u16(message_type);
    message.put_u16(body_len);
    message.put_u32(MAGIC_COOKIE);
    message.put_slice(transaction_id);
    message.extend_from_slice(&body);

    Ok(message.to_vec())
}

/// A decoded STUN Binding Response
#[derive(Debug, Clone)]
pub struct StunMessage {
    /// Message type from the header
    pub message_type: u16,
    /// Transaction ID from the header
    pub transaction_id: TransactionId,
    attributes: HashMap<u16, Vec<u8>>,
}

impl StunMessage {
    /// Raw value of an attribute, if present
    pub fn attribute(&self, attr_type: u16) -> Option<&[u8]> {
        self.attributes.get(&attr_type).map(Vec::as_slice)
    }

    /// Externally observed address, preferring XOR-MAPPED-ADDRESS over MAPPED-ADDRESS
    pub fn mapped_address(&self) -> Option<MappedEndpoint> {
        let addr = self
            .attribute(ATTR_XOR_MAPPED_ADDRESS)
            .and_then(|value| parse_xor_address(value, &self.transaction_id))
            .or_else(|| {
                self.attribute(ATTR_MAPPED_ADDRESS)
                    .and_then(parse_address)
            })?;

        Some(MappedEndpoint {
            ip: addr.ip(),
            port: addr.port(),
        })
    }

    /// Server's alternate address from OTHER-ADDRESS or legacy CHANGED-ADDRESS
    pub fn other_address(&self) -> Option<SocketAddr> {
        self.attribute(ATTR_OTHER_ADDRESS)
            .and_then(parse_address)
            .or_else(|| self.attribute(ATTR_CHANGED_ADDRESS).and_then(parse_address))
    }
}

/// Decode a Binding Response
pub fn decode_response(data: &[u8]) -> Result<StunMessage, DecodeError> {
    if data.len() < HEADER_SIZE {
        return Err(DecodeError::TooShort(data.len()));
    }

    let message_type = u16::from_be_bytes([data[0], data[1]]);
    if message_type & 0xC000 != 0 {
        return Err(DecodeError::NotStun(message_type));
    }

    let declared = u16::from_be_bytes([data[2], data[3]]) as usize;

    let cookie = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    if cookie != MAGIC_COOKIE {
        return Err(DecodeError::BadMagicCookie(cookie));
    }

    let available = data.len() - HEADER_SIZE;
    if declared > available {
        return Err(DecodeError::LengthMismatch {
            declared,
            available,
        });
    }
    if declared % 4 != 0 {
        return Err(DecodeError::UnalignedLength(declared));
    }

    let mut transaction_id = [0u8; 12];
    transaction_id.copy_from_slice(&data[8..HEADER_SIZE]);

    let attributes = parse_attributes(&data[HEADER_SIZE..HEADER_SIZE + declared])?;

    match message_type {
        BINDING_SUCCESS => Ok(StunMessage {
            message_type,
            transaction_id,
            attributes,
        }),
        BINDING_ERROR => Err(DecodeError::ErrorResponse {
            code: attributes.get(&ATTR_ERROR_CODE).and_then(|v| parse_error_code(v)),
        }),
        other => Err(DecodeError::UnexpectedType(other)),
    }
}

fn parse_attributes(body: &[u8]) -> Result<HashMap<u16, Vec<u8>>, DecodeError> {
    let mut attributes = HashMap::new();
    let mut offset = 0;

    while offset < body.len() {
        if offset + 4 > body.len() {
            return Err(DecodeError::TruncatedAttribute {
                attr_type: 0,
                offset: HEADER_SIZE + offset,
            });
        }

        let attr_type = u16::from_be_bytes([body[offset], body[offset + 1]]);
        let len = u16::from_be_bytes([body[offset + 2], body[offset + 3]]) as usize;
        let start = offset + 4;

        if start + len > body.len() {
            return Err(DecodeError::TruncatedAttribute {
                attr_type,
                offset: HEADER_SIZE + offset,
            });
        }

        // Only the first occurrence of an attribute type is significant
        attributes
            .entry(attr_type)
            .or_insert_with(|| body[start..start + len].to_vec());

        offset = start + len + padding(len);
    }

    Ok(attributes)
}

/// ERROR-CODE: 21 reserved bits, 3-bit class, 8-bit number
fn parse_error_code(value: &[u8]) -> Option<u16> {
    if value.len() < 4 {
        return None;
    }
    let class = (value[2] & 0x07) as u16;
    let number = value[3] as u16;
    Some(class * 100 + number)
}

fn parse_address(value: &[u8]) -> Option<SocketAddr> {
    let (family, port, ip) = split_address(value)?;
    let ip = match family {
        FAMILY_IPV4 => IpAddr::V4(Ipv4Addr::new(ip[0], ip[1], ip[2], ip[3])),
        _ => IpAddr::V6(Ipv6Addr::from(<[u8; 16]>::try_from(ip).ok()?)),
    };
    Some(SocketAddr::new(ip, port))
}

fn parse_xor_address(value: &[u8], transaction_id: &TransactionId) -> Option<SocketAddr> {
    let (family, port, ip) = split_address(value)?;
    let port = port ^ (MAGIC_COOKIE >> 16) as u16;
    let ip = xor_bytes(ip, &xor_key(transaction_id));
    let ip = match family {
        FAMILY_IPV4 => IpAddr::V4(Ipv4Addr::new(ip[0], ip[1], ip[2], ip[3])),
        _ => IpAddr::V6(Ipv6Addr::from(<[u8; 16]>::try_from(ip.as_slice()).ok()?)),
    };
    Some(SocketAddr::new(ip, port))
}

/// Split an address value into (family, port, address bytes)
fn split_address(value: &[u8]) -> Option<(u8, u16, &[u8])> {
    if value.len() < 4 {
        return None;
    }
    let family = value[1];
    let port = u16::from_be_bytes([value[2], value[3]]);
    let ip_len = match family {
        FAMILY_IPV4 => 4,
        FAMILY_IPV6 => 16,
        _ => return None,
    };
    let ip = value.get(4..4 + ip_len)?;
    Some((family, port, ip))
}

fn encode_address_value(ip: IpAddr, port: u16, ip_bytes: &[u8]) -> Vec<u8> {
    let family = match ip {
        IpAddr::V4(_) => FAMILY_IPV4,
        IpAddr::V6(_) => FAMILY_IPV6,
    };
    let mut value = Vec::with_capacity(4 + ip_bytes.len());
    value.push(0);
    value.push(family);
    value.extend_from_slice(&port.to_be_bytes());
    value.extend_from_slice(ip_bytes);
    value
}

/// Magic cookie followed by the transaction ID
fn xor_key(transaction_id: &TransactionId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    key[4..].copy_from_slice(transaction_id);
    key
}

fn xor_bytes(data: &[u8], key: &[u8; 16]) -> Vec<u8> {
    data.iter().zip(key.iter()).map(|(d, k)| d ^ k).collect()
}

fn padding(len: usize) -> usize {
    (4 - len % 4) % 4
}
