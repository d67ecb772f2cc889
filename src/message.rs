//! DHCP/BOOTP wire codec.
//!
//! The fixed header is 236 bytes. Multi-byte header fields are written in
//! the byte order of the deployed x86 servers this one replaces (little
//! endian), except `secs`, which is big endian on the wire. The two must
//! stay this way for those servers and this one to read each other's
//! datagrams.

use std::convert::TryFrom;
use std::net::Ipv4Addr;

use nom::bytes::complete::take;
use nom::combinator::map;
use nom::multi::length_data;
use nom::number::complete::{be_u16, be_u32, le_u16, le_u32, u8 as byte};
use nom::IResult;

use crate::address::{parse_ipv4, HardwareAddress};
use crate::error::MessageError;

pub const HEADER_LEN: usize = 236;

/// Cookie emitted in front of the options area.
pub const MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];
/// Byte-swapped cookie written by older servers; accepted on decode only.
pub const ALT_MAGIC_COOKIE: [u8; 4] = [99, 83, 130, 99];

pub const HARDWARE_ETHERNET: u8 = 1;

const LEGACY_AREA_LEN: usize = 192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    BootRequest = 1,
    BootReply = 2,
}

impl TryFrom<u8> for Operation {
    type Error = MessageError;

    fn try_from(value: u8) -> Result<Operation, MessageError> {
        match value {
            1 => Ok(Operation::BootRequest),
            2 => Ok(Operation::BootReply),
            other => Err(MessageError::InvalidOperation(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionCode {
    Pad,
    SubnetMask,
    Router,
    DomainNameServer,
    Hostname,
    DomainNameSuffix,
    AddressRequest,
    AddressTime,
    MessageType,
    ServerIdentifier,
    ParameterRequestList,
    Message,
    MaxMessageSize,
    ClassId,
    ClientId,
    AutoConfig,
    End,
    /// Any code this server does not interpret. Carried through untouched.
    Other(u8),
}

impl From<u8> for OptionCode {
    fn from(code: u8) -> OptionCode {
        match code {
            0 => OptionCode::Pad,
            1 => OptionCode::SubnetMask,
            3 => OptionCode::Router,
            6 => OptionCode::DomainNameServer,
            12 => OptionCode::Hostname,
            15 => OptionCode::DomainNameSuffix,
            50 => OptionCode::AddressRequest,
            51 => OptionCode::AddressTime,
            53 => OptionCode::MessageType,
            54 => OptionCode::ServerIdentifier,
            55 => OptionCode::ParameterRequestList,
            56 => OptionCode::Message,
            57 => OptionCode::MaxMessageSize,
            60 => OptionCode::ClassId,
            61 => OptionCode::ClientId,
            116 => OptionCode::AutoConfig,
            255 => OptionCode::End,
            other => OptionCode::Other(other),
        }
    }
}

impl From<OptionCode> for u8 {
    fn from(code: OptionCode) -> u8 {
        match code {
            OptionCode::Pad => 0,
            OptionCode::SubnetMask => 1,
            OptionCode::Router => 3,
            OptionCode::DomainNameServer => 6,
            OptionCode::Hostname => 12,
            OptionCode::DomainNameSuffix => 15,
            OptionCode::AddressRequest => 50,
            OptionCode::AddressTime => 51,
            OptionCode::MessageType => 53,
            OptionCode::ServerIdentifier => 54,
            OptionCode::ParameterRequestList => 55,
            OptionCode::Message => 56,
            OptionCode::MaxMessageSize => 57,
            OptionCode::ClassId => 60,
            OptionCode::ClientId => 61,
            OptionCode::AutoConfig => 116,
            OptionCode::End => 255,
            OptionCode::Other(other) => other,
        }
    }
}

impl OptionCode {
    /// Collapses `Other(n)` onto the named variant when `n` is a known code.
    fn normalize(self) -> OptionCode {
        OptionCode::from(u8::from(self))
    }

    fn is_framing(self) -> bool {
        matches!(self, OptionCode::Pad | OptionCode::End)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Discover = 1,
    Offer,
    Request,
    Decline,
    Ack,
    Nak,
    Release,
    Inform,
    ForceRenew,
    LeaseQuery,
    LeaseUnassigned,
    LeaseUnknown,
    LeaseActive,
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(value: u8) -> Result<MessageType, u8> {
        Ok(match value {
            1 => MessageType::Discover,
            2 => MessageType::Offer,
            3 => MessageType::Request,
            4 => MessageType::Decline,
            5 => MessageType::Ack,
            6 => MessageType::Nak,
            7 => MessageType::Release,
            8 => MessageType::Inform,
            9 => MessageType::ForceRenew,
            10 => MessageType::LeaseQuery,
            11 => MessageType::LeaseUnassigned,
            12 => MessageType::LeaseUnknown,
            13 => MessageType::LeaseActive,
            other => return Err(other),
        })
    }
}

/// A decoded DHCP message.
///
/// Options are unique by code and kept in insertion order. `option_ordering`
/// only affects [`DhcpMessage::encode`]: codes listed there are written
/// first, in that order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpMessage {
    pub operation: Operation,
    pub hardware_type: u8,
    pub hardware_len: u8,
    pub hops: u8,
    pub session_id: u32,
    pub seconds_elapsed: u16,
    pub flags: u16,
    pub client_address: Ipv4Addr,
    pub assigned_address: Ipv4Addr,
    pub next_server_address: Ipv4Addr,
    pub relay_agent_address: Ipv4Addr,
    pub client_hardware: [u8; 16],
    pub option_ordering: Vec<u8>,
    options: Vec<(OptionCode, Vec<u8>)>,
}

impl Default for DhcpMessage {
    fn default() -> DhcpMessage {
        DhcpMessage::new(Operation::BootRequest)
    }
}

struct Header {
    op: u8,
    hardware_type: u8,
    hardware_len: u8,
    hops: u8,
    session_id: u32,
    seconds_elapsed: u16,
    flags: u16,
    client_address: Ipv4Addr,
    assigned_address: Ipv4Addr,
    next_server_address: Ipv4Addr,
    relay_agent_address: Ipv4Addr,
    client_hardware: [u8; 16],
}

fn ipv4(input: &[u8]) -> IResult<&[u8], Ipv4Addr> {
    map(be_u32, Ipv4Addr::from)(input)
}

fn chaddr(input: &[u8]) -> IResult<&[u8], [u8; 16]> {
    map(take(16usize), |bytes: &[u8]| {
        let mut chaddr = [0u8; 16];
        chaddr.copy_from_slice(bytes);
        chaddr
    })(input)
}

fn header(input: &[u8]) -> IResult<&[u8], Header> {
    let (input, op) = byte(input)?;
    let (input, hardware_type) = byte(input)?;
    let (input, hardware_len) = byte(input)?;
    let (input, hops) = byte(input)?;
    let (input, session_id) = le_u32(input)?;
    let (input, seconds_elapsed) = be_u16(input)?;
    let (input, flags) = le_u16(input)?;
    let (input, client_address) = ipv4(input)?;
    let (input, assigned_address) = ipv4(input)?;
    let (input, next_server_address) = ipv4(input)?;
    let (input, relay_agent_address) = ipv4(input)?;
    let (input, client_hardware) = chaddr(input)?;
    let (input, _) = take(LEGACY_AREA_LEN)(input)?;
    Ok((
        input,
        Header {
            op,
            hardware_type,
            hardware_len,
            hops,
            session_id,
            seconds_elapsed,
            flags,
            client_address,
            assigned_address,
            next_server_address,
            relay_agent_address,
            client_hardware,
        },
    ))
}

enum Tlv<'a> {
    Pad,
    End,
    Entry(u8, &'a [u8]),
}

fn tlv(input: &[u8]) -> IResult<&[u8], Tlv<'_>> {
    let (input, code) = byte(input)?;
    match OptionCode::from(code) {
        OptionCode::Pad => Ok((input, Tlv::Pad)),
        OptionCode::End => Ok((input, Tlv::End)),
        _ => {
            let (input, data) = length_data(byte)(input)?;
            Ok((input, Tlv::Entry(code, data)))
        }
    }
}

impl DhcpMessage {
    pub fn new(operation: Operation) -> DhcpMessage {
        DhcpMessage {
            operation,
            hardware_type: HARDWARE_ETHERNET,
            hardware_len: 0,
            hops: 0,
            session_id: 0,
            seconds_elapsed: 0,
            flags: 0,
            client_address: Ipv4Addr::UNSPECIFIED,
            assigned_address: Ipv4Addr::UNSPECIFIED,
            next_server_address: Ipv4Addr::UNSPECIFIED,
            relay_agent_address: Ipv4Addr::UNSPECIFIED,
            client_hardware: [0u8; 16],
            option_ordering: Vec::new(),
            options: Vec::new(),
        }
    }

    pub fn decode(buffer: &[u8]) -> Result<DhcpMessage, MessageError> {
        let (rest, header) =
            header(buffer).map_err(|_| MessageError::Truncated(buffer.len()))?;

        let mut message = DhcpMessage {
            operation: Operation::try_from(header.op)?,
            hardware_type: header.hardware_type,
            hardware_len: header.hardware_len,
            hops: header.hops,
            session_id: header.session_id,
            seconds_elapsed: header.seconds_elapsed,
            flags: header.flags,
            client_address: header.client_address,
            assigned_address: header.assigned_address,
            next_server_address: header.next_server_address,
            relay_agent_address: header.relay_agent_address,
            client_hardware: header.client_hardware,
            option_ordering: Vec::new(),
            options: Vec::new(),
        };

        if rest.len() >= 4 && (rest[..4] == MAGIC_COOKIE || rest[..4] == ALT_MAGIC_COOKIE) {
            let mut input = &rest[4..];
            while let Some(&code) = input.first() {
                let (remaining, entry) =
                    tlv(input).map_err(|_| MessageError::OptionOverrun { code })?;
                input = remaining;
                match entry {
                    Tlv::Pad => continue,
                    Tlv::End => break,
                    Tlv::Entry(code, data) => message.add_option(code, data.to_vec())?,
                }
            }
        }

        Ok(message)
    }

    /// Serialize to wire form. With no options the result is exactly the
    /// fixed header.
    pub fn encode(&self) -> Vec<u8> {
        let len = self.encoded_len();
        let mut buf = Vec::with_capacity(len);

        buf.push(self.operation as u8);
        buf.push(self.hardware_type);
        buf.push(self.hardware_len);
        buf.push(self.hops);
        buf.extend_from_slice(&self.session_id.to_le_bytes());
        buf.extend_from_slice(&self.seconds_elapsed.to_be_bytes());
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf.extend_from_slice(&self.client_address.octets());
        buf.extend_from_slice(&self.assigned_address.octets());
        buf.extend_from_slice(&self.next_server_address.octets());
        buf.extend_from_slice(&self.relay_agent_address.octets());
        buf.extend_from_slice(&self.client_hardware);
        buf.resize(HEADER_LEN, 0);

        if self.options.is_empty() {
            return buf;
        }

        buf.extend_from_slice(&MAGIC_COOKIE);

        let mut emitted: Vec<OptionCode> = Vec::with_capacity(self.options.len());
        for &raw in &self.option_ordering {
            let code = OptionCode::from(raw);
            if emitted.contains(&code) {
                continue;
            }
            if let Some(data) = self.option(code) {
                write_option(&mut buf, code, data);
                emitted.push(code);
            }
        }
        for (code, data) in &self.options {
            if !emitted.contains(code) {
                write_option(&mut buf, *code, data);
            }
        }
        buf.push(u8::from(OptionCode::End));

        // Zero-length options are written without a length byte, so the
        // stream can end short of the computed size; the rest stays zero.
        buf.resize(len, 0);
        buf
    }

    pub fn encoded_len(&self) -> usize {
        if self.options.is_empty() {
            return HEADER_LEN;
        }
        let payload: usize = self.options.iter().map(|(_, data)| data.len()).sum();
        HEADER_LEN + 4 + self.options.len() * 2 + payload + 1
    }

    pub fn add_option<C: Into<OptionCode>>(
        &mut self,
        code: C,
        data: Vec<u8>,
    ) -> Result<(), MessageError> {
        let code = code.into().normalize();
        if code.is_framing() {
            return Err(MessageError::ReservedOption(code.into()));
        }
        if data.len() > u8::MAX as usize {
            return Err(MessageError::OptionTooLong {
                code: code.into(),
                len: data.len(),
            });
        }
        if self.option(code).is_some() {
            return Err(MessageError::DuplicateOption(code.into()));
        }
        self.options.push((code, data));
        Ok(())
    }

    /// Returns whether the option was present.
    pub fn remove_option<C: Into<OptionCode>>(&mut self, code: C) -> Result<bool, MessageError> {
        let code = code.into().normalize();
        if code.is_framing() {
            return Err(MessageError::ReservedOption(code.into()));
        }
        let before = self.options.len();
        self.options.retain(|(existing, _)| *existing != code);
        Ok(self.options.len() != before)
    }

    pub fn clear_options(&mut self) {
        self.options.clear();
    }

    pub fn option<C: Into<OptionCode>>(&self, code: C) -> Option<&[u8]> {
        let code = code.into().normalize();
        self.options
            .iter()
            .find(|(existing, _)| *existing == code)
            .map(|(_, data)| data.as_slice())
    }

    pub fn options(&self) -> impl Iterator<Item = (OptionCode, &[u8])> {
        self.options.iter().map(|(code, data)| (*code, data.as_slice()))
    }

    pub fn message_type(&self) -> Option<MessageType> {
        match self.option(OptionCode::MessageType)? {
            [value] => MessageType::try_from(*value).ok(),
            _ => None,
        }
    }

    pub fn requested_address(&self) -> Option<Ipv4Addr> {
        parse_ipv4(self.option(OptionCode::AddressRequest)?).ok()
    }

    pub fn server_identifier(&self) -> Option<Ipv4Addr> {
        parse_ipv4(self.option(OptionCode::ServerIdentifier)?).ok()
    }

    /// Requested lease time in seconds (big endian on the wire).
    pub fn requested_lease_time(&self) -> Option<u32> {
        match self.option(OptionCode::AddressTime)? {
            [a, b, c, d] => Some(u32::from_be_bytes([*a, *b, *c, *d])),
            _ => None,
        }
    }

    pub fn parameter_request_list(&self) -> Option<&[u8]> {
        self.option(OptionCode::ParameterRequestList)
    }

    pub fn hardware_address(&self) -> HardwareAddress {
        HardwareAddress::from_chaddr(&self.client_hardware)
    }

    /// Copies `address` into the client-hardware field and sets its length.
    pub fn set_client_hardware(&mut self, address: &[u8]) {
        let len = address.len().min(self.client_hardware.len());
        self.client_hardware = [0u8; 16];
        self.client_hardware[..len].copy_from_slice(&address[..len]);
        self.hardware_len = len as u8;
    }
}

fn write_option(buf: &mut Vec<u8>, code: OptionCode, data: &[u8]) {
    buf.push(code.into());
    if !data.is_empty() {
        buf.push(data.len() as u8);
        buf.extend_from_slice(data);
    }
}
