//! DISCOVER/REQUEST state machine.
//!
//! Per address the only states are the pool partitions: free, offered
//! (active, unacknowledged) and bound (active, acknowledged). Reserved
//! addresses never enter the pool; their lease is recomputed per message.

use std::convert::TryFrom;
use std::net::Ipv4Addr;
use std::time::{Duration, SystemTime};

use crate::acl::AccessControl;
use crate::config::Config;
use crate::error::MessageError;
use crate::leases::{Lease, LeasePool};
use crate::message::{DhcpMessage, MessageType, Operation, OptionCode, HARDWARE_ETHERNET};

pub struct ProtocolEngine {
    config: Config,
    pool: LeasePool,
    acl: AccessControl,
    logger: slog::Logger,
}

impl ProtocolEngine {
    pub fn create(config: &Config, logger: slog::Logger) -> ProtocolEngine {
        ProtocolEngine {
            config: config.clone(),
            pool: LeasePool::new(config.pool_start, config.pool_end),
            acl: AccessControl::with_tables(config.allow_any, &config.acl, &config.reservations),
            logger: logger.new(o!("module" => "engine")),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pool(&self) -> &LeasePool {
        &self.pool
    }

    pub fn acl(&self) -> &AccessControl {
        &self.acl
    }

    /// Process one request and build the reply to broadcast, if any.
    pub async fn handle(&self, message: &DhcpMessage, now: SystemTime) -> Option<DhcpMessage> {
        let logger = self.logger.new(o!(
            "xid" => message.session_id,
            "mac" => message.hardware_address().to_string()
        ));

        if message.operation != Operation::BootRequest {
            debug!(logger, "Ignoring BOOTREPLY");
            return None;
        }

        let reply = match message.message_type() {
            Some(MessageType::Discover) => {
                info!(logger, "Got DISCOVER");
                self.discover(message, now, &logger).await
            }
            Some(MessageType::Request) => {
                info!(logger, "Got REQUEST");
                self.request(message, now, &logger).await
            }
            Some(other) => {
                warn!(logger, "Ignoring unsupported message type {:?}", other);
                return None;
            }
            None => {
                warn!(logger, "Ignoring message without a valid message type");
                return None;
            }
        };

        match reply {
            Ok(reply) => reply,
            Err(err) => {
                error!(logger, "Failed building reply: {}", err);
                None
            }
        }
    }

    /// Return timed-out offers and expired leases to the free partition.
    pub async fn reclaim(&self, now: SystemTime) -> Vec<Ipv4Addr> {
        let reclaimed = self
            .pool
            .reclaim_expired(now, self.config.offer_timeout())
            .await;
        for address in &reclaimed {
            debug!(self.logger, "Reclaimed lease"; "address" => %address);
        }
        reclaimed
    }

    async fn discover(
        &self,
        message: &DhcpMessage,
        now: SystemTime,
        logger: &slog::Logger,
    ) -> Result<Option<DhcpMessage>, MessageError> {
        let mac = message.hardware_address();
        let requested = message
            .requested_address()
            .unwrap_or(message.client_address);
        let reservation = self.acl.reservation(&mac).await;

        if !self.acl.is_admitted(&mac, reservation.is_some()).await {
            warn!(logger, "Dropping DISCOVER from client that is not admitted");
            return Ok(None);
        }

        let expiration = now + self.config.offer_timeout();
        let offer = match reservation {
            Some(address) => Some(Lease {
                owner: Some(mac),
                address,
                expiration,
                session_id: message.session_id,
                acknowledged: false,
            }),
            None => {
                self.pool
                    .allocate(requested, mac, message.session_id, expiration)
                    .await
            }
        };

        match offer {
            Some(lease) => {
                info!(logger, "Sending OFFER"; "address" => %lease.address);
                self.lease_reply(message, MessageType::Offer, lease.address)
                    .map(Some)
            }
            None => {
                warn!(logger, "Pool exhausted, sending NAK");
                self.nak(message).map(Some)
            }
        }
    }

    async fn request(
        &self,
        message: &DhcpMessage,
        now: SystemTime,
        logger: &slog::Logger,
    ) -> Result<Option<DhcpMessage>, MessageError> {
        match message.server_identifier() {
            Some(server) if server == self.config.server_address => {}
            other => {
                debug!(logger, "Ignoring REQUEST addressed to another server"; "server" => ?other);
                return Ok(None);
            }
        }

        let requested = message
            .requested_address()
            .unwrap_or(message.client_address);
        if requested.is_unspecified() {
            warn!(logger, "REQUEST without an address, sending NAK");
            return self.nak(message).map(Some);
        }

        let mac = message.hardware_address();
        let reservation = self.acl.reservation(&mac).await;
        if !self.acl.is_admitted(&mac, reservation.is_some()).await {
            warn!(logger, "REQUEST from client that is not admitted, sending NAK");
            return self.nak(message).map(Some);
        }

        let lease_time = self.config.negotiate_lease(message.requested_lease_time());
        let bound = match reservation {
            Some(address) if address == requested => Some(address),
            Some(_) => None,
            None => self
                .pool
                .confirm(requested, mac, message.session_id, now + lease_time)
                .await
                .map(|lease| lease.address),
        };

        match bound {
            Some(address) => {
                info!(logger, "Sending ACK"; "address" => %address);
                self.lease_reply(message, MessageType::Ack, address).map(Some)
            }
            None => {
                info!(logger, "Sending NAK"; "address" => %requested);
                self.nak(message).map(Some)
            }
        }
    }

    fn reply_header(&self, request: &DhcpMessage) -> DhcpMessage {
        let mut reply = DhcpMessage::new(Operation::BootReply);
        reply.hardware_type = HARDWARE_ETHERNET;
        reply.session_id = request.session_id;
        reply.seconds_elapsed = request.seconds_elapsed;
        reply.flags = request.flags;
        reply.set_client_hardware(&request.hardware_address().octets());
        reply
    }

    /// OFFER or ACK carrying `address` and the network parameters.
    fn lease_reply(
        &self,
        request: &DhcpMessage,
        kind: MessageType,
        address: Ipv4Addr,
    ) -> Result<DhcpMessage, MessageError> {
        let config = &self.config;
        let mut reply = self.reply_header(request);
        reply.assigned_address = address;
        reply.next_server_address = config.server_address;

        let lease_time = lease_seconds(config.negotiate_lease(request.requested_lease_time()));

        reply.add_option(OptionCode::MessageType, vec![kind as u8])?;
        reply.add_option(OptionCode::AddressRequest, address.octets().to_vec())?;
        reply.add_option(OptionCode::AddressTime, lease_time.to_be_bytes().to_vec())?;
        reply.add_option(OptionCode::Router, config.gateway.octets().to_vec())?;
        reply.add_option(OptionCode::SubnetMask, config.subnet_mask.octets().to_vec())?;
        if let Some(suffix) = config.dns_suffix.as_ref().filter(|s| !s.is_empty()) {
            reply.add_option(OptionCode::DomainNameSuffix, suffix.as_bytes().to_vec())?;
        }
        if !config.dns_servers.is_empty() {
            let servers = config
                .dns_servers
                .iter()
                .flat_map(|server| server.octets().to_vec())
                .collect();
            reply.add_option(OptionCode::DomainNameServer, servers)?;
        }
        reply.add_option(
            OptionCode::ServerIdentifier,
            config.server_address.octets().to_vec(),
        )?;

        if let Some(order) = request.parameter_request_list() {
            reply.option_ordering = order.to_vec();
        }
        Ok(reply)
    }

    fn nak(&self, request: &DhcpMessage) -> Result<DhcpMessage, MessageError> {
        let mut reply = self.reply_header(request);
        reply.add_option(OptionCode::MessageType, vec![MessageType::Nak as u8])?;
        reply.add_option(
            OptionCode::ServerIdentifier,
            self.config.server_address.octets().to_vec(),
        )?;
        Ok(reply)
    }
}

fn lease_seconds(duration: Duration) -> u32 {
    u32::try_from(duration.as_secs()).unwrap_or(u32::MAX)
}
