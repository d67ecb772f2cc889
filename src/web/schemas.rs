use crate::acl::AclEntry;
use crate::address::HardwareAddress;
use crate::leases::{Lease, LeaseState};
use std::net::Ipv4Addr;
use std::time::SystemTime;

use serde_derive::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct LeaseView {
    pub address: Ipv4Addr,
    pub mac: Option<HardwareAddress>,
    pub state: LeaseState,
    // Milliseconds since the Unix epoch
    #[serde(with = "serde_millis")]
    pub expiration: SystemTime,
    pub session_id: u32,
}

impl From<Lease> for LeaseView {
    fn from(lease: Lease) -> LeaseView {
        LeaseView {
            address: lease.address,
            mac: lease.owner,
            state: lease.active_state(),
            expiration: lease.expiration,
            session_id: lease.session_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AclView {
    pub allow_any: bool,
    pub entries: Vec<AclEntry>,
}

/// Body of `PUT /acl/{mac}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AclUpdate {
    pub deny: bool,
}

/// Body of `PUT /acl`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PolicyUpdate {
    pub allow_any: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
