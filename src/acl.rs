//! Admission control and static reservations.
//!
//! Both tables sit behind their own reader/writer lock: lookups happen on
//! every DISCOVER/REQUEST, edits only come from the admin API.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use serde_derive::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::address::HardwareAddress;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    pub mac: HardwareAddress,
    pub deny: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub mac: HardwareAddress,
    pub address: Ipv4Addr,
}

struct AclTable {
    allow_any: bool,
    // true = allowed, false = denied
    entries: HashMap<HardwareAddress, bool>,
}

pub struct AccessControl {
    table: RwLock<AclTable>,
    reservations: RwLock<HashMap<HardwareAddress, Ipv4Addr>>,
}

impl AccessControl {
    pub fn new(allow_any: bool) -> AccessControl {
        AccessControl {
            table: RwLock::new(AclTable {
                allow_any,
                entries: HashMap::new(),
            }),
            reservations: RwLock::new(HashMap::new()),
        }
    }

    /// Load the tables from configuration.
    pub fn with_tables(
        allow_any: bool,
        entries: &[AclEntry],
        reservations: &[Reservation],
    ) -> AccessControl {
        AccessControl {
            table: RwLock::new(AclTable {
                allow_any,
                entries: entries
                    .iter()
                    .map(|entry| (entry.mac, !entry.deny))
                    .collect(),
            }),
            reservations: RwLock::new(
                reservations
                    .iter()
                    .map(|reservation| (reservation.mac, reservation.address))
                    .collect(),
            ),
        }
    }

    /// Explicit entries win; otherwise the default policy decides.
    pub async fn is_allowed(&self, mac: &HardwareAddress) -> bool {
        self.is_admitted(mac, false).await
    }

    /// Like [`AccessControl::is_allowed`], except that a client holding a
    /// reservation is admitted when it has no explicit entry.
    pub async fn is_admitted(&self, mac: &HardwareAddress, reserved: bool) -> bool {
        let table = self.table.read().await;
        table
            .entries
            .get(mac)
            .copied()
            .unwrap_or(table.allow_any || reserved)
    }

    /// Whether `mac` has an explicit entry, and which way it goes.
    pub async fn policy(&self, mac: &HardwareAddress) -> Option<bool> {
        self.table.read().await.entries.get(mac).copied()
    }

    /// Overwrites any existing entry for `mac`.
    pub async fn add(&self, mac: HardwareAddress, deny: bool) {
        self.table.write().await.entries.insert(mac, !deny);
    }

    pub async fn remove(&self, mac: &HardwareAddress) -> bool {
        self.table.write().await.entries.remove(mac).is_some()
    }

    pub async fn clear(&self) {
        self.table.write().await.entries.clear();
    }

    pub async fn allow_any(&self) -> bool {
        self.table.read().await.allow_any
    }

    pub async fn set_allow_any(&self, allow_any: bool) {
        self.table.write().await.allow_any = allow_any;
    }

    pub async fn entries(&self) -> Vec<AclEntry> {
        let table = self.table.read().await;
        let mut entries: Vec<AclEntry> = table
            .entries
            .iter()
            .map(|(mac, allowed)| AclEntry {
                mac: *mac,
                deny: !allowed,
            })
            .collect();
        entries.sort_by_key(|entry| entry.mac);
        entries
    }

    pub async fn reservation(&self, mac: &HardwareAddress) -> Option<Ipv4Addr> {
        self.reservations.read().await.get(mac).copied()
    }

    pub async fn reserve(&self, mac: HardwareAddress, address: Ipv4Addr) {
        self.reservations.write().await.insert(mac, address);
    }

    pub async fn unreserve(&self, mac: &HardwareAddress) -> bool {
        self.reservations.write().await.remove(mac).is_some()
    }

    pub async fn reservations(&self) -> Vec<Reservation> {
        let reservations = self.reservations.read().await;
        let mut list: Vec<Reservation> = reservations
            .iter()
            .map(|(mac, address)| Reservation {
                mac: *mac,
                address: *address,
            })
            .collect();
        list.sort_by_key(|reservation| reservation.mac);
        list
    }
}
