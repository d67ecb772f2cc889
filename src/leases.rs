use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_derive::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::address::{self, HardwareAddress};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub owner: Option<HardwareAddress>,
    pub address: Ipv4Addr,
    #[serde(with = "serde_millis")]
    pub expiration: SystemTime,
    /// Transaction id of the exchange that last offered this lease.
    pub session_id: u32,
    pub acknowledged: bool,
}

impl Lease {
    /// An unassigned lease, as created when the pool is filled.
    pub fn fresh(address: Ipv4Addr) -> Lease {
        Lease {
            owner: None,
            address,
            expiration: UNIX_EPOCH,
            session_id: 0,
            acknowledged: false,
        }
    }

    fn offer_to(&mut self, owner: HardwareAddress, session_id: u32, expiration: SystemTime) {
        self.owner = Some(owner);
        self.session_id = session_id;
        self.expiration = expiration;
        self.acknowledged = false;
    }

    /// State of a lease held in the active partition.
    pub fn active_state(&self) -> LeaseState {
        if self.acknowledged {
            LeaseState::Bound
        } else {
            LeaseState::Offered
        }
    }

    fn reclaimable(&self, now: SystemTime, offer_timeout: Duration) -> bool {
        if self.acknowledged {
            self.expiration < now
        } else {
            self.expiration < now + offer_timeout
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaseState {
    Free,
    Offered,
    Bound,
}

/// Both partitions live behind one lock: every move touches both.
struct Partitions {
    start: Ipv4Addr,
    end: Ipv4Addr,
    inactive: BTreeMap<Ipv4Addr, Lease>,
    active: HashMap<Ipv4Addr, Lease>,
}

impl Partitions {
    fn new(start: Ipv4Addr, end: Ipv4Addr) -> Partitions {
        Partitions {
            start,
            end,
            inactive: address::range(start, end)
                .map(|address| (address, Lease::fresh(address)))
                .collect(),
            active: HashMap::new(),
        }
    }

    fn contains(&self, address: Ipv4Addr) -> bool {
        self.start <= address && address <= self.end
    }

    fn activate(
        &mut self,
        mut lease: Lease,
        owner: HardwareAddress,
        session_id: u32,
        expiration: SystemTime,
    ) -> Lease {
        lease.offer_to(owner, session_id, expiration);
        self.active.insert(lease.address, lease.clone());
        lease
    }

    fn allocate(
        &mut self,
        requested: Ipv4Addr,
        owner: HardwareAddress,
        session_id: u32,
        expiration: SystemTime,
    ) -> Option<Lease> {
        if !requested.is_unspecified() {
            if let Some(lease) = self.inactive.remove(&requested) {
                return Some(self.activate(lease, owner, session_id, expiration));
            }
            if let Some(lease) = self.active.get_mut(&requested) {
                if lease.owner == Some(owner) {
                    lease.offer_to(owner, session_id, expiration);
                    return Some(lease.clone());
                }
            }
        }

        let lowest = *self.inactive.keys().next()?;
        let lease = self.inactive.remove(&lowest)?;
        Some(self.activate(lease, owner, session_id, expiration))
    }

    fn confirm(
        &mut self,
        requested: Ipv4Addr,
        owner: HardwareAddress,
        session_id: u32,
        expiration: SystemTime,
    ) -> Option<Lease> {
        let lease = self.active.get_mut(&requested)?;
        if lease.owner != Some(owner) && lease.session_id != session_id {
            return None;
        }
        lease.acknowledged = true;
        lease.owner = Some(owner);
        lease.expiration = expiration;
        Some(lease.clone())
    }

    fn reclaim_expired(&mut self, now: SystemTime, offer_timeout: Duration) -> Vec<Ipv4Addr> {
        let mut expired: Vec<Ipv4Addr> = self
            .active
            .values()
            .filter(|lease| lease.reclaimable(now, offer_timeout))
            .map(|lease| lease.address)
            .collect();
        expired.sort();

        for address in &expired {
            if let Some(mut lease) = self.active.remove(address) {
                lease.acknowledged = false;
                self.inactive.insert(*address, lease);
            }
        }
        expired
    }

    fn restore(&mut self, lease: Lease, now: SystemTime) -> bool {
        if !self.contains(lease.address) || lease.expiration < now {
            return false;
        }
        match self.inactive.remove(&lease.address) {
            Some(_) => {
                self.active.insert(lease.address, lease);
                true
            }
            None => false,
        }
    }

    fn state(&self, address: Ipv4Addr) -> Option<LeaseState> {
        if self.inactive.contains_key(&address) {
            return Some(LeaseState::Free);
        }
        self.active.get(&address).map(Lease::active_state)
    }
}

/// The address allocator for one contiguous range.
///
/// Every address in `[start, end]` is in exactly one partition: free
/// (ordered, so the lowest free address is handed out first) or active.
/// Nothing outside this type reads or writes the partitions.
pub struct LeasePool {
    state: Mutex<Partitions>,
}

impl LeasePool {
    pub fn new(start: Ipv4Addr, end: Ipv4Addr) -> LeasePool {
        LeasePool {
            state: Mutex::new(Partitions::new(start, end)),
        }
    }

    /// Refill the free partition with fresh leases and drop every active one.
    pub async fn initialize(&self, start: Ipv4Addr, end: Ipv4Addr) {
        let mut state = self.state.lock().await;
        *state = Partitions::new(start, end);
    }

    /// Pick an address for a DISCOVER and mark it offered.
    ///
    /// Prefers `requested` when free, re-offers it when `owner` already
    /// holds it, and otherwise takes the lowest free address. `None` when
    /// the pool is exhausted.
    pub async fn allocate(
        &self,
        requested: Ipv4Addr,
        owner: HardwareAddress,
        session_id: u32,
        expiration: SystemTime,
    ) -> Option<Lease> {
        self.state
            .lock()
            .await
            .allocate(requested, owner, session_id, expiration)
    }

    /// Bind an offered (or already bound) address for a REQUEST.
    ///
    /// Succeeds only when `requested` is active and either `owner` or
    /// `session_id` matches what the pool recorded.
    pub async fn confirm(
        &self,
        requested: Ipv4Addr,
        owner: HardwareAddress,
        session_id: u32,
        expiration: SystemTime,
    ) -> Option<Lease> {
        self.state
            .lock()
            .await
            .confirm(requested, owner, session_id, expiration)
    }

    /// Return timed-out offers and expired bindings to the free partition.
    pub async fn reclaim_expired(&self, now: SystemTime, offer_timeout: Duration) -> Vec<Ipv4Addr> {
        self.state.lock().await.reclaim_expired(now, offer_timeout)
    }

    /// Re-activate leases from a snapshot. Leases outside the range or
    /// already expired are skipped. Returns how many were restored.
    pub async fn restore<I>(&self, leases: I, now: SystemTime) -> usize
    where
        I: IntoIterator<Item = Lease>,
    {
        let mut state = self.state.lock().await;
        leases
            .into_iter()
            .filter(|lease| state.restore(lease.clone(), now))
            .count()
    }

    pub async fn state(&self, address: Ipv4Addr) -> Option<LeaseState> {
        self.state.lock().await.state(address)
    }

    /// Active leases in address order.
    pub async fn active_leases(&self) -> Vec<Lease> {
        let state = self.state.lock().await;
        let mut leases: Vec<Lease> = state.active.values().cloned().collect();
        leases.sort_by_key(|lease| lease.address);
        leases
    }

    pub async fn free_count(&self) -> usize {
        self.state.lock().await.inactive.len()
    }
}
