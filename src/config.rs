use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_derive::{Deserialize, Serialize};

use crate::acl::{AclEntry, Reservation};
use crate::error::ConfigError;

const MIN_LEASE_SECS: u64 = 60;
const MAX_LEASE_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_address: SocketAddrV4,
    pub bind_interface: Option<String>,
    /// Address of the bound interface; sent as the server identifier.
    pub server_address: Ipv4Addr,
    pub client_port: u16,
    pub broadcast_address: Ipv4Addr,
    pub pool_start: Ipv4Addr,
    pub pool_end: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns_suffix: Option<String>,
    pub dns_servers: Vec<Ipv4Addr>,
    pub lease_duration_secs: u64,
    pub offer_timeout_secs: u64,
    pub reclaim_interval_secs: u64,
    pub allow_any: bool,
    pub acl: Vec<AclEntry>,
    pub reservations: Vec<Reservation>,
    pub lease_file: Option<PathBuf>,
    pub admin_address: Option<SocketAddr>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            bind_address: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 67),
            bind_interface: None,
            server_address: Ipv4Addr::new(192, 168, 100, 1),
            client_port: 68,
            broadcast_address: Ipv4Addr::BROADCAST,
            pool_start: Ipv4Addr::new(192, 168, 100, 10),
            pool_end: Ipv4Addr::new(192, 168, 100, 150),
            subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 100, 1),
            dns_suffix: None,
            dns_servers: Vec::new(),
            lease_duration_secs: 86400,
            offer_timeout_secs: 60,
            reclaim_interval_secs: 30,
            allow_any: true,
            acl: Vec::new(),
            reservations: Vec::new(),
            lease_file: None,
            admin_address: None,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_start > self.pool_end {
            return Err(ConfigError::Invalid(
                "pool_start must not be above pool_end".to_string(),
            ));
        }
        if self.in_pool(self.server_address) {
            return Err(ConfigError::Invalid(format!(
                "server_address {} lies inside the pool",
                self.server_address
            )));
        }
        if self.lease_duration_secs == 0 {
            return Err(ConfigError::Invalid(
                "lease_duration_secs must be positive".to_string(),
            ));
        }
        if self.offer_timeout_secs == 0 || self.reclaim_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "offer_timeout_secs and reclaim_interval_secs must be positive".to_string(),
            ));
        }
        for reservation in &self.reservations {
            if reservation.address == self.server_address {
                return Err(ConfigError::Invalid(format!(
                    "reservation for {} uses the server address",
                    reservation.mac
                )));
            }
            if self.in_pool(reservation.address) {
                return Err(ConfigError::Invalid(format!(
                    "reservation for {} at {} lies inside the pool",
                    reservation.mac, reservation.address
                )));
            }
        }
        Ok(())
    }

    pub fn in_pool(&self, address: Ipv4Addr) -> bool {
        self.pool_start <= address && address <= self.pool_end
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_secs)
    }

    pub fn offer_timeout(&self) -> Duration {
        Duration::from_secs(self.offer_timeout_secs)
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_secs)
    }

    /// The lease time to grant: the client's request when it lies within
    /// one minute to thirty days, the configured duration otherwise.
    pub fn negotiate_lease(&self, requested_secs: Option<u32>) -> Duration {
        match requested_secs.map(u64::from) {
            Some(secs) if (MIN_LEASE_SECS..=MAX_LEASE_SECS).contains(&secs) => {
                Duration::from_secs(secs)
            }
            _ => self.lease_duration(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::HardwareAddress;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_pool() {
        let config = Config {
            pool_start: Ipv4Addr::new(192, 168, 100, 200),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_server_inside_pool() {
        let config = Config {
            server_address: Ipv4Addr::new(192, 168, 100, 20),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_reservation_inside_pool() {
        let mac = HardwareAddress::new([0xaa, 0xbb, 0xcc, 0, 0, 1]);
        let config = Config {
            pool_start: Ipv4Addr::new(10, 0, 0, 2),
            pool_end: Ipv4Addr::new(10, 0, 0, 3),
            server_address: Ipv4Addr::new(10, 0, 0, 1),
            reservations: vec![Reservation {
                mac,
                address: Ipv4Addr::new(10, 0, 0, 2),
            }],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            reservations: vec![Reservation {
                mac,
                address: Ipv4Addr::new(10, 0, 0, 50),
            }],
            ..config
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn deserialize_with_defaults() {
        let json = r#"{
            "server_address": "10.0.0.1",
            "pool_start": "10.0.0.2",
            "pool_end": "10.0.0.3",
            "allow_any": false,
            "acl": [{"mac": "aa:bb:cc:00:00:01", "deny": true}],
            "reservations": [{"mac": "aa:bb:cc:00:00:09", "address": "10.0.0.50"}]
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.client_port, 68);
        assert_eq!(config.lease_duration_secs, 86400);
        assert!(!config.allow_any);
        assert_eq!(
            config.acl,
            vec![AclEntry {
                mac: "aa:bb:cc:00:00:01".parse::<HardwareAddress>().unwrap(),
                deny: true,
            }]
        );
        assert_eq!(config.reservations[0].address, Ipv4Addr::new(10, 0, 0, 50));
    }

    #[test]
    fn rejects_malformed_mac() {
        let json = r#"{"acl": [{"mac": "not-a-mac", "deny": true}]}"#;
        assert!(serde_json::from_str::<Config>(json).is_err());
    }

    #[test]
    fn negotiate_lease_bounds() {
        let config = Config::default();
        assert_eq!(config.negotiate_lease(None), Duration::from_secs(86400));
        assert_eq!(config.negotiate_lease(Some(3600)), Duration::from_secs(3600));
        assert_eq!(config.negotiate_lease(Some(60)), Duration::from_secs(60));
        assert_eq!(config.negotiate_lease(Some(59)), Duration::from_secs(86400));
        assert_eq!(
            config.negotiate_lease(Some(30 * 24 * 3600 + 1)),
            Duration::from_secs(86400)
        );
    }
}
