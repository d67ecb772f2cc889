//! Active-lease snapshot, written at shutdown and read back at startup.
//!
//! The file is a JSON object keyed by the dotted address string.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::Path;

use crate::error::SnapshotError;
use crate::leases::Lease;

pub fn save(path: &Path, leases: &[Lease]) -> Result<(), SnapshotError> {
    let table: BTreeMap<String, &Lease> = leases
        .iter()
        .map(|lease| (lease.address.to_string(), lease))
        .collect();
    let content = serde_json::to_string_pretty(&table)?;

    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Entries whose key disagrees with the lease address are dropped.
pub fn load(path: &Path) -> Result<Vec<Lease>, SnapshotError> {
    let content = std::fs::read_to_string(path)?;
    let table: BTreeMap<String, Lease> = serde_json::from_str(&content)?;
    Ok(table
        .into_iter()
        .filter(|(key, lease)| key.parse::<Ipv4Addr>().ok() == Some(lease.address))
        .map(|(_, lease)| lease)
        .collect())
}

/// Like [`load`], but any failure yields an empty table.
pub fn restore(path: &Path, logger: &slog::Logger) -> Vec<Lease> {
    if !path.exists() {
        debug!(logger, "No lease snapshot"; "path" => %path.display());
        return Vec::new();
    }
    match load(path) {
        Ok(leases) => {
            info!(logger, "Loaded lease snapshot"; "path" => %path.display(), "count" => leases.len());
            leases
        }
        Err(err) => {
            warn!(logger, "Ignoring unreadable lease snapshot: {}", err; "path" => %path.display());
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::HardwareAddress;
    use std::path::PathBuf;
    use std::time::{Duration, UNIX_EPOCH};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("lan-dhcpd-{}-{}.json", name, std::process::id()))
    }

    fn discard() -> slog::Logger {
        slog::Logger::root(slog::Discard, o!())
    }

    fn lease(last: u8) -> Lease {
        Lease {
            owner: Some(HardwareAddress::new([0xaa, 0xbb, 0xcc, 0, 0, last])),
            address: Ipv4Addr::new(10, 0, 0, last),
            expiration: UNIX_EPOCH + Duration::from_millis(1_700_000_000_123),
            session_id: 0xdeadbeef,
            acknowledged: true,
        }
    }

    #[test]
    fn save_then_load() {
        let path = temp_path("roundtrip");
        let leases = vec![lease(2), lease(3)];
        save(&path, &leases).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"10.0.0.2\""));
        assert!(content.contains("1700000000123"));

        assert_eq!(load(&path).unwrap(), leases);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_or_corrupt_file_restores_nothing() {
        let path = temp_path("missing");
        assert!(restore(&path, &discard()).is_empty());

        let path = temp_path("corrupt");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(restore(&path, &discard()).is_empty());
        std::fs::remove_file(&path).unwrap();
    }
}
