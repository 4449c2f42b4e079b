//! Integrity hashes for lock entries

use crate::types::{Integrity, Lockfile, PackageLock};

pub const ALGORITHM: &str = "blake3";

/// BLAKE3 over `provider:name@version`
pub fn compute(provider: &str, name: &str, version: &str) -> Integrity {
    let input = format!("{provider}:{name}@{version}");
    Integrity {
        algorithm: ALGORITHM.to_string(),
        hash: blake3::hash(input.as_bytes()).to_hex().to_string(),
    }
}

/// Whether an entry's recorded hash matches its coordinates
pub fn verify(provider: &str, name: &str, entry: &PackageLock) -> bool {
    entry.integrity.algorithm == ALGORITHM
        && entry.integrity == compute(provider, name, &entry.version)
}

/// Keys whose recorded hash no longer matches their entry
pub fn tampered(lockfile: &Lockfile) -> Vec<&str> {
    lockfile
        .packages
        .iter()
        .filter(|(key, entry)| match key.split_once(':') {
            Some((provider, name)) => !verify(provider, name, entry),
            None => true,
        })
        .map(|(key, _)| key.as_str())
        .collect()
}
