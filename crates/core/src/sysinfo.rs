//! Host fingerprints and identifiers derived from them.
//!
//! Identifiers combine the sorted IPv4 addresses of the host with an OS fingerprint and are
//! cached for ten minutes, so repeated lookups during startup stay cheap.

use crate::hashes::HashAlgo;
use machineid_rs::{Encryption, HWIDComponent, IdBuilder};
use moka::sync::Cache;
use std::net::IpAddr;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::warn;

const FINGERPRINT_KEY: &str = "yali.sysinfo";
const FALLBACK_IPADDR: &str = "127.0.0.1";
const CACHE_CAPACITY: u64 = 128;
const CACHE_TTL: Duration = Duration::from_secs(600);

static ID_CACHE: LazyLock<Cache<(String, bool, HashAlgo), String>> = LazyLock::new(|| {
    Cache::builder().max_capacity(CACHE_CAPACITY).time_to_live(CACHE_TTL).build()
});

static FILENAME_CACHE: LazyLock<Cache<(String, String), String>> = LazyLock::new(|| {
    Cache::builder().max_capacity(CACHE_CAPACITY).time_to_live(CACHE_TTL).build()
});

/// IPv4 addresses of all network interfaces, in interface order.
#[must_use]
pub fn sys_ipaddrs() -> Vec<String> {
    match if_addrs::get_if_addrs() {
        Ok(ifaces) => ifaces
            .iter()
            .filter_map(|iface| match iface.ip() {
                IpAddr::V4(ip) => Some(ip.to_string()),
                IpAddr::V6(_) => None,
            })
            .collect(),
        Err(e) => {
            warn!(error = %e, "Failed to list network interfaces");
            Vec::new()
        },
    }
}

/// `host|os|family|arch`, where `host` is a stable hash of the machine name.
#[must_use]
pub fn os_uname_str() -> String {
    let host = IdBuilder::new(Encryption::SHA256)
        .add_component(HWIDComponent::MachineName)
        .build(FINGERPRINT_KEY)
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to fingerprint host name");
            String::from("unknown-host")
        });
    format!("{host}|{}|{}|{}", std::env::consts::OS, std::env::consts::FAMILY, std::env::consts::ARCH)
}

fn sysinfo_seed() -> String {
    let mut addrs = sys_ipaddrs();
    if addrs.is_empty() {
        addrs.push(FALLBACK_IPADDR.to_owned());
    }
    addrs.sort();
    addrs.concat() + &os_uname_str()
}

/// A host identifier: the digest of the host fingerprint (and the pid) followed by `suffix`.
#[must_use]
pub fn id_by_sysinfo(suffix: &str, use_pid: bool, algo: HashAlgo) -> String {
    ID_CACHE.get_with((suffix.to_owned(), use_pid, algo), || {
        let mut seed = sysinfo_seed();
        if use_pid {
            seed.push_str(&std::process::id().to_string());
        }
        algo.digest_hex(seed) + suffix
    })
}

/// `{basename}_{md5 of host fingerprint}{extension}`.
#[must_use]
pub fn filename_by_sysinfo(basename: &str, extension: &str) -> String {
    FILENAME_CACHE.get_with((basename.to_owned(), extension.to_owned()), || {
        format!("{basename}_{}{extension}", HashAlgo::Md5.digest_hex(sysinfo_seed()))
    })
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SortChunk {
    Num(u128),
    Text(String),
}

fn natural_key(value: &str) -> Vec<SortChunk> {
    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut digits = false;

    let mut flush = |buf: &mut String, digits: bool| {
        if buf.is_empty() {
            return;
        }
        chunks.push(if digits {
            SortChunk::Num(buf.parse().unwrap_or(u128::MAX))
        } else {
            SortChunk::Text(buf.to_lowercase())
        });
        buf.clear();
    };

    for ch in value.chars() {
        let is_digit = ch.is_ascii_digit();
        if is_digit != digits {
            flush(&mut buf, digits);
            digits = is_digit;
        }
        buf.push(ch);
    }
    flush(&mut buf, digits);
    chunks
}

/// Sorts strings in natural order: digit runs compare numerically, text ignores case.
#[must_use]
pub fn alphanum_sorted<I, S>(items: I) -> Vec<S>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut items: Vec<S> = items.into_iter().collect();
    items.sort_by_cached_key(|s| natural_key(s.as_ref()));
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashes::Hasher;

    #[test]
    fn test_ids_are_stable_and_suffixed() {
        let first = id_by_sysinfo("-svc", false, HashAlgo::Md5);
        assert_eq!(first, id_by_sysinfo("-svc", false, HashAlgo::Md5));
        assert!(first.ends_with("-svc"));
        assert!(Hasher::is_formatted_md5(first.trim_end_matches("-svc")));

        let sha = id_by_sysinfo("", true, HashAlgo::Sha256);
        assert!(Hasher::is_formatted_sha256(&sha));
    }

    #[test]
    fn test_filename_by_sysinfo() {
        let name = filename_by_sysinfo("my-app", ".log");
        assert!(name.starts_with("my-app_"));
        assert!(name.ends_with(".log"));
        assert_eq!(name.len(), "my-app_".len() + 32 + ".log".len());
    }

    #[test]
    fn test_uname_has_four_parts() {
        assert_eq!(os_uname_str().split('|').count(), 4);
    }

    #[test]
    fn test_alphanum_sorted() {
        let sorted = alphanum_sorted(["file10", "File2", "file1", "a", "file02b"]);
        assert_eq!(sorted, vec!["a", "file1", "File2", "file02b", "file10"]);
    }
}
