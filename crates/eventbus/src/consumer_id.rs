// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Stable per-process consumer id derivation (§6:
//! `sha1(hostname):sha1(install-path):process-index`).

use sha1::{Digest, Sha1};

fn sha1_hex(input: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Derives the stable consumer id for this worker process.
pub fn consumer_id(hostname: &str, install_path: &str, process_index: u32) -> String {
    format!("{}:{}:{}", sha1_hex(hostname), sha1_hex(install_path), process_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_produce_same_id() {
        let a = consumer_id("host-1", "/opt/backendai", 0);
        let b = consumer_id("host-1", "/opt/backendai", 0);
        assert_eq!(a, b);
    }

    #[test]
    fn different_process_index_produces_different_id() {
        let a = consumer_id("host-1", "/opt/backendai", 0);
        let b = consumer_id("host-1", "/opt/backendai", 1);
        assert_ne!(a, b);
    }

    #[test]
    fn id_shape_is_two_hex_digests_and_an_index() {
        let id = consumer_id("host-1", "/opt/backendai", 3);
        let parts: Vec<&str> = id.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 40);
        assert_eq!(parts[1].len(), 40);
        assert_eq!(parts[2], "3");
    }
}
