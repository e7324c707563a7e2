//! Id Service
//!
//! Mints domain-scoped string ids of the form `<domain>:<seq>` and recovers
//! a monotonic sequence from any externally supplied numeric id, so that
//! ids minted after loading an external dataset never collide with loaded
//! ones.
//!
//! # Examples
//!
//! ```rust
//! use hyperstore_core::graph::IdService;
//!
//! let mut ids = IdService::new("d");
//! assert_eq!(ids.create_id(None), "d:1");
//! assert_eq!(ids.create_id(Some("42")), "d:42");
//! assert_eq!(ids.create_id(None), "d:43");
//! assert_eq!(ids.create_id(Some("title-page")), "d:title-page");
//! assert_eq!(ids.create_id(None), "d:44");
//! ```

/// Domain-scoped id minting with sequence recovery
#[derive(Debug, Clone)]
pub struct IdService {
    domain: String,
    seq: u64,
}

impl IdService {
    /// Create a service minting ids under the given domain name
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            seq: 0,
        }
    }

    /// Current sequence value
    pub fn sequence(&self) -> u64 {
        self.seq
    }

    /// Mint an id, or qualify a caller-supplied local part
    ///
    /// A numeric local part greater than the current sequence raises the
    /// sequence, keeping future minted ids collision-free.
    pub fn create_id(&mut self, local: Option<&str>) -> String {
        match local {
            Some(local) => {
                if let Ok(n) = local.parse::<u64>() {
                    self.seq = self.seq.max(n);
                }
                format!("{}:{}", self.domain, local)
            }
            None => {
                self.seq += 1;
                format!("{}:{}", self.domain, self.seq)
            }
        }
    }

    /// Ratchet the sequence from a full id observed in loaded data
    ///
    /// Ids from other domains are ignored.
    pub fn observe(&mut self, id: &str) {
        if let Some(local) = id.strip_prefix(&self.domain).and_then(|r| r.strip_prefix(':')) {
            if let Ok(n) = local.parse::<u64>() {
                self.seq = self.seq.max(n);
            }
        }
    }
}
