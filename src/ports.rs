//! Port allocation for live projects.
//!
//! Best-effort accounting only: the allocator guarantees that no two projects
//! it manages are handed the same port, but it does not probe whether the OS
//! considers the port free.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::errors::OrchestratorError;

/// How many candidate ports to scan above the base before giving up.
const SEARCH_WINDOW: u16 = 10_000;

/// Hands out unique listening ports to live projects.
///
/// `reserved` holds ports the host process itself occupies (the dashboard's
/// own listening port); they are never handed out even after `release`.
pub struct PortAllocator {
    base: u16,
    reserved: HashSet<u16>,
    assigned: Mutex<HashSet<u16>>,
}

impl PortAllocator {
    pub fn new(base: u16, reserved: impl IntoIterator<Item = u16>) -> Self {
        Self {
            base,
            reserved: reserved.into_iter().collect(),
            assigned: Mutex::new(HashSet::new()),
        }
    }

    /// Return the first free port at or above the base and mark it assigned.
    pub fn allocate(&self) -> Result<u16, OrchestratorError> {
        let mut assigned = self.assigned.lock().unwrap_or_else(|e| e.into_inner());
        for offset in 0..SEARCH_WINDOW {
            let Some(port) = self.base.checked_add(offset) else {
                break;
            };
            if self.reserved.contains(&port) || assigned.contains(&port) {
                continue;
            }
            assigned.insert(port);
            return Ok(port);
        }
        Err(OrchestratorError::PortsExhausted {
            base: self.base,
            window: SEARCH_WINDOW,
        })
    }

    /// Make a previously-assigned port eligible for reuse.
    pub fn release(&self, port: u16) {
        let mut assigned = self.assigned.lock().unwrap_or_else(|e| e.into_inner());
        assigned.remove(&port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_sequential_distinct_ports() {
        let ports = PortAllocator::new(4000, []);
        assert_eq!(ports.allocate().unwrap(), 4000);
        assert_eq!(ports.allocate().unwrap(), 4001);
        assert_eq!(ports.allocate().unwrap(), 4002);
    }

    #[test]
    fn skips_reserved_ports() {
        let ports = PortAllocator::new(4000, [4000, 4002]);
        assert_eq!(ports.allocate().unwrap(), 4001);
        assert_eq!(ports.allocate().unwrap(), 4003);
    }

    #[test]
    fn released_port_is_reusable() {
        let ports = PortAllocator::new(4000, []);
        let first = ports.allocate().unwrap();
        let second = ports.allocate().unwrap();
        assert_ne!(first, second);
        ports.release(first);
        assert_eq!(ports.allocate().unwrap(), first);
    }

    #[test]
    fn release_never_unreserves_host_ports() {
        let ports = PortAllocator::new(4000, [4000]);
        ports.release(4000);
        assert_eq!(ports.allocate().unwrap(), 4001);
    }

    #[test]
    fn fails_when_search_window_is_exhausted() {
        let ports = PortAllocator::new(4000, []);
        for _ in 0..SEARCH_WINDOW {
            ports.allocate().unwrap();
        }
        let err = ports.allocate().unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::PortsExhausted { base: 4000, .. }
        ));
    }

    #[test]
    fn window_is_clamped_at_the_top_of_the_port_range() {
        let ports = PortAllocator::new(u16::MAX - 1, []);
        assert_eq!(ports.allocate().unwrap(), u16::MAX - 1);
        assert_eq!(ports.allocate().unwrap(), u16::MAX);
        assert!(ports.allocate().is_err());
    }

    #[test]
    fn allocation_is_injective_across_threads() {
        use std::sync::Arc;

        let ports = Arc::new(PortAllocator::new(4000, []));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let ports = Arc::clone(&ports);
            handles.push(std::thread::spawn(move || {
                (0..50)
                    .map(|_| ports.allocate().unwrap())
                    .collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for port in handle.join().unwrap() {
                assert!(seen.insert(port), "port {} handed out twice", port);
            }
        }
        assert_eq!(seen.len(), 400);
    }
}
