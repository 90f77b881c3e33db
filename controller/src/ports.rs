//! Process-wide host port allocator, §4.3. A single [`PortRegistry`] is constructed once per
//! process and shared via `Arc` with every collection-reconciler worker; it never performs I/O
//! while holding its lock.

use kube::{Api, ResourceExt};
use rand::seq::SliceRandom;
use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use crate::util::Error;
use fleet_types::GameServer;

struct State {
    used: HashSet<u16>,
    permutation: Vec<u16>,
    cursor: usize,
    by_server: HashMap<String, Vec<u16>>,
}

pub struct PortRegistry {
    state: Mutex<State>,
    min_port: u16,
    max_port: u16,
}

impl PortRegistry {
    pub fn new(min_port: u16, max_port: u16) -> Self {
        Self {
            state: Mutex::new(State {
                used: HashSet::new(),
                permutation: Vec::new(),
                cursor: 0,
                by_server: HashMap::new(),
            }),
            min_port,
            max_port,
        }
    }

    /// Lists every live `GameServer`, binds its ports as used, then appends a random permutation
    /// of the remaining free ports. Call once at startup, before the collection reconciler
    /// starts handing out new ports.
    pub async fn reconstruct(&self, api: &Api<GameServer>) -> Result<(), Error> {
        let servers = api.list(&Default::default()).await?;
        for server in &servers {
            let ports: Vec<u16> = server.spec.ports.iter().map(|p| p.host_port).collect();
            self.bind(&ports, &server.name_any());
        }
        self.finalize();
        Ok(())
    }

    /// Marks `ports` as used under `server_name`. Used both by [`Self::reconstruct`] and
    /// directly in tests to seed a known starting state.
    pub fn bind(&self, ports: &[u16], server_name: &str) {
        let mut state = self.state.lock().unwrap();
        for &port in ports {
            if state.used.insert(port) {
                state.permutation.push(port);
            }
        }
        if !ports.is_empty() {
            state
                .by_server
                .entry(server_name.to_string())
                .or_default()
                .extend(ports.iter().copied());
        }
    }

    /// Appends a random permutation of every not-yet-used port in `[min_port, max_port]` after
    /// whatever `bind` calls have already contributed. Call exactly once, after all startup
    /// `bind` calls.
    pub fn finalize(&self) {
        let mut state = self.state.lock().unwrap();
        let mut remaining: Vec<u16> = (self.min_port..=self.max_port)
            .filter(|p| !state.used.contains(p))
            .collect();
        remaining.shuffle(&mut rand::rng());
        state.permutation.extend(remaining);
    }

    /// Scans forward from `cursor`, wrapping, for the next free port. Returns
    /// [`Error::PortsExhausted`] without mutating state if the whole range is in use.
    pub fn allocate(&self, server_name: &str) -> Result<u16, Error> {
        let mut state = self.state.lock().unwrap();
        let len = state.permutation.len();
        if len == 0 {
            return Err(Error::PortsExhausted);
        }
        for step in 0..len {
            let idx = (state.cursor + step) % len;
            let port = state.permutation[idx];
            if !state.used.contains(&port) {
                state.used.insert(port);
                state.cursor = (idx + 1) % len;
                state
                    .by_server
                    .entry(server_name.to_string())
                    .or_default()
                    .push(port);
                return Ok(port);
            }
        }
        Err(Error::PortsExhausted)
    }

    /// Frees every port held by `server_name`.
    pub fn release(&self, server_name: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(ports) = state.by_server.remove(server_name) {
            for port in ports {
                state.used.remove(&port);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_stays_in_range() {
        let reg = PortRegistry::new(20000, 20005);
        reg.finalize();
        for i in 0..6 {
            let port = reg.allocate(&format!("s{i}")).unwrap();
            assert!((20000..=20005).contains(&port));
        }
    }

    #[test]
    fn allocate_never_returns_duplicates() {
        let reg = PortRegistry::new(20000, 20009);
        reg.finalize();
        let mut seen = HashSet::new();
        for i in 0..10 {
            let port = reg.allocate(&format!("s{i}")).unwrap();
            assert!(seen.insert(port), "port {port} allocated twice");
        }
    }

    #[test]
    fn exhaustion_does_not_mutate_state() {
        let reg = PortRegistry::new(20000, 20001);
        reg.finalize();
        reg.allocate("a").unwrap();
        reg.allocate("b").unwrap();
        assert!(matches!(reg.allocate("c"), Err(Error::PortsExhausted)));
        // Releasing "a" must free exactly one slot back up.
        reg.release("a");
        let port = reg.allocate("c").unwrap();
        assert!(port == 20000 || port == 20001);
    }

    #[test]
    fn release_returns_port_to_free_pool() {
        let reg = PortRegistry::new(20000, 20000);
        reg.finalize();
        let port = reg.allocate("a").unwrap();
        reg.release("a");
        let port2 = reg.allocate("b").unwrap();
        assert_eq!(port, port2);
    }

    #[test]
    fn bind_reconstructs_startup_state_and_rejects_used_ports() {
        let reg = PortRegistry::new(20000, 20020);
        reg.bind(&[20005, 20012], "existing-a");
        reg.finalize();
        for _ in 0..30 {
            let port = reg.allocate("new").unwrap();
            assert_ne!(port, 20005);
            assert_ne!(port, 20012);
            reg.release("new");
        }
    }

    #[test]
    fn release_of_unknown_server_is_a_noop() {
        let reg = PortRegistry::new(20000, 20000);
        reg.finalize();
        reg.release("never-allocated");
        let port = reg.allocate("a").unwrap();
        assert_eq!(port, 20000);
    }
}
