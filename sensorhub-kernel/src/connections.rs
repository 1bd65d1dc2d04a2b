//! Count of live dashboard connections. Observability only.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    active: AtomicUsize,
}

impl ConnectionRegistry {
    /// Returns the count after the increment
    pub fn on_connect(&self) -> usize {
        self.active.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the count after the decrement; never goes below zero
    pub fn on_disconnect(&self) -> usize {
        match self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => 0,
        }
    }

    pub fn count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Registers a connection released when the guard drops
    pub fn guard(self: &Arc<Self>) -> ConnectionGuard {
        let active = self.on_connect();
        info!("[ws] client connected. Active connections: {}", active);
        ConnectionGuard { registry: self.clone() }
    }
}

pub struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let active = self.registry.on_disconnect();
        info!("[ws] client disconnected. Active connections: {}", active);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_floors_at_zero() {
        let registry = ConnectionRegistry::default();
        assert_eq!(registry.on_disconnect(), 0);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_three_connects_one_disconnect() {
        let registry = ConnectionRegistry::default();
        for _ in 0..3 {
            registry.on_connect();
        }
        assert_eq!(registry.on_disconnect(), 2);
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn test_n_connects_m_disconnects() {
        let registry = ConnectionRegistry::default();
        for _ in 0..10 {
            registry.on_connect();
        }
        for _ in 0..4 {
            registry.on_disconnect();
        }
        assert_eq!(registry.count(), 6);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let registry = Arc::new(ConnectionRegistry::default());
        let first = registry.guard();
        let second = registry.guard();
        assert_eq!(registry.count(), 2);
        drop(first);
        assert_eq!(registry.count(), 1);
        drop(second);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_concurrent_updates_do_not_race() {
        let registry = Arc::new(ConnectionRegistry::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        registry.on_connect();
                        registry.on_disconnect();
                    }
                    registry.on_connect();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.count(), 8);
    }
}
