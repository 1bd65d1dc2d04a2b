/*!
Test harness for kernel components talking to the board

Provides:
- Automatic setup of the gateway stub
- Expectations on the number of requests per route
- Polling helpers for asynchronous pollers
*/

use crate::gateway_stub::GatewayStub;
use std::collections::HashMap;
use std::time::Duration;
use anyhow::Result;

/// Full harness around a running gateway stub
pub struct TestHarness {
    pub gateway: GatewayStub,
    expectations: Vec<Expectation>,
}

#[derive(Debug)]
struct Expectation {
    path: String,
    expected_count: usize,
}

impl TestHarness {
    /// Starts a stub with default answers
    pub async fn new() -> Result<Self> {
        env_logger::try_init().ok(); // logging for tests

        Ok(Self {
            gateway: GatewayStub::start().await?,
            expectations: Vec::new(),
        })
    }

    pub fn base_url(&self) -> String {
        self.gateway.base_url()
    }

    /// Adds an expectation: exactly N requests must hit `path`
    pub fn expect_requests(&mut self, path: &str, count: usize) -> &mut Self {
        self.expectations.push(Expectation {
            path: path.to_string(),
            expected_count: count,
        });
        self
    }

    /// Waits until at least `count` requests hit `path`, or the timeout elapses
    pub async fn wait_for_requests(&self, path: &str, count: usize, timeout_ms: u64) -> bool {
        let start = std::time::Instant::now();

        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if self.gateway.count(path) >= count {
                log::info!("✅ {} reached {} requests", path, count);
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        log::warn!("⏰ Timeout waiting for {} requests on {}", count, path);
        false
    }

    /// Checks every configured expectation
    pub fn verify_expectations(&self) -> Result<()> {
        log::info!("🔍 Verifying {} expectations...", self.expectations.len());

        for expectation in &self.expectations {
            let actual_count = self.gateway.count(&expectation.path);
            if actual_count != expectation.expected_count {
                anyhow::bail!(
                    "Expectation failed for '{}': expected {} requests, got {}",
                    expectation.path, expectation.expected_count, actual_count
                );
            }
        }

        Ok(())
    }

    /// Request counts per path
    pub fn get_stats(&self) -> TestStats {
        let requests = self.gateway.requests();
        let mut path_counts = HashMap::new();

        for request in &requests {
            *path_counts.entry(request.path.clone()).or_insert(0) += 1;
        }

        TestStats {
            total_requests: requests.len(),
            path_counts,
        }
    }

    /// Resets recorded requests and expectations
    pub fn reset(&mut self) {
        self.gateway.clear();
        self.expectations.clear();
    }
}

#[derive(Debug)]
pub struct TestStats {
    pub total_requests: usize,
    pub path_counts: HashMap<String, usize>,
}

impl TestStats {
    pub fn print(&self) {
        println!("📊 Gateway stub statistics:");
        println!("  Total requests: {}", self.total_requests);
        for (path, count) in &self.path_counts {
            println!("    {}: {} requests", path, count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_harness_expectations() {
        let mut harness = TestHarness::new().await.unwrap();
        harness.expect_requests("/data", 2).expect_requests("/buzzer", 0);

        for _ in 0..2 {
            reqwest::get(format!("{}/data", harness.base_url())).await.unwrap();
        }

        assert!(harness.wait_for_requests("/data", 2, 1000).await);
        harness.verify_expectations().unwrap();

        let stats = harness.get_stats();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.path_counts.get("/data"), Some(&2));
        stats.print();

        harness.reset();
        assert_eq!(harness.get_stats().total_requests, 0);
    }

    #[tokio::test]
    async fn test_harness_detects_mismatch() {
        let mut harness = TestHarness::new().await.unwrap();
        harness.expect_requests("/data", 1);

        assert!(harness.verify_expectations().is_err());
        assert!(!harness.wait_for_requests("/data", 1, 50).await);
    }
}
