// Collector scenarios: deduplication, partial failure, deadlines, cancellation,
// geolocation policy and metric carry-over

#[cfg(test)]
mod collector_tests {
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tokio_util::sync::CancellationToken;

    use crate::address::Address;
    use crate::collector::{CollectError, GeoMode, HostCollector};
    use crate::config::EndpointConfig;
    use crate::gateway::GatewayError;
    use crate::host::HostError;
    use crate::metrics::{MetricKind, Metrics};
    use crate::tests::{FakeGeo, FakeRpc, FakeScraper};
    use crate::types::TableType;

    // ===== HELPER FUNCTIONS =====

    fn resolve(table: TableType, raw: &[&str]) -> Vec<Address> {
        raw.iter()
            .map(|r| EndpointConfig::new(*r).resolve(table).unwrap())
            .collect()
    }

    fn collector(rpc: &Arc<FakeRpc>, scraper: &Arc<FakeScraper>) -> HostCollector {
        HostCollector::new(rpc.clone(), scraper.clone())
    }

    // ===== DEDUPLICATION & PARTIAL FAILURE =====

    #[tokio::test]
    async fn test_duplicates_dropped_and_unreachable_excluded() {
        let rpc = Arc::new(FakeRpc::default());
        let scraper = Arc::new(FakeScraper::default());

        for endpoint in ["http://10.0.0.1:9000", "http://10.0.0.2:9000", "http://10.0.0.3:9000"] {
            rpc.chain(endpoint, 1000, 50);
        }
        rpc.take_down("http://10.0.0.4:9000");

        // Same endpoint written two ways
        let addresses = resolve(
            TableType::Rpc,
            &["10.0.0.1", "http://10.0.0.1:9000", "10.0.0.2", "10.0.0.3", "10.0.0.4"],
        );

        let outcome = collector(&rpc, &scraper)
            .collect(TableType::Rpc, &addresses, HashMap::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.hosts.len(), 3);
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(
            &outcome.errors[0],
            HostError::Unreachable { failures: 4, .. }
        ));

        // 4 unique addresses, 4 methods each
        assert_eq!(rpc.calls.load(Ordering::SeqCst), 16);

        for host in &outcome.hosts {
            assert!(host.metrics.updated);
            assert_eq!(host.metrics.total_transaction_blocks, 1000);
            // System state and APY were never scripted
            assert_eq!(host.errors.len(), 2);
        }
    }

    #[tokio::test]
    async fn test_no_hosts_is_an_error() {
        let rpc = Arc::new(FakeRpc::default());
        let scraper = Arc::new(FakeScraper::default());
        rpc.take_down("http://10.0.0.1:9000");
        rpc.take_down("http://10.0.0.2:9000");

        let addresses = resolve(TableType::Node, &["10.0.0.1", "10.0.0.2"]);
        scraper.take_down("http://10.0.0.1:9184/metrics");
        scraper.take_down("http://10.0.0.2:9184/metrics");

        let err = collector(&rpc, &scraper)
            .collect(TableType::Node, &addresses, HashMap::new(), &CancellationToken::new())
            .await
            .unwrap_err();

        let CollectError::NoHosts { table, errors, .. } = err;
        assert_eq!(table, TableType::Node);
        assert_eq!(errors.len(), 2);
    }

    #[tokio::test]
    async fn test_panicking_task_is_reported() {
        let rpc = Arc::new(FakeRpc::default());
        let scraper = Arc::new(FakeScraper::default());
        rpc.chain("http://10.0.0.1:9000", 1000, 50);
        rpc.explode("http://10.0.0.2:9000");

        let addresses = resolve(TableType::Rpc, &["10.0.0.1", "10.0.0.2"]);
        let outcome = collector(&rpc, &scraper)
            .collect(TableType::Rpc, &addresses, HashMap::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.hosts.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        match &outcome.errors[0] {
            HostError::Aborted { address, reason } => {
                assert_eq!(address, &addresses[1].to_string());
                assert!(reason.contains("panic"), "{}", reason);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scrape_alone_keeps_node() {
        let rpc = Arc::new(FakeRpc::default());
        let scraper = Arc::new(FakeScraper::default());
        rpc.take_down("http://10.0.0.1:9000");
        scraper.set("http://10.0.0.1:9184/metrics", "uptime", 7200.0);

        let addresses = resolve(TableType::Node, &["10.0.0.1"]);
        let outcome = collector(&rpc, &scraper)
            .collect(TableType::Node, &addresses, HashMap::new(), &CancellationToken::new())
            .await
            .unwrap();

        let host = &outcome.hosts[0];
        assert_eq!(host.metrics.uptime, "2h 0m");
        assert_eq!(host.metrics.total_transaction_blocks, 0);
    }

    #[tokio::test]
    async fn test_empty_address_list() {
        let rpc = Arc::new(FakeRpc::default());
        let scraper = Arc::new(FakeScraper::default());

        let result = collector(&rpc, &scraper)
            .collect(TableType::Validator, &[], HashMap::new(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(CollectError::NoHosts { .. })));
    }

    // ===== VALIDATOR SCRAPE =====

    #[tokio::test]
    async fn test_validator_scrape() {
        let rpc = Arc::new(FakeRpc::default());
        let scraper = Arc::new(FakeScraper::default());
        let endpoint = "http://10.0.1.1:9184/metrics";

        scraper.set_labeled(endpoint, "uptime", 93_784.0, &[("version", "1.28.3-a1b2c3d")]);
        scraper.set(endpoint, "current_round", 42.0);
        scraper.set(endpoint, "highest_synced_checkpoint", 1200.0);
        scraper.set(endpoint, "last_executed_checkpoint", 1195.0);

        let addresses = resolve(TableType::Validator, &["10.0.1.1"]);
        let outcome = collector(&rpc, &scraper)
            .collect(TableType::Validator, &addresses, HashMap::new(), &CancellationToken::new())
            .await
            .unwrap();

        let host = &outcome.hosts[0];
        assert!(host.rpc_url.is_none());
        assert_eq!(host.metrics.uptime, "1d 2h 3m");
        assert_eq!(host.metrics.version, "1.28.3");
        assert_eq!(host.metrics.commit, "a1b2c3d");
        assert_eq!(host.metrics.current_round, 42);
        assert_eq!(host.metrics.checkpoint_exec_backlog, 5);

        // Series the validator does not export are recorded, not fatal
        assert!(host.errors.iter().any(|e| e.contains("certificates_created")));
        assert_eq!(rpc.calls.load(Ordering::SeqCst), 0);
    }

    // ===== DEADLINES & CANCELLATION =====

    #[tokio::test]
    async fn test_hanging_host_times_out() {
        let rpc = Arc::new(FakeRpc::default());
        let scraper = Arc::new(FakeScraper::default());
        rpc.chain("http://10.0.0.1:9000", 500, 20);
        rpc.hang("http://10.0.0.2:9000");

        let addresses = resolve(TableType::Rpc, &["10.0.0.1", "10.0.0.2"]);
        let started = Instant::now();
        let outcome = collector(&rpc, &scraper)
            .with_call_timeout(Duration::from_millis(50))
            .collect(TableType::Rpc, &addresses, HashMap::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(outcome.hosts.len(), 1);
        assert!(matches!(
            &outcome.errors[0],
            HostError::Unreachable {
                first: GatewayError::Timeout { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_calls() {
        let rpc = Arc::new(FakeRpc::default());
        let scraper = Arc::new(FakeScraper::default());
        rpc.hang("http://10.0.0.1:9000");
        rpc.hang("http://10.0.0.2:9000");

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let addresses = resolve(TableType::Rpc, &["10.0.0.1", "10.0.0.2"]);
        let started = Instant::now();
        let err = collector(&rpc, &scraper)
            .collect(TableType::Rpc, &addresses, HashMap::new(), &cancel)
            .await
            .unwrap_err();

        // Well below the default call timeout
        assert!(started.elapsed() < Duration::from_secs(2));

        let CollectError::NoHosts { errors, .. } = err;
        assert!(errors.iter().all(|e| matches!(
            e,
            HostError::Unreachable {
                first: GatewayError::Cancelled { .. },
                ..
            }
        )));
    }

    // ===== GEOLOCATION =====

    #[tokio::test]
    async fn test_required_geolocation_drops_host() {
        let rpc = Arc::new(FakeRpc::default());
        let scraper = Arc::new(FakeScraper::default());
        rpc.chain("http://10.0.0.1:9000", 500, 20);
        rpc.chain("http://10.0.0.2:9000", 500, 20);
        let geo = Arc::new(FakeGeo::default().with("10.0.0.1", "DE"));

        let addresses = resolve(TableType::Rpc, &["10.0.0.1", "10.0.0.2"]);
        let outcome = collector(&rpc, &scraper)
            .with_geolocation(geo, GeoMode::Required)
            .collect(TableType::Rpc, &addresses, HashMap::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.hosts.len(), 1);
        assert_eq!(outcome.hosts[0].location.as_ref().unwrap().flag, "🇩🇪");
        assert!(matches!(&outcome.errors[0], HostError::Geolocation { .. }));
    }

    #[tokio::test]
    async fn test_best_effort_geolocation_keeps_host() {
        let rpc = Arc::new(FakeRpc::default());
        let scraper = Arc::new(FakeScraper::default());
        rpc.chain("http://10.0.0.1:9000", 500, 20);
        rpc.chain("http://10.0.0.2:9000", 500, 20);
        let geo = Arc::new(FakeGeo::default().with("10.0.0.1", "DE"));

        let addresses = resolve(TableType::Rpc, &["10.0.0.1", "10.0.0.2"]);
        let outcome = collector(&rpc, &scraper)
            .with_geolocation(geo, GeoMode::BestEffort)
            .collect(TableType::Rpc, &addresses, HashMap::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.hosts.len(), 2);
        assert!(outcome.errors.is_empty());

        let unlocated = outcome.hosts.iter().find(|h| h.location.is_none()).unwrap();
        assert!(unlocated.errors.iter().any(|e| e.contains("geolocation")));
    }

    // ===== CARRY-OVER =====

    #[tokio::test]
    async fn test_carried_windows_continue() {
        let rpc = Arc::new(FakeRpc::default());
        let scraper = Arc::new(FakeScraper::default());
        rpc.chain("http://10.0.0.1:9000", 130, 20);

        let addresses = resolve(TableType::Rpc, &["10.0.0.1"]);

        let mut previous = Metrics::new(3);
        previous.ingest(MetricKind::TotalTransactionBlocks, "100".into()).unwrap();
        previous.ingest(MetricKind::TotalTransactionBlocks, "110".into()).unwrap();
        let carried = HashMap::from([(addresses[0].key(), previous.carry_forward())]);

        let outcome = collector(&rpc, &scraper)
            .collect(TableType::Rpc, &addresses, carried, &CancellationToken::new())
            .await
            .unwrap();

        let metrics = &outcome.hosts[0].metrics;
        assert_eq!(metrics.total_transaction_blocks, 130);
        assert_eq!(metrics.transactions_per_second(), 30);
    }

    fn warm_start(addresses: &[Address]) -> HashMap<String, Metrics> {
        addresses
            .iter()
            .map(|address| {
                let mut metrics = Metrics::new(3);
                metrics.ingest(MetricKind::TotalTransactionBlocks, "100".into()).unwrap();
                metrics.ingest(MetricKind::TotalTransactionBlocks, "110".into()).unwrap();
                (address.key(), metrics.carry_forward())
            })
            .collect()
    }

    #[tokio::test]
    async fn test_failed_host_returns_its_windows() {
        let rpc = Arc::new(FakeRpc::default());
        let scraper = Arc::new(FakeScraper::default());
        rpc.chain("http://10.0.0.1:9000", 130, 20);
        rpc.take_down("http://10.0.0.2:9000");

        let addresses = resolve(TableType::Rpc, &["10.0.0.1", "10.0.0.2"]);
        let outcome = collector(&rpc, &scraper)
            .collect(TableType::Rpc, &addresses, warm_start(&addresses), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.hosts.len(), 1);
        assert_eq!(outcome.retained.len(), 1);

        let kept = &outcome.retained[&addresses[1].key()];
        assert_eq!(kept.windows.transactions.len(), 2);
        assert!(!kept.updated);
        assert_eq!(kept.total_transaction_blocks, 0);
    }

    #[tokio::test]
    async fn test_failed_table_returns_its_windows() {
        let rpc = Arc::new(FakeRpc::default());
        let scraper = Arc::new(FakeScraper::default());
        rpc.take_down("http://10.0.0.1:9000");
        rpc.take_down("http://10.0.0.2:9000");

        let addresses = resolve(TableType::Rpc, &["10.0.0.1", "10.0.0.2"]);
        let err = collector(&rpc, &scraper)
            .collect(TableType::Rpc, &addresses, warm_start(&addresses), &CancellationToken::new())
            .await
            .unwrap_err();

        let retained = err.into_retained();
        assert_eq!(retained.len(), 2);
        assert!(retained.values().all(|m| m.windows.transactions.len() == 2));
    }
}
