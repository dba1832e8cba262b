//! Selection behaviour across strategies and under concurrent pool changes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pool_balancer::config::parse_config;
use pool_balancer::{Balancer, BalancerError, Strategy, Target};

mod common;

fn healthy(targets: Vec<Arc<Target>>) -> Vec<Arc<Target>> {
    for target in &targets {
        target.set_healthy(true);
    }
    targets
}

fn picks(lb: &Balancer, n: usize) -> Vec<String> {
    (0..n)
        .map(|_| lb.select_next().unwrap().address().to_string())
        .collect()
}

#[test]
fn test_weighted_three_to_one() {
    let lb = Balancer::new(
        healthy(vec![common::weighted("A", 3), common::weighted("B", 1)]),
        Strategy::WeightedRoundRobin,
    )
    .unwrap();

    let first = picks(&lb, 4);
    assert_eq!(first, ["A", "A", "A", "B"]);
    assert_eq!(picks(&lb, 4), first);
}

#[test]
fn test_weighted_shares_over_many_rounds() {
    let lb = Balancer::new(
        healthy(vec![
            common::weighted("A", 5),
            common::weighted("B", 2),
            common::weighted("C", 1),
        ]),
        Strategy::WeightedRoundRobin,
    )
    .unwrap();

    let mut counts: HashMap<String, usize> = HashMap::new();
    for address in picks(&lb, 80) {
        *counts.entry(address).or_default() += 1;
    }
    assert_eq!(counts["A"], 50);
    assert_eq!(counts["B"], 20);
    assert_eq!(counts["C"], 10);
}

#[test]
fn test_round_robin_unhealthy_fallback() {
    let lb = Balancer::new(common::targets(&["a", "b", "c"]), Strategy::RoundRobin).unwrap();
    lb.advance_cursor();

    // Fresh targets are alive but not yet healthy.
    assert_eq!(lb.select_next().unwrap().address(), "b");
    assert_eq!(lb.cursor_position(), 2);
}

#[test]
fn test_weighted_added_target_joins_rotation() {
    let lb = Balancer::new(healthy(vec![common::weighted("A", 1)]), Strategy::WeightedRoundRobin)
        .unwrap();
    assert_eq!(picks(&lb, 2), ["A", "A"]);

    let added = common::weighted("B", 1);
    added.set_healthy(true);
    assert!(lb.add_server(added));

    let next = picks(&lb, 4);
    assert_eq!(next.iter().filter(|a| *a == "B").count(), 2);
}

#[test]
fn test_removed_target_never_selected() {
    let lb = Balancer::new(healthy(common::targets(&["a", "b", "c"])), Strategy::WeightedRoundRobin)
        .unwrap();
    picks(&lb, 3);
    assert!(lb.remove_server("b"));
    assert!(picks(&lb, 10).iter().all(|a| a != "b"));
}

#[test]
fn test_strategy_switch_at_runtime() {
    let lb = Balancer::new(
        healthy(vec![common::weighted("A", 2), common::weighted("B", 1)]),
        Strategy::RoundRobin,
    )
    .unwrap();
    assert_eq!(picks(&lb, 3), ["A", "B", "A"]);

    lb.set_strategy(Strategy::WeightedRoundRobin).unwrap();
    assert_eq!(picks(&lb, 3), ["A", "A", "B"]);

    assert!(matches!(
        lb.set_strategy(Strategy::IpHash),
        Err(BalancerError::UnsupportedStrategy(Strategy::IpHash))
    ));
}

#[test]
fn test_selection_during_pool_churn() {
    let lb = Arc::new(
        Balancer::new(healthy(common::targets(&["stable"])), Strategy::RoundRobin).unwrap(),
    );
    let done = Arc::new(AtomicBool::new(false));

    let churn = {
        let lb = Arc::clone(&lb);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut i = 0u32;
            while !done.load(Ordering::SeqCst) {
                let target = Arc::new(Target::new(format!("churn-{}", i % 4)));
                target.set_healthy(true);
                lb.add_server(target);
                lb.remove_server(&format!("churn-{}", (i + 2) % 4));
                i += 1;
            }
        })
    };

    let selectors: Vec<_> = (0..3)
        .map(|_| {
            let lb = Arc::clone(&lb);
            thread::spawn(move || {
                for _ in 0..2000 {
                    assert!(lb.select_next().is_some());
                    let _ = lb.stats();
                }
            })
        })
        .collect();

    for handle in selectors {
        handle.join().unwrap();
    }
    done.store(true, Ordering::SeqCst);
    churn.join().unwrap();

    assert!(lb.servers().iter().any(|t| t.address() == "stable"));
}

#[test]
fn test_connection_guard_feeds_average_load() {
    let lb = Balancer::new(healthy(common::targets(&["a", "b"])), Strategy::RoundRobin).unwrap();

    let first = lb.select_next().unwrap().acquire();
    let second = lb.select_next().unwrap().acquire();
    let third = lb.select_next().unwrap().acquire();
    assert!((lb.average_load() - 1.5).abs() < 1e-9);

    drop((first, second, third));
    assert_eq!(lb.average_load(), 0.0);
}

#[test]
fn test_from_config() {
    let config = parse_config(
        r#"
        strategy = "weighted_round_robin"

        [[targets]]
        address = "127.0.0.1:1"
        weight = 2

        [[targets]]
        address = "127.0.0.1:2"

        [health_check]
        interval_ms = 250
        probe_timeout_ms = 50
        workers = 2
        failure_threshold = 4
        "#,
    )
    .unwrap();

    let lb = Balancer::from_config(&config).unwrap();
    assert_eq!(lb.strategy(), Strategy::WeightedRoundRobin);
    assert_eq!(lb.server_count(), 2);
    assert_eq!(lb.health_check_interval(), Duration::from_millis(250));
    assert_eq!(lb.max_health_check_failures(), 4);
    assert_eq!(lb.prober().worker_pool_size(), 2);
    assert_eq!(lb.prober().timeout(), Duration::from_millis(50));
    assert_eq!(lb.servers()[0].weight(), 2);
}
