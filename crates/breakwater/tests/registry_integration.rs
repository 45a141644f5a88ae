//! Integration tests for entity registries
//!
//! Exercises get-or-create semantics, configuration precedence, removal and
//! the merged event view under real traffic, including concurrent first
//! access and a full breaker state cycle driven through registry handles.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use breakwater::{
    BackoffStrategy, CircuitBreakerConfig, CircuitBreakerEventKind, CircuitBreakerRegistry,
    CircuitState, MockClock, RetryConfig, RetryMetrics, RetryRegistry,
};

#[derive(Debug, thiserror::Error)]
#[error("service error: {0}")]
struct ServiceError(String);

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn fail(message: &str) -> Result<&'static str, ServiceError> {
    Err(ServiceError(message.to_string()))
}

fn zero_backoff(max_attempts: u32) -> RetryConfig {
    RetryConfig::builder()
        .max_attempts(max_attempts)
        .backoff(BackoffStrategy::Fixed(Duration::ZERO))
        .build()
        .expect("Failed to build config")
}

/// Validates repeated lookups share one instance per name.
///
/// This test ensures two handles obtained under the same name observe the
/// same counters and event log, so metrics recorded through one handle are
/// visible through the other.
///
/// # Test Steps
/// 1. Obtain two handles for the same name from one registry
/// 2. Run a retried call through the first handle
/// 3. Verify the second handle reports the recorded metrics and events
/// 4. Confirm the registry holds exactly one entity
#[test]
fn test_lookups_share_one_instance_per_name() {
    init_tracing();
    let registry = RetryRegistry::new(zero_backoff(3)).expect("valid config");
    let writer = registry.get_or_create("checkout");
    let reader = registry.get_or_create("checkout");

    let calls = AtomicU32::new(0);
    let result = writer.execute(|| {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            fail("transient")
        } else {
            Ok("done")
        }
    });
    assert_eq!(result.expect("Should succeed"), "done");

    assert_eq!(reader.name(), "checkout");
    assert_eq!(reader.metrics().successful_calls_with_retry, 1);
    assert_eq!(reader.events().len(), 2);
    assert_eq!(registry.len(), 1);
}

/// Validates concurrent first access constructs exactly one instance.
///
/// This test ensures racing lookups under an unregistered name all end up
/// with the same entity; every thread's calls land on one shared counter
/// set instead of being split across duplicate instances.
///
/// # Test Steps
/// 1. Spawn 8 threads that each look up the same unregistered name
/// 2. Run 5 successful calls on each thread's handle
/// 3. Verify the registry holds exactly one entity
/// 4. Confirm the shared metrics count all 40 calls
#[test]
fn test_concurrent_first_access_constructs_once() {
    let registry = Arc::new(RetryRegistry::new(zero_backoff(3)).expect("valid config"));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                let retry = registry.get_or_create("shared");
                for _ in 0..5 {
                    let result = retry.execute(|| Ok::<&str, ServiceError>("ok"));
                    assert!(result.is_ok());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker panicked");
    }

    assert_eq!(registry.len(), 1);
    let metrics = registry.get_or_create("shared").metrics();
    assert_eq!(
        metrics,
        RetryMetrics { successful_calls_without_retry: 40, ..RetryMetrics::default() }
    );
}

/// Validates configuration precedence between defaults and overrides.
///
/// This test ensures entities created without an explicit configuration
/// inherit the registry default, an override applies on first creation, and
/// a later override for an existing name is ignored.
///
/// # Test Steps
/// 1. Create a registry whose default allows 5 attempts
/// 2. Run a persistent failure through a default-configured entity
/// 3. Run the same failure through an entity created with a 2-attempt
///    override
/// 4. Re-request the overridden name with a different configuration
/// 5. Verify attempt counts show the default, the override and the
///    first-wins rule
#[test]
fn test_default_config_and_per_name_override() {
    let registry = RetryRegistry::new(zero_backoff(5)).expect("valid config");

    let standard = registry.get_or_create("standard");
    let standard_calls = AtomicU32::new(0);
    let result: Result<&str, _> = standard.execute(|| {
        standard_calls.fetch_add(1, Ordering::SeqCst);
        fail("down")
    });
    assert!(result.is_err());
    assert_eq!(standard_calls.load(Ordering::SeqCst), 5);

    let limited = registry
        .get_or_create_with("limited", zero_backoff(2))
        .expect("Failed to create entity");
    assert_eq!(limited.config().max_attempts, 2);

    // A second override for the same name is ignored: first creation wins.
    let limited_again = registry
        .get_or_create_with("limited", zero_backoff(4))
        .expect("Failed to look up entity");
    let limited_calls = AtomicU32::new(0);
    let result: Result<&str, _> = limited_again.execute(|| {
        limited_calls.fetch_add(1, Ordering::SeqCst);
        fail("down")
    });
    assert!(result.is_err());
    assert_eq!(limited_calls.load(Ordering::SeqCst), 2);
}

/// Validates removal detaches the name while the next lookup starts fresh.
///
/// This test ensures a removed entity keeps functioning through outstanding
/// handles, still feeding the merged view, while a later lookup under the
/// same name builds a pristine instance with zeroed counters and an empty
/// log.
///
/// # Test Steps
/// 1. Run a retried call on an entity, then remove it from the registry
/// 2. Run another retried call through the removed handle
/// 3. Verify the removed handle kept recording and forwarding events
/// 4. Re-create the name and confirm the replacement starts pristine
#[test]
fn test_remove_then_recreate_starts_fresh() {
    init_tracing();
    let registry = RetryRegistry::new(zero_backoff(3)).expect("valid config");
    let original = registry.get_or_create("worker");

    let calls = AtomicU32::new(0);
    let warm = original.execute(|| {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            fail("blip")
        } else {
            Ok("ok")
        }
    });
    assert!(warm.is_ok());

    let removed = registry.remove("worker").expect("Should remove entity");
    assert!(registry.is_empty());
    assert!(registry.get("worker").is_none());

    // The detached handle keeps its counters, log and merged-view link.
    let calls = AtomicU32::new(0);
    let late = removed.execute(|| {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            fail("blip")
        } else {
            Ok("ok")
        }
    });
    assert!(late.is_ok());
    assert_eq!(removed.metrics().successful_calls_with_retry, 2);
    assert_eq!(registry.events().len(), 4);

    let replacement = registry.get_or_create("worker");
    assert_eq!(replacement.metrics(), RetryMetrics::default());
    assert!(replacement.events().is_empty());
    assert_eq!(registry.len(), 1);
}

/// Validates a breaker state cycle driven entirely through registry handles.
///
/// This test ensures handles obtained from a registry share the breaker
/// state machine: failures through one handle open the circuit for every
/// handle, and a successful trial through another closes it again, with the
/// merged view recording the whole cycle.
///
/// # Test Steps
/// 1. Create a breaker registry on a mock clock with a 2-call threshold
/// 2. Fail twice through an operations handle until the breaker opens
/// 3. Verify a separately obtained handle is rejected while open
/// 4. Advance past the open wait and close via a successful trial call
/// 5. Confirm both handles agree on the final state
/// 6. Confirm the merged log captured the transitions in order
#[test]
fn test_breaker_registry_state_cycle_through_clones() {
    let config = CircuitBreakerConfig::builder()
        .sliding_window_size(4)
        .minimum_number_of_calls(2)
        .failure_rate_threshold(50.0)
        .wait_duration_in_open_state(Duration::from_secs(1))
        .permitted_calls_in_half_open(1)
        .build()
        .expect("Failed to build config");
    let clock = MockClock::new();
    let registry =
        CircuitBreakerRegistry::with_clock(config, clock.clone()).expect("valid config");

    let ops = registry.get_or_create("backend");
    for _ in 0..2 {
        let result: Result<&str, _> = ops.call(|| fail("backend down"));
        assert!(result.is_err());
    }
    assert_eq!(ops.state(), CircuitState::Open);

    let dashboard = registry.get_or_create("backend");
    assert_eq!(registry.len(), 1);
    assert_eq!(dashboard.state(), CircuitState::Open);
    let rejected = dashboard.call(|| Ok::<&str, ServiceError>("never runs"));
    assert!(rejected.is_err());

    clock.advance(Duration::from_secs(1));
    let trial = dashboard.call(|| Ok::<&str, ServiceError>("recovered"));
    assert_eq!(trial.expect("Trial call should succeed"), "recovered");

    assert_eq!(ops.state(), CircuitState::Closed);
    assert_eq!(dashboard.state(), CircuitState::Closed);

    let transitions: Vec<_> = registry
        .events()
        .iter()
        .filter_map(|event| match event.kind {
            CircuitBreakerEventKind::StateTransition { from, to } => Some((from, to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            (CircuitState::Closed, CircuitState::Open),
            (CircuitState::Open, CircuitState::HalfOpen),
            (CircuitState::HalfOpen, CircuitState::Closed),
        ]
    );
}

/// Validates the entity snapshot supports aggregate views.
///
/// This test ensures `entities()` lists every registered member so callers
/// can aggregate health across the fleet, and that the snapshot tracks
/// removals.
///
/// # Test Steps
/// 1. Register three breakers and run a different call count through each
/// 2. Verify the snapshot lists all three names
/// 3. Aggregate successful calls across the snapshot
/// 4. Remove one member and confirm the snapshot shrinks
#[test]
fn test_entities_snapshot_drives_aggregate_view() {
    let registry = CircuitBreakerRegistry::with_defaults();
    let traffic = [("svc-a", 3_u64), ("svc-b", 1), ("svc-c", 2)];
    for (name, count) in traffic {
        let breaker = registry.get_or_create(name);
        for _ in 0..count {
            let result = breaker.call(|| Ok::<&str, ServiceError>("ok"));
            assert!(result.is_ok());
        }
    }

    let entities = registry.entities();
    assert_eq!(entities.len(), 3);
    let mut names: Vec<_> = entities.iter().map(|b| b.name().to_string()).collect();
    names.sort();
    assert_eq!(names, vec!["svc-a", "svc-b", "svc-c"]);

    let total: u64 = entities.iter().map(|b| b.metrics().successful_calls).sum();
    assert_eq!(total, 6);

    registry.remove("svc-b");
    assert_eq!(registry.entities().len(), 2);
}

/// Validates the merged subscription spans every registered breaker.
///
/// This test ensures one registry-level subscription observes events from
/// all members in arrival order, tagged with the emitting entity's name.
///
/// # Test Steps
/// 1. Register two breakers, then subscribe to the merged feed
/// 2. Record a success on one member and a failure on the other
/// 3. Verify the subscriber receives both events in order with their names
#[tokio::test(flavor = "multi_thread")]
async fn test_merged_subscription_spans_breakers() {
    let registry = CircuitBreakerRegistry::with_defaults();
    let api = registry.get_or_create("api");
    let db = registry.get_or_create("db");

    let mut feed = registry.subscribe();

    let ok = api.call(|| Ok::<&str, ServiceError>("200"));
    assert!(ok.is_ok());
    let err: Result<&str, _> = db.call(|| fail("deadlock"));
    assert!(err.is_err());

    let first = feed.recv().await.expect("Should receive first event");
    assert_eq!(first.name, "api");
    assert_eq!(first.kind.label(), "SUCCESS");

    let second = feed.recv().await.expect("Should receive second event");
    assert_eq!(second.name, "db");
    assert_eq!(second.kind.label(), "ERROR");
}
