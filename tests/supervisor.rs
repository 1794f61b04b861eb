//! Reconnect supervision keeps existing subscriptions alive.

use alloy::primitives::Address;
use arc_swap::ArcSwap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chain_orchestrator::chain::ConnectionManager;
use chain_orchestrator::config::{ConnectionConfig, Endpoint, SubscriberConfig, SupervisorConfig};
use chain_orchestrator::events::{EventSubscriber, HandlerError};
use chain_orchestrator::lifecycle::{ConnectionSupervisor, Session, SupervisorAction};

mod common;
use common::{MockChain, MockFactory};

fn endpoint() -> Endpoint {
    Endpoint {
        network: "sepolia".to_string(),
        rpc_url: "http://node.example".to_string(),
        chain_id: Some(common::CHAIN_ID),
        contract_address: Some(Address::repeat_byte(0x11).to_string()),
    }
}

fn subscriber_config() -> SubscriberConfig {
    SubscriberConfig {
        poll_interval_ms: 20,
        max_block_range: 100,
    }
}

#[tokio::test]
async fn test_reconnect_keeps_subscriptions_delivering() {
    let first = MockChain::with_heads([10]);
    let second = MockChain::with_heads([12]);
    let factory = MockFactory::new(vec![first.clone(), second.clone()]);
    let manager = ConnectionManager::with_factory(
        ConnectionConfig {
            rpc_timeout_secs: 1,
            verify_chain_id: false,
        },
        factory.clone(),
    );

    let connection = manager.connect(&endpoint()).await.unwrap();
    let interface = common::bind(first.clone()).interface().clone();
    let contract =
        chain_orchestrator::ContractBinding::bind(connection.clone(), common::CONTRACT, interface)
            .unwrap();
    let subscriber = EventSubscriber::new(contract, subscriber_config(), 18);
    let registry = subscriber.registry().clone();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    registry.subscribe_blocks(move |height| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push(height);
            Ok::<(), HandlerError>(())
        }
    });

    let session = Arc::new(ArcSwap::from_pointee(Session::start(subscriber)));
    let supervisor = ConnectionSupervisor::new(
        manager,
        endpoint(),
        common::CONTRACT,
        registry,
        subscriber_config(),
        18,
        SupervisorConfig {
            enabled: true,
            check_interval_secs: 1,
            failure_threshold: 2,
        },
        session.clone(),
    );

    assert!(common::wait_until(Duration::from_secs(5), || seen.lock().unwrap().contains(&10)).await);
    assert_eq!(supervisor.check_once().await, SupervisorAction::Healthy);

    first.set_fail_blocks(true);
    assert_eq!(
        supervisor.check_once().await,
        SupervisorAction::Degraded { failures: 1 }
    );
    assert_eq!(supervisor.check_once().await, SupervisorAction::Reconnected);

    assert_eq!(factory.connects(), 2);
    assert!(!connection.is_ready());
    let current = session.load_full();
    assert!(!current.connection().same_link(&connection));
    assert!(current.connection().is_ready());

    assert!(common::wait_until(Duration::from_secs(5), || seen.lock().unwrap().contains(&12)).await);
    assert_eq!(*seen.lock().unwrap(), vec![10, 11, 12]);

    common::within(current.stop()).await;
}

#[tokio::test]
async fn test_failed_rebuild_keeps_old_session() {
    let first = MockChain::with_heads([5]);
    let factory = MockFactory::new(vec![first.clone()]);
    let manager = ConnectionManager::with_factory(ConnectionConfig::default(), factory.clone());

    let connection = manager.connect(&endpoint()).await.unwrap();
    let subscriber = EventSubscriber::new(
        chain_orchestrator::ContractBinding::bind(
            connection,
            common::CONTRACT,
            common::bind(first.clone()).interface().clone(),
        )
        .unwrap(),
        subscriber_config(),
        18,
    );
    let registry = subscriber.registry().clone();
    let session = Arc::new(ArcSwap::from_pointee(Session::start(subscriber)));

    let mut broken = endpoint();
    broken.rpc_url = "not a url".to_string();
    let supervisor = ConnectionSupervisor::new(
        manager,
        broken,
        common::CONTRACT,
        registry,
        subscriber_config(),
        18,
        SupervisorConfig {
            enabled: true,
            check_interval_secs: 1,
            failure_threshold: 1,
        },
        session.clone(),
    );

    first.set_fail_blocks(true);
    let before = session.load_full();
    assert_eq!(
        supervisor.check_once().await,
        SupervisorAction::ReconnectFailed { failures: 1 }
    );
    assert!(Arc::ptr_eq(&before, &session.load_full()));

    common::within(before.stop()).await;
}
