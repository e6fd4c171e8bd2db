//! End-to-end admission flows through the dispatch gate.
//!
//! These tests drive the public surface the way the gateway does: admit,
//! perform (or fail) the call, report the outcome, repeat. Timings are scaled
//! down so breaker recovery is observable without minute-long sleeps.

use std::sync::Arc;
use std::time::Duration;

use switchboard_dispatch::{
    BudgetConfig, CircuitState, CredentialKind, CredentialProfile, CredentialSource,
    DispatchConfig, DispatchError, DispatchGate, DispatchRequest, InMemoryProfileStore,
    ProviderBreakerConfig,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store_with_profiles(provider: &str, ids: &[&str]) -> Arc<InMemoryProfileStore> {
    let store = Arc::new(InMemoryProfileStore::new());
    for id in ids {
        store.insert(CredentialProfile::new(
            provider,
            *id,
            CredentialKind::ApiKey,
            format!("sk-ant-api03-{id}"),
        ));
    }
    store
}

#[tokio::test]
async fn provider_outage_trips_probes_and_reopens() {
    // Default threshold of 5, reset timeout scaled down from 60s.
    let mut config = DispatchConfig::default();
    config.provider_breaker = ProviderBreakerConfig::new()
        .with_failure_threshold(5)
        .with_reset_timeout_ms(80);
    let gate =
        DispatchGate::new(config, store_with_profiles("p1", &["p1:default"])).unwrap();
    let request = DispatchRequest::new("p1", "telegram:default:42");

    // Five consecutive failures open the circuit.
    for _ in 0..4 {
        gate.admit(&request).await.unwrap();
        gate.record_failure(&request);
    }
    gate.admit(&request).await.unwrap();
    gate.record_failure(&request);
    let err = gate.admit(&request).await.unwrap_err();
    assert!(matches!(err, DispatchError::CircuitOpen { failures: 5, .. }));

    // After the reset timeout one trial call is admitted.
    tokio::time::sleep(Duration::from_millis(100)).await;
    gate.admit(&request).await.unwrap();
    assert_eq!(
        gate.breakers().state("p1").state,
        CircuitState::HalfOpen
    );

    // The trial fails: re-open immediately, no re-counting to five.
    gate.record_failure(&request);
    assert!(gate.admit(&request).await.is_err());

    // Next trial succeeds: fully closed again.
    tokio::time::sleep(Duration::from_millis(100)).await;
    gate.admit(&request).await.unwrap();
    gate.record_success(&request, None);
    let snapshot = gate.breakers().state("p1");
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.consecutive_failures, 0);
}

#[tokio::test]
async fn daily_budget_denies_at_the_ceiling() {
    let mut config = DispatchConfig::default();
    config.budget = BudgetConfig::with_daily_limit(200.0);
    let gate = DispatchGate::new(
        config,
        store_with_profiles("anthropic", &["anthropic:default"]),
    )
    .unwrap();
    let request = DispatchRequest::new("anthropic", "telegram:default:42");

    gate.admit(&request).await.unwrap();
    gate.record_success(&request, Some(100.0));
    gate.admit(&request).await.unwrap();
    gate.record_success(&request, Some(100.0));

    let status = gate.budget().check("telegram:default:42");
    assert!(status.over_budget);
    assert_eq!(status.daily_spent_cents, 200.0);
    assert_eq!(status.daily_remaining_cents, Some(0.0));

    let err = gate.admit(&request).await.unwrap_err();
    assert!(matches!(err, DispatchError::BudgetExhausted { .. }));

    // Other conversations keep dispatching.
    let other = DispatchRequest::new("anthropic", "telegram:default:43");
    gate.admit(&other).await.unwrap();
}

#[tokio::test]
async fn relay_outage_aborts_before_any_other_check() {
    let gate = DispatchGate::new(
        DispatchConfig::default(),
        store_with_profiles("anthropic", &["anthropic:default"]),
    )
    .unwrap();
    // Nothing listens here; the probe fails fast.
    let request =
        DispatchRequest::new("anthropic", "telegram:default:42").via_relay("http://127.0.0.1:1");

    let err = gate.admit(&request).await.unwrap_err();
    assert!(matches!(err, DispatchError::RelayUnreachable { .. }));
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("Start or restart the relay process"));

    // The relay denial never touched the provider circuit.
    assert_eq!(gate.breakers().state("anthropic").consecutive_failures, 0);
}

#[tokio::test]
async fn healthy_relay_is_probed_once_across_dispatches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let gate = DispatchGate::new(
        DispatchConfig::default(),
        store_with_profiles("anthropic", &["anthropic:default"]),
    )
    .unwrap();
    let request =
        DispatchRequest::new("anthropic", "telegram:default:42").via_relay(server.uri());

    for _ in 0..3 {
        let admission = gate.admit(&request).await.unwrap();
        assert_eq!(admission.credential.kind, CredentialKind::ApiKey);
        gate.record_success(&request, Some(1.5));
    }
    // expect(1) verifies the second and third admits hit the health cache.
}

#[tokio::test]
async fn rotation_changes_the_dispatched_credential() {
    let store = store_with_profiles("anthropic", &["anthropic:default", "anthropic:backup"]);
    let gate = DispatchGate::new(DispatchConfig::default(), store).unwrap();
    let request = DispatchRequest::new("anthropic", "telegram:default:42");

    let admission = gate.admit(&request).await.unwrap();
    assert_eq!(
        admission.credential.source,
        CredentialSource::Profile {
            profile_id: "anthropic:default".to_string()
        }
    );

    // Operator rotates after e.g. the default profile hit its quota.
    assert!(gate
        .credentials()
        .set_active_profile("anthropic", "anthropic:backup")
        .unwrap());
    let admission = gate.admit(&request).await.unwrap();
    assert_eq!(admission.credential.secret, "sk-ant-api03-anthropic:backup");

    // A typo'd id is a plain negative result and rotation stays put.
    assert!(!gate
        .credentials()
        .set_active_profile("anthropic", "anthropic:typo")
        .unwrap());
    assert_eq!(
        gate.credentials().list_profiles("anthropic").unwrap(),
        vec!["anthropic:backup", "anthropic:default"]
    );
}

#[tokio::test]
async fn overload_breaker_gates_the_spawner_not_dispatch() {
    let gate = DispatchGate::new(
        DispatchConfig::default(),
        store_with_profiles("anthropic", &["anthropic:default"]),
    )
    .unwrap();
    let request = DispatchRequest::new("anthropic", "telegram:default:42");

    // The spawner records overload-shaped spawn failures.
    gate.overload().record_failure(Some("529 overloaded"));
    gate.overload().record_failure(None);
    gate.overload().record_failure(Some("rate limit exceeded"));

    assert!(gate.overload().is_open());
    let message = gate.overload().spawn_error_message();
    assert!(message.contains("Wait about"));

    // Model dispatch is a separate failure domain and still admits.
    gate.admit(&request).await.unwrap();

    let status = gate.status();
    assert!(status.overload.open);
    assert_eq!(status.overload.recent_failures, 3);
}
