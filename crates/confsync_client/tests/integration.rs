//! End-to-end tests for the client against in-process servers and doubles.

use confsync_client::{
    BindingDescriptor, CacheFormat, ClientConfig, ClientContext, ClientSyncEngine, EngineState,
    FallbackTable, Field, RetryConfig,
};
use confsync_protocol::{PullResponse, PushEnvelope};
use confsync_testkit::prelude::*;
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn scripted_engine(transport: Arc<ScriptedTransport>, retry: RetryConfig) -> ClientSyncEngine {
    let config = ClientConfig::new("http://config.test", APP_CODE, ENV_CODE)
        .with_ids(APP_ID, ENV_ID)
        .with_polling(false)
        .with_retry(retry);
    ClientSyncEngine::new(config, transport)
        .unwrap()
        .with_sleeper(RecordingSleeper::new())
}

// ============================================================================
// Cache merge
// ============================================================================

#[test]
fn pull_and_push_merge_into_cache() {
    let transport = Arc::new(ScriptedTransport::failing(
        0,
        PullResponse::ok(config_map(&[("a", "1"), ("b", "2")])).with_revision(1),
    ));
    let engine = scripted_engine(transport.clone(), RetryConfig::no_retry());
    engine.pull().unwrap();

    transport.set_response(PullResponse::ok(config_map(&[("a", "10")])).with_revision(2));
    engine.pull().unwrap();
    assert_eq!(engine.cache().get("a").as_deref(), Some("10"));
    assert_eq!(engine.cache().get("b").as_deref(), Some("2"));

    let push = PushEnvelope::update(APP_ID, ENV_ID, config_map(&[("c", "3")])).with_revision(3);
    engine.handle_envelope(&push).unwrap();
    let cached = engine.snapshot();
    assert_eq!(cached.data(), &config_map(&[("a", "10"), ("b", "2"), ("c", "3")]));
}

proptest! {
    #[test]
    fn every_delivered_key_matches_and_others_survive(
        first in config_map_strategy(8),
        second in config_map_strategy(8),
    ) {
        let transport = Arc::new(ScriptedTransport::failing(0, PullResponse::ok(first.clone())));
        let engine = scripted_engine(transport.clone(), RetryConfig::no_retry());
        engine.pull().unwrap();
        transport.set_response(PullResponse::ok(second.clone()));
        engine.pull().unwrap();

        for (key, value) in &second {
            let cached = engine.cache().get(key);
            prop_assert_eq!(cached.as_ref(), Some(value));
        }
        for (key, value) in first.iter().filter(|(k, _)| !second.contains_key(*k)) {
            let cached = engine.cache().get(key);
            prop_assert_eq!(cached.as_ref(), Some(value));
        }
    }
}

// ============================================================================
// Bindings
// ============================================================================

#[test]
fn same_payload_twice_assigns_once() {
    let transport = Arc::new(ScriptedTransport::failing(
        0,
        PullResponse::ok(config_map(&[("feature.flag", "on")])),
    ));
    let ctx = ClientContext::new(scripted_engine(transport, RetryConfig::no_retry()));
    let probe = AssignmentProbe::new();
    ctx.bind(BindingDescriptor::new("feature.flag", probe.clone()))
        .unwrap();
    ctx.start(None).unwrap();
    assert_eq!(probe.count(), 1);

    let push = PushEnvelope::update(APP_ID, ENV_ID, config_map(&[("feature.flag", "on")]));
    ctx.engine().handle_envelope(&push).unwrap();
    ctx.engine().handle_envelope(&push).unwrap();
    ctx.engine().pull().unwrap();
    ctx.bindings().reapply_all();

    assert_eq!(probe.count(), 1);
    assert_eq!(probe.last().as_deref(), Some("on"));
}

// ============================================================================
// Fallbacks
// ============================================================================

#[test]
fn unreachable_server_and_empty_cache_fall_back() {
    let transport = Arc::new(ScriptedTransport::unreachable());
    let engine = scripted_engine(transport, RetryConfig::no_retry())
        .with_fallback(FallbackTable::new().with("db.url", "jdbc:h2:mem"));

    assert_eq!(engine.initialize(), EngineState::Empty);
    assert_eq!(engine.get("db.url", None).as_deref(), Some("jdbc:h2:mem"));
    assert_eq!(engine.get("missing", None), None);
    assert_eq!(engine.get_or("missing", "x"), "x");
    assert!(engine.health().degraded);
}

// ============================================================================
// Retry
// ============================================================================

#[test]
fn exhausted_pull_follows_backoff_sequence() {
    let transport = Arc::new(ScriptedTransport::unreachable());
    let sleeper = RecordingSleeper::new();
    let config = ClientConfig::new("http://config.test", APP_CODE, ENV_CODE)
        .with_ids(APP_ID, ENV_ID)
        .with_polling(false)
        .with_retry(
            RetryConfig::default()
                .with_max_retries(3)
                .with_initial_delay(Duration::from_millis(1000))
                .with_multiplier(2.0)
                .with_max_delay(Duration::from_millis(10_000)),
        );
    let engine = ClientSyncEngine::new(config, transport.clone())
        .unwrap()
        .with_sleeper(sleeper.clone());

    assert!(engine.pull().is_err());
    assert_eq!(transport.attempts(), 4);
    assert_eq!(sleeper.waits_ms(), vec![0, 1000, 2000, 4000]);
    assert_eq!(engine.stats().retries, 3);
    assert!(engine.cache().is_empty());
}

#[test]
fn pull_recovers_before_exhaustion() {
    let transport = Arc::new(ScriptedTransport::failing(
        2,
        PullResponse::ok(config_map(&[("a", "1")])),
    ));
    let engine = scripted_engine(transport.clone(), RetryConfig::default());
    assert!(engine.pull().unwrap().is_applied());
    assert_eq!(transport.attempts(), 3);
}

// ============================================================================
// End to end
// ============================================================================

#[test]
fn publish_pull_push_and_bind() {
    let server = TestServer::new();
    let first = server.publish(&[("a", "1")]);

    let ctx = ClientContext::new(server.client_engine(server.client_config()));
    assert_eq!(
        ctx.start(Some(Box::new(server.push_channel()))).unwrap(),
        EngineState::Synced
    );
    assert_eq!(ctx.get("a", None).as_deref(), Some("1"));
    assert!(wait_until(|| server.server().registry().len() == 1));

    let a = Arc::new(Field::<String>::new());
    ctx.bind(BindingDescriptor::new("a", a.clone())).unwrap();
    assert_eq!(a.get().as_deref(), Some("1"));

    let second = server.publish(&[("a", "2"), ("b", "x")]);
    assert_eq!(first.version().as_str(), "v1.0.0");
    assert_eq!(second.version().as_str(), "v1.0.1");

    assert!(wait_until(|| a.get().as_deref() == Some("2")));
    assert_eq!(
        ctx.engine().snapshot().data(),
        &config_map(&[("a", "2"), ("b", "x")])
    );

    let b = Arc::new(Field::<String>::new());
    ctx.bind(BindingDescriptor::new("b", b.clone())).unwrap();
    assert_eq!(b.get().as_deref(), Some("x"));

    ctx.shutdown();
    assert!(wait_until(|| server.server().registry().is_empty()));
}

#[test]
fn notification_without_payload_triggers_pull() {
    let server = TestServer::with_config(
        confsync_server::ServerConfig::default().with_push_on_apply(false),
    );
    server.publish(&[("a", "1")]);
    let ctx = ClientContext::new(server.client_engine(server.client_config()));
    ctx.start(Some(Box::new(server.push_channel()))).unwrap();
    assert!(wait_until(|| server.server().registry().len() == 1));

    server.publish(&[("a", "2")]);
    assert!(wait_until(|| ctx.engine().cache().get("a").as_deref() == Some("2")));
    ctx.shutdown();
}

#[test]
fn late_targeted_push_never_replaces_newer_values() {
    let server = TestServer::new();
    server.publish(&[("a", "1")]);
    let latest = server.publish(&[("a", "2")]);
    let ctx = ClientContext::new(server.client_engine(server.client_config()));
    ctx.start(Some(Box::new(server.push_channel()))).unwrap();
    assert!(wait_until(|| server.server().registry().len() == 1));
    assert_eq!(ctx.engine().cache().revision(), Some(2));

    let instance = server.server().registry().online_clients(APP_ID)[0]
        .instance_id
        .clone();
    let registry = server.server().registry();

    registry.push_to_instances(
        APP_ID,
        ENV_ID,
        &[instance.as_str()],
        config_map(&[("a", "1")]),
        Some(1),
        Some("v1.0.0"),
    );
    assert!(wait_until(|| ctx.engine().stats().pushes_dropped == 1));
    assert_eq!(ctx.engine().cache().get("a").as_deref(), Some("2"));

    let pulls = ctx.engine().stats().pulls_attempted;
    registry.push_to_instances(
        APP_ID,
        ENV_ID,
        &[instance.as_str()],
        config_map(&[("a", "1")]),
        None,
        None,
    );
    assert!(wait_until(|| ctx.engine().stats().pulls_attempted > pulls));
    assert_eq!(ctx.engine().stats().pushes_dropped, 2);
    assert_eq!(ctx.engine().cache().get("a").as_deref(), Some("2"));
    assert_eq!(ctx.engine().snapshot().version(), Some(latest.version().as_str()));
    ctx.shutdown();
}

// ============================================================================
// Durable cache
// ============================================================================

#[test]
fn durable_cache_warms_next_start() {
    let dir = TempCacheDir::new();
    let path = dir.file("shop-prod.properties");
    let server = TestServer::new();
    server.publish(&[("a", "1"), ("name", "hello world")]);

    let engine = server.client_engine(server.client_config().with_cache_file(&path));
    assert_eq!(engine.initialize(), EngineState::Synced);
    assert_eq!(CacheFormat::from_path(&path), CacheFormat::Properties);

    let config = ClientConfig::new("http://config.test", APP_CODE, ENV_CODE)
        .with_ids(APP_ID, ENV_ID)
        .with_polling(false)
        .with_retry(RetryConfig::no_retry())
        .with_cache_file(&path);
    let restarted = ClientSyncEngine::new(config, Arc::new(ScriptedTransport::unreachable()))
        .unwrap()
        .with_sleeper(RecordingSleeper::new());
    assert_eq!(restarted.initialize(), EngineState::Warm);
    assert_eq!(restarted.get("name", None).as_deref(), Some("hello world"));
    assert_eq!(restarted.cache().revision(), Some(1));
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn concurrent_pushes_never_regress_revision() {
    let transport = Arc::new(ScriptedTransport::unreachable());
    let engine = scripted_engine(transport, RetryConfig::no_retry());

    run_concurrent(4, 50, |t, i| {
        let revision = (i * 4 + t + 1) as u64;
        let push = PushEnvelope::update(
            APP_ID,
            ENV_ID,
            config_map(&[("rev", &revision.to_string())]),
        )
        .with_revision(revision);
        engine.handle_envelope(&push).unwrap();
    });

    assert_eq!(engine.cache().revision(), Some(200));
    assert_eq!(engine.cache().get("rev").as_deref(), Some("200"));
}
