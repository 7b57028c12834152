//! Server scenarios: connections, publishes and pulls through `ConfigServer`.

use confsync_core::{ConfigItem, DraftRequest};
use confsync_protocol::{ClientMessage, ConfigMap, PullResponse, PushEnvelope};
use confsync_server::{ChannelSink, ConfigServer, MemoryDirectory, ServerConfig};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn server(config: ServerConfig) -> Arc<ConfigServer> {
    let directory = MemoryDirectory::new()
        .with("shop", 1, "prod", 10)
        .with("shop", 1, "dev", 11)
        .with("ledger", 2, "prod", 20);
    Arc::new(ConfigServer::new(config, Arc::new(directory)))
}

fn map(pairs: &[(&str, &str)]) -> ConfigMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn pushes_are_broadcast_per_application_not_per_environment() {
    let server = server(ServerConfig::default());
    let (prod_sink, prod_rx) = ChannelSink::pair();
    let (dev_sink, dev_rx) = ChannelSink::pair();
    let (other_sink, other_rx) = ChannelSink::pair();

    for (sink, app, instance) in [(prod_sink, 1, "prod-1"), (dev_sink, 1, "dev-1"), (other_sink, 2, "l-1")] {
        let conn = server.accept(Arc::new(sink));
        server
            .handle_client_message(&conn, ClientMessage::register(app, instance, "", "1.0.0"))
            .unwrap();
    }

    let draft = server
        .lifecycle()
        .create(DraftRequest::new(1, 10, "alice").with_map(&map(&[("a", "1")])))
        .unwrap();
    server.publish(draft.id(), "alice").unwrap();

    let prod: Vec<_> = prod_rx.try_iter().collect();
    let dev: Vec<_> = dev_rx.try_iter().collect();
    assert_eq!(prod.len(), 2);
    assert_eq!(dev.len(), 2);
    assert!(other_rx.try_recv().is_err());
    for envelope in prod.iter().chain(dev.iter()) {
        assert_eq!(envelope.env_id(), 10);
    }
}

#[test]
fn pull_reflects_every_publish() {
    let server = server(ServerConfig::default().with_push_on_apply(false));
    let lc = server.lifecycle();

    let v1 = lc
        .create_draft(1, 10, "one", "", vec![ConfigItem::new("a", "1")], "alice")
        .unwrap();
    server.publish(v1.id(), "alice").unwrap();
    let first = PullResponse::decode(&server.handle_get("/api/client/configs/shop/prod").body).unwrap();
    assert_eq!(first.data, map(&[("a", "1")]));
    assert_eq!(first.revision, Some(1));

    let v2 = lc
        .create_draft(
            1,
            10,
            "two",
            "",
            vec![ConfigItem::new("a", "2"), ConfigItem::new("b", "x")],
            "alice",
        )
        .unwrap();
    server.publish(v2.id(), "alice").unwrap();
    let second = PullResponse::decode(&server.handle_get("/api/client/configs/shop/prod").body).unwrap();
    assert_eq!(second.data, map(&[("a", "2"), ("b", "x")]));
    assert_eq!(second.version.as_deref(), Some("v1.0.1"));

    let dev = PullResponse::decode(&server.handle_get("/api/client/configs/shop/dev").body).unwrap();
    assert!(dev.data.is_empty());
}

#[test]
fn connections_churn_while_publishing() {
    let server = server(ServerConfig::default().with_heartbeat_timeout(Duration::from_secs(30)));
    let workers: Vec<_> = (0..6)
        .map(|t| {
            let server = Arc::clone(&server);
            thread::spawn(move || {
                let mut received = 0;
                for i in 0..20 {
                    let (sink, rx) = ChannelSink::pair();
                    let conn = server.accept(Arc::new(sink));
                    server
                        .handle_client_message(
                            &conn,
                            ClientMessage::register(1, format!("i-{t}-{i}"), "", ""),
                        )
                        .unwrap();
                    server
                        .handle_client_message(&conn, ClientMessage::heartbeat(1, format!("i-{t}-{i}")))
                        .unwrap();
                    received += rx.try_iter().count();
                    server.close(&conn);
                }
                received
            })
        })
        .collect();

    for i in 0..10 {
        let draft = server
            .lifecycle()
            .create_draft(1, 10, "d", "", vec![ConfigItem::new("n", i.to_string())], "alice")
            .unwrap();
        server.publish(draft.id(), "alice").unwrap();
    }

    for w in workers {
        w.join().unwrap();
    }
    assert!(server.registry().is_empty());
    assert_eq!(server.store().statistics(confsync_core::Lineage::new(1, 10)).published, 10);
}

#[test]
fn stale_connections_stop_receiving_until_heartbeat() {
    let server = server(ServerConfig::default().with_heartbeat_timeout(Duration::from_millis(200)));
    let (sink, rx) = ChannelSink::pair();
    let conn = server.accept(Arc::new(sink));
    server
        .handle_client_message(&conn, ClientMessage::register(1, "i-1", "", ""))
        .unwrap();
    thread::sleep(Duration::from_millis(350));

    let publish = |value: &str| {
        let draft = server
            .lifecycle()
            .create_draft(1, 10, "d", "", vec![ConfigItem::new("a", value)], "alice")
            .unwrap();
        server.publish(draft.id(), "alice").unwrap();
    };

    publish("1");
    assert!(rx.try_recv().is_err());

    server
        .handle_client_message(&conn, ClientMessage::heartbeat(1, "i-1"))
        .unwrap();
    publish("2");
    match rx.try_recv().unwrap() {
        PushEnvelope::ConfigUpdate(u) => assert_eq!(u.config_data, map(&[("a", "2")])),
        other => panic!("unexpected {other:?}"),
    }
}
