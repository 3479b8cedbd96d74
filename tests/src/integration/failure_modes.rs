//! # Failure Mode Tests
//!
//! - Transport errors surface from `start` and are not retried.
//! - Frame errors are logged and skipped; the read loop survives.
//! - Misuse (duplicate registration, double reply) fails locally.

#[cfg(test)]
mod tests {
    use crate::fixtures::{echo, eventually, TestNetwork, ECHO};
    use async_trait::async_trait;
    use bytes::Bytes;
    use rpc_bus::{BroadcastBus, BusError, Subscription};
    use rpc_core::{
        codec, CallError, CborCodec, Connection, ConnectionError, LinkState, NoArgs, Outcome,
        RegistryError, ReplyError, RequestContext, RpcConfig, SendError,
    };
    use rpc_types::{MessageKind, StatusCode};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::runtime::Handle;

    /// A bus that refuses every subscription.
    struct RefusingBus {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl BroadcastBus for RefusingBus {
        async fn subscribe(&self, channel: &str) -> Result<Subscription, BusError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(BusError::Subscribe {
                channel: channel.to_string(),
                reason: "connection refused".into(),
            })
        }

        async fn publish(&self, _channel: &str, _frame: Bytes) -> Result<usize, BusError> {
            Err(BusError::Closed)
        }
    }

    #[tokio::test]
    async fn test_transport_error_surfaces_from_start() {
        let bus = Arc::new(RefusingBus {
            attempts: AtomicUsize::new(0),
        });
        let connection = Connection::new(&RpcConfig::new("broken"), Handle::current()).unwrap();

        let result = connection.start(bus.clone()).await;
        assert!(matches!(
            result,
            Err(ConnectionError::Transport(BusError::Subscribe { .. }))
        ));
        assert_eq!(bus.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(connection.state(), LinkState::Idle);
        assert!(!connection.sender().is_connected());
    }

    #[tokio::test]
    async fn test_garbage_does_not_stop_the_server() {
        let net = TestNetwork::new("garbage");
        let (server, _dispatcher) = net.echo_server("server").await;
        let (client, caller) = net.client("client").await;

        let junk: Vec<Bytes> = vec![
            Bytes::new(),
            Bytes::from_static(&[0]),
            Bytes::from_static(&[3, 0xa0]),
            Bytes::from_static(&[1, 0xff]),
            Bytes::from_static(&[2, 0xff]),
            codec::encode(&CborCodec, MessageKind::Response, &json!({"s": 9})).unwrap(),
            codec::encode(&CborCodec, MessageKind::Request, &json!([1, 2, 3])).unwrap(),
        ];
        for frame in junk {
            net.bus.publish("rpc:garbage", frame).await.unwrap();
        }

        let responses = caller
            .call(ECHO)
            .arg("message", "still here")
            .timeout(Duration::from_millis(300))
            .expect_responses(1)
            .send()
            .await
            .unwrap()
            .await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].data, Some(json!("still here")));
        assert!(server.stats().frames_skipped >= 6);

        server.close();
        client.close();
    }

    #[tokio::test]
    async fn test_bad_format_reaches_caller() {
        let net = TestNetwork::new("garbage");
        let (server, _dispatcher) = net.echo_server("server").await;
        let (client, caller) = net.client("client").await;

        // Register an address the way a call would, then send a request
        // for it whose command index is not an integer.
        let table = caller.table().clone();
        let address = rpc_types::Address::generate();
        let (registration, receiver) = table.register(address.clone()).unwrap();
        let mut responses = rpc_core::Responses::pending(
            receiver,
            registration,
            tokio::time::Instant::now() + Duration::from_millis(300),
            Some(1),
        );
        let frame = codec::encode(
            &CborCodec,
            MessageKind::Request,
            &json!({"c": "echo", "a": address.as_str()}),
        )
        .unwrap();
        net.bus.publish("rpc:garbage", frame).await.unwrap();

        let response = responses.next().await.expect("BadFormat reply");
        assert_eq!(response.status, StatusCode::BadFormat);
        assert_eq!(response.address, address);

        server.close();
        client.close();
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_final() {
        let net = TestNetwork::new("closing");
        let (client, caller) = net.client("client").await;

        client.close();
        client.close();
        assert_eq!(client.state(), LinkState::Closed);

        let result = caller.call(ECHO).timeout(Duration::from_secs(1)).send().await;
        assert!(matches!(
            result,
            Err(CallError::Send(SendError::NotConnected))
        ));
        assert_eq!(caller.table().pending_count(), 0);

        assert_eq!(
            client.start(net.bus.clone()).await,
            Err(ConnectionError::Closed)
        );
        assert_eq!(client.wait_until_ready().await, Err(ConnectionError::Closed));
    }

    #[tokio::test]
    async fn test_bus_shutdown_ends_loop() {
        let net = TestNetwork::new("shutdown");
        let connection = Arc::new(
            Connection::new(&net.config("node"), Handle::current()).unwrap(),
        );
        let task = connection.spawn(net.bus.clone());
        connection.wait_until_ready().await.unwrap();

        net.bus.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("loop exit")
            .expect("join");
        assert!(result.is_ok());
        assert_eq!(connection.state(), LinkState::Idle);
    }

    #[tokio::test]
    async fn test_registry_misuse_is_local() {
        let net = TestNetwork::new("registry");
        let (server, dispatcher) = net.echo_server("server").await;

        assert_eq!(
            dispatcher.register(ECHO, echo),
            Err(RegistryError::AlreadyRegistered(ECHO))
        );
        assert_eq!(dispatcher.remove(17), Err(RegistryError::NotRegistered(17)));
        assert_eq!(dispatcher.commands(), vec![ECHO]);

        // The original handler is untouched
        let (client, caller) = net.client("client").await;
        let responses = caller
            .call(ECHO)
            .arg("message", "ok")
            .timeout(Duration::from_millis(300))
            .send()
            .await
            .unwrap()
            .await;
        assert_eq!(responses[0].data, Some(json!("ok")));

        dispatcher.remove(ECHO).unwrap();
        let responses = caller
            .call(ECHO)
            .arg("message", "ok")
            .timeout(Duration::from_millis(300))
            .send()
            .await
            .unwrap()
            .await;
        assert_eq!(responses[0].status, StatusCode::UnknownCommand);

        server.close();
        client.close();
    }

    #[tokio::test]
    async fn test_double_reply_is_rejected_locally() {
        let net = TestNetwork::new("replies");
        let (server, dispatcher) = net.server("server").await;
        let second_errors = Arc::new(AtomicUsize::new(0));
        let counter = second_errors.clone();
        dispatcher
            .register(ECHO, move |ctx: RequestContext, _: NoArgs| {
                let counter = counter.clone();
                async move {
                    if ctx.reply(StatusCode::Success, Some(json!("first"))).await.is_err() {
                        return Outcome::error("first reply failed");
                    }
                    if let Err(ReplyError::AlreadyReplied) =
                        ctx.reply(StatusCode::Success, Some(json!("second"))).await
                    {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                    Outcome::reply("terminal")
                }
            })
            .unwrap();
        let (client, caller) = net.client("client").await;

        let responses = caller
            .call(ECHO)
            .timeout(Duration::from_millis(300))
            .send()
            .await
            .unwrap()
            .await;

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].data, Some(json!("first")));
        assert!(eventually(|| second_errors.load(Ordering::SeqCst) == 1).await);
        assert_eq!(server.stats().responses_sent, 1);

        server.close();
        client.close();
    }
}
