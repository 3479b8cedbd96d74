//! # Self-Suppression Tests
//!
//! A peer both calls and serves on one channel, so every request it
//! publishes is delivered straight back to its own dispatcher:
//!
//! ```text
//! [Peer A] ──request(n = A)──► [Bus] ──► [Peer A]  ignored (own node)
//!                                  └──► [Peer B]  answered
//! ```

#[cfg(test)]
mod tests {
    use crate::fixtures::{echo, TestNetwork, ECHO};
    use rpc_core::{NoArgs, Outcome, RequestContext};
    use rpc_types::{NodeId, StatusCode};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_lone_peer_gets_no_answer() {
        let net = TestNetwork::new("mesh");
        let peer = net.peer("alone").await;
        let invoked = Arc::new(AtomicUsize::new(0));
        let counter = invoked.clone();
        peer.register(ECHO, move |_ctx: RequestContext, _: NoArgs| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Outcome::reply("self")
            }
        })
        .unwrap();

        let responses = peer
            .call(ECHO)
            .timeout(Duration::from_millis(200))
            .send()
            .await
            .unwrap()
            .await;

        assert!(responses.is_empty());
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(peer.stats().responses_sent, 0);
        peer.close();
    }

    #[tokio::test]
    async fn test_peers_answer_each_other() {
        let net = TestNetwork::new("mesh");
        let alice = net.peer("alice").await;
        let bob = net.peer("bob").await;
        alice.register(ECHO, echo).unwrap();
        bob.register(ECHO, echo).unwrap();

        let from_alice = alice
            .call(ECHO)
            .arg("message", "to bob")
            .timeout(Duration::from_millis(300))
            .send()
            .await
            .unwrap()
            .await;
        assert_eq!(from_alice.len(), 1);
        assert_eq!(from_alice[0].node, NodeId::from("bob"));
        assert_eq!(from_alice[0].data, Some(json!("to bob")));

        let from_bob = bob
            .call(ECHO)
            .arg("message", "to alice")
            .timeout(Duration::from_millis(300))
            .send()
            .await
            .unwrap()
            .await;
        assert_eq!(from_bob.len(), 1);
        assert_eq!(from_bob[0].node, NodeId::from("alice"));

        alice.close();
        bob.close();
    }

    #[tokio::test]
    async fn test_peer_with_external_client() {
        let net = TestNetwork::new("mesh");
        let peer = net.peer("peer").await;
        peer.register(ECHO, echo).unwrap();
        let (server, _dispatcher) = net.echo_server("server").await;
        let (client, caller) = net.client("client").await;

        // External callers are answered by the peer and the plain server
        let responses = caller
            .call(ECHO)
            .arg("message", "")
            .timeout(Duration::from_millis(300))
            .send()
            .await
            .unwrap()
            .await;
        let mut nodes: Vec<_> = responses.iter().map(|r| r.node.to_string()).collect();
        nodes.sort();
        assert_eq!(nodes, vec!["peer", "server"]);
        assert!(responses.iter().all(|r| r.status == StatusCode::Success));

        // The peer's own call is answered by the server only
        let responses = peer
            .call(ECHO)
            .arg("message", "")
            .timeout(Duration::from_millis(300))
            .send()
            .await
            .unwrap()
            .await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].node, NodeId::from("server"));

        peer.close();
        server.close();
        client.close();
    }
}
