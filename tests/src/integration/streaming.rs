//! # Streaming Tests
//!
//! A handler may answer one request several times: it emits each item to
//! the request's address and finishes with `NoReply`. The caller can take
//! the items one by one, as a `Stream`, or all at once.

#[cfg(test)]
mod tests {
    use crate::fixtures::TestNetwork;
    use futures::StreamExt;
    use rpc_core::{Outcome, RequestContext};
    use rpc_types::StatusCode;
    use serde::Deserialize;
    use std::time::Duration;

    const COUNT_TO: u32 = 7;

    #[derive(Deserialize)]
    struct CountTo {
        limit: u32,
        #[serde(default)]
        delay_ms: u64,
    }

    async fn count_to(ctx: RequestContext, args: CountTo) -> Outcome {
        for i in 1..=args.limit {
            if let Err(e) = ctx.emit(i).await {
                return Outcome::error(e);
            }
            if args.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(args.delay_ms)).await;
            }
        }
        Outcome::NoReply
    }

    #[tokio::test]
    async fn test_stream_in_arrival_order() {
        let net = TestNetwork::new("stream");
        let (server, dispatcher) = net.server("server").await;
        dispatcher.register(COUNT_TO, count_to).unwrap();
        let (client, caller) = net.client("client").await;

        let responses = caller
            .call(COUNT_TO)
            .arg("limit", 5)
            .arg("delay_ms", 5)
            .timeout(Duration::from_millis(500))
            .send()
            .await
            .unwrap();

        let values: Vec<u32> = responses
            .into_stream()
            .map(|r| {
                assert_eq!(r.status, StatusCode::Success);
                r.data_as::<u32>().unwrap()
            })
            .collect()
            .await;
        assert_eq!(values, vec![1, 2, 3, 4, 5]);

        server.close();
        client.close();
    }

    #[tokio::test]
    async fn test_expected_count_cuts_stream() {
        let net = TestNetwork::new("stream");
        let (server, dispatcher) = net.server("server").await;
        dispatcher.register(COUNT_TO, count_to).unwrap();
        let (client, caller) = net.client("client").await;

        let mut responses = caller
            .call(COUNT_TO)
            .arg("limit", 10)
            .timeout(Duration::from_secs(5))
            .expect_responses(3)
            .send()
            .await
            .unwrap();

        let mut values = Vec::new();
        while let Some(response) = responses.next().await {
            values.push(response.data_as::<u32>().unwrap());
            assert_eq!(responses.responses_seen(), values.len());
        }
        assert_eq!(values, vec![1, 2, 3]);
        assert!(responses.is_exhausted());
        assert_eq!(caller.table().pending_count(), 0);

        server.close();
        client.close();
    }

    #[tokio::test]
    async fn test_final_reply_after_stream() {
        let net = TestNetwork::new("stream");
        let (server, dispatcher) = net.server("server").await;
        dispatcher
            .register(COUNT_TO, |ctx: RequestContext, args: CountTo| async move {
                for i in 1..args.limit {
                    ctx.emit(i).await.map_err(|e| e.to_string())?;
                }
                Ok::<_, String>(args.limit)
            })
            .unwrap();
        let (client, caller) = net.client("client").await;

        let responses = caller
            .call(COUNT_TO)
            .arg("limit", 4)
            .timeout(Duration::from_millis(300))
            .send()
            .await
            .unwrap()
            .await;

        let values: Vec<u32> = responses.iter().map(|r| r.data_as().unwrap()).collect();
        assert_eq!(values, vec![1, 2, 3, 4]);

        server.close();
        client.close();
    }
}
