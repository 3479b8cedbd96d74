//! # Payload Codec Tests
//!
//! Every node on a channel must agree on the payload encoding. CBOR is the
//! default; JSON and user-supplied function pairs plug in through
//! `RpcConfig`.

#[cfg(test)]
mod tests {
    use crate::fixtures::{echo, TestNetwork, ECHO};
    use rpc_core::{
        CodecError, Connection, DeserializeFn, Dispatcher, JsonCodec, RpcConfig, SerializeFn,
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::runtime::Handle;

    async fn echo_round_trip(
        net: &TestNetwork,
        server: RpcConfig,
        client: RpcConfig,
    ) -> Vec<Value> {
        let connection = Arc::new(Connection::new(&server, Handle::current()).unwrap());
        let dispatcher = Dispatcher::attach(&connection);
        dispatcher.register(ECHO, echo).unwrap();
        net.start(&connection).await;

        let (client_connection, caller) = net.client_with(client).await;
        let responses = caller
            .call(ECHO)
            .arg("message", "encoded")
            .timeout(Duration::from_millis(200))
            .send()
            .await
            .unwrap()
            .await;

        connection.close();
        client_connection.close();
        responses.into_iter().filter_map(|r| r.data).collect()
    }

    /// Hex-wrapped JSON, to prove the bytes really go through the pair.
    fn hex_pair() -> (SerializeFn, DeserializeFn) {
        let serialize: SerializeFn = Arc::new(|value: &Value| -> Result<Vec<u8>, CodecError> {
            let text = serde_json::to_string(value).map_err(CodecError::new)?;
            Ok(text.bytes().map(|b| format!("{b:02x}")).collect::<String>().into_bytes())
        });
        let deserialize: DeserializeFn = Arc::new(|bytes: &[u8]| -> Result<Value, CodecError> {
            let text = std::str::from_utf8(bytes).map_err(CodecError::new)?;
            if text.len() % 2 != 0 {
                return Err(CodecError::new("odd length"));
            }
            let raw = (0..text.len())
                .step_by(2)
                .map(|i| u8::from_str_radix(&text[i..i + 2], 16).map_err(CodecError::new))
                .collect::<Result<Vec<u8>, _>>()?;
            serde_json::from_slice(&raw).map_err(CodecError::new)
        });
        (serialize, deserialize)
    }

    #[tokio::test]
    async fn test_json_codec() {
        let net = TestNetwork::new("json");
        let server = net.config("server").with_codec(JsonCodec);
        let client = net.config("client").with_codec(JsonCodec);

        assert_eq!(echo_round_trip(&net, server, client).await, vec![json!("encoded")]);
    }

    #[tokio::test]
    async fn test_function_pair_codec() {
        let net = TestNetwork::new("hex");
        let (serialize, deserialize) = hex_pair();
        let server = net
            .config("server")
            .with_serializer(serialize.clone())
            .with_deserializer(deserialize.clone());
        let client = net
            .config("client")
            .with_serializer(serialize)
            .with_deserializer(deserialize);

        assert_eq!(echo_round_trip(&net, server, client).await, vec![json!("encoded")]);
    }

    #[tokio::test]
    async fn test_mismatched_codecs_never_correlate() {
        let net = TestNetwork::new("mixed");
        let server = net.config("server");
        let client = net.config("client").with_codec(JsonCodec);

        assert!(echo_round_trip(&net, server, client).await.is_empty());
    }

    #[test]
    fn test_half_pair_rejected_at_construction() {
        let (serialize, _) = hex_pair();
        let config = RpcConfig::new("broken").with_serializer(serialize);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        assert!(Connection::new(&config, runtime.handle().clone()).is_err());
    }
}
