//! Serving over a stdio transport pair, driven by raw JSON-RPC.

use mcplink_protocol::{MessageId, ToolDefinition, ToolKind};
use mcplink_server::{ServerBuilder, ToolOutput};
use mcplink_stdio::StdioTransport;
use mcplink_transport_traits::{Transport, TransportMessage};

fn pair() -> (StdioTransport, StdioTransport) {
    let (client_out, server_in) = tokio::io::duplex(64 * 1024);
    let (server_out, client_in) = tokio::io::duplex(64 * 1024);
    (
        StdioTransport::from_raw(client_in, client_out),
        StdioTransport::from_raw(server_in, server_out),
    )
}

async fn send_json(transport: &StdioTransport, value: serde_json::Value) {
    let payload = serde_json::to_vec(&value).unwrap();
    transport
        .send(TransportMessage::new(MessageId::from("req"), payload.into()))
        .await
        .unwrap();
}

async fn receive_json(transport: &StdioTransport) -> serde_json::Value {
    let message = transport.receive().await.unwrap().unwrap();
    serde_json::from_slice(&message.payload).unwrap()
}

#[tokio::test]
async fn serves_initialize_list_and_call() {
    let (client_transport, server_transport) = pair();

    let server = ServerBuilder::new()
        .name("clock")
        .version("1.0.0")
        .tool(
            ToolDefinition {
                name: "get_time".to_string(),
                description: "Current UTC time".to_string(),
                parameters: vec![],
                kind: ToolKind::Function,
            },
            |_args| async move { Ok(ToolOutput::text("12:00Z")) },
        )
        .build();

    tokio::spawn(async move {
        let _ = server.serve(&server_transport).await;
    });

    client_transport.connect().await.unwrap();

    send_json(
        &client_transport,
        serde_json::json!({"jsonrpc": "2.0", "method": "initialize", "id": 1, "params": {}}),
    )
    .await;
    let response = receive_json(&client_transport).await;
    assert_eq!(response["id"], 1);
    assert_eq!(response["result"]["serverInfo"]["name"], "clock");

    send_json(
        &client_transport,
        serde_json::json!({"jsonrpc": "2.0", "method": "tools/list", "id": 2}),
    )
    .await;
    let response = receive_json(&client_transport).await;
    assert_eq!(response["result"]["tools"][0]["name"], "get_time");

    send_json(
        &client_transport,
        serde_json::json!({
            "jsonrpc": "2.0",
            "method": "tools/call",
            "id": 3,
            "params": {"name": "get_time", "arguments": {}},
        }),
    )
    .await;
    let response = receive_json(&client_transport).await;
    assert_eq!(response["result"]["content"][0]["text"], "12:00Z");
    assert_eq!(response["result"]["isError"], false);
}

#[tokio::test]
async fn notifications_are_consumed_silently() {
    let (client_transport, server_transport) = pair();
    let server = ServerBuilder::new().name("quiet").build();

    tokio::spawn(async move {
        let _ = server.serve(&server_transport).await;
    });

    client_transport.connect().await.unwrap();

    send_json(
        &client_transport,
        serde_json::json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
    )
    .await;
    send_json(
        &client_transport,
        serde_json::json!({"jsonrpc": "2.0", "method": "ping", "id": 9}),
    )
    .await;

    // The notification produced no response; ping's answer is first out.
    let response = receive_json(&client_transport).await;
    assert_eq!(response["id"], 9);
}
