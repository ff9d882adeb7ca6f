mod common;

use anyhow::Result;
use common::*;
use futures_util::{SinkExt, StreamExt};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, time::timeout};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use wms_realtime_core::{ConnectionState, RealtimeConfig, RealtimeManager};
use wms_realtime_proto::CacheDomain;
use wms_realtime_websocket_client::{message::PhoenixMessage, WebsocketConfig, WebsocketTransport};

/// Minimal realtime server: acknowledges the join, then pushes one insert per table in `tables`
async fn serve(listener: TcpListener, tables: Vec<&'static str>) -> Result<()> {
    let (stream, _) = listener.accept().await?;
    let mut ws = accept_async(stream).await?;

    let join = loop {
        match ws.next().await.transpose()? {
            Some(Message::Text(text)) => {
                let message = PhoenixMessage::decode(text.as_str())?;
                if message.event == "phx_join" {
                    break message;
                }
            }
            Some(_) => {}
            None => anyhow::bail!("client hung up before joining"),
        }
    };
    let reply = serde_json::json!({
        "topic": join.topic,
        "event": "phx_reply",
        "ref": join.msg_ref,
        "payload": {"status": "ok", "response": {"postgres_changes": []}}
    });
    ws.send(Message::text(reply.to_string())).await?;

    for table in tables {
        let change = serde_json::json!({
            "topic": join.topic,
            "event": "postgres_changes",
            "ref": null,
            "payload": {"data": {"table": table, "type": "INSERT", "record": {"id": 1}, "commit_timestamp": "2024-05-01T10:00:00Z"}}
        });
        ws.send(Message::text(change.to_string())).await?;
    }

    while let Some(message) = ws.next().await {
        if let Message::Text(text) = message? {
            if PhoenixMessage::decode(text.as_str())?.event == "phx_leave" {
                break;
            }
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_websocket_feed_invalidates_cache() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let endpoint = format!("ws://{}", listener.local_addr()?);
    let server = tokio::spawn(serve(listener, vec!["orders", "financial_documents"]));

    let transport = Arc::new(WebsocketTransport::new(WebsocketConfig::new(endpoint, "anon")));
    let manager = RealtimeManager::new(RealtimeConfig::default().with_debounce(Duration::from_millis(50)), transport);

    let cache = RecordingCache::new();
    let guard = manager.subscribe(cache.clone(), None);
    timeout(Duration::from_secs(5), manager.wait_connected()).await?;
    assert_eq!(manager.status().connection_state, ConnectionState::Connected);

    let mut domains = Vec::new();
    timeout(Duration::from_secs(5), async {
        while domains.len() < 5 {
            domains.extend(cache.take());
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await?;
    domains.sort();
    domains.dedup();
    assert_eq!(
        domains,
        vec![CacheDomain::Orders, CacheDomain::Dashboard, CacheDomain::FinancialDocuments, CacheDomain::FinancialSummary]
    );

    drop(guard);
    manager.global_cleanup();
    timeout(Duration::from_secs(5), server).await???;
    assert_eq!(manager.status().connection_state, ConnectionState::Disconnected);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_server_enters_error() -> Result<()> {
    // bind then drop so the port refuses connections
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let endpoint = format!("ws://{}", listener.local_addr()?);
    drop(listener);

    let transport = Arc::new(WebsocketTransport::new(WebsocketConfig::new(endpoint, "anon")));
    let manager = RealtimeManager::new(RealtimeConfig::default(), transport);
    let _guard = manager.subscribe(RecordingCache::new(), None);

    let mut state = manager.state();
    timeout(Duration::from_secs(5), state.wait_for(|state| *state == ConnectionState::Error)).await??;
    assert_eq!(manager.status().failed_connections, 1);
    assert!(manager.status().last_error.is_some());
    manager.global_cleanup();
    Ok(())
}
