//! Newline-delimited JSON bridge for the host command channel.
//!
//! Reads `CommandEnvelope` lines from stdin, routes them through the
//! `HostCommandServer`, and writes `ResponseEnvelope` and `EventEnvelope`
//! lines to stdout.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use crate::engine::RushEngine;
use crate::error::{Result, RushError};
use crate::host::channel::{HostCommandClient, command_channel};
use crate::host::contract::{CommandEnvelope, CommandName, ResponseEnvelope};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

/// Run the bridge on stdin/stdout until stdin closes or `runtime.stop`
/// arrives.
pub async fn run_stdio_bridge(engine: Arc<RushEngine>) -> Result<()> {
    run_bridge(
        engine,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

/// Run the bridge over arbitrary line-oriented streams.
///
/// Three concurrent parts cooperate: the command router, an event
/// forwarder writing event envelopes, and the reader loop running on the
/// caller's task. The bridge returns once the reader finishes.
pub async fn run_bridge<R, W>(engine: Arc<RushEngine>, reader: R, writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (request_capacity, event_capacity) = {
        let host = &engine.config().host;
        (host.request_capacity, host.event_capacity)
    };
    let (client, server) = command_channel(request_capacity, event_capacity, engine);
    let writer = Arc::new(Mutex::new(writer));

    let server_handle = tokio::spawn(server.run());

    let event_writer = Arc::clone(&writer);
    let mut event_rx = client.subscribe_events();
    let event_handle = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(envelope) => match serde_json::to_string(&envelope) {
                    Ok(json) => {
                        let mut w = event_writer.lock().await;
                        if let Err(e) = write_line(&mut *w, &json).await {
                            tracing::warn!(error = %e, "cannot write event envelope; stopping event forwarder");
                            break;
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "cannot serialize event envelope; skipping"),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "event writer lagged; some events were dropped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let reader_result = run_reader(client, reader, Arc::clone(&writer)).await;

    // The reader dropped the client, so the server drains and exits.
    let _ = server_handle.await;
    event_handle.abort();
    let _ = event_handle.await;

    reader_result
}

async fn run_reader<R, W>(
    client: HostCommandClient,
    mut reader: R,
    writer: Arc<Mutex<W>>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut line = String::new();
    let mut in_flight = JoinSet::new();

    let outcome = loop {
        line.clear();
        let bytes_read = match reader.read_line(&mut line).await {
            Ok(n) => n,
            Err(e) => break Err(RushError::Channel(format!("failed to read command line: {e}"))),
        };
        if bytes_read == 0 {
            tracing::info!("input closed; shutting down host bridge");
            break Ok(());
        }
        while in_flight.try_join_next().is_some() {}

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope = match serde_json::from_str::<CommandEnvelope>(trimmed) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, raw_line = %trimmed, "cannot parse command envelope");
                let response = ResponseEnvelope::error(
                    "parse-error",
                    format!("cannot parse command envelope: {e}"),
                )
                .with_kind("validation_error");
                if let Err(e) = write_response(&writer, &response).await {
                    break Err(e);
                }
                continue;
            }
        };

        if envelope.command == CommandName::RuntimeStop {
            let response = answer(&client, envelope).await;
            if let Err(e) = write_response(&writer, &response).await {
                break Err(e);
            }
            tracing::info!("runtime.stop received; shutting down host bridge");
            break Ok(());
        }

        // Answer out of order; slow device commands must not hold the line.
        let client = client.clone();
        let writer = Arc::clone(&writer);
        in_flight.spawn(async move {
            let response = answer(&client, envelope).await;
            if let Err(e) = write_response(&writer, &response).await {
                tracing::warn!(error = %e, "cannot write response envelope");
            }
        });
    };

    while in_flight.join_next().await.is_some() {}
    outcome
}

async fn answer(client: &HostCommandClient, envelope: CommandEnvelope) -> ResponseEnvelope {
    let request_id = envelope.request_id.clone();
    match client.send(envelope).await {
        Ok(resp) => resp,
        Err(e) => ResponseEnvelope::error(request_id, e.to_string()).with_kind(e.kind()),
    }
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &Mutex<W>,
    response: &ResponseEnvelope,
) -> Result<()> {
    let json = serde_json::to_string(response)
        .map_err(|e| RushError::Channel(format!("cannot serialize response envelope: {e}")))?;
    let mut w = writer.lock().await;
    write_line(&mut *w, &json).await
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, json: &str) -> Result<()> {
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| RushError::Channel(format!("failed to write output: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| RushError::Channel(format!("failed to write newline: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| RushError::Channel(format!("failed to flush output: {e}")))?;
    Ok(())
}
