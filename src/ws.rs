//! Shared WebSocket transport.
//!
//! Thin wrapper around `tokio-tungstenite` providing type-isolated
//! reader/writer halves for accepted browser connections. All WebSocket
//! consumers in the crate should use this module rather than
//! `tokio-tungstenite` directly.
//!
//! # Architecture
//!
//! [`accept`] performs the server handshake on an established TCP stream
//! and returns a ([`WsWriter`], [`WsReader`]) pair ready for use in
//! `tokio::select!` loops. The hub hands each client's writer task a
//! channel of [`ClientCmd`]s; frames are compressed there, keeping the
//! per-client deflate stream off the hub task.

// Rust guideline compliant 2026-03

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite;

/// Concrete server-side WebSocket stream type.
type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// Commands delivered to a client's writer task.
#[derive(Debug)]
pub enum ClientCmd {
    /// An encoded (not yet compressed) server frame to deliver.
    Frame(Vec<u8>),
    /// Reply to a transport-level ping.
    Pong(Vec<u8>),
    /// Close the connection gracefully.
    Close,
}

/// Received WebSocket message.
#[derive(Debug)]
pub enum WsMessage {
    /// UTF-8 text frame (client JSON messages).
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// Ping frame with payload.
    Ping(Vec<u8>),
    /// Pong frame with payload.
    Pong(Vec<u8>),
    /// Close frame with status code and reason.
    Close {
        /// WebSocket close code (1000 = normal, 1005 = no code).
        code: u16,
        /// Human-readable close reason.
        reason: String,
    },
}

/// Write half of an accepted WebSocket connection.
#[derive(Debug)]
pub struct WsWriter {
    sink: futures_util::stream::SplitSink<WsStream, tungstenite::Message>,
}

impl WsWriter {
    /// Send a binary frame (compressed server payloads).
    ///
    /// # Errors
    ///
    /// Returns an error if the send fails (connection closed, I/O error).
    pub async fn send_binary(&mut self, data: Vec<u8>) -> Result<()> {
        self.sink
            .send(tungstenite::Message::Binary(data))
            .await
            .context("WebSocket send_binary failed")
    }

    /// Send a pong frame in response to a ping.
    ///
    /// # Errors
    ///
    /// Returns an error if the send fails.
    pub async fn send_pong(&mut self, data: Vec<u8>) -> Result<()> {
        self.sink
            .send(tungstenite::Message::Pong(data))
            .await
            .context("WebSocket send_pong failed")
    }

    /// Flush pending writes and close the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if closing fails.
    pub async fn close(&mut self) -> Result<()> {
        self.sink.close().await.context("WebSocket close failed")
    }
}

/// Read half of an accepted WebSocket connection.
#[derive(Debug)]
pub struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
}

impl WsReader {
    /// Receive the next message, returning `None` when the stream ends.
    ///
    /// Raw `Frame` variants are skipped internally.
    pub async fn recv(&mut self) -> Option<Result<WsMessage>> {
        loop {
            match self.stream.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    return Some(Ok(WsMessage::Text(text.to_string())));
                }
                Some(Ok(tungstenite::Message::Binary(data))) => {
                    return Some(Ok(WsMessage::Binary(data.to_vec())));
                }
                Some(Ok(tungstenite::Message::Ping(data))) => {
                    return Some(Ok(WsMessage::Ping(data.to_vec())));
                }
                Some(Ok(tungstenite::Message::Pong(data))) => {
                    return Some(Ok(WsMessage::Pong(data.to_vec())));
                }
                Some(Ok(tungstenite::Message::Close(close_frame))) => {
                    let (code, reason) = close_frame
                        .map(|cf| (cf.code.into(), cf.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    return Some(Ok(WsMessage::Close { code, reason }));
                }
                Some(Ok(tungstenite::Message::Frame(_))) => {
                    // Raw frames — skip
                    continue;
                }
                Some(Err(e)) => {
                    return Some(Err(anyhow::anyhow!("WebSocket read error: {e}")));
                }
                None => return None,
            }
        }
    }
}

/// Accept a WebSocket handshake on an established TCP stream.
///
/// Returns split (writer, reader) halves for independent use in
/// `tokio::select!` loops.
///
/// # Errors
///
/// Returns an error if the handshake fails.
pub async fn accept(stream: TcpStream) -> Result<(WsWriter, WsReader)> {
    let ws_stream = tokio_tungstenite::accept_async(stream)
        .await
        .context("WebSocket handshake failed")?;
    let (sink, stream) = ws_stream.split();
    Ok((WsWriter { sink }, WsReader { stream }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accept_rejects_non_websocket_stream() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");

        let client = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            let mut stream = TcpStream::connect(addr).await.expect("connect");
            stream
                .write_all(b"GET / HTTP/1.0\r\n\r\n")
                .await
                .expect("write");
        });

        let (stream, _) = listener.accept().await.expect("accept");
        assert!(accept(stream).await.is_err());
        client.await.expect("client task");
    }

    #[tokio::test]
    async fn round_trip_binary_frame() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");

        let client = tokio::spawn(async move {
            let (stream, _) =
                tokio_tungstenite::connect_async(format!("ws://{addr}/"))
                    .await
                    .expect("connect");
            let (mut sink, mut reader) = stream.split();
            sink.send(tungstenite::Message::Text("hi".into()))
                .await
                .expect("send");
            match reader.next().await {
                Some(Ok(tungstenite::Message::Binary(data))) => data.to_vec(),
                other => panic!("unexpected: {other:?}"),
            }
        });

        let (stream, _) = listener.accept().await.expect("accept");
        let (mut writer, mut reader) = accept(stream).await.expect("handshake");
        match reader.recv().await {
            Some(Ok(WsMessage::Text(text))) => assert_eq!(text, "hi"),
            other => panic!("unexpected: {other:?}"),
        }
        writer.send_binary(vec![1, 2, 3]).await.expect("send");
        let got = client.await.expect("client task");
        assert_eq!(got, vec![1, 2, 3]);
    }
}
