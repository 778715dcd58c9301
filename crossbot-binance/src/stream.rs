//! Kline WebSocket transport.
//!
//! Subscribes to `<symbol>@kline_<interval>` and hands raw text frames to
//! the coordinator. Reads block for at most the poll timeout so the caller
//! can check its stop flag between frames.

use crossbot_core::domain::Interval;
use crossbot_core::exchange::{Transport, TransportError, TransportEvent};
use std::io::ErrorKind;
use std::net::TcpStream;
use std::time::Duration;
use tracing::{debug, info, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Error as WsError, Message, WebSocket};

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

pub struct KlineStream {
    ws_url: String,
    poll_timeout: Duration,
    socket: Option<Socket>,
}

impl KlineStream {
    pub fn new(ws_url: impl Into<String>, poll_timeout: Duration) -> Self {
        Self {
            ws_url: ws_url.into(),
            poll_timeout,
            socket: None,
        }
    }

    /// Single-stream endpoint for one symbol and interval.
    pub fn stream_url(ws_url: &str, symbol: &str, interval: Interval) -> String {
        format!(
            "{}/ws/{}@kline_{}",
            ws_url.trim_end_matches('/'),
            symbol.to_lowercase(),
            interval.code()
        )
    }
}

fn set_read_timeout(socket: &mut Socket, timeout: Duration) -> std::io::Result<()> {
    match socket.get_mut() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(timeout)),
        MaybeTlsStream::NativeTls(stream) => stream.get_mut().set_read_timeout(Some(timeout)),
        _ => Ok(()),
    }
}

impl Transport for KlineStream {
    fn start(&mut self, symbol: &str, interval: Interval) -> Result<(), TransportError> {
        let url = Self::stream_url(&self.ws_url, symbol, interval);
        let (mut socket, response) =
            tungstenite::connect(url.as_str()).map_err(|e| TransportError::Connect {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        set_read_timeout(&mut socket, self.poll_timeout).map_err(|e| TransportError::Connect {
            url: url.clone(),
            reason: format!("failed to set read timeout: {e}"),
        })?;
        info!(%url, status = response.status().as_u16(), "kline stream connected");
        self.socket = Some(socket);
        Ok(())
    }

    fn next_event(&mut self) -> Result<TransportEvent, TransportError> {
        let socket = self.socket.as_mut().ok_or(TransportError::NotStarted)?;
        match socket.read() {
            Ok(Message::Text(text)) => Ok(TransportEvent::Message(text)),
            Ok(Message::Close(frame)) => {
                info!(?frame, "kline stream closed by server");
                Ok(TransportEvent::Closed)
            }
            // Pings are answered by tungstenite on the next read or flush.
            Ok(other) => {
                debug!(kind = ?other, "ignoring non-text frame");
                Ok(TransportEvent::Idle)
            }
            Err(WsError::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                Ok(TransportEvent::Idle)
            }
            Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => {
                Ok(TransportEvent::Closed)
            }
            Err(e) => Err(TransportError::Dropped(e.to_string())),
        }
    }

    fn stop(&mut self) -> Result<(), TransportError> {
        let Some(mut socket) = self.socket.take() else {
            return Ok(());
        };
        if let Err(e) = socket.close(None) {
            warn!(error = %e, "close handshake failed");
            return Ok(());
        }
        // Drain until the server acknowledges the close or the read times out.
        loop {
            match socket.read() {
                Ok(_) => continue,
                Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => break,
                Err(e) => {
                    debug!(error = %e, "close handshake incomplete");
                    break;
                }
            }
        }
        info!("kline stream stopped");
        Ok(())
    }
}
