//! Native/Desktop transport using tokio-tungstenite.
//!
//! Each opened transport runs in its own tokio task and only talks to the
//! client through the [`EventSink`], so the client itself can stay on one
//! thread.

use std::collections::HashMap;
use std::time::Duration;

use alerta_shared::{NotifyError, CLOSE_ABNORMAL, CLOSE_NO_STATUS};
use futures_channel::oneshot;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
};
use url::Url;

use super::{AttemptId, Connector, EventSink, Scheduler, TransportEvent, TransportHandle};

/// Opens WebSocket transports on the current tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    pub fn new() -> Self {
        Self
    }
}

/// Handle to a transport task. Closing (or dropping) it asks the task to
/// send a close frame and stop.
pub struct TungsteniteHandle {
    close_tx: Option<oneshot::Sender<(u16, String)>>,
}

impl TransportHandle for TungsteniteHandle {
    fn close(&mut self, code: u16, reason: &str) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send((code, reason.to_string()));
        }
    }
}

impl Connector for TungsteniteConnector {
    type Handle = TungsteniteHandle;

    fn open(
        &mut self,
        url: &Url,
        attempt: AttemptId,
        sink: EventSink,
    ) -> Result<Self::Handle, NotifyError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| NotifyError::Transport(format!("no tokio runtime: {}", e)))?;
        let (close_tx, close_rx) = oneshot::channel();
        runtime.spawn(run_transport(url.to_string(), attempt, sink, close_rx));
        Ok(TungsteniteHandle {
            close_tx: Some(close_tx),
        })
    }
}

/// Drive one WebSocket from handshake to close, reporting every step.
async fn run_transport(
    url: String,
    attempt: AttemptId,
    sink: EventSink,
    mut close_rx: oneshot::Receiver<(u16, String)>,
) {
    let connected = tokio::select! {
        result = connect_async(url.as_str()) => result,
        _ = &mut close_rx => {
            // Closed before the handshake finished; the owner already moved on.
            crate::log_debug!("Transport {} cancelled while connecting", attempt);
            return;
        }
    };

    let mut ws = match connected {
        Ok((ws, _response)) => ws,
        Err(e) => {
            crate::log_error!("WebSocket handshake failed [{}]: {}", attempt, e);
            sink.transport(attempt, TransportEvent::Error(e.to_string()));
            sink.transport(
                attempt,
                TransportEvent::Closed {
                    code: CLOSE_ABNORMAL,
                    reason: e.to_string(),
                },
            );
            return;
        }
    };

    if !sink.transport(attempt, TransportEvent::Opened) {
        let _ = ws.close(None).await;
        return;
    }

    loop {
        tokio::select! {
            request = &mut close_rx => {
                // A dropped handle counts as a normal close request.
                let (code, reason) = request.unwrap_or((1000, String::new()));
                let frame = CloseFrame {
                    code: CloseCode::from(code),
                    reason: reason.clone().into(),
                };
                if let Err(e) = ws.close(Some(frame)).await {
                    crate::log_debug!("Close handshake failed [{}]: {}", attempt, e);
                }
                sink.transport(attempt, TransportEvent::Closed { code, reason });
                return;
            }
            msg = ws.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let text: &str = &text;
                    if !sink.transport(attempt, TransportEvent::Message(text.to_owned())) {
                        return;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => {
                            let reason: &str = &frame.reason;
                            (u16::from(frame.code), reason.to_owned())
                        }
                        None => (CLOSE_NO_STATUS, String::new()),
                    };
                    crate::log_info!("WebSocket [{}] received close frame {}", attempt, code);
                    sink.transport(attempt, TransportEvent::Closed { code, reason });
                    return;
                }
                Some(Ok(Message::Ping(data))) => {
                    // Pong is handled automatically by tungstenite
                    crate::log_debug!("Received ping: {:?}", data);
                }
                Some(Ok(_)) => {
                    // Ignore binary, pong, etc.
                }
                Some(Err(e)) => {
                    crate::log_error!("WebSocket read error [{}]: {}", attempt, e);
                    sink.transport(attempt, TransportEvent::Error(e.to_string()));
                    sink.transport(attempt, TransportEvent::Closed {
                        code: CLOSE_ABNORMAL,
                        reason: e.to_string(),
                    });
                    return;
                }
                None => {
                    sink.transport(attempt, TransportEvent::Closed {
                        code: CLOSE_ABNORMAL,
                        reason: "stream ended".to_string(),
                    });
                    return;
                }
            }
        }
    }
}

/// Reconnect timers as tokio sleeps. Cancelling aborts the task.
#[derive(Default)]
pub struct TokioScheduler {
    timers: HashMap<u64, JoinHandle<()>>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration, ticket: u64, sink: EventSink) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            crate::log_error!("No tokio runtime, reconnect {} not scheduled", ticket);
            return;
        };
        self.timers.retain(|_, timer| !timer.is_finished());
        let timer = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            sink.reconnect_due(ticket);
        });
        self.timers.insert(ticket, timer);
    }

    fn cancel(&mut self, ticket: u64) {
        if let Some(timer) = self.timers.remove(&ticket) {
            timer.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
    }
}
