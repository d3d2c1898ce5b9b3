//! Browser transport using `web_sys::WebSocket`.

use std::collections::HashMap;
use std::time::Duration;

use alerta_shared::NotifyError;
use gloo_timers::callback::Timeout;
use url::Url;
use wasm_bindgen::prelude::*;
use web_sys::{CloseEvent, Event, MessageEvent, WebSocket};

use super::{AttemptId, Connector, EventSink, Scheduler, TransportEvent, TransportHandle};

/// Opens browser WebSockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserConnector;

impl BrowserConnector {
    pub fn new() -> Self {
        Self
    }
}

/// A browser WebSocket together with the callbacks installed on it.
///
/// The callbacks are owned here instead of leaked; dropping the handle
/// detaches them so a superseded socket can no longer report anything.
pub struct BrowserHandle {
    ws: WebSocket,
    _onopen: Closure<dyn FnMut(Event)>,
    _onmessage: Closure<dyn FnMut(MessageEvent)>,
    _onerror: Closure<dyn FnMut(Event)>,
    _onclose: Closure<dyn FnMut(CloseEvent)>,
}

impl TransportHandle for BrowserHandle {
    fn close(&mut self, code: u16, reason: &str) {
        let state = self.ws.ready_state();
        if state == WebSocket::OPEN || state == WebSocket::CONNECTING {
            if let Err(e) = self.ws.close_with_code_and_reason(code, reason) {
                crate::log_warn!("WebSocket close failed: {:?}", e);
            }
        }
    }
}

impl Drop for BrowserHandle {
    fn drop(&mut self) {
        self.ws.set_onopen(None);
        self.ws.set_onmessage(None);
        self.ws.set_onerror(None);
        self.ws.set_onclose(None);
    }
}

impl Connector for BrowserConnector {
    type Handle = BrowserHandle;

    fn open(
        &mut self,
        url: &Url,
        attempt: AttemptId,
        sink: EventSink,
    ) -> Result<Self::Handle, NotifyError> {
        let ws = WebSocket::new(url.as_str())
            .map_err(|e| NotifyError::Transport(format!("Failed to create WebSocket: {:?}", e)))?;

        let open_sink = sink.clone();
        let onopen = Closure::<dyn FnMut(Event)>::new(move |_: Event| {
            open_sink.transport(attempt, TransportEvent::Opened);
        });
        ws.set_onopen(Some(onopen.as_ref().unchecked_ref()));

        let message_sink = sink.clone();
        let onmessage = Closure::<dyn FnMut(MessageEvent)>::new(move |e: MessageEvent| {
            match e.data().as_string() {
                Some(text) => {
                    message_sink.transport(attempt, TransportEvent::Message(text));
                }
                None => crate::log_debug!("Ignoring non-text frame [{}]", attempt),
            }
        });
        ws.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));

        let error_sink = sink.clone();
        let onerror = Closure::<dyn FnMut(Event)>::new(move |e: Event| {
            error_sink.transport(attempt, TransportEvent::Error(e.type_()));
        });
        ws.set_onerror(Some(onerror.as_ref().unchecked_ref()));

        let onclose = Closure::<dyn FnMut(CloseEvent)>::new(move |e: CloseEvent| {
            sink.transport(
                attempt,
                TransportEvent::Closed {
                    code: e.code(),
                    reason: e.reason(),
                },
            );
        });
        ws.set_onclose(Some(onclose.as_ref().unchecked_ref()));

        Ok(BrowserHandle {
            ws,
            _onopen: onopen,
            _onmessage: onmessage,
            _onerror: onerror,
            _onclose: onclose,
        })
    }
}

/// Reconnect timers backed by `setTimeout`. Dropping a [`Timeout`] clears it.
#[derive(Default)]
pub struct BrowserScheduler {
    timers: HashMap<u64, Timeout>,
}

impl BrowserScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for BrowserScheduler {
    fn schedule(&mut self, delay: Duration, ticket: u64, sink: EventSink) {
        let millis = delay.as_millis().min(u32::MAX as u128) as u32;
        let timer = Timeout::new(millis, move || {
            sink.reconnect_due(ticket);
        });
        // Older tickets are either fired or superseded by now.
        self.timers.clear();
        self.timers.insert(ticket, timer);
    }

    fn cancel(&mut self, ticket: u64) {
        self.timers.remove(&ticket);
    }
}
