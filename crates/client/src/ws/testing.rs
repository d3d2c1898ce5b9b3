//! In-memory connector and scheduler for driving the client in tests.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use alerta_shared::NotifyError;
use url::Url;

use super::connection::{AttemptId, Connector, EventSink, Scheduler, TransportHandle};

#[derive(Default, Debug)]
pub struct TransportLog {
    pub opened: Vec<(AttemptId, String)>,
    pub closed: Vec<(AttemptId, u16, String)>,
    /// Returned by the next `open` call instead of a handle.
    pub fail_next: Option<NotifyError>,
}

impl TransportLog {
    /// Transports opened and not closed by the client.
    pub fn live(&self) -> Vec<AttemptId> {
        self.opened
            .iter()
            .map(|(attempt, _)| *attempt)
            .filter(|attempt| !self.closed.iter().any(|(closed, _, _)| closed == attempt))
            .collect()
    }

    pub fn last_opened(&self) -> Option<AttemptId> {
        self.opened.last().map(|(attempt, _)| *attempt)
    }
}

#[derive(Clone, Default)]
pub struct MockConnector {
    pub log: Rc<RefCell<TransportLog>>,
}

pub struct MockHandle {
    attempt: AttemptId,
    log: Rc<RefCell<TransportLog>>,
}

impl TransportHandle for MockHandle {
    fn close(&mut self, code: u16, reason: &str) {
        self.log
            .borrow_mut()
            .closed
            .push((self.attempt, code, reason.to_string()));
    }
}

impl Connector for MockConnector {
    type Handle = MockHandle;

    fn open(
        &mut self,
        url: &Url,
        attempt: AttemptId,
        _sink: EventSink,
    ) -> Result<MockHandle, NotifyError> {
        let mut log = self.log.borrow_mut();
        if let Some(err) = log.fail_next.take() {
            return Err(err);
        }
        log.opened.push((attempt, url.to_string()));
        Ok(MockHandle {
            attempt,
            log: self.log.clone(),
        })
    }
}

#[derive(Default, Debug)]
pub struct TimerLog {
    pub scheduled: Vec<(u64, Duration)>,
    pub cancelled: Vec<u64>,
}

impl TimerLog {
    pub fn pending(&self) -> Vec<u64> {
        self.scheduled
            .iter()
            .map(|(ticket, _)| *ticket)
            .filter(|ticket| !self.cancelled.contains(ticket))
            .collect()
    }
}

#[derive(Clone, Default)]
pub struct MockScheduler {
    pub log: Rc<RefCell<TimerLog>>,
}

impl Scheduler for MockScheduler {
    fn schedule(&mut self, delay: Duration, ticket: u64, _sink: EventSink) {
        self.log.borrow_mut().scheduled.push((ticket, delay));
    }

    fn cancel(&mut self, ticket: u64) {
        self.log.borrow_mut().cancelled.push(ticket);
    }
}
