//! Instrumented fake backend shared by classifier and pipeline tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{ChatBackend, ChatMessage};
use crate::Result;
use crate::error::BackendError;

type Responder = Box<dyn Fn(&[ChatMessage]) -> Option<String> + Send + Sync>;

/// Backend returning scripted responses while counting calls and concurrency
pub(crate) struct ScriptedBackend {
    responder: Responder,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
}

impl ScriptedBackend {
    /// Answer every call with `response`
    pub(crate) fn replying(response: &str) -> Self {
        let response = response.to_string();
        Self::with(move |_| Some(response.clone()))
    }

    /// Fail every call with a transport error
    pub(crate) fn failing() -> Self {
        Self::with(|_| None)
    }

    /// Compute the response from the transcript; `None` fails the call
    pub(crate) fn with(
        responder: impl Fn(&[ChatMessage]) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
        }
    }

    /// Hold each call open for `delay`
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most calls observed in flight at once
    pub(crate) fn high_water(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn provider(&self) -> &str {
        "scripted"
    }

    async fn submit(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let response = (self.responder)(messages);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response.ok_or_else(|| {
            BackendError::Transport {
                provider: "scripted".to_string(),
                reason: "connection refused".to_string(),
            }
            .into()
        })
    }
}
