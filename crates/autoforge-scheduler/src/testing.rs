//! In-memory backend and collaborator fakes for tests.

use async_trait::async_trait;
use autoforge_core::backend::{ActiveSessionCounter, BuildBackend, SessionChannel};
use autoforge_core::collaborator::{
    Discoverer, IdeaStatus, IdeaTracker, PublishedLocation, Publisher,
};
use autoforge_core::event::{BackendEvent, CompletedPayload, OutboundMessage};
use autoforge_core::{Error, Idea, Result};
use serde_json::json;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{Instant, sleep_until};

/// One step of a scripted session.
pub enum Step {
    Event(BackendEvent),
    /// Wait before the next step.
    Delay(Duration),
    /// Transport error.
    Fail(Error),
    /// Peer closes the channel.
    Close,
}

pub fn connected(session_id: &str) -> Step {
    Step::Event(BackendEvent::Connected {
        session_id: session_id.to_string(),
    })
}

pub fn started() -> Step {
    Step::Event(BackendEvent::Started)
}

pub fn agent(name: &str) -> Step {
    Step::Event(BackendEvent::AgentMessage {
        agent: name.to_string(),
    })
}

pub fn completed(files: &[&str]) -> Step {
    let results: serde_json::Map<_, _> = files
        .iter()
        .map(|name| (name.to_string(), json!(format!("# {}", name))))
        .collect();
    Step::Event(BackendEvent::Completed(CompletedPayload {
        results: results.into(),
        code_files: json!(files),
        token_usage: Some(json!({"total_tokens": 1200})),
    }))
}

pub fn backend_error(message: &str) -> Step {
    Step::Event(BackendEvent::Error {
        message: message.to_string(),
    })
}

/// What a channel saw from the orchestrator side.
#[derive(Default)]
pub struct ChannelProbe {
    sent: Mutex<Vec<OutboundMessage>>,
    closes: AtomicUsize,
}

impl ChannelProbe {
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Channel replaying a script. Once the script is exhausted it stays
/// open and silent.
pub struct ScriptedChannel {
    script: VecDeque<Step>,
    delay_until: Option<Instant>,
    probe: Arc<ChannelProbe>,
}

#[async_trait]
impl SessionChannel for ScriptedChannel {
    async fn send(&mut self, message: &OutboundMessage) -> Result<()> {
        self.probe.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<BackendEvent>> {
        loop {
            if let Some(Step::Delay(delay)) = self.script.front() {
                let delay = *delay;
                let until = *self.delay_until.get_or_insert_with(|| Instant::now() + delay);
                sleep_until(until).await;
                self.delay_until = None;
                self.script.pop_front();
                continue;
            }

            return match self.script.pop_front() {
                Some(Step::Event(event)) => Some(Ok(event)),
                Some(Step::Fail(error)) => Some(Err(error)),
                Some(Step::Close) => None,
                Some(Step::Delay(_)) => continue,
                None => std::future::pending().await,
            };
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Backend handing out one scripted channel.
pub struct ScriptedBackend {
    script: Mutex<Option<Vec<Step>>>,
    probe: Arc<ChannelProbe>,
    healthy: bool,
    connects: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(Some(script)),
            probe: Arc::new(ChannelProbe::default()),
            healthy: true,
            connects: AtomicUsize::new(0),
        }
    }

    /// Backend that refuses every connection.
    pub fn unreachable() -> Self {
        Self {
            script: Mutex::new(None),
            probe: Arc::new(ChannelProbe::default()),
            healthy: false,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn probe(&self) -> Arc<ChannelProbe> {
        self.probe.clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BuildBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn connect(&self) -> Result<Box<dyn SessionChannel>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let script = self
            .script
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| Error::Unavailable("connection refused".to_string()))?;

        Ok(Box::new(ScriptedChannel {
            script: script.into(),
            delay_until: None,
            probe: self.probe.clone(),
        }))
    }

    async fn health(&self) -> Result<bool> {
        if self.healthy {
            Ok(true)
        } else {
            Err(Error::Unavailable("connection refused".to_string()))
        }
    }
}

/// Counter returning scripted counts in order, repeating the last one.
pub struct ScriptedCounter {
    counts: Vec<Result<usize>>,
    calls: AtomicUsize,
}

impl ScriptedCounter {
    pub fn new(counts: impl IntoIterator<Item = Result<usize>>) -> Self {
        Self {
            counts: counts.into_iter().collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn idle() -> Self {
        Self::new([Ok(0)])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActiveSessionCounter for ScriptedCounter {
    async fn active_sessions(&self) -> Result<usize> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let index = call.min(self.counts.len().saturating_sub(1));
        match self.counts.get(index) {
            Some(Ok(count)) => Ok(*count),
            Some(Err(e)) => Err(Error::Internal(e.to_string())),
            None => Ok(0),
        }
    }
}

pub struct FakeDiscoverer {
    ideas: Option<Vec<Idea>>,
    calls: AtomicUsize,
}

impl FakeDiscoverer {
    pub fn with(ideas: Vec<Idea>) -> Self {
        Self {
            ideas: Some(ideas),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            ideas: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Discoverer for FakeDiscoverer {
    async fn discover(&self, limit: usize) -> Result<Vec<Idea>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.ideas {
            Some(ideas) => Ok(ideas.iter().take(limit).cloned().collect()),
            None => Err(Error::Discovery("catalog unreadable".to_string())),
        }
    }
}

pub struct CountingPublisher {
    fail_with: Option<String>,
    calls: AtomicUsize,
    published: Mutex<Vec<BTreeMap<String, String>>>,
}

impl CountingPublisher {
    pub fn succeeding() -> Self {
        Self {
            fail_with: None,
            calls: AtomicUsize::new(0),
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::succeeding()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<BTreeMap<String, String>> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for CountingPublisher {
    fn is_configured(&self) -> bool {
        true
    }

    async fn publish(
        &self,
        idea: &Idea,
        files: &BTreeMap<String, String>,
    ) -> Result<PublishedLocation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_with {
            return Err(Error::Publish(message.clone()));
        }
        self.published.lock().unwrap().push(files.clone());
        Ok(PublishedLocation {
            url: format!("https://github.com/acme/{}", idea.name),
            repository: format!("acme/{}", idea.name),
        })
    }
}

/// Tracker remembering every status update.
#[derive(Default)]
pub struct RecordingTracker {
    failing: bool,
    updates: Mutex<Vec<(IdeaStatus, Option<String>)>>,
}

impl RecordingTracker {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub fn statuses(&self) -> Vec<IdeaStatus> {
        self.updates.lock().unwrap().iter().map(|(s, _)| *s).collect()
    }

    pub fn last_url(&self) -> Option<String> {
        self.updates.lock().unwrap().last().and_then(|(_, url)| url.clone())
    }
}

#[async_trait]
impl IdeaTracker for RecordingTracker {
    async fn record_idea(&self, idea: &Idea) -> Result<String> {
        if self.failing {
            return Err(Error::Tracker("unauthorized".to_string()));
        }
        self.updates
            .lock()
            .unwrap()
            .push((IdeaStatus::Discovered, None));
        Ok(format!("page-{}", idea.name))
    }

    async fn update_status(&self, _id: &str, status: IdeaStatus, url: Option<&str>) -> Result<()> {
        if self.failing {
            return Err(Error::Tracker("unauthorized".to_string()));
        }
        self.updates
            .lock()
            .unwrap()
            .push((status, url.map(str::to_string)));
        Ok(())
    }
}
