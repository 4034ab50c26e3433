//! Scripted collaborators shared by the join and engine tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use wlscan::error::ProbeError;
use wlscan::network::{GameVersion, ProbeVerdict, StatusProbe};
use wlscan::session::{BotConnector, BotSession, SessionEvent};
use wlscan::{Credential, Endpoint, ScanError};

/// One step of a scripted session
#[derive(Debug, Clone)]
pub enum Step {
    Event(SessionEvent),
    Delay(Duration),
    /// Report the session as over
    Close,
}

/// What the next `connect` call does
#[derive(Debug, Clone)]
pub enum Script {
    Session { steps: Vec<Step>, echo_chat: bool },
    ConnectError(String),
    Panic,
    HangConnect,
}

impl Script {
    pub fn events(events: impl IntoIterator<Item = SessionEvent>) -> Self {
        Script::Session {
            steps: events.into_iter().map(Step::Event).collect(),
            echo_chat: false,
        }
    }

    pub fn steps(steps: Vec<Step>) -> Self {
        Script::Session {
            steps,
            echo_chat: false,
        }
    }

    pub fn echoing(mut self) -> Self {
        if let Script::Session { echo_chat, .. } = &mut self {
            *echo_chat = true;
        }
        self
    }
}

/// What the fake connector saw
#[derive(Debug, Default)]
pub struct Observed {
    pub connects: Mutex<Vec<(String, Endpoint)>>,
    pub chats: Mutex<Vec<String>>,
    pub ended: AtomicUsize,
}

impl Observed {
    pub fn connect_count(&self) -> usize {
        self.connects.lock().unwrap().len()
    }

    pub fn chats(&self) -> Vec<String> {
        self.chats.lock().unwrap().clone()
    }

    pub fn ended(&self) -> usize {
        self.ended.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeConnector {
    per_endpoint: Mutex<HashMap<Endpoint, VecDeque<Script>>>,
    fallback: Mutex<VecDeque<Script>>,
    pub observed: Arc<Observed>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, script: Script) -> &Self {
        self.fallback.lock().unwrap().push_back(script);
        self
    }

    pub fn push_for(&self, endpoint: Endpoint, script: Script) -> &Self {
        self.per_endpoint
            .lock()
            .unwrap()
            .entry(endpoint)
            .or_default()
            .push_back(script);
        self
    }

    fn next_script(&self, endpoint: Endpoint) -> Option<Script> {
        let scripted = self
            .per_endpoint
            .lock()
            .unwrap()
            .get_mut(&endpoint)
            .and_then(VecDeque::pop_front);
        scripted.or_else(|| self.fallback.lock().unwrap().pop_front())
    }
}

#[async_trait]
impl BotConnector for FakeConnector {
    async fn connect(
        &self,
        credential: &Credential,
        endpoint: Endpoint,
        _version: &GameVersion,
    ) -> wlscan::Result<Box<dyn BotSession>> {
        self.observed
            .connects
            .lock()
            .unwrap()
            .push((credential.username.clone(), endpoint));

        match self.next_script(endpoint) {
            Some(Script::Session { steps, echo_chat }) => Ok(Box::new(FakeSession {
                username: credential.username.clone(),
                steps: steps.into(),
                echo_chat,
                delay_until: None,
                observed: Arc::clone(&self.observed),
            })),
            Some(Script::ConnectError(message)) => Err(ScanError::Network(message)),
            Some(Script::Panic) => panic!("connector exploded"),
            Some(Script::HangConnect) => std::future::pending().await,
            None => Err(ScanError::Network("no script left".to_string())),
        }
    }
}

pub struct FakeSession {
    username: String,
    steps: VecDeque<Step>,
    echo_chat: bool,
    delay_until: Option<Instant>,
    observed: Arc<Observed>,
}

#[async_trait]
impl BotSession for FakeSession {
    fn username(&self) -> &str {
        &self.username
    }

    async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            // survives cancellation: the deadline is kept until it passes
            if let Some(deadline) = self.delay_until {
                tokio::time::sleep_until(deadline).await;
                self.delay_until = None;
            }

            match self.steps.pop_front() {
                Some(Step::Event(event)) => return Some(event),
                Some(Step::Delay(delay)) => self.delay_until = Some(Instant::now() + delay),
                Some(Step::Close) => return None,
                // script exhausted: stay connected and silent
                None => std::future::pending::<()>().await,
            }
        }
    }

    async fn send_chat(&mut self, message: &str) -> wlscan::Result<()> {
        self.observed.chats.lock().unwrap().push(message.to_string());
        if self.echo_chat {
            self.steps.push_front(Step::Event(SessionEvent::Chat {
                username: self.username.clone(),
                message: message.to_string(),
            }));
        }
        Ok(())
    }

    async fn end(&mut self) {
        self.observed.ended.fetch_add(1, Ordering::SeqCst);
    }
}

/// Status answers per endpoint
#[derive(Debug, Clone)]
pub enum ProbeScript {
    Supported(GameVersion),
    Unsupported,
    Unreachable,
}

#[derive(Default)]
pub struct FakeProbe {
    answers: HashMap<Endpoint, ProbeScript>,
    pub probed: Mutex<Vec<Endpoint>>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, endpoint: Endpoint, script: ProbeScript) -> Self {
        self.answers.insert(endpoint, script);
        self
    }

    pub fn probed(&self) -> Vec<Endpoint> {
        self.probed.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusProbe for FakeProbe {
    async fn probe_version(&self, endpoint: Endpoint) -> ProbeVerdict {
        self.probed.lock().unwrap().push(endpoint);
        match self.answers.get(&endpoint) {
            Some(ProbeScript::Supported(version)) => ProbeVerdict::Supported(version.clone()),
            Some(ProbeScript::Unsupported) => ProbeVerdict::Unsupported(ProbeError::UnknownProtocol(-1)),
            Some(ProbeScript::Unreachable) | None => ProbeVerdict::Unreachable(ScanError::Timeout),
        }
    }
}

pub fn version() -> GameVersion {
    GameVersion::new("1.20.1", 763)
}

pub fn kicked(reason: &str) -> SessionEvent {
    SessionEvent::Kicked(wlscan::session::KickReason::parse(reason))
}

pub fn errored(message: &str) -> SessionEvent {
    SessionEvent::Error(message.to_string())
}
