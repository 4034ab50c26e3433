//! Join attempt state machine
//!
//! One attempt refreshes the account, opens a bot session and watches its
//! events until a verdict can be drawn:
//!
//! ```text
//! Refreshing -> Connecting -> AwaitingLogin -> LoggedIn -> (Warning) -> Resolved
//!                                  |  \
//!                                  |   Kicked  -> Resolved
//!                                  Errored     -> Resolved
//! ```
//!
//! A single timer slot holds whichever deadline the current state needs:
//! the connect deadline until the first event, then the advisory grace
//! period. Every path ends the session before resolving.

use crate::credentials::{Account, TokenRefresher};
use crate::network::version::GameVersion;
use crate::scanner::{Outcome, UnknownCause};
use crate::session::{BotConnector, BotSession, KickReason, SessionEvent};
use crate::utils::address_table::Endpoint;
use futures::FutureExt;
use log::debug;
use std::future::pending;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Sleep};

/// Legacy and namespaced whitelist rejection texts
pub const NOT_WHITELISTED_MARKERS: [&str; 2] = [
    "You are not whitelisted on this server",
    "multiplayer.disconnect.not_whitelisted",
];

/// Errors that clear up if the same join is tried again later
pub const RETRY_MARKERS: [&str; 2] = ["RateLimiter disallowed request", "Failed to obtain profile data"];

pub const WARNING_MESSAGE: &str = "WARNING: If you don't want your server to be joined (and likely destroyed) by random people, the only way to protect your server is by enabling a whitelist. Banning this bot will NOT protect your server.";

pub const BAN_NOTICE: &str =
    "If this is intended to be a public server, simply ban this bot and my messages will stop.";

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(6);
pub const DEFAULT_WARNING_GRACE: Duration = Duration::from_secs(3);

/// Timing and advisory behaviour of a join attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSettings {
    pub connect_timeout: Duration,
    pub warning_grace: Duration,
    pub chat_warning: bool,
    pub contact_line: Option<String>,
}

impl Default for JoinSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            warning_grace: DEFAULT_WARNING_GRACE,
            chat_warning: false,
            contact_line: None,
        }
    }
}

impl JoinSettings {
    /// The two chat lines sent after an unguarded login
    pub fn advisory_messages(&self) -> [String; 2] {
        let notice = match self.contact_line.as_deref().map(str::trim) {
            Some(contact) if !contact.is_empty() => format!("{} {}", BAN_NOTICE, contact),
            _ => BAN_NOTICE.to_string(),
        };
        [WARNING_MESSAGE.to_string(), notice]
    }
}

/// Classify a disconnect received before login
pub fn classify_kick(reason: &KickReason) -> Outcome {
    let text = reason.to_text();
    if NOT_WHITELISTED_MARKERS.iter().any(|m| text.contains(m)) {
        Outcome::Whitelisted
    } else {
        Outcome::Unknown(UnknownCause::AmbiguousKick)
    }
}

/// Classify a session error
pub fn classify_error(message: &str) -> Outcome {
    if RETRY_MARKERS.iter().any(|m| message.contains(m)) {
        Outcome::Retry
    } else {
        Outcome::Unknown(UnknownCause::SessionError)
    }
}

type Session = Box<dyn BotSession>;

enum JoinState {
    Refreshing,
    Connecting,
    AwaitingLogin(Session),
    LoggedIn(Session),
    Warning(Session),
    Kicked(Session, KickReason),
    Errored(Option<Session>, String),
    Resolved(Outcome),
}

/// What woke a waiting state
enum Wake<T> {
    Ready(T),
    Timer,
}

/// Completes when the armed timer fires; never completes when disarmed
async fn timer_fired(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}

/// Drives join attempts through a bot connector
pub struct JoinOrchestrator {
    connector: Arc<dyn BotConnector>,
    refresher: Arc<dyn TokenRefresher>,
    settings: JoinSettings,
}

impl JoinOrchestrator {
    pub fn new(
        connector: Arc<dyn BotConnector>,
        refresher: Arc<dyn TokenRefresher>,
        settings: JoinSettings,
    ) -> Self {
        Self {
            connector,
            refresher,
            settings,
        }
    }

    /// Attempt to join `endpoint` as `account` and classify what happens
    pub async fn attempt_join(&self, account: &Account, endpoint: Endpoint, version: &GameVersion) -> Outcome {
        let mut timer: Option<Pin<Box<Sleep>>> = None;
        let mut state = JoinState::Refreshing;

        loop {
            state = match state {
                JoinState::Refreshing => match account.refresh(self.refresher.as_ref()).await {
                    Ok(()) => JoinState::Connecting,
                    Err(e) => {
                        debug!("{} refresh for {} failed: {}", endpoint, account.username(), e);
                        JoinState::Resolved(Outcome::Unknown(UnknownCause::RefreshFailed))
                    }
                },

                JoinState::Connecting => {
                    timer = Some(Box::pin(sleep(self.settings.connect_timeout)));
                    let connect = AssertUnwindSafe(self.connector.connect(account.credential(), endpoint, version))
                        .catch_unwind();

                    let wake = tokio::select! {
                        opened = connect => Wake::Ready(opened),
                        _ = timer_fired(&mut timer) => Wake::Timer,
                    };

                    match wake {
                        Wake::Timer => JoinState::Resolved(Outcome::Unknown(UnknownCause::ConnectDeadline)),
                        Wake::Ready(Err(_)) => {
                            debug!("{} connector panicked", endpoint);
                            JoinState::Resolved(Outcome::Unknown(UnknownCause::SetupFault))
                        }
                        Wake::Ready(Ok(Err(e))) => JoinState::Errored(None, e.to_string()),
                        Wake::Ready(Ok(Ok(session))) => JoinState::AwaitingLogin(session),
                    }
                }

                JoinState::AwaitingLogin(mut session) => {
                    let wake = tokio::select! {
                        event = session.next_event() => Wake::Ready(event),
                        _ = timer_fired(&mut timer) => Wake::Timer,
                    };

                    match wake {
                        Wake::Timer => {
                            session.end().await;
                            JoinState::Resolved(Outcome::Unknown(UnknownCause::ConnectDeadline))
                        }
                        Wake::Ready(None) => {
                            session.end().await;
                            JoinState::Resolved(Outcome::Unknown(UnknownCause::SessionClosed))
                        }
                        // chat before login does not count as the first event
                        Wake::Ready(Some(SessionEvent::Chat { .. })) => JoinState::AwaitingLogin(session),
                        Wake::Ready(Some(event)) => {
                            timer = None;
                            match event {
                                SessionEvent::Login => JoinState::LoggedIn(session),
                                SessionEvent::Kicked(reason) => JoinState::Kicked(session, reason),
                                SessionEvent::Error(message) => JoinState::Errored(Some(session), message),
                                SessionEvent::Chat { .. } => JoinState::AwaitingLogin(session),
                            }
                        }
                    }
                }

                JoinState::LoggedIn(mut session) => {
                    if !self.settings.chat_warning {
                        session.end().await;
                        JoinState::Resolved(Outcome::NotWhitelisted)
                    } else {
                        for message in self.settings.advisory_messages() {
                            if let Err(e) = session.send_chat(&message).await {
                                debug!("{} advisory chat not sent: {}", endpoint, e);
                            }
                        }
                        timer = Some(Box::pin(sleep(self.settings.warning_grace)));
                        JoinState::Warning(session)
                    }
                }

                JoinState::Warning(mut session) => {
                    let wake = tokio::select! {
                        event = session.next_event() => Wake::Ready(event),
                        _ = timer_fired(&mut timer) => Wake::Timer,
                    };

                    match wake {
                        Wake::Ready(Some(SessionEvent::Chat { username, .. })) if username != session.username() => {
                            JoinState::Warning(session)
                        }
                        Wake::Ready(Some(SessionEvent::Login)) => JoinState::Warning(session),
                        _ => {
                            timer = None;
                            session.end().await;
                            JoinState::Resolved(Outcome::NotWhitelisted)
                        }
                    }
                }

                JoinState::Kicked(mut session, reason) => {
                    session.end().await;
                    let outcome = classify_kick(&reason);
                    if !matches!(outcome, Outcome::Whitelisted) {
                        debug!("{} kicked: {}", endpoint, reason.to_text());
                    }
                    JoinState::Resolved(outcome)
                }

                JoinState::Errored(session, message) => {
                    if let Some(mut session) = session {
                        session.end().await;
                    }
                    debug!("{} session error: {}", endpoint, message);
                    JoinState::Resolved(classify_error(&message))
                }

                JoinState::Resolved(outcome) => return outcome,
            };
        }
    }
}
