/*
[INPUT]:  Authenticate requests and login results for one connection
[OUTPUT]: Decision to send a login frame, wait, or reply immediately
[POS]:    Auth layer - per-connection login state shared by concurrent callers
[UPDATE]: When changing login caching or failure semantics
*/

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{Result, WirebookError};

pub type AuthReply = oneshot::Sender<Result<()>>;

/// What the event loop must do after registering an authenticate call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStep {
    /// First caller: build and send the login frame
    SendLogin,
    /// A login is already in flight; the caller joined it
    Wait,
    /// Connection already authenticated; the caller was answered
    Done,
}

#[derive(Debug, Default)]
enum Phase {
    #[default]
    Idle,
    Pending {
        waiters: Vec<AuthReply>,
        deadline: Option<Instant>,
    },
    Authenticated,
}

/// One-shot login state; success is cached, failure is not
#[derive(Debug, Default)]
pub struct AuthHandshake {
    phase: Phase,
}

impl AuthHandshake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.phase, Phase::Authenticated)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.phase, Phase::Pending { .. })
    }

    pub fn request(&mut self, reply: AuthReply, deadline: Option<Instant>) -> AuthStep {
        match &mut self.phase {
            Phase::Authenticated => {
                let _ = reply.send(Ok(()));
                AuthStep::Done
            }
            Phase::Pending { waiters, .. } => {
                waiters.push(reply);
                AuthStep::Wait
            }
            Phase::Idle => {
                self.phase = Phase::Pending {
                    waiters: vec![reply],
                    deadline,
                };
                AuthStep::SendLogin
            }
        }
    }

    /// Login accepted: answer every waiter and cache the result
    pub fn succeed(&mut self) -> usize {
        let waiters = match std::mem::replace(&mut self.phase, Phase::Authenticated) {
            Phase::Pending { waiters, .. } => waiters,
            _ => Vec::new(),
        };
        let count = waiters.len();
        for waiter in waiters {
            let _ = waiter.send(Ok(()));
        }
        count
    }

    /// Login rejected or abandoned: reject every waiter and allow a retry
    pub fn fail(&mut self, err: WirebookError) -> usize {
        let waiters = match std::mem::take(&mut self.phase) {
            Phase::Pending { waiters, .. } => waiters,
            Phase::Authenticated => {
                self.phase = Phase::Authenticated;
                Vec::new()
            }
            Phase::Idle => Vec::new(),
        };
        let count = waiters.len();
        for waiter in waiters {
            let _ = waiter.send(Err(err.clone()));
        }
        count
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        match &self.phase {
            Phase::Pending {
                deadline: Some(deadline),
                ..
            } => now >= *deadline,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_login() {
        let mut handshake = AuthHandshake::new();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();

        assert_eq!(handshake.request(tx1, None), AuthStep::SendLogin);
        assert_eq!(handshake.request(tx2, None), AuthStep::Wait);
        assert_eq!(handshake.succeed(), 2);

        assert_eq!(rx1.await.unwrap(), Ok(()));
        assert_eq!(rx2.await.unwrap(), Ok(()));

        let (tx3, rx3) = oneshot::channel();
        assert_eq!(handshake.request(tx3, None), AuthStep::Done);
        assert_eq!(rx3.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn failure_rejects_waiters_and_allows_retry() {
        let mut handshake = AuthHandshake::new();
        let (tx1, rx1) = oneshot::channel();
        handshake.request(tx1, None);

        handshake.fail(WirebookError::authentication("bad signature"));
        let err = rx1.await.unwrap().unwrap_err();
        assert!(err.is_auth_error());
        assert!(!handshake.is_authenticated());

        let (tx2, _rx2) = oneshot::channel();
        assert_eq!(handshake.request(tx2, None), AuthStep::SendLogin);
    }

    #[tokio::test]
    async fn pending_login_expires_at_deadline() {
        let mut handshake = AuthHandshake::new();
        let now = Instant::now();
        let (tx, _rx) = oneshot::channel();
        handshake.request(tx, Some(now + Duration::from_secs(5)));

        assert!(!handshake.is_expired(now));
        assert!(handshake.is_expired(now + Duration::from_secs(5)));
    }
}
