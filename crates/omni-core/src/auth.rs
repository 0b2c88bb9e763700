//! Auto-login with network backoff
//!
//! Retries only while every division is unreachable. A rejection or server
//! error from any division ends the loop at once.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Credentials;
use crate::error::CoreError;
use crate::session::{LoginOutcome, SessionManager};

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> LoginOutcome;
}

#[async_trait]
impl Authenticator for SessionManager {
    async fn login(&self, credentials: &Credentials) -> LoginOutcome {
        SessionManager::login(self, credentials).await
    }
}

/// Log in, sleeping `backoff` between attempts while the portal is unreachable
///
/// `max_attempts = None` retries forever.
pub async fn auto_login<A>(
    auth: &A,
    credentials: &Credentials,
    backoff: Duration,
    max_attempts: Option<u32>,
) -> Result<LoginOutcome, CoreError>
where
    A: Authenticator + ?Sized,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let outcome = auth.login(credentials).await;

        if outcome.success() {
            info!(attempt, state = ?outcome.degraded_state(), "Auto-login succeeded");
            return Ok(outcome);
        }
        if !outcome.all_offline() {
            return outcome.into_result();
        }
        if max_attempts.is_some_and(|max| attempt >= max) {
            warn!(attempt, "Portal unreachable, giving up");
            return outcome.into_result();
        }

        warn!(attempt, retry_in = ?backoff, "Portal unreachable, retrying login");
        tokio::time::sleep(backoff).await;
    }
}
