//! Dual session manager
//!
//! One cookie-backed HTTP session per division. Both sessions log in with
//! the same credentials but present a different User-Agent, so the portal
//! keeps them apart.

mod transport;

pub use transport::{DivisionTransport, Method, PortalRequest, PortalResponse};

use async_trait::async_trait;
use omni_types::{Division, PerDivision};
use parking_lot::RwLock;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{Credentials, PortalConfig};
use crate::error::{CoreError, DegradedState, DivisionFailure};
use crate::event::{EventBus, PortalEvent};

const CSRF_COOKIE: &str = "_csrf";

struct Session {
    client: Client,
    jar: Arc<Jar>,
    user_agent: String,
    csrf: Option<String>,
    authenticated: bool,
}

impl Session {
    fn new(user_agent: &str, timeout: Duration) -> Result<Self, CoreError> {
        let jar = Arc::new(Jar::default());

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            "X-Requested-With",
            HeaderValue::from_static("XMLHttpRequest"),
        );

        let client = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .user_agent(user_agent)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::InvalidConfig {
                message: format!("HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            jar,
            user_agent: user_agent.to_string(),
            csrf: None,
            authenticated: false,
        })
    }
}

/// Result of logging in to both divisions
#[derive(Debug)]
pub struct LoginOutcome {
    pub results: PerDivision<Result<(), CoreError>>,
}

impl LoginOutcome {
    /// At least one division authenticated
    pub fn success(&self) -> bool {
        self.results.iter().any(|(_, r)| r.is_ok())
    }

    pub fn succeeded(&self, division: Division) -> bool {
        self.results[division].is_ok()
    }

    pub fn failures(&self) -> Vec<DivisionFailure> {
        self.results
            .iter()
            .filter_map(|(d, r)| r.as_ref().err().map(|e| DivisionFailure::from_core_error(d, e)))
            .collect()
    }

    /// Every failed division failed for lack of connectivity
    pub fn all_offline(&self) -> bool {
        self.results
            .iter()
            .all(|(_, r)| matches!(r, Err(e) if e.is_transport()))
    }

    pub fn degraded_state(&self) -> DegradedState {
        let failures = self.failures();
        if failures.is_empty() {
            return DegradedState::Healthy;
        }
        let reason = failures
            .iter()
            .map(|f| f.message.clone())
            .collect::<Vec<_>>()
            .join("; ");
        if self.success() {
            DegradedState::PartialData {
                missing: failures.iter().map(|f| f.division).collect(),
                reason,
            }
        } else {
            DegradedState::Offline { reason }
        }
    }

    /// `Ok` if any division succeeded, otherwise the combined failure
    pub fn into_result(self) -> Result<Self, CoreError> {
        if self.success() {
            Ok(self)
        } else {
            Err(CoreError::NoDivisionAvailable {
                failures: self.failures(),
            })
        }
    }
}

/// Owns both division sessions
pub struct SessionManager {
    base: Url,
    timeout: Duration,
    sessions: PerDivision<RwLock<Session>>,
    events: EventBus,
}

impl SessionManager {
    pub fn new(config: &PortalConfig, events: EventBus) -> Result<Self, CoreError> {
        let base = config.base()?;
        let timeout = config.request_timeout();
        let academy = Session::new(config.user_agent(Division::Academy), timeout)?;
        let college = Session::new(config.user_agent(Division::College), timeout)?;

        Ok(Self {
            base,
            timeout,
            sessions: PerDivision::new(RwLock::new(academy), RwLock::new(college)),
            events,
        })
    }

    pub fn is_authenticated(&self, division: Division) -> bool {
        self.sessions[division].read().authenticated
    }

    /// Divisions with a live session, in fetch order
    pub fn authenticated_divisions(&self) -> Vec<Division> {
        Division::ALL
            .into_iter()
            .filter(|d| self.is_authenticated(*d))
            .collect()
    }

    pub fn csrf_token(&self, division: Division) -> Option<String> {
        self.sessions[division].read().csrf.clone()
    }

    /// Log in to both divisions concurrently
    pub async fn login(&self, credentials: &Credentials) -> LoginOutcome {
        let (academy, college) = tokio::join!(
            self.login_division(Division::Academy, credentials),
            self.login_division(Division::College, credentials),
        );

        let outcome = LoginOutcome {
            results: PerDivision::new(academy, college),
        };

        for (division, result) in outcome.results.iter() {
            match result {
                Ok(()) => info!(division = %division, "Logged in"),
                Err(e) => warn!(division = %division, error = %e, "Login failed"),
            }
        }

        self.events.publish(PortalEvent::LoggedIn {
            academy: outcome.succeeded(Division::Academy),
            college: outcome.succeeded(Division::College),
        });
        outcome
    }

    /// A failed attempt leaves the division logged out, whatever it was before
    async fn login_division(
        &self,
        division: Division,
        credentials: &Credentials,
    ) -> Result<(), CoreError> {
        let result = self.try_login_division(division, credentials).await;
        if result.is_err() {
            let mut session = self.sessions[division].write();
            session.authenticated = false;
            session.csrf = None;
        }
        result
    }

    async fn try_login_division(
        &self,
        division: Division,
        credentials: &Credentials,
    ) -> Result<(), CoreError> {
        let request = PortalRequest::post_json(
            "auth/login",
            json!({
                "LoginForm": {
                    "username": credentials.username,
                    "password": credentials.password,
                }
            }),
        );
        let response = self.execute(division, request).await?;

        if !response.is_success() {
            return Err(if (400..500).contains(&response.status) {
                CoreError::AuthRejected {
                    division,
                    status: response.status,
                }
            } else {
                CoreError::Server {
                    division,
                    status: response.status,
                    body: response.body,
                }
            });
        }

        // Both sessions share one account; the active location picks the tenant
        let switch = PortalRequest::get("auth/change-city").with_query("city", division.id());
        let switched = self.execute(division, switch).await?;
        if !switched.is_success() {
            warn!(
                division = %division,
                status = switched.status,
                "Location switch rejected"
            );
        }

        let mut session = self.sessions[division].write();
        let csrf = read_cookie(&session.jar, &self.base, CSRF_COOKIE);
        session.csrf = csrf;
        session.authenticated = true;
        if session.csrf.is_none() {
            debug!(division = %division, "No CSRF cookie after login");
        }
        Ok(())
    }

    /// Drop both sessions' cookies and tokens (no server contact)
    pub fn logout(&self) -> Result<(), CoreError> {
        for division in Division::ALL {
            let mut session = self.sessions[division].write();
            let fresh = Session::new(&session.user_agent, self.timeout)?;
            *session = fresh;
        }
        info!("Logged out of both divisions");
        self.events.publish(PortalEvent::LoggedOut);
        Ok(())
    }

    /// Health summary of the two sessions
    pub fn degraded_state(&self) -> DegradedState {
        let missing: Vec<Division> = Division::ALL
            .into_iter()
            .filter(|d| !self.is_authenticated(*d))
            .collect();
        match missing.len() {
            0 => DegradedState::Healthy,
            n if n == Division::ALL.len() => DegradedState::Offline {
                reason: "not logged in".to_string(),
            },
            _ => DegradedState::PartialData {
                reason: format!(
                    "{} not logged in",
                    missing.iter().map(|d| d.label()).collect::<Vec<_>>().join(", ")
                ),
                missing,
            },
        }
    }

    fn url(&self, path: &str) -> Result<Url, CoreError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| CoreError::InvalidConfig {
                message: format!("bad request path {}: {}", path, e),
            })
    }
}

#[async_trait]
impl DivisionTransport for SessionManager {
    async fn execute(
        &self,
        division: Division,
        request: PortalRequest,
    ) -> Result<PortalResponse, CoreError> {
        // Clone out so no lock is held across the await
        let (client, csrf) = {
            let session = self.sessions[division].read();
            (session.client.clone(), session.csrf.clone())
        };
        let url = self.url(&request.path)?;

        let mut builder = match request.method {
            Method::Get => client.get(url),
            Method::Post => client.post(url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if request.method == Method::Post {
            if let Some(token) = csrf {
                builder = builder.header("X-CSRF-Token", token);
            }
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CoreError::transport(division, e))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| CoreError::transport(division, e))?;

        if request.mutating {
            info!(division = %division, path = %request.path, status, "Mutation sent");
        } else {
            debug!(division = %division, path = %request.path, status, "Portal request");
        }
        Ok(PortalResponse::new(status, body))
    }
}

fn read_cookie(jar: &Jar, url: &Url, name: &str) -> Option<String> {
    let header = jar.cookies(url)?;
    let header = header.to_str().ok()?;
    parse_cookie(header, name)
}

fn parse_cookie(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cookie() {
        let header = "PHPSESSID=abc; _csrf=tok%3D1; lang=ru";
        assert_eq!(parse_cookie(header, "_csrf").as_deref(), Some("tok%3D1"));
        assert_eq!(parse_cookie(header, "lang").as_deref(), Some("ru"));
        assert_eq!(parse_cookie(header, "missing"), None);
    }

    #[test]
    fn test_read_cookie_from_jar() {
        let jar = Jar::default();
        let url = Url::parse("https://omni.example/").unwrap();
        jar.add_cookie_str("_csrf=secret-token; Path=/", &url);

        assert_eq!(
            read_cookie(&jar, &url, CSRF_COOKIE).as_deref(),
            Some("secret-token")
        );
    }

    #[test]
    fn test_new_manager_starts_logged_out() {
        let manager = SessionManager::new(&PortalConfig::default(), EventBus::default()).unwrap();
        assert!(manager.authenticated_divisions().is_empty());
        assert!(matches!(
            manager.degraded_state(),
            DegradedState::Offline { .. }
        ));
        assert_eq!(manager.csrf_token(Division::Academy), None);
    }

    #[test]
    fn test_login_outcome_partial() {
        let outcome = LoginOutcome {
            results: PerDivision::new(
                Ok(()),
                Err(CoreError::Server {
                    division: Division::College,
                    status: 500,
                    body: String::new(),
                }),
            ),
        };
        assert!(outcome.success());
        assert!(!outcome.all_offline());
        assert!(matches!(
            outcome.degraded_state(),
            DegradedState::PartialData { ref missing, .. } if missing == &vec![Division::College]
        ));
        assert!(outcome.into_result().is_ok());
    }
}
