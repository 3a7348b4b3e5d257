//! Portal session driver: one browser session per call, sign in, scrape, tear down.

use crate::core::parse;
use crate::core::routes::PortalRoutes;
use crate::domain::model::{AveragesResult, FetchOutcome, PlaintextCredentials, TranscriptResult};
use crate::domain::ports::{BrowserLauncher, BrowserSession};
use crate::utils::error::{PortalError, Result};
use crate::utils::redact::redact_secret;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSettings {
    pub launch_timeout: Duration,
    pub navigation_timeout: Duration,
    pub submit_timeout: Duration,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            launch_timeout: Duration::from_secs(30),
            navigation_timeout: Duration::from_secs(30),
            submit_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    NavigatingLogin,
    SubmittingCredentials,
    EvaluatingLogin,
    Authenticated,
    FetchingAverages,
    FetchingTranscript,
    Done,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Init => "init",
            SessionState::NavigatingLogin => "navigating to login",
            SessionState::SubmittingCredentials => "submitting credentials",
            SessionState::EvaluatingLogin => "evaluating login",
            SessionState::Authenticated => "authenticated",
            SessionState::FetchingAverages => "fetching averages",
            SessionState::FetchingTranscript => "fetching transcript",
            SessionState::Done => "done",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

enum LoginVerdict {
    Accepted,
    Rejected { reason: Option<String> },
}

/// Owns a session and guarantees exactly one teardown: `release` on the normal path,
/// `abort` from `Drop` when the owning future is cancelled or unwinds.
pub struct SessionGuard<S: BrowserSession> {
    session: Option<S>,
}

impl<S: BrowserSession> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn session_mut(&mut self) -> Result<&mut S> {
        self.session.as_mut().ok_or_else(|| PortalError::Browser {
            message: "session already released".to_string(),
        })
    }

    /// Awaits `close()` with the session still owned by the guard, so dropping this future
    /// part-way through still aborts it.
    pub async fn release(mut self) {
        if let Some(session) = self.session.as_mut() {
            if let Err(e) = session.close().await {
                tracing::warn!(error = %e, "Browser session did not close cleanly, aborting");
                session.abort();
            }
        }
        self.session = None;
    }
}

impl<S: BrowserSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            tracing::debug!("Browser session dropped before release, aborting");
            session.abort();
        }
    }
}

pub struct PortalDriver<L: BrowserLauncher> {
    launcher: L,
    settings: DriverSettings,
}

impl<L: BrowserLauncher> PortalDriver<L> {
    pub fn new(launcher: L, settings: DriverSettings) -> Self {
        Self { launcher, settings }
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    /// Sign in and scrape both datasets. `Err` is reserved for an unusable base URL; every
    /// other failure is reported through the outcome.
    pub async fn authenticate_and_fetch(
        &self,
        credentials: &PlaintextCredentials,
    ) -> Result<FetchOutcome> {
        let routes = PortalRoutes::resolve(credentials.portal_url())?;
        let span = tracing::info_span!("portal_session");
        Ok(self.session(&routes, credentials).instrument(span).await)
    }

    async fn session(
        &self,
        routes: &PortalRoutes,
        credentials: &PlaintextCredentials,
    ) -> FetchOutcome {
        tracing::debug!(convention = ?routes.convention, "Resolved portal routes");

        let launched = self
            .bounded(
                self.settings.launch_timeout,
                "launching browser",
                self.launcher.launch(),
            )
            .await;
        let session = match launched {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "Could not start browser session");
                return FetchOutcome::TransientFailure {
                    cause: format!("{}: {}", SessionState::Init, e),
                };
            }
        };

        let mut guard = SessionGuard::new(session);
        let mut state = SessionState::Init;
        let result = match guard.session_mut() {
            Ok(session) => self.run(session, routes, credentials, &mut state).await,
            Err(e) => Err(e),
        };
        if tokio::time::timeout(self.settings.navigation_timeout, guard.release())
            .await
            .is_err()
        {
            tracing::warn!("Browser session did not close in time, aborted");
        }

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                let cause = redact_secret(&format!("{}: {}", state, e), credentials.password());
                tracing::warn!(%cause, "Portal session failed");
                FetchOutcome::TransientFailure { cause }
            }
        }
    }

    async fn run(
        &self,
        session: &mut L::Session,
        routes: &PortalRoutes,
        credentials: &PlaintextCredentials,
        state: &mut SessionState,
    ) -> Result<FetchOutcome> {
        transition(state, SessionState::NavigatingLogin);
        self.navigate(session, routes.login.as_str(), "loading the login page")
            .await?;

        transition(state, SessionState::SubmittingCredentials);
        self.submit_credentials(session, credentials).await?;

        transition(state, SessionState::EvaluatingLogin);
        if let LoginVerdict::Rejected { reason } =
            self.evaluate_login(session, routes, credentials).await?
        {
            transition(state, SessionState::Failed);
            return Ok(FetchOutcome::AuthenticationFailed { reason });
        }
        transition(state, SessionState::Authenticated);

        transition(state, SessionState::FetchingAverages);
        let averages = self.fetch_averages(session, routes).await?;

        transition(state, SessionState::FetchingTranscript);
        let transcript = self.fetch_transcript(session, routes).await?;

        transition(state, SessionState::Done);
        Ok(FetchOutcome::Success {
            averages,
            transcript,
        })
    }

    async fn navigate(&self, session: &mut L::Session, url: &str, step: &str) -> Result<()> {
        self.bounded(self.settings.navigation_timeout, step, session.goto(url))
            .await
    }

    async fn submit_credentials(
        &self,
        session: &mut L::Session,
        credentials: &PlaintextCredentials,
    ) -> Result<()> {
        let page_limit = self.settings.navigation_timeout;
        let submit_limit = self.settings.submit_timeout;

        for field in [parse::USERNAME_FIELD, parse::PASSWORD_FIELD] {
            let present = self
                .bounded(page_limit, "reading the login form", session.has_element(field))
                .await?;
            if !present {
                return Err(PortalError::Markup {
                    message: format!("login field '{}' not found", field),
                });
            }
        }

        self.bounded(
            page_limit,
            "filling the login form",
            session.fill(parse::USERNAME_FIELD, credentials.username()),
        )
        .await?;
        self.bounded(
            page_limit,
            "filling the login form",
            session.fill(parse::PASSWORD_FIELD, credentials.password()),
        )
        .await?;

        let has_submit = self
            .bounded(
                page_limit,
                "reading the login form",
                session.has_element(parse::SUBMIT_BUTTON),
            )
            .await?;
        if has_submit {
            self.bounded(
                submit_limit,
                "submitting credentials",
                session.click(parse::SUBMIT_BUTTON),
            )
            .await?;
        } else {
            tracing::debug!("No submit control, pressing Enter in the password field");
            self.bounded(
                submit_limit,
                "submitting credentials",
                session.press_enter(parse::PASSWORD_FIELD),
            )
            .await?;
        }

        match tokio::time::timeout(self.settings.submit_timeout, session.wait_for_navigation())
            .await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!("No navigation after submitting credentials");
                Ok(())
            }
        }
    }

    async fn evaluate_login(
        &self,
        session: &mut L::Session,
        routes: &PortalRoutes,
        credentials: &PlaintextCredentials,
    ) -> Result<LoginVerdict> {
        let limit = self.settings.navigation_timeout;
        let current = self
            .bounded(limit, "checking the login result", session.current_url())
            .await?;
        if !routes.is_login_route(&current) {
            return Ok(LoginVerdict::Accepted);
        }

        let page = self
            .bounded(limit, "checking the login result", session.content())
            .await?;
        let reason =
            parse::validation_error(&page).map(|text| redact_secret(&text, credentials.password()));
        tracing::info!(reason = reason.as_deref().unwrap_or("none"), "Portal rejected login");
        Ok(LoginVerdict::Rejected { reason })
    }

    async fn fetch_averages(
        &self,
        session: &mut L::Session,
        routes: &PortalRoutes,
    ) -> Result<AveragesResult> {
        self.navigate(session, routes.averages.as_str(), "loading averages")
            .await?;
        let page = self
            .bounded(self.settings.navigation_timeout, "reading averages", session.content())
            .await?;
        let averages = parse::course_averages(&page);
        tracing::debug!(courses = averages.len(), "Parsed course averages");
        Ok(averages)
    }

    async fn fetch_transcript(
        &self,
        session: &mut L::Session,
        routes: &PortalRoutes,
    ) -> Result<TranscriptResult> {
        self.navigate(session, routes.transcript.as_str(), "loading the transcript")
            .await?;
        let page = self
            .bounded(
                self.settings.navigation_timeout,
                "reading the transcript",
                session.content(),
            )
            .await?;
        let transcript = parse::transcript_summary(&page);
        tracing::debug!(fields = transcript.len(), "Parsed transcript summary");
        Ok(transcript)
    }

    async fn bounded<T>(
        &self,
        limit: Duration,
        step: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| PortalError::Timeout {
                step: step.to_string(),
            })?
    }
}

fn transition(state: &mut SessionState, next: SessionState) {
    tracing::debug!(from = %state, to = %next, "Session state");
    *state = next;
}
