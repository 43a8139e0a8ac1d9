//! Session management
//!
//! A successful login yields a [`SessionGuard`], the only owner of the
//! session token. Ending the session consumes the guard, so no scan or
//! export call can be made with a session that was logged out.

use log::{info, warn};
use std::sync::Arc;

use crate::core::{Credentials, ScanService, Session};
use crate::error::{ExportError, ExportResult};

/// Establishes authenticated sessions with the scanning service
pub struct SessionManager {
    service: Arc<dyn ScanService>,
}

impl SessionManager {
    pub fn new(service: Arc<dyn ScanService>) -> Self {
        Self { service }
    }

    /// Log in; any failure is reported as an authentication error
    pub async fn login(&self, credentials: &Credentials) -> ExportResult<SessionGuard> {
        info!(
            "Logging in to {} as {}",
            self.service.name(),
            credentials.username
        );

        let session = self
            .service
            .authenticate(credentials)
            .await
            .map_err(|e| match e {
                ExportError::AuthenticationError(_) | ExportError::ConfigError(_) => e,
                other => ExportError::AuthenticationError(other.to_string()),
            })?;

        info!("Logged in");
        Ok(SessionGuard {
            service: Arc::clone(&self.service),
            session,
            released: false,
        })
    }
}

/// Live session, released exactly once
///
/// Call [`SessionGuard::logout`] on every exit path. If the guard is dropped
/// instead (the owning future was dropped, or a panic unwound through it),
/// the session is ended in the background on the current tokio runtime.
pub struct SessionGuard {
    service: Arc<dyn ScanService>,
    session: Session,
    released: bool,
}

impl SessionGuard {
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn service(&self) -> &Arc<dyn ScanService> {
        &self.service
    }

    /// End the session; failures are logged and swallowed, never retried
    pub async fn logout(mut self) {
        self.released = true;
        match self.service.end_session(&self.session).await {
            Ok(()) => info!("Logged out"),
            Err(e) => {
                let e = match e {
                    ExportError::LogoutError(_) => e,
                    other => ExportError::LogoutError(other.to_string()),
                };
                warn!("{}", e);
            }
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        // The placeholder is never sent anywhere; the guard is going away.
        let session = std::mem::replace(&mut self.session, Session::new(String::new()));
        let service = Arc::clone(&self.service);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Session dropped before logout, ending it in the background");
                handle.spawn(async move {
                    if let Err(e) = service.end_session(&session).await {
                        warn!("Background logout failed: {}", e);
                    }
                });
            }
            Err(_) => {
                warn!("Session dropped outside of a runtime; it will expire on the server");
            }
        }
    }
}
