//! Site sessions: per-host records, bookmarks and identity binding.

use super::app_state::AppState;
use super::error::{StateError, StateResult};
use super::types::{site_host, SiteSession, StateChange};

impl AppState {
    /// All site sessions, most recently touched first.
    #[must_use]
    pub fn sessions(&self) -> &[SiteSession] {
        &self.sessions
    }

    /// Returns the session for `host`.
    #[must_use]
    pub fn session(&self, host: &str) -> Option<&SiteSession> {
        self.sessions.iter().find(|session| session.id == host)
    }

    fn session_index(&self, host: &str) -> Option<usize> {
        self.sessions.iter().position(|session| session.id == host)
    }

    /// Moves the session for `url`'s host to the front, creating it if needed.
    fn upsert_front(&mut self, url: &str) -> StateResult<&mut SiteSession> {
        let host = site_host(url)?;
        let session = match self.session_index(&host) {
            Some(index) => {
                let mut session = self.sessions.remove(index);
                session.url = url.to_string();
                session
            }
            None => SiteSession::new(url)?,
        };
        self.sessions.insert(0, session);
        Ok(&mut self.sessions[0])
    }

    /// Records a successful bridge exchange with the site at `url`.
    ///
    /// Returns the session's host.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidSiteUrl`] if `url` has no host.
    pub fn touch_session(&mut self, url: &str) -> StateResult<String> {
        let session = self.upsert_front(url)?;
        session.updated_at = chrono::Utc::now().timestamp();
        let host = session.id.clone();
        self.notify(StateChange::Sessions);
        Ok(host)
    }

    /// Toggles the bookmark of the session for `url`'s host.
    ///
    /// A missing session is created bookmarked. Returns the new flag.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidSiteUrl`] if `url` has no host.
    pub fn toggle_bookmark(&mut self, url: &str) -> StateResult<bool> {
        let host = site_host(url)?;
        let bookmarked = match self.session_index(&host) {
            Some(index) => {
                let session = &mut self.sessions[index];
                session.bookmarked = !session.bookmarked;
                session.updated_at = chrono::Utc::now().timestamp();
                session.bookmarked
            }
            None => {
                let mut session = SiteSession::new(url)?;
                session.bookmarked = true;
                self.sessions.insert(0, session);
                true
            }
        };
        self.notify(StateChange::Sessions);
        Ok(bookmarked)
    }

    /// Binds `public_key` to the session for `host`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::SessionNotFound`] or
    /// [`StateError::IdentityNotFound`] if either side is unknown.
    pub fn bind_identity(&mut self, host: &str, public_key: &str) -> StateResult<()> {
        let public_key = self
            .identity(public_key)
            .map(|identity| identity.public_key.clone())
            .ok_or_else(|| StateError::IdentityNotFound(public_key.to_string()))?;
        let index = self
            .session_index(host)
            .ok_or_else(|| StateError::SessionNotFound(host.to_string()))?;

        self.sessions[index].bound_public_key = Some(public_key);
        self.notify(StateChange::Sessions);
        Ok(())
    }

    /// Public key bound to the session for `host`.
    #[must_use]
    pub fn bound_identity(&self, host: &str) -> Option<&str> {
        self.session(host)?.bound_public_key.as_deref()
    }

    /// Selects the session for `url`'s host as the active one, creating it
    /// if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidSiteUrl`] if `url` has no host.
    pub fn activate_url(&mut self, url: &str) -> StateResult<String> {
        let host = self.upsert_front(url)?.id.clone();
        self.active_session = Some(host.clone());
        self.notify(StateChange::Sessions);
        self.notify(StateChange::ActiveSession);
        Ok(host)
    }

    /// The active session, if any.
    #[must_use]
    pub fn active_session(&self) -> Option<&SiteSession> {
        self.session(self.active_session.as_deref()?)
    }

    /// Clears the active session.
    pub fn clear_active_session(&mut self) {
        if self.active_session.take().is_some() {
            self.notify(StateChange::ActiveSession);
        }
    }

    /// Sessions that are not bookmarked, newest first.
    #[must_use]
    pub fn recent_sessions(&self) -> Vec<&SiteSession> {
        self.sorted_sessions(|session| !session.bookmarked)
    }

    /// Bookmarked sessions, newest first.
    #[must_use]
    pub fn bookmarked_sessions(&self) -> Vec<&SiteSession> {
        self.sorted_sessions(|session| session.bookmarked)
    }

    fn sorted_sessions(&self, keep: impl Fn(&SiteSession) -> bool) -> Vec<&SiteSession> {
        let mut sessions: Vec<_> = self.sessions.iter().filter(|s| keep(s)).collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions
    }

    /// Records the icon the host resolved for `host`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::SessionNotFound`] if the session is unknown.
    pub fn set_session_icon(&mut self, host: &str, icon_url: Option<String>) -> StateResult<()> {
        let index = self
            .session_index(host)
            .ok_or_else(|| StateError::SessionNotFound(host.to_string()))?;
        self.sessions[index].icon_url = icon_url;
        self.notify(StateChange::Sessions);
        Ok(())
    }

    /// Forgets the session for `host`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::SessionNotFound`] if the session is unknown.
    pub fn remove_session(&mut self, host: &str) -> StateResult<SiteSession> {
        let index = self
            .session_index(host)
            .ok_or_else(|| StateError::SessionNotFound(host.to_string()))?;
        let removed = self.sessions.remove(index);

        if self.active_session.as_deref() == Some(host) {
            self.active_session = None;
            self.notify(StateChange::ActiveSession);
        }
        self.notify(StateChange::Sessions);
        Ok(removed)
    }
}
