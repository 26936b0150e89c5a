//! # hx-store
//!
//! Registry of concurrently open workspaces. Each loaded workspace becomes a
//! [`Session`] owned by a [`SessionStore`] and addressed by a small integer
//! id. Freed ids are reclaimed lowest-first; otherwise the next id is one
//! past the current maximum. The store is an explicit value — there are no
//! global singletons — so every session's derived data stays independent.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::collections::{BTreeMap, HashMap};

use hx_agg::NormFactorRegistry;
use hx_core::{Error, FitResults, Result};
use hx_model::Workspace;

/// One open workspace with its derived, session-scoped state.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session id issued by the store.
    pub id: usize,
    /// Display name (file name or record id the workspace came from).
    pub name: String,
    /// The loaded workspace document.
    pub workspace: Workspace,
    /// Normalization factors, with user-editable pre-fit values.
    pub normfactors: NormFactorRegistry,
    /// Fit results once an external fit has completed.
    pub fit_results: Option<FitResults>,
    process_titles: HashMap<String, String>,
    channel_titles: HashMap<String, String>,
}

impl Session {
    fn new(id: usize, name: String, workspace: Workspace) -> Self {
        let normfactors = NormFactorRegistry::from_workspace(&workspace);
        Self {
            id,
            name,
            workspace,
            normfactors,
            fit_results: None,
            process_titles: HashMap::new(),
            channel_titles: HashMap::new(),
        }
    }

    /// Replace the workspace document, rebuilding derived state and dropping
    /// stale fit results.
    pub fn replace_workspace(&mut self, workspace: Workspace) {
        self.normfactors = NormFactorRegistry::from_workspace(&workspace);
        self.workspace = workspace;
        self.fit_results = None;
    }

    /// Attach fit results from an external fit service.
    pub fn set_fit_results(&mut self, fit: FitResults) -> Result<()> {
        fit.validate()?;
        self.fit_results = Some(fit);
        Ok(())
    }

    /// Override the display title of a process.
    pub fn set_process_title(&mut self, process: &str, title: &str) {
        self.process_titles.insert(process.to_string(), title.to_string());
    }

    /// Override the display title of a channel.
    pub fn set_channel_title(&mut self, channel: &str, title: &str) {
        self.channel_titles.insert(channel.to_string(), title.to_string());
    }

    /// Display title of a process, falling back to the raw name.
    pub fn process_title<'a>(&'a self, process: &'a str) -> &'a str {
        self.process_titles.get(process).map(String::as_str).unwrap_or(process)
    }

    /// Display title of a channel, falling back to the raw name.
    pub fn channel_title<'a>(&'a self, channel: &'a str) -> &'a str {
        self.channel_titles.get(channel).map(String::as_str).unwrap_or(channel)
    }
}

/// Owner of all open sessions, indexed by allocated id.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: BTreeMap<usize, Session>,
    free_ids: Vec<usize>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> usize {
        let lowest_free =
            self.free_ids.iter().enumerate().min_by_key(|(_, id)| **id).map(|(index, _)| index);
        if let Some(index) = lowest_free {
            return self.free_ids.swap_remove(index);
        }
        self.sessions.keys().next_back().map(|max| max + 1).unwrap_or(0)
    }

    /// Open a new session for a workspace, returning its id.
    pub fn open(&mut self, name: impl Into<String>, workspace: Workspace) -> usize {
        let id = self.allocate_id();
        self.sessions.insert(id, Session::new(id, name.into(), workspace));
        id
    }

    /// Close a session, releasing its id for reuse. Returns the session, or
    /// `None` (with a diagnostic) when the id is unknown.
    pub fn close(&mut self, id: usize) -> Option<Session> {
        match self.sessions.remove(&id) {
            Some(session) => {
                self.free_ids.push(id);
                Some(session)
            }
            None => {
                tracing::warn!(id, "could not find session id to close");
                None
            }
        }
    }

    /// Borrow a session.
    pub fn get(&self, id: usize) -> Result<&Session> {
        self.sessions
            .get(&id)
            .ok_or_else(|| Error::Validation(format!("no open session with id {id}")))
    }

    /// Mutably borrow a session.
    pub fn get_mut(&mut self, id: usize) -> Result<&mut Session> {
        self.sessions
            .get_mut(&id)
            .ok_or_else(|| Error::Validation(format!("no open session with id {id}")))
    }

    /// Iterate over open sessions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are open.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hx_model::parse_workspace;

    fn fixture() -> Workspace {
        parse_workspace(include_str!("../../../tests/fixtures/simple_workspace.json")).unwrap()
    }

    #[test]
    fn ids_start_at_zero_and_increment() {
        let mut store = SessionStore::new();
        assert_eq!(store.open("a", fixture()), 0);
        assert_eq!(store.open("b", fixture()), 1);
        assert_eq!(store.open("c", fixture()), 2);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn freed_ids_are_reused_lowest_first() {
        let mut store = SessionStore::new();
        let a = store.open("a", fixture());
        let b = store.open("b", fixture());
        let c = store.open("c", fixture());
        assert!(store.close(b).is_some());
        assert!(store.close(a).is_some());
        // lowest freed id first, then the next one, then max+1
        assert_eq!(store.open("d", fixture()), 0);
        assert_eq!(store.open("e", fixture()), 1);
        assert_eq!(store.open("f", fixture()), c + 1);
    }

    #[test]
    fn closing_unknown_id_is_reported() {
        let mut store = SessionStore::new();
        assert!(store.close(42).is_none());
        assert!(store.get(42).is_err());
    }

    #[test]
    fn session_titles_fall_back_to_raw_names() {
        let mut store = SessionStore::new();
        let id = store.open("ws", fixture());
        let session = store.get_mut(id).unwrap();
        session.set_process_title("A", "Signal A");
        assert_eq!(session.process_title("A"), "Signal A");
        assert_eq!(session.process_title("B"), "B");
        assert_eq!(session.channel_title("singlechannel"), "singlechannel");
    }

    #[test]
    fn replace_workspace_drops_fit_results() {
        let mut store = SessionStore::new();
        let id = store.open("ws", fixture());
        let session = store.get_mut(id).unwrap();
        session
            .set_fit_results(FitResults {
                bestfit: vec![1.0],
                uncertainty: vec![0.1],
                correlations: vec![vec![1.0]],
                labels: vec!["mu".to_string()],
            })
            .unwrap();
        assert!(session.fit_results.is_some());
        session.replace_workspace(fixture());
        assert!(session.fit_results.is_none());
    }

    #[test]
    fn invalid_fit_results_rejected() {
        let mut store = SessionStore::new();
        let id = store.open("ws", fixture());
        let session = store.get_mut(id).unwrap();
        let bad = FitResults {
            bestfit: vec![1.0, 2.0],
            uncertainty: vec![0.1],
            correlations: vec![],
            labels: vec!["mu".to_string()],
        };
        assert!(session.set_fit_results(bad).is_err());
    }
}
