// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Filters file selections against the extension blocklist and keeps the
//! blocklist in sync with the server.
//!
//! The filter is a convenience for the user; the server re-checks every
//! upload against its own copy of the blocklist.

pub mod error;
pub mod extension;
pub mod state;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::client::BlocklistApi;
use error::{GatekeeperError, LocalValidationError, RemoteError};
use extension::{Blocklist, FileCandidate, normalize_extension};
use state::{BlocklistState, StateChange};

/// Something the user should be told about, one per event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Rejected { file_name: String },
    Invalid(LocalValidationError),
    CreateFailed(RemoteError),
    RequestFailed { ext: String, reason: String },
    RemovalFailed { ext: String, reason: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Rejected { file_name } => {
                write!(f, "[{file_name}] has a blocked extension.")
            }
            Notice::Invalid(err) => write!(f, "{err}"),
            Notice::CreateFailed(RemoteError::Unknown(_)) => f.write_str("Registration failed."),
            Notice::CreateFailed(err) => write!(f, "{err}"),
            Notice::RequestFailed { ext, reason } => {
                write!(f, "Registering '{ext}' failed: {reason}")
            }
            Notice::RemovalFailed { ext, reason } => {
                write!(f, "Removing '{ext}' failed: {reason}")
            }
        }
    }
}

/// Where user-facing messages go.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Sends every notice to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        warn!("{notice}");
    }
}

/// What the upload widget should do with a selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionDecision {
    Proceed(Vec<FileCandidate>),
    Cancel,
}

impl SelectionDecision {
    pub fn is_cancel(&self) -> bool {
        matches!(self, SelectionDecision::Cancel)
    }

    pub fn accepted(&self) -> &[FileCandidate] {
        match self {
            SelectionDecision::Proceed(files) => files,
            SelectionDecision::Cancel => &[],
        }
    }
}

/// Splits `candidates` into accepted and rejected, keeping their relative order.
pub fn partition_selection(
    candidates: Vec<FileCandidate>,
    blocklist: &Blocklist,
) -> (Vec<FileCandidate>, Vec<FileCandidate>) {
    candidates
        .into_iter()
        .partition(|file| !blocklist.contains(&file.extension()))
}

pub struct Gatekeeper<A, N> {
    api: A,
    notifier: N,
    state: Mutex<BlocklistState>,
}

impl<A: BlocklistApi, N: Notifier> Gatekeeper<A, N> {
    pub fn new(api: A, notifier: N, state: BlocklistState) -> Self {
        Self {
            api,
            notifier,
            state: Mutex::new(state),
        }
    }

    /// Builds a gatekeeper whose state is loaded from the server.
    pub async fn connect(api: A, notifier: N) -> Result<Self, GatekeeperError> {
        let snapshot = api.fetch_blocklist().await?;
        let state = BlocklistState::new(snapshot.fixed, snapshot.custom);
        Ok(Self::new(api, notifier, state))
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    fn state(&self) -> MutexGuard<'_, BlocklistState> {
        // a panic mid-update leaves the state usable, keep going with it
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `f` against the state under the lock.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut BlocklistState) -> R) -> R {
        f(&mut self.state())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state().subscribe()
    }

    /// Re-reads the server copy and replaces local state with it.
    pub async fn refresh(&self) -> Result<(), GatekeeperError> {
        let snapshot = self.api.fetch_blocklist().await?;
        self.state().replace(snapshot.fixed, snapshot.custom);
        Ok(())
    }

    pub fn replace_state(&self, fixed: BTreeMap<String, bool>, custom: Vec<String>) {
        self.state().replace(fixed, custom);
    }

    pub fn compute_blocklist(&self) -> Blocklist {
        self.state().blocklist()
    }

    pub fn filter_selection(
        &self,
        candidates: Vec<FileCandidate>,
        blocklist: &Blocklist,
    ) -> SelectionDecision {
        if blocklist.is_empty() {
            return SelectionDecision::Proceed(candidates);
        }

        let had_candidates = !candidates.is_empty();
        let (accepted, rejected) = partition_selection(candidates, blocklist);
        for file in rejected {
            debug!(file = %file.name, "Rejected blocked file");
            self.notifier.notify(Notice::Rejected {
                file_name: file.name,
            });
        }

        if accepted.is_empty() && had_candidates {
            SelectionDecision::Cancel
        } else {
            SelectionDecision::Proceed(accepted)
        }
    }

    /// Selection hook for the upload widget: replaces `files` with the accepted
    /// ones and returns whether the queue may advance.
    pub fn handle_selection(&self, files: &mut Vec<FileCandidate>) -> bool {
        let blocklist = self.compute_blocklist();
        match self.filter_selection(std::mem::take(files), &blocklist) {
            SelectionDecision::Proceed(accepted) => {
                *files = accepted;
                true
            }
            SelectionDecision::Cancel => false,
        }
    }

    pub async fn add_custom_extension(&self, raw: &str) -> Result<String, GatekeeperError> {
        let ext = match self.validate_new(raw) {
            Ok(ext) => ext,
            Err(err) => {
                self.notifier.notify(Notice::Invalid(err));
                return Err(err.into());
            }
        };

        self.state().begin_create(&ext);
        let outcome = self.api.create_custom(&ext).await;

        match outcome {
            Ok(result) if result.success => {
                let mut state = self.state();
                state.finish_create(&ext, true);
                state.clear_input();
                info!(ext = %ext, "Custom extension added");
                Ok(ext)
            }
            Ok(result) => {
                self.state().finish_create(&ext, false);
                let err = RemoteError::from_code(result.error.as_deref());
                warn!(ext = %ext, error = ?result.error, "Server refused custom extension");
                self.notifier.notify(Notice::CreateFailed(err.clone()));
                Err(err.into())
            }
            Err(err) => {
                self.state().finish_create(&ext, false);
                warn!(ext = %ext, error = %err, "Custom extension request failed");
                self.notifier.notify(Notice::RequestFailed {
                    ext: ext.clone(),
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Adds whatever is currently typed in the input field.
    pub async fn submit_input(&self) -> Result<String, GatekeeperError> {
        let raw = self.state().input().to_string();
        self.add_custom_extension(&raw).await
    }

    fn validate_new(&self, raw: &str) -> Result<String, LocalValidationError> {
        let ext = normalize_extension(raw)?;
        if self.state().is_rendered(&ext) {
            return Err(LocalValidationError::DuplicateLocal);
        }
        Ok(ext)
    }

    pub async fn remove_custom_extension(&self, value: &str) -> Result<(), GatekeeperError> {
        self.state().begin_delete(value);
        let outcome = self.api.delete_custom(value).await;

        match outcome {
            Ok(()) => {
                self.state().finish_delete(value, true);
                info!(ext = value, "Custom extension removed");
                Ok(())
            }
            Err(err) => {
                self.state().finish_delete(value, false);
                warn!(ext = value, error = %err, "Custom extension removal failed");
                self.notifier.notify(Notice::RemovalFailed {
                    ext: value.to_string(),
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Flips a fixed extension locally, then tells the server. The local flag
    /// stays flipped whatever the server answers; callers may ignore the result.
    pub async fn toggle_fixed_extension(
        &self,
        value: &str,
        checked: bool,
    ) -> Result<(), GatekeeperError> {
        let ext = value.to_lowercase();
        if !self.state().set_fixed(&ext, checked) {
            debug!(ext = %ext, "Toggled extension is not in the local fixed set");
        }

        let result = self.api.set_fixed(&ext, checked).await?;
        if result.success {
            Ok(())
        } else {
            warn!(ext = %ext, error = ?result.error, "Server refused fixed extension toggle");
            Err(RemoteError::from_code(result.error.as_deref()).into())
        }
    }
}
