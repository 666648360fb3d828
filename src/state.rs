//! Pipeline state and its reducer
//!
//! [`reduce`] is a pure function from `(state, event)` to a [`Transition`].
//! [`StateStore`] is the single writer around it: it owns the in-flight run,
//! tags runs with monotonically increasing [`RunId`]s, discards stale
//! completions, releases preview references a transition drops and publishes
//! every new snapshot to readers.

use crate::preview::{PreviewLease, PreviewStore};
use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Sequence number of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RunId(u64);

impl RunId {
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// The single state record driving presentation.
///
/// Invariants: both previews are present or both absent; `is_loading` is
/// false whenever a preview is present.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PipelineState {
    pub is_loading: bool,
    pub original_preview_url: Option<String>,
    pub result_preview_url: Option<String>,
    pub derived_name: Option<String>,
}

/// Coarse phase of a [`PipelineState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Populated,
}

impl PipelineState {
    /// The initial, all-absent state
    #[must_use]
    pub fn idle() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn loading() -> Self {
        Self {
            is_loading: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        if self.is_loading {
            Phase::Loading
        } else if self.result_preview_url.is_some() {
            Phase::Populated
        } else {
            Phase::Idle
        }
    }

    /// Preview URLs referenced by this state
    pub fn preview_urls(&self) -> impl Iterator<Item = &str> {
        self.original_preview_url
            .as_deref()
            .into_iter()
            .chain(self.result_preview_url.as_deref())
    }

    /// Whether the state satisfies the record invariants
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let both_or_neither =
            self.original_preview_url.is_some() == self.result_preview_url.is_some();
        let populated = self.result_preview_url.is_some();
        let name_matches = self.derived_name.is_some() == populated;
        both_or_neither && name_matches && !(self.is_loading && populated)
    }

    /// Download file name, `<derivedName>.png`, while populated
    #[must_use]
    pub fn download_file_name(&self) -> Option<String> {
        match self.phase() {
            Phase::Populated => self.derived_name.as_ref().map(|name| format!("{name}.png")),
            Phase::Idle | Phase::Loading => None,
        }
    }
}

/// Events the reducer understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    IntakeStarted,
    RemovalSucceeded {
        original_preview_url: String,
        result_preview_url: String,
        derived_name: String,
    },
    Failed,
    Reset,
}

/// Why an event left the state untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ignored {
    /// `IntakeStarted` while a run is loading
    AlreadyLoading,
    /// `RemovalSucceeded` outside of a loading state
    NotLoading,
    /// `Reset` from idle
    AlreadyIdle,
}

impl fmt::Display for Ignored {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyLoading => write!(f, "a run is already loading"),
            Self::NotLoading => write!(f, "no run is loading"),
            Self::AlreadyIdle => write!(f, "state is already idle"),
        }
    }
}

/// Result of reducing one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Applied(PipelineState),
    Ignored(Ignored),
}

/// Transition table:
///
/// | current   | event            | next                          |
/// |-----------|------------------|-------------------------------|
/// | idle      | IntakeStarted    | loading                       |
/// | populated | IntakeStarted    | loading (old previews dropped)|
/// | loading   | IntakeStarted    | ignored                       |
/// | loading   | RemovalSucceeded | populated                     |
/// | other     | RemovalSucceeded | ignored                       |
/// | any       | Failed           | idle                          |
/// | populated | Reset            | idle                          |
/// | loading   | Reset            | idle (run abandoned)          |
/// | idle      | Reset            | ignored                       |
#[must_use]
pub fn reduce(state: &PipelineState, event: &PipelineEvent) -> Transition {
    match (state.phase(), event) {
        (Phase::Loading, PipelineEvent::IntakeStarted) => Transition::Ignored(Ignored::AlreadyLoading),
        (Phase::Idle | Phase::Populated, PipelineEvent::IntakeStarted) => {
            Transition::Applied(PipelineState::loading())
        },
        (
            Phase::Loading,
            PipelineEvent::RemovalSucceeded {
                original_preview_url,
                result_preview_url,
                derived_name,
            },
        ) => Transition::Applied(PipelineState {
            is_loading: false,
            original_preview_url: Some(original_preview_url.clone()),
            result_preview_url: Some(result_preview_url.clone()),
            derived_name: Some(derived_name.clone()),
        }),
        (Phase::Idle | Phase::Populated, PipelineEvent::RemovalSucceeded { .. }) => {
            Transition::Ignored(Ignored::NotLoading)
        },
        (_, PipelineEvent::Failed) => Transition::Applied(PipelineState::idle()),
        (Phase::Idle, PipelineEvent::Reset) => Transition::Ignored(Ignored::AlreadyIdle),
        (Phase::Loading | Phase::Populated, PipelineEvent::Reset) => {
            Transition::Applied(PipelineState::idle())
        },
    }
}

/// How the store handled a run's terminal event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The event was reduced into the published state
    Applied,
    /// The run is no longer the active one; the event was discarded
    Stale,
}

#[derive(Debug, Default)]
struct Register {
    state: PipelineState,
    active_run: Option<RunId>,
    last_run: u64,
}

/// Single-writer register for [`PipelineState`]
#[derive(Debug)]
pub struct StateStore {
    register: Mutex<Register>,
    publisher: watch::Sender<PipelineState>,
    previews: PreviewStore,
}

impl StateStore {
    #[must_use]
    pub fn new(previews: PreviewStore) -> Self {
        let (publisher, _) = watch::channel(PipelineState::idle());
        Self {
            register: Mutex::new(Register::default()),
            publisher,
            previews,
        }
    }

    fn register(&self) -> MutexGuard<'_, Register> {
        self.register.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state
    #[must_use]
    pub fn snapshot(&self) -> PipelineState {
        self.register().state.clone()
    }

    /// Receive every published state
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.publisher.subscribe()
    }

    /// Run currently in flight, if any
    #[must_use]
    pub fn active_run(&self) -> Option<RunId> {
        self.register().active_run
    }

    #[must_use]
    pub fn previews(&self) -> &PreviewStore {
        &self.previews
    }

    /// Install `next`, revoke previews it no longer references and publish it
    fn commit(&self, register: &mut Register, next: PipelineState) {
        debug_assert!(next.is_consistent(), "inconsistent state {next:?}");
        let released: Vec<String> = register
            .state
            .preview_urls()
            .filter(|url| !next.preview_urls().any(|kept| kept == *url))
            .map(str::to_string)
            .collect();

        register.state = next;
        for url in &released {
            self.previews.revoke(url);
        }
        self.publisher.send_replace(register.state.clone());
    }

    /// Check-and-set the in-flight flag and move to loading
    ///
    /// # Errors
    /// Returns why intake was refused when a run is already loading.
    pub fn begin_run(&self) -> std::result::Result<RunId, Ignored> {
        let mut register = self.register();
        match reduce(&register.state, &PipelineEvent::IntakeStarted) {
            Transition::Applied(next) => {
                register.last_run += 1;
                let run = RunId(register.last_run);
                register.active_run = Some(run);
                self.commit(&mut register, next);
                tracing::debug!(%run, "Run started");
                Ok(run)
            },
            Transition::Ignored(reason) => Err(reason),
        }
    }

    /// Publish a successful run, taking ownership of its preview leases.
    ///
    /// Stale runs leave the state untouched and their leases are revoked.
    pub fn complete_success(
        &self,
        run: RunId,
        derived_name: String,
        original: PreviewLease,
        result: PreviewLease,
    ) -> Completion {
        let mut register = self.register();
        if register.active_run != Some(run) {
            tracing::debug!(%run, "Discarding stale successful run");
            return Completion::Stale;
        }

        let event = PipelineEvent::RemovalSucceeded {
            original_preview_url: original.url().to_string(),
            result_preview_url: result.url().to_string(),
            derived_name,
        };
        match reduce(&register.state, &event) {
            Transition::Applied(next) => {
                // Ownership of both references moves to the published state
                let original_url = original.commit();
                let result_url = result.commit();
                debug_assert_eq!(
                    next.original_preview_url.as_deref(),
                    Some(original_url.as_str())
                );
                debug_assert_eq!(
                    next.result_preview_url.as_deref(),
                    Some(result_url.as_str())
                );
                register.active_run = None;
                self.commit(&mut register, next);
                Completion::Applied
            },
            Transition::Ignored(reason) => {
                tracing::debug!(%run, %reason, "Success event ignored");
                register.active_run = None;
                Completion::Stale
            },
        }
    }

    /// Return a failed run to idle
    pub fn complete_failure(&self, run: RunId) -> Completion {
        let mut register = self.register();
        if register.active_run != Some(run) {
            tracing::debug!(%run, "Discarding stale failed run");
            return Completion::Stale;
        }

        register.active_run = None;
        if let Transition::Applied(next) = reduce(&register.state, &PipelineEvent::Failed) {
            self.commit(&mut register, next);
        }
        Completion::Applied
    }

    /// Return to idle, abandoning any run in flight
    pub fn reset(&self) -> Transition {
        let mut register = self.register();
        let transition = reduce(&register.state, &PipelineEvent::Reset);
        if let Transition::Applied(next) = &transition {
            if let Some(run) = register.active_run.take() {
                tracing::debug!(%run, "Run abandoned by reset");
            }
            self.commit(&mut register, next.clone());
        }
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaType;
    use std::sync::Arc;

    fn populated() -> PipelineState {
        PipelineState {
            is_loading: false,
            original_preview_url: Some("blob:bgtify/a".to_string()),
            result_preview_url: Some("blob:bgtify/b".to_string()),
            derived_name: Some("photo".to_string()),
        }
    }

    fn succeeded() -> PipelineEvent {
        PipelineEvent::RemovalSucceeded {
            original_preview_url: "blob:bgtify/a".to_string(),
            result_preview_url: "blob:bgtify/b".to_string(),
            derived_name: "photo".to_string(),
        }
    }

    fn lease(store: &PreviewStore) -> PreviewLease {
        store
            .create(MediaType::Png, Arc::from(vec![1u8, 2, 3]))
            .unwrap()
    }

    #[test]
    fn test_transition_table() {
        let idle = PipelineState::idle();
        let loading = PipelineState::loading();

        assert_eq!(
            reduce(&idle, &PipelineEvent::IntakeStarted),
            Transition::Applied(loading.clone())
        );
        assert_eq!(
            reduce(&loading, &succeeded()),
            Transition::Applied(populated())
        );
        assert_eq!(
            reduce(&loading, &PipelineEvent::Failed),
            Transition::Applied(idle.clone())
        );
        assert_eq!(
            reduce(&populated(), &PipelineEvent::Reset),
            Transition::Applied(idle.clone())
        );
        assert_eq!(
            reduce(&populated(), &PipelineEvent::Failed),
            Transition::Applied(idle.clone())
        );
        assert_eq!(
            reduce(&populated(), &PipelineEvent::IntakeStarted),
            Transition::Applied(loading.clone())
        );
    }

    #[test]
    fn test_rejected_transitions_are_deterministic() {
        assert_eq!(
            reduce(&PipelineState::loading(), &PipelineEvent::IntakeStarted),
            Transition::Ignored(Ignored::AlreadyLoading)
        );
        assert_eq!(
            reduce(&PipelineState::idle(), &succeeded()),
            Transition::Ignored(Ignored::NotLoading)
        );
        assert_eq!(
            reduce(&PipelineState::idle(), &PipelineEvent::Reset),
            Transition::Ignored(Ignored::AlreadyIdle)
        );
    }

    #[test]
    fn test_phase_and_invariants() {
        assert_eq!(PipelineState::idle().phase(), Phase::Idle);
        assert_eq!(PipelineState::loading().phase(), Phase::Loading);
        assert_eq!(populated().phase(), Phase::Populated);
        assert!(PipelineState::idle().is_consistent());
        assert!(PipelineState::loading().is_consistent());
        assert!(populated().is_consistent());

        let half = PipelineState {
            result_preview_url: None,
            ..populated()
        };
        assert!(!half.is_consistent());
    }

    #[test]
    fn test_download_file_name() {
        assert_eq!(populated().download_file_name().as_deref(), Some("photo.png"));
        assert!(PipelineState::loading().download_file_name().is_none());
    }

    #[test]
    fn test_store_rejects_overlapping_runs() {
        let store = StateStore::new(PreviewStore::new());
        let run = store.begin_run().unwrap();
        assert_eq!(store.begin_run(), Err(Ignored::AlreadyLoading));
        assert_eq!(store.active_run(), Some(run));
        assert!(store.snapshot().is_loading);
    }

    #[test]
    fn test_store_success_publishes_and_owns_previews() {
        let previews = PreviewStore::new();
        let store = StateStore::new(previews.clone());
        let mut receiver = store.subscribe();

        let run = store.begin_run().unwrap();
        let (original, result) = (lease(&previews), lease(&previews));
        let urls = (original.url().to_string(), result.url().to_string());
        let outcome = store.complete_success(run, "photo".into(), original, result);
        assert_eq!(outcome, Completion::Applied);

        // The leases were handed over, not dropped
        let state = store.snapshot();
        assert_eq!(state.phase(), Phase::Populated);
        assert_eq!(state.original_preview_url.as_deref(), Some(urls.0.as_str()));
        assert_eq!(state.result_preview_url.as_deref(), Some(urls.1.as_str()));
        assert!(previews.is_live(&urls.0) && previews.is_live(&urls.1));
        assert_eq!(previews.live_count(), 2);
        assert!(receiver.has_changed().unwrap());
        assert_eq!(*receiver.borrow_and_update(), state);
        assert!(store.active_run().is_none());

        // Reset revokes both previews
        store.reset();
        assert_eq!(store.snapshot(), PipelineState::idle());
        assert_eq!(previews.live_count(), 0);
    }

    #[test]
    fn test_store_discards_stale_completion() {
        let previews = PreviewStore::new();
        let store = StateStore::new(previews.clone());

        let abandoned = store.begin_run().unwrap();
        store.reset();
        let current = store.begin_run().unwrap();
        assert_ne!(abandoned, current);

        let outcome =
            store.complete_success(abandoned, "old".into(), lease(&previews), lease(&previews));
        assert_eq!(outcome, Completion::Stale);
        assert_eq!(previews.live_count(), 0);
        assert!(store.snapshot().is_loading);

        assert_eq!(store.complete_failure(abandoned), Completion::Stale);
        assert!(store.snapshot().is_loading);

        assert_eq!(store.complete_failure(current), Completion::Applied);
        assert_eq!(store.snapshot(), PipelineState::idle());
    }

    #[test]
    fn test_replacing_run_revokes_previous_previews() {
        let previews = PreviewStore::new();
        let store = StateStore::new(previews.clone());

        let first = store.begin_run().unwrap();
        store.complete_success(first, "one".into(), lease(&previews), lease(&previews));
        let first_urls: Vec<String> = store.snapshot().preview_urls().map(String::from).collect();

        let second = store.begin_run().unwrap();
        for url in &first_urls {
            assert!(!previews.is_live(url));
        }
        store.complete_success(second, "two".into(), lease(&previews), lease(&previews));
        assert_eq!(previews.live_count(), 2);
        assert_eq!(store.snapshot().derived_name.as_deref(), Some("two"));
    }

    #[test]
    fn test_reset_from_idle_is_noop() {
        let store = StateStore::new(PreviewStore::new());
        let receiver = store.subscribe();
        assert_eq!(store.reset(), Transition::Ignored(Ignored::AlreadyIdle));
        assert_eq!(store.snapshot(), PipelineState::idle());
        assert!(!receiver.has_changed().unwrap());
    }
}
