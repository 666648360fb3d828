//! Pipeline orchestration and error boundary
//!
//! A [`Pipeline`] wires intake, normalization, removal and preview
//! construction around one [`StateStore`]. Each accepted drop becomes a run:
//!
//! 1. intake picks exactly one file (rejections are silent)
//! 2. the state moves to loading before any work starts
//! 3. the file is normalized, background-removed and turned into previews
//! 4. success populates the state; any failure is reported once as an error
//!    notification and the state returns to idle
//!
//! Failures never escape [`Pipeline::run`]; callers get a [`RunReport`].

use crate::config::PipelineConfig;
use crate::error::{BgtifyError, FailureStage, Result};
use crate::intake::{FileIntake, IntakeDecision, IntakeRejection};
use crate::normalize::{FormatNormalizer, Transcoder};
use crate::notify::{NoOpNotifier, Notification, Notifier};
use crate::preview::{PreviewLease, PreviewStore};
use crate::removal::{BackgroundRemover, RemovalAdapter};
use crate::state::{Completion, PipelineState, RunId, StateStore, Transition};
use crate::tracing_config::spans;
use crate::types::{MediaType, SourceFile};
use instant::Instant;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::Instrument;

/// An admitted run waiting to be executed with [`Pipeline::run`].
///
/// The state is already loading when a ticket exists; dropping it without
/// running leaves the pipeline loading until [`Pipeline::reset`].
#[derive(Debug)]
#[must_use = "an admitted run keeps the pipeline loading until it is run"]
pub struct RunTicket {
    run: RunId,
    file: SourceFile,
}

impl RunTicket {
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run
    }

    #[must_use]
    pub fn file(&self) -> &SourceFile {
        &self.file
    }
}

/// Result of offering a selection to the pipeline
#[derive(Debug)]
pub enum Admission {
    /// Accepted; the state is loading
    Started(RunTicket),
    /// Refused at the intake boundary
    Ignored(IntakeRejection),
    /// Another run is in flight
    Busy,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The state is populated with this run's previews
    Succeeded { derived_name: String },
    /// The run failed and the user was notified with `message`
    Failed { stage: FailureStage, message: String },
    /// The run was abandoned by a reset; its outcome was discarded
    Superseded,
}

/// Summary of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run: RunId,
    pub source_name: String,
    pub outcome: RunOutcome,
    pub elapsed_ms: u64,
}

impl RunReport {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, RunOutcome::Succeeded { .. })
    }
}

/// Result of [`Pipeline::handle_drop`]
#[derive(Debug)]
pub enum IntakeOutcome {
    Ignored(IntakeRejection),
    Busy,
    Completed(RunReport),
}

/// The background-removed image, ready to be saved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    /// `<derivedName>.png`
    pub file_name: String,
    pub media_type: MediaType,
    pub bytes: Arc<[u8]>,
}

impl Download {
    /// Write the payload as `dir/<file_name>` and return the path
    pub async fn save_in<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let path = dir.as_ref().join(&self.file_name);
        tokio::fs::write(&path, &self.bytes)
            .await
            .map_err(|e| BgtifyError::file_io_error("write result", &path, &e))?;
        Ok(path)
    }
}

/// Message the error boundary shows for a failure
#[must_use]
pub fn failure_message(error: &BgtifyError, fallback: &str) -> String {
    error
        .description()
        .filter(|description| !description.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

/// Builder for [`Pipeline`]
pub struct PipelineBuilder {
    remover: Arc<dyn BackgroundRemover>,
    config: PipelineConfig,
    notifier: Arc<dyn Notifier>,
    transcoder: Option<Arc<dyn Transcoder>>,
    previews: PreviewStore,
}

impl PipelineBuilder {
    #[must_use]
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replace the bundled `image` transcoder
    #[must_use]
    pub fn transcoder(mut self, transcoder: Arc<dyn Transcoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    #[must_use]
    pub fn previews(mut self, previews: PreviewStore) -> Self {
        self.previews = previews;
        self
    }

    /// Validate the configuration and assemble the pipeline
    pub fn build(self) -> Result<Pipeline> {
        self.config.validate()?;

        let normalizer = match self.transcoder {
            Some(transcoder) => {
                FormatNormalizer::with_transcoder(self.config.normalizer.clone(), transcoder)
            },
            None => FormatNormalizer::new(self.config.normalizer.clone()),
        };
        let removal = RemovalAdapter::new(
            self.remover,
            Arc::clone(&self.notifier),
            &self.config.removal,
            self.config.notifier.clone(),
        );

        tracing::debug!(
            remover = %removal.remover_name(),
            accepted = ?self.config.intake.accepted,
            "Pipeline assembled"
        );

        Ok(Pipeline {
            intake: FileIntake::new(&self.config.intake),
            normalizer,
            removal,
            store: StateStore::new(self.previews),
            notifier: self.notifier,
            config: self.config,
        })
    }
}

/// Intake to preview pipeline around a single state store
pub struct Pipeline {
    config: PipelineConfig,
    intake: FileIntake,
    normalizer: FormatNormalizer,
    removal: RemovalAdapter,
    store: StateStore,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("remover", &self.removal.remover_name())
            .field("state", &self.store.snapshot())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Start building a pipeline around a removal capability
    #[must_use]
    pub fn builder(remover: Arc<dyn BackgroundRemover>) -> PipelineBuilder {
        PipelineBuilder {
            remover,
            config: PipelineConfig::default(),
            notifier: Arc::new(NoOpNotifier),
            transcoder: None,
            previews: PreviewStore::new(),
        }
    }

    /// Pipeline with the bundled transcoder and a fresh preview store
    pub fn new(
        config: PipelineConfig,
        remover: Arc<dyn BackgroundRemover>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        Self::builder(remover).config(config).notifier(notifier).build()
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.store.snapshot()
    }

    /// Observe every state transition
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.store.subscribe()
    }

    #[must_use]
    pub fn previews(&self) -> &PreviewStore {
        self.store.previews()
    }

    /// Whether a run is in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.store.active_run().is_some()
    }

    /// Offer a selection event to the pipeline.
    ///
    /// On acceptance the state is loading by the time this returns.
    pub fn admit(&self, candidates: Vec<SourceFile>) -> Admission {
        let file = match self.intake.evaluate(candidates) {
            IntakeDecision::Accepted(file) => file,
            IntakeDecision::Rejected(rejection) => {
                tracing::debug!(reason = %rejection, "Selection ignored");
                return Admission::Ignored(rejection);
            },
        };

        match self.store.begin_run() {
            Ok(run) => Admission::Started(RunTicket { run, file }),
            Err(reason) => {
                tracing::debug!(file = %file.name(), %reason, "Selection refused while busy");
                Admission::Busy
            },
        }
    }

    /// Execute an admitted run to completion. Never fails.
    pub async fn run(&self, ticket: RunTicket) -> RunReport {
        let RunTicket { run, file } = ticket;
        let span = spans::pipeline_run(run.get(), file.name());

        async move {
            let start = Instant::now();
            let source_name = file.name().to_string();
            let derived_name = file.derived_name();

            let outcome = match self.execute(file).await {
                Ok((original, result)) => {
                    match self
                        .store
                        .complete_success(run, derived_name.clone(), original, result)
                    {
                        Completion::Applied => {
                            tracing::info!(derived_name = %derived_name, "Background removed");
                            RunOutcome::Succeeded { derived_name }
                        },
                        Completion::Stale => RunOutcome::Superseded,
                    }
                },
                Err(error) => self.fail(run, &error),
            };

            RunReport {
                run,
                source_name,
                outcome,
                elapsed_ms: start.elapsed().as_millis() as u64,
            }
        }
        .instrument(span)
        .await
    }

    /// Admit and run a selection event
    pub async fn handle_drop(&self, candidates: Vec<SourceFile>) -> IntakeOutcome {
        match self.admit(candidates) {
            Admission::Started(ticket) => IntakeOutcome::Completed(self.run(ticket).await),
            Admission::Ignored(rejection) => IntakeOutcome::Ignored(rejection),
            Admission::Busy => IntakeOutcome::Busy,
        }
    }

    /// Return to idle. Abandons an in-flight run; a no-op from idle.
    ///
    /// Returns `true` if the state changed.
    pub fn reset(&self) -> bool {
        matches!(self.store.reset(), Transition::Applied(_))
    }

    /// The result image of the populated state
    #[must_use]
    pub fn download(&self) -> Option<Download> {
        let state = self.store.snapshot();
        let file_name = state.download_file_name()?;
        let url = state.result_preview_url.as_deref()?;
        let resource = self.store.previews().resolve(url)?;
        Some(Download {
            file_name,
            media_type: resource.media_type,
            bytes: resource.bytes,
        })
    }

    async fn execute(&self, file: SourceFile) -> Result<(PreviewLease, PreviewLease)> {
        let normalized = self.normalizer.normalize(file).await?;
        let removed = self.removal.remove(&normalized).await?;

        let previews = self.store.previews();
        let original = previews.create(normalized.media_type().clone(), normalized.payload())?;
        let result = previews.create(removed.media_type().clone(), removed.payload())?;
        Ok((original, result))
    }

    /// Error boundary: one notification, then back to idle
    fn fail(&self, run: RunId, error: &BgtifyError) -> RunOutcome {
        let stage = error.stage();
        if self.store.complete_failure(run) == Completion::Stale {
            tracing::debug!(error = %error, "Abandoned run failed");
            return RunOutcome::Superseded;
        }

        let message = failure_message(error, &self.config.notifier.fallback_message);
        tracing::warn!(stage = ?stage, error = %error, "Pipeline run failed");
        self.notifier.notify(Notification::error(message.clone()));
        RunOutcome::Failed { stage, message }
    }
}
