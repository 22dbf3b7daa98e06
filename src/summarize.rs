//! Map-reduce summarization orchestrator.
//!
//! A request moves through these phases:
//!
//! | Phase | Work |
//! |-------|------|
//! | `collecting` | Segment the request text; rank passages for a document scope |
//! | `chunking` | Pack candidates into chunks under the summarizer's token budget |
//! | `dispatching` | One chunk → terminal call. Several → concurrent extraction calls |
//! | `reducing` | Join non-sentinel extraction outputs in chunk order, re-segment, chunk again |
//!
//! The loop ends when a round yields a single chunk, whose terminal call
//! produces the answer. It is bounded by `max_rounds`; running out of
//! rounds is [`SummaryError::ReductionDivergence`].
//!
//! # Failure policy
//!
//! - Any extraction failure (including a timeout) aborts the request.
//!   Calls already in flight finish; queued chunks are never dispatched.
//! - The terminal call is retried up to `retries` times when it fails with a
//!   retryable [`InferenceError`] or its response lacks an accepted ending.
//!   Running out of retries on a bad ending returns `failure_text`; running
//!   out on an inference error returns the error.
//! - Empty input returns `empty_text` without calling a model.
//!
//! Usage from every call made, including retries and sentinel outputs, is
//! summed into the final [`SummaryResult`]. Every lease taken for a request
//! is released before [`SummaryEngine::summarize`] returns.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use summary_harness_core::assemble::{assemble, passage_candidates, Candidate, ChunkBudget};
use summary_harness_core::embedding::Encoder;
use summary_harness_core::models::{
    content_key, Chunk, DocumentScope, RankedPassage, Role, SummaryResult, Usage,
};
use summary_harness_core::rank::{rank, topics, PassageScorer, RankOptions};
use summary_harness_core::segment::{segment, segment_all};
use summary_harness_core::sentences::SentenceParser;
use summary_harness_core::store::{CacheEntry, DocumentSource, SummaryCache, VectorIndex};
use summary_harness_core::tokens::TokenCounter;
use tracing::{debug, info, warn};

use crate::allocator::{ProviderAllocator, ProviderHandle};
use crate::config::{SummarizerConfig, SummaryConfig};
use crate::error::{InferenceError, SummaryError};
use crate::llm::{Completion, GenerationOptions, LanguageModel};
use crate::prompt::{Prompt, PromptFormat, PromptParts};

/// Request lifecycle phase, used as a structured log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Collecting,
    Chunking,
    Dispatching,
    Reducing,
    Done,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Collecting => "collecting",
            Phase::Chunking => "chunking",
            Phase::Dispatching => "dispatching",
            Phase::Reducing => "reducing",
            Phase::Done => "done",
            Phase::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limits and sampling settings of one summarizer.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelProfile {
    pub context_window: usize,
    /// Token budget of one chunk, prompt overhead included.
    pub chunk_length: usize,
    pub max_new_tokens: u32,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
}

impl From<&SummarizerConfig> for ModelProfile {
    fn from(config: &SummarizerConfig) -> Self {
        Self {
            context_window: config.context_window,
            chunk_length: config.chunk_length.min(config.context_window),
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }
}

/// Everything needed to call one summarizer provider.
pub struct SummarizerBackend {
    pub profile: ModelProfile,
    pub model: Arc<dyn LanguageModel>,
    pub format: Arc<dyn PromptFormat>,
    pub counter: Arc<dyn TokenCounter>,
}

impl SummarizerBackend {
    fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            max_tokens: Some(self.profile.max_new_tokens),
            temperature: self.profile.temperature,
            top_p: self.profile.top_p,
        }
    }
}

/// Provider implementations by role, keyed by provider name.
#[derive(Default)]
pub struct Backends {
    pub summarizers: BTreeMap<String, SummarizerBackend>,
    pub encoders: BTreeMap<String, Arc<dyn Encoder>>,
    pub sentence_parsers: BTreeMap<String, Arc<dyn SentenceParser>>,
}

/// Collaborators for document-scoped requests.
pub struct Retrieval {
    pub index: Arc<dyn VectorIndex>,
    pub documents: Arc<dyn DocumentSource>,
    pub scorer: Arc<dyn PassageScorer>,
}

/// Engine-wide settings and request defaults.
#[derive(Debug, Clone)]
pub struct SummarySettings {
    pub max_chunks: usize,
    pub retries: usize,
    pub endings: Vec<String>,
    pub sentence_limit: usize,
    pub min_score: f32,
    pub workers: usize,
    pub max_rounds: usize,
    pub max_section_length: usize,
    pub call_timeout: Duration,
    pub window_tokens: usize,
    pub sentinel: String,
    pub failure_text: String,
    pub empty_text: String,
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self::from(&SummaryConfig::default())
    }
}

impl From<&SummaryConfig> for SummarySettings {
    fn from(config: &SummaryConfig) -> Self {
        Self {
            max_chunks: config.max_chunks,
            retries: config.retries,
            endings: config.endings.clone(),
            sentence_limit: config.sentence_limit,
            min_score: config.min_score,
            workers: config.workers.max(1),
            max_rounds: config.max_rounds.max(1),
            max_section_length: config.max_section_length,
            call_timeout: Duration::from_secs(config.timeout_secs),
            window_tokens: config.window_tokens,
            sentinel: config.sentinel.clone(),
            failure_text: config.failure_text.clone(),
            empty_text: config.empty_text.clone(),
        }
    }
}

/// One summarization request. Unset options fall back to [`SummarySettings`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct SummaryRequest {
    /// Texts summarized as if concatenated paragraph by paragraph.
    #[serde(skip)]
    pub texts: Vec<String>,
    pub scope: Option<DocumentScope>,
    pub prompt: String,
    pub search_prompt: Option<String>,
    pub persona: Option<String>,
    pub output_format: Option<String>,
    pub provider: Option<String>,
    pub max_chunks: Option<usize>,
    pub retries: Option<usize>,
    pub endings: Option<Vec<String>>,
    pub sentence_limit: Option<usize>,
    pub min_score: Option<f32>,
}

impl SummaryRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.texts.push(text.into());
        self
    }

    pub fn documents(mut self, scope: DocumentScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn search_prompt(mut self, search_prompt: impl Into<String>) -> Self {
        self.search_prompt = Some(search_prompt.into());
        self
    }

    pub fn persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    pub fn output_format(mut self, output_format: impl Into<String>) -> Self {
        self.output_format = Some(output_format.into());
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn max_chunks(mut self, max_chunks: usize) -> Self {
        self.max_chunks = Some(max_chunks);
        self
    }

    pub fn retries(mut self, retries: usize) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn endings(mut self, endings: Vec<String>) -> Self {
        self.endings = Some(endings);
        self
    }

    pub fn sentence_limit(mut self, sentence_limit: usize) -> Self {
        self.sentence_limit = Some(sentence_limit);
        self
    }

    pub fn min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    fn has_text(&self) -> bool {
        self.texts.iter().any(|t| !t.trim().is_empty())
    }
}

/// Request options after applying defaults.
#[derive(Debug, Clone, Serialize)]
struct Resolved<'a> {
    prompt: &'a str,
    search_prompt: &'a str,
    persona: &'a str,
    output_format: &'a str,
    scope: Option<&'a DocumentScope>,
    provider: Option<&'a str>,
    max_chunks: usize,
    retries: usize,
    endings: &'a [String],
    sentence_limit: usize,
    min_score: f32,
}

impl<'a> Resolved<'a> {
    fn new(request: &'a SummaryRequest, settings: &'a SummarySettings) -> Self {
        Self {
            prompt: request.prompt.trim(),
            search_prompt: request
                .search_prompt
                .as_deref()
                .unwrap_or(&request.prompt)
                .trim(),
            persona: request.persona.as_deref().unwrap_or(""),
            output_format: request.output_format.as_deref().unwrap_or(""),
            scope: request.scope.as_ref(),
            provider: request.provider.as_deref(),
            max_chunks: request.max_chunks.unwrap_or(settings.max_chunks),
            retries: request.retries.unwrap_or(settings.retries),
            endings: request.endings.as_deref().unwrap_or(&settings.endings),
            sentence_limit: request.sentence_limit.unwrap_or(settings.sentence_limit),
            min_score: request.min_score.unwrap_or(settings.min_score),
        }
    }
}

/// Outcome of a request with its statistics.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub result: SummaryResult,
    /// Ranked documents whose passages were offered to the assembler.
    pub passages: usize,
    pub rounds: usize,
    pub llm_calls: usize,
    pub cached: bool,
    pub processing_ms: u64,
}

#[derive(Default)]
struct Progress {
    usage: Usage,
    passages: usize,
    rounds: usize,
    llm_calls: usize,
}

pub struct SummaryEngine {
    allocator: Arc<ProviderAllocator>,
    backends: Backends,
    settings: SummarySettings,
    retrieval: Option<Retrieval>,
    cache: Option<Arc<dyn SummaryCache>>,
}

impl SummaryEngine {
    pub fn new(
        allocator: Arc<ProviderAllocator>,
        backends: Backends,
        settings: SummarySettings,
    ) -> Self {
        Self {
            allocator,
            backends,
            settings,
            retrieval: None,
            cache: None,
        }
    }

    pub fn with_retrieval(mut self, retrieval: Retrieval) -> Self {
        self.retrieval = Some(retrieval);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn SummaryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn allocator(&self) -> &Arc<ProviderAllocator> {
        &self.allocator
    }

    pub fn settings(&self) -> &SummarySettings {
        &self.settings
    }

    /// Summarize `request`, leasing providers for its duration.
    pub async fn summarize(&self, request: &SummaryRequest) -> Result<Summary, SummaryError> {
        let started = Instant::now();
        let resolved = Resolved::new(request, &self.settings);

        if !request.has_text() && request.scope.is_none() {
            info!(phase = %Phase::Done, "empty request");
            return Ok(self.finish(
                SummaryResult::new(self.settings.empty_text.clone(), Usage::default()),
                Progress::default(),
                false,
                started,
            ));
        }

        let cache_key = self.cache_key(request, &resolved)?;
        if let Some(cached) = self.cached(cache_key.as_deref()).await {
            info!(phase = %Phase::Done, "summary served from cache");
            return Ok(self.finish(cached, Progress::default(), true, started));
        }

        if let Some(name) = resolved.provider {
            if !self.backends.summarizers.contains_key(name) {
                return Err(SummaryError::UnknownProvider {
                    role: Role::Summarizer,
                    name: name.to_string(),
                });
            }
        }

        let handle = self
            .allocator
            .acquire(Role::Summarizer, resolved.provider)
            .await?;
        let mut progress = Progress::default();
        let outcome = self.run(request, &resolved, &handle, &mut progress).await;
        self.release_quietly(&handle).await;

        let text = match outcome {
            Ok(text) => text,
            Err(e) => {
                warn!(phase = %Phase::Failed, error = %e, rounds = progress.rounds, "summary failed");
                return Err(e);
            }
        };

        let result = SummaryResult::new(text, progress.usage);
        if result.text != self.settings.failure_text && result.text != self.settings.empty_text {
            self.store(cache_key.as_deref(), request, &result).await;
        }
        info!(
            phase = %Phase::Done,
            rounds = progress.rounds,
            llm_calls = progress.llm_calls,
            prompt_tokens = result.prompt_tokens,
            output_tokens = result.output_tokens,
            "summary complete"
        );
        Ok(self.finish(result, progress, false, started))
    }

    async fn run(
        &self,
        request: &SummaryRequest,
        resolved: &Resolved<'_>,
        handle: &ProviderHandle,
        progress: &mut Progress,
    ) -> Result<String, SummaryError> {
        let backend = self.backends.summarizers.get(&handle.name).ok_or_else(|| {
            SummaryError::UnknownProvider {
                role: Role::Summarizer,
                name: handle.name.clone(),
            }
        })?;
        let counter = backend.counter.as_ref();

        // Collecting
        let mut candidates: Vec<Candidate> =
            segment_all(&request.texts, self.settings.max_section_length)
                .into_iter()
                .map(Candidate::text)
                .collect();
        if let Some(scope) = resolved.scope {
            let passages = self.retrieve(resolved, scope, counter).await?;
            progress.passages = passages.len();
            candidates.extend(passage_candidates(&passages));
        }
        info!(
            phase = %Phase::Collecting,
            provider = %handle.name,
            candidates = candidates.len(),
            passages = progress.passages,
            "candidates collected"
        );
        if candidates.is_empty() {
            return Ok(self.settings.empty_text.clone());
        }

        let extraction = extraction_instruction(resolved.prompt, &self.settings.sentinel);
        let extraction_parts = PromptParts {
            text: "",
            instruction: &extraction,
            persona: resolved.persona,
            output_format: "",
        };
        let terminal_parts = PromptParts {
            text: "",
            instruction: resolved.prompt,
            persona: resolved.persona,
            output_format: resolved.output_format,
        };
        let prompt_overhead = backend
            .format
            .prompt_overhead(&extraction_parts, counter)
            .max(backend.format.prompt_overhead(&terminal_parts, counter));

        for round in 1..=self.settings.max_rounds {
            progress.rounds = round;
            let budget = ChunkBudget {
                max_tokens: backend.profile.chunk_length,
                prompt_overhead,
                max_chunks: if round == 1 { resolved.max_chunks } else { 0 },
            };
            let chunks = assemble(&candidates, &budget, counter);
            info!(
                phase = %Phase::Chunking,
                round,
                chunks = chunks.len(),
                prompt_overhead,
                "chunks assembled"
            );

            match chunks.as_slice() {
                [] => return Ok(self.settings.empty_text.clone()),
                [only] => {
                    let parts = PromptParts {
                        text: &only.text,
                        ..terminal_parts
                    };
                    return self.terminal(backend, &parts, resolved, progress).await;
                }
                _ => {}
            }

            let outputs = self
                .extract(backend, &chunks, &extraction_parts, progress)
                .await?;
            let survivors: Vec<String> = outputs
                .into_iter()
                .filter(|output| !is_sentinel(output, &self.settings.sentinel))
                .collect();
            info!(
                phase = %Phase::Reducing,
                round,
                chunks = chunks.len(),
                survivors = survivors.len(),
                "extraction round complete"
            );
            if survivors.is_empty() {
                return Ok(self.settings.empty_text.clone());
            }

            candidates = segment(&survivors.join("\n\n"), self.settings.max_section_length)
                .into_iter()
                .map(Candidate::text)
                .collect();
        }

        Err(SummaryError::ReductionDivergence {
            rounds: self.settings.max_rounds,
        })
    }

    /// Split and encode the search prompt, then rank passages in `scope`.
    async fn retrieve(
        &self,
        resolved: &Resolved<'_>,
        scope: &DocumentScope,
        counter: &dyn TokenCounter,
    ) -> Result<Vec<RankedPassage>, SummaryError> {
        let Some(retrieval) = &self.retrieval else {
            return Err(SummaryError::Store(anyhow::anyhow!(
                "document-scoped request but no vector index is configured"
            )));
        };

        let parser_handle = self.allocator.acquire(Role::SentenceParser, None).await?;
        let encoder_handle = match self.allocator.acquire(Role::Encoder, None).await {
            Ok(handle) => handle,
            Err(e) => {
                self.release_quietly(&parser_handle).await;
                return Err(e);
            }
        };

        let outcome = self
            .rank_passages(
                retrieval,
                &parser_handle,
                &encoder_handle,
                resolved,
                scope,
                counter,
            )
            .await;
        self.release_quietly(&encoder_handle).await;
        self.release_quietly(&parser_handle).await;
        outcome
    }

    async fn rank_passages(
        &self,
        retrieval: &Retrieval,
        parser_handle: &ProviderHandle,
        encoder_handle: &ProviderHandle,
        resolved: &Resolved<'_>,
        scope: &DocumentScope,
        counter: &dyn TokenCounter,
    ) -> Result<Vec<RankedPassage>, SummaryError> {
        let parser = self
            .backends
            .sentence_parsers
            .get(&parser_handle.name)
            .ok_or_else(|| SummaryError::UnknownProvider {
                role: Role::SentenceParser,
                name: parser_handle.name.clone(),
            })?;
        let encoder = self
            .backends
            .encoders
            .get(&encoder_handle.name)
            .ok_or_else(|| SummaryError::UnknownProvider {
                role: Role::Encoder,
                name: encoder_handle.name.clone(),
            })?;

        let sentences = parser.split(resolved.search_prompt).await?;
        if sentences.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = encoder.encode(&sentences).await?;
        debug!(
            sentences = sentences.len(),
            encoder = %encoder.model_name(),
            "search prompt encoded"
        );

        let options = RankOptions {
            limit: resolved.sentence_limit,
            min_score: resolved.min_score,
            window_tokens: self.settings.window_tokens,
        };
        let passages = rank(
            retrieval.index.as_ref(),
            retrieval.documents.as_ref(),
            &vectors,
            scope,
            &topics(resolved.search_prompt),
            &options,
            retrieval.scorer.as_ref(),
            counter,
        )
        .await?;
        Ok(passages)
    }

    /// Run one extraction call per chunk and return outputs in chunk order.
    ///
    /// Once a call fails, chunks not yet started are skipped. In-flight
    /// calls finish, and the first failure by chunk index is returned.
    async fn extract(
        &self,
        backend: &SummarizerBackend,
        chunks: &[Chunk],
        parts: &PromptParts<'_>,
        progress: &mut Progress,
    ) -> Result<Vec<String>, SummaryError> {
        info!(
            phase = %Phase::Dispatching,
            chunks = chunks.len(),
            workers = self.settings.workers,
            "dispatching extraction calls"
        );

        let failed = &AtomicBool::new(false);
        let mut results: Vec<(usize, Option<Result<Completion, InferenceError>>)> =
            stream::iter(chunks.iter().map(|chunk| async move {
                if failed.load(Ordering::SeqCst) {
                    debug!(chunk = chunk.index, "extraction skipped after a failure");
                    return (chunk.index, None);
                }
                let prompt = backend.format.build_prompt(&PromptParts {
                    text: &chunk.text,
                    ..*parts
                });
                let result = self.generate(backend, &prompt).await;
                if result.is_err() {
                    failed.store(true, Ordering::SeqCst);
                }
                debug!(chunk = chunk.index, ok = result.is_ok(), "extraction call finished");
                (chunk.index, Some(result))
            }))
            .buffer_unordered(self.settings.workers)
            .collect()
            .await;
        results.sort_by_key(|(index, _)| *index);

        let mut outputs = Vec::with_capacity(results.len());
        let mut failure = None;
        for (index, result) in results {
            let Some(result) = result else {
                continue;
            };
            progress.llm_calls += 1;
            match result {
                Ok(completion) => {
                    progress.usage += completion.usage;
                    outputs.push(backend.format.parse_response(&completion.text));
                }
                Err(e) => {
                    warn!(chunk = index, error = %e, "extraction call failed");
                    failure.get_or_insert(e);
                }
            }
        }
        match failure {
            Some(e) => Err(e.into()),
            None => Ok(outputs),
        }
    }

    /// Final call with the caller's own prompt, retried on bad endings.
    async fn terminal(
        &self,
        backend: &SummarizerBackend,
        parts: &PromptParts<'_>,
        resolved: &Resolved<'_>,
        progress: &mut Progress,
    ) -> Result<String, SummaryError> {
        info!(phase = %Phase::Dispatching, "dispatching terminal call");
        let prompt = backend.format.build_prompt(parts);
        let mut last_error = None;

        for attempt in 0..=resolved.retries {
            progress.llm_calls += 1;
            match self.generate(backend, &prompt).await {
                Ok(completion) => {
                    progress.usage += completion.usage;
                    let text = backend.format.parse_response(&completion.text);
                    if has_accepted_ending(&text, resolved.endings) {
                        return Ok(text);
                    }
                    warn!(attempt, "response lacks an accepted ending");
                    last_error = None;
                }
                Err(e) if e.is_retryable() => {
                    warn!(attempt, error = %e, "retrying terminal call");
                    last_error = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        match last_error {
            Some(e) => Err(e.into()),
            None => Ok(self.settings.failure_text.clone()),
        }
    }

    async fn generate(
        &self,
        backend: &SummarizerBackend,
        prompt: &Prompt,
    ) -> Result<Completion, InferenceError> {
        let timeout = self.settings.call_timeout;
        let options = backend.generation_options();
        match tokio::time::timeout(timeout, backend.model.generate(prompt, &options)).await {
            Ok(result) => result,
            Err(_) => Err(InferenceError::Timeout(timeout)),
        }
    }

    async fn release_quietly(&self, handle: &ProviderHandle) {
        if let Err(e) = self.allocator.release(handle).await {
            warn!(key = %handle.key(), error = %e, "failed to release lease");
        }
    }

    fn cache_key(
        &self,
        request: &SummaryRequest,
        resolved: &Resolved<'_>,
    ) -> Result<Option<String>, SummaryError> {
        if self.cache.is_none() {
            return Ok(None);
        }
        let config = serde_json::to_string(resolved).map_err(anyhow::Error::from)?;
        Ok(Some(content_key(&request.texts.join("\n\n"), &config)))
    }

    async fn cached(&self, key: Option<&str>) -> Option<SummaryResult> {
        let (Some(cache), Some(key)) = (&self.cache, key) else {
            return None;
        };
        match cache.get(key).await {
            Ok(entry) => entry.map(|e| e.result),
            Err(e) => {
                warn!(error = %e, "summary cache lookup failed");
                None
            }
        }
    }

    async fn store(&self, key: Option<&str>, request: &SummaryRequest, result: &SummaryResult) {
        let (Some(cache), Some(key)) = (&self.cache, key) else {
            return;
        };
        let config = match serde_json::to_string(request) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "failed to serialize request, summary not cached");
                return;
            }
        };
        let entry = CacheEntry {
            text: request.texts.join("\n\n"),
            config,
            result: result.clone(),
        };
        if let Err(e) = cache.put(key, &entry).await {
            warn!(error = %e, "failed to cache summary");
        }
    }

    fn finish(
        &self,
        result: SummaryResult,
        progress: Progress,
        cached: bool,
        started: Instant,
    ) -> Summary {
        Summary {
            result,
            passages: progress.passages,
            rounds: progress.rounds,
            llm_calls: progress.llm_calls,
            cached,
            processing_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Sub-prompt sent to each chunk of an extraction round.
pub fn extraction_instruction(prompt: &str, sentinel: &str) -> String {
    format!(
        "Extract and format only the information from the text that is relevant to the following request. Do not answer the request itself. If no information in the text is relevant, respond with exactly {} and nothing else.\nRequest: {}",
        sentinel, prompt
    )
}

/// Whether an extraction output is the sentinel, ignoring case, wrapping
/// quotes and trailing punctuation.
pub fn is_sentinel(output: &str, sentinel: &str) -> bool {
    let normalize = |s: &str| {
        s.trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .trim_end_matches(['.', '!'])
            .trim()
            .to_lowercase()
    };
    normalize(output) == normalize(sentinel)
}

/// An empty `endings` list accepts any non-empty text.
pub fn has_accepted_ending(text: &str, endings: &[String]) -> bool {
    let text = text.trim_end();
    if text.is_empty() {
        return false;
    }
    endings.is_empty() || endings.iter().any(|ending| text.ends_with(ending.as_str()))
}
