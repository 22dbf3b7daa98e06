//! Builds a [`SummaryEngine`] and lease tooling from [`Config`].
//!
//! | Concern | Implementation |
//! |---------|----------------|
//! | Leases | [`SqliteLeaseStore`] |
//! | Named locks | [`SqliteMutex`] |
//! | Summarizers | [`HttpModel`] + prompt format + token counter |
//! | Encoders | [`HttpEncoder`] |
//! | Sentence parsers | [`PunctuationSentenceParser`] |
//! | Vector index | [`QdrantIndex`], when `[vector]` is set |
//! | Summary cache | [`SqliteSummaryCache`], when `summary.cache` is on |

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::SqlitePool;
use summary_harness_core::embedding::Encoder;
use summary_harness_core::models::Role;
use summary_harness_core::rank::DensityScorer;
use summary_harness_core::sentences::{PunctuationSentenceParser, SentenceParser};
use summary_harness_core::store::LeaseStore;
use tracing::debug;

use crate::allocator::ProviderAllocator;
use crate::config::Config;
use crate::db;
use crate::encoder::HttpEncoder;
use crate::llm::HttpModel;
use crate::lock::{NamedMutex, SqliteMutex};
use crate::migrate;
use crate::prompt::create_format;
use crate::qdrant::QdrantIndex;
use crate::sqlite_store::{SqliteLeaseStore, SqliteSummaryCache};
use crate::summarize::{
    Backends, ModelProfile, Retrieval, SummarizerBackend, SummaryEngine, SummarySettings,
};
use crate::tokenizer::create_counter;

/// Shared lease state of one database.
#[derive(Clone)]
pub struct LeaseTools {
    pub leases: Arc<dyn LeaseStore>,
    pub mutex: Arc<dyn NamedMutex>,
}

impl LeaseTools {
    pub fn new(pool: &SqlitePool, config: &Config) -> Self {
        Self {
            leases: Arc::new(SqliteLeaseStore::new(pool.clone())),
            mutex: Arc::new(SqliteMutex::new(
                pool.clone(),
                Duration::from_secs(config.summary.lock_timeout_secs),
            )),
        }
    }
}

/// Connect to the database and make sure the schema exists.
pub async fn open(config: &Config) -> Result<SqlitePool> {
    let pool = db::connect(config).await?;
    migrate::migrate(&pool).await?;
    Ok(pool)
}

/// Construct provider clients for every configured backend.
pub fn backends(config: &Config) -> Result<Backends> {
    let call_timeout = Duration::from_secs(config.summary.timeout_secs);
    let mut backends = Backends::default();

    for (name, summarizer) in &config.summarizers {
        let counter = create_counter(summarizer.tokenizer)?;
        let model = HttpModel::new(name, summarizer, counter.clone(), call_timeout)?;
        backends.summarizers.insert(
            name.clone(),
            SummarizerBackend {
                profile: ModelProfile::from(summarizer),
                model: Arc::new(model),
                format: create_format(summarizer.style),
                counter,
            },
        );
    }

    for (name, encoder) in &config.encoders {
        let encoder: Arc<dyn Encoder> = Arc::new(HttpEncoder::new(name, encoder)?);
        backends.encoders.insert(name.clone(), encoder);
    }

    for (name, parser) in &config.sentence_parsers {
        let parser: Arc<dyn SentenceParser> =
            Arc::new(PunctuationSentenceParser::new(parser.max_sentence_length));
        backends.sentence_parsers.insert(name.clone(), parser);
    }
    // Listed parsers without a definition use the default length limit.
    for entry in config.providers.entries(Role::SentenceParser) {
        backends
            .sentence_parsers
            .entry(entry.name().to_string())
            .or_insert_with(|| Arc::new(PunctuationSentenceParser::default()));
    }

    debug!(
        summarizers = backends.summarizers.len(),
        encoders = backends.encoders.len(),
        sentence_parsers = backends.sentence_parsers.len(),
        "backends ready"
    );
    Ok(backends)
}

/// Build the engine for `requester`.
pub fn build_engine(config: &Config, pool: &SqlitePool, requester: &str) -> Result<SummaryEngine> {
    let tools = LeaseTools::new(pool, config);
    let registry = Arc::new(config.providers.registry()?);
    let allocator = Arc::new(ProviderAllocator::new(
        registry,
        tools.leases,
        tools.mutex,
        requester,
    ));

    let mut engine = SummaryEngine::new(
        allocator,
        backends(config)?,
        SummarySettings::from(&config.summary),
    );

    if let Some(vector) = &config.vector {
        let index = Arc::new(QdrantIndex::new(vector)?);
        engine = engine.with_retrieval(Retrieval {
            index: index.clone(),
            documents: index,
            scorer: Arc::new(DensityScorer {
                topic_weight: config.summary.topic_weight,
            }),
        });
    }
    if config.summary.cache {
        engine = engine.with_cache(Arc::new(SqliteSummaryCache::new(pool.clone())));
    }
    Ok(engine)
}
