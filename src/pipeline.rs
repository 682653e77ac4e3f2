use crate::config::PipelineConfig;
use crate::estate::envelope::{EnvelopeError, as_list, id_string, unwrap_envelope, value_at_path};
use crate::estate::overview::build_overview;
use crate::estate::rename::deep_rename_keys;
use crate::is24::attachments::resolve_attachments;
use crate::is24::client::{FetchError, JsonFetch};
use crate::is24::config::{ATTACHMENT_REF_KEY, ConfigError};
use crate::models::{Attachment, RunReport, StageReport};
use crate::sink::{NodeSink, PublishedNode, SinkError};
use serde_json::{Map, Value, json};
use std::{
    collections::{BTreeMap, BTreeSet},
    future::Future,
    sync::Arc,
    time::Instant,
};
use thiserror::Error;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// One extract-transform-load pass over the vendor's listings.
#[derive(Clone)]
pub struct Pipeline {
    pub config: Arc<PipelineConfig>,
    fetcher: Arc<dyn JsonFetch>,
}

impl Pipeline {
    /// Fails on unusable configuration before any request is made.
    pub fn new(config: PipelineConfig, fetcher: Arc<dyn JsonFetch>) -> Result<Self, PipelineError> {
        config
            .validate()
            .map_err(|err| PipelineError::configuration("configure", err))?;
        Ok(Self {
            config: Arc::new(config),
            fetcher,
        })
    }

    /// Fetches, merges and normalizes every listing without touching a sink.
    pub async fn assemble(&self) -> Result<Vec<ListingRecord>, PipelineError> {
        let mut stages = Vec::new();
        self.assemble_into(&mut stages).await
    }

    /// Full pass: assemble, diff against `sink`, publish and delete.
    ///
    /// Sink mutations only start after every listing was fetched, so a
    /// failed fetch leaves the sink untouched.
    pub async fn run(&self, sink: &dyn NodeSink) -> Result<RunReport, PipelineError> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!(
            target: "is24.pipeline",
            "sync",
            run_id = %run_id,
            owner = %self.config.owner
        );
        self.run_with_id(run_id, sink).instrument(span).await
    }

    async fn run_with_id(
        &self,
        run_id: String,
        sink: &dyn NodeSink,
    ) -> Result<RunReport, PipelineError> {
        info!(target: "is24.pipeline", base_url = %self.config.base_url, "sync started");
        let mut stages = Vec::new();
        let records = self.assemble_into(&mut stages).await?;

        let config = self.config.clone();
        let plan = self
            .capture_stage(
                "diff",
                &mut stages,
                stages::diff(sink, &config.owner, records),
            )
            .await?;

        let outcome = self
            .capture_stage("publish", &mut stages, stages::publish(sink, &config, plan))
            .await?;

        crate::metrics::listings_synced(
            &config.owner,
            outcome.published.len(),
            outcome.deleted.len(),
        );
        info!(
            target: "is24.pipeline",
            published = outcome.published.len(),
            deleted = outcome.deleted.len(),
            "sync finished"
        );

        Ok(RunReport {
            run_id,
            owner: config.owner.clone(),
            stages,
            published: outcome.published,
            deleted: outcome.deleted,
        })
    }

    async fn assemble_into(
        &self,
        stages: &mut Vec<StageReport>,
    ) -> Result<Vec<ListingRecord>, PipelineError> {
        let config = self.config.clone();
        let fetcher = self.fetcher.clone();

        let summaries = self
            .capture_stage(
                "fetch_list",
                stages,
                stages::fetch_list(fetcher.as_ref(), &config),
            )
            .await?;

        let fetched = self
            .capture_stage(
                "fetch_details",
                stages,
                stages::fetch_details(fetcher.as_ref(), &config, summaries),
            )
            .await?;

        let merged = self
            .capture_stage("merge", stages, async move { stages::merge(fetched) })
            .await?;

        self.capture_stage("normalize", stages, async {
            Ok(stages::normalize(&config, merged))
        })
        .await
    }

    async fn capture_stage<T, Fut>(
        &self,
        name: &'static str,
        stages: &mut Vec<StageReport>,
        fut: Fut,
    ) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<StageOutcome<T>, PipelineError>>,
    {
        let started = Instant::now();
        let outcome = fut.await?;
        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed(name, elapsed_ms);
        stages.push(StageReport::new(name, elapsed_ms, outcome.output));
        Ok(outcome.value)
    }
}

/// A listing element from the index endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingSummary {
    pub id: String,
    pub fields: Value,
}

/// Index entry plus its unwrapped detail body and resolved attachments.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedListing {
    pub summary: ListingSummary,
    pub type_tag: String,
    pub detail: Value,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListingRecord {
    pub id: String,
    pub type_tag: String,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncPlan {
    pub publish: Vec<ListingRecord>,
    pub delete: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublishOutcome {
    pub published: Vec<String>,
    pub deleted: Vec<String>,
}

/// Every current listing is republished; previously published ids that
/// vanished upstream are deleted.
pub fn plan_sync(existing: &[String], current: Vec<ListingRecord>) -> SyncPlan {
    let live: BTreeSet<&str> = current.iter().map(|r| r.id.as_str()).collect();
    let delete = existing
        .iter()
        .filter(|id| !live.contains(id.as_str()))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    SyncPlan {
        publish: current,
        delete,
    }
}

/// Summary fields overlaid by detail fields, then the type tag and the
/// resolved attachments.
pub fn merge_listing(listing: FetchedListing) -> Result<ListingRecord, PipelineError> {
    let mut merged = match listing.summary.fields {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    if let Value::Object(detail) = listing.detail {
        merged.extend(detail);
    }
    merged.insert("type".into(), Value::String(listing.type_tag.clone()));
    let attachments = serde_json::to_value(&listing.attachments)
        .map_err(|err| PipelineError::internal("merge", err.to_string()))?;
    merged.insert("attachments".into(), attachments);

    Ok(ListingRecord {
        id: listing.summary.id,
        type_tag: listing.type_tag,
        body: Value::Object(merged),
    })
}

/// Vendor reference to the attachment collection of a detail body.
pub fn attachment_reference(detail: &Value) -> Option<String> {
    detail
        .get("attachments")
        .and_then(|refs| as_list(refs).into_iter().next())
        .and_then(|first| first.get(ATTACHMENT_REF_KEY))
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub mod stages {
    use super::*;
    use futures::{StreamExt, TryStreamExt, future::try_join_all, stream};

    pub async fn fetch_list(
        fetcher: &dyn JsonFetch,
        config: &PipelineConfig,
    ) -> Result<StageOutcome<Vec<ListingSummary>>, PipelineError> {
        let index = fetcher
            .fetch_json(&config.base_url)
            .await
            .map_err(|err| PipelineError::fetch("fetch_list", err))?;

        // A missing outer envelope means the response is not a listing index;
        // treating it as "no listings" would delete everything downstream.
        let Some(outer) = config.listing_path.first() else {
            return Err(PipelineError::shape(
                "fetch_list",
                &config.base_url,
                "listing path is empty",
            ));
        };
        if index.get(outer).is_none() {
            return Err(PipelineError::shape(
                "fetch_list",
                &config.base_url,
                format!("missing envelope `{outer}`"),
            ));
        }

        let elements = value_at_path(&index, &config.listing_path)
            .map(as_list)
            .unwrap_or_default();

        let summaries = elements
            .into_iter()
            .enumerate()
            .map(|(pos, element)| -> Result<ListingSummary, PipelineError> {
                let id = element
                    .get(config.id_key.as_str())
                    .and_then(id_string)
                    .ok_or_else(|| {
                        PipelineError::shape(
                            "fetch_list",
                            &config.base_url,
                            format!("listing element {pos} has no `{}`", config.id_key),
                        )
                    })?;
                Ok(ListingSummary {
                    id,
                    fields: element.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let preview: Vec<&str> = summaries.iter().take(3).map(|s| s.id.as_str()).collect();
        let output = json!({
            "count": summaries.len(),
            "preview": preview,
        });
        Ok(StageOutcome::new(summaries, output))
    }

    /// Detail requests are all in flight at once (or up to
    /// `max_concurrency`); results keep the index order. The first failure
    /// aborts the stage.
    pub async fn fetch_details(
        fetcher: &dyn JsonFetch,
        config: &PipelineConfig,
        summaries: Vec<ListingSummary>,
    ) -> Result<StageOutcome<Vec<FetchedListing>>, PipelineError> {
        let tasks = summaries
            .into_iter()
            .map(|summary| fetch_listing(fetcher, config, summary));

        let fetched = match config.max_concurrency {
            None => try_join_all(tasks).await?,
            Some(limit) => {
                stream::iter(tasks)
                    .buffered(limit)
                    .try_collect::<Vec<_>>()
                    .await?
            }
        };

        let mut types: BTreeMap<&str, usize> = BTreeMap::new();
        for listing in &fetched {
            *types.entry(listing.type_tag.as_str()).or_default() += 1;
        }
        let output = json!({
            "count": fetched.len(),
            "with_attachments": fetched.iter().filter(|l| !l.attachments.is_empty()).count(),
            "types": types,
            "max_concurrency": config.max_concurrency,
        });
        Ok(StageOutcome::new(fetched, output))
    }

    pub async fn fetch_listing(
        fetcher: &dyn JsonFetch,
        config: &PipelineConfig,
        summary: ListingSummary,
    ) -> Result<FetchedListing, PipelineError> {
        let url = config.listing_url(&summary.id);
        let envelope = fetcher
            .fetch_json(&url)
            .await
            .map_err(|err| PipelineError::fetch("fetch_details", err))?;
        let unwrapped = unwrap_envelope(envelope, &config.type_prefix)
            .map_err(|err| PipelineError::envelope("fetch_details", &url, err))?;

        let attachments_url = attachment_reference(&unwrapped.body);
        let attachments = resolve_attachments(
            fetcher,
            attachments_url.as_deref(),
            config.image_size,
            config.scale_mode,
        )
        .await
        .map_err(|err| PipelineError::fetch("fetch_details", err))?;

        debug!(
            target: "is24.pipeline",
            listing_id = %summary.id,
            type_tag = %unwrapped.type_tag,
            attachments = attachments.len(),
            "listing fetched"
        );

        Ok(FetchedListing {
            summary,
            type_tag: unwrapped.type_tag,
            detail: unwrapped.body,
            attachments,
        })
    }

    pub fn merge(
        fetched: Vec<FetchedListing>,
    ) -> Result<StageOutcome<Vec<ListingRecord>>, PipelineError> {
        let records = fetched
            .into_iter()
            .map(merge_listing)
            .collect::<Result<Vec<_>, _>>()?;
        let output = json!({ "count": records.len() });
        Ok(StageOutcome::new(records, output))
    }

    pub fn normalize(
        config: &PipelineConfig,
        records: Vec<ListingRecord>,
    ) -> StageOutcome<Vec<ListingRecord>> {
        let normalized: Vec<ListingRecord> = records
            .into_iter()
            .map(|record| ListingRecord {
                body: deep_rename_keys(&record.body, &config.rename),
                ..record
            })
            .collect();
        let output = json!({
            "count": normalized.len(),
            "aliases": config.rename.aliases().len(),
            "strip": config.rename.strip(),
        });
        StageOutcome::new(normalized, output)
    }

    pub async fn diff(
        sink: &dyn NodeSink,
        owner: &str,
        records: Vec<ListingRecord>,
    ) -> Result<StageOutcome<SyncPlan>, PipelineError> {
        let existing = sink
            .list_existing(owner)
            .await
            .map_err(|err| PipelineError::sink("diff", err))?;
        let plan = plan_sync(&existing, records);
        let output = json!({
            "existing": existing.len(),
            "publish": plan.publish.len(),
            "delete": plan.delete,
        });
        Ok(StageOutcome::new(plan, output))
    }

    /// Sink operations run one after another.
    pub async fn publish(
        sink: &dyn NodeSink,
        config: &PipelineConfig,
        plan: SyncPlan,
    ) -> Result<StageOutcome<PublishOutcome>, PipelineError> {
        let mut outcome = PublishOutcome::default();

        for record in plan.publish {
            let mut node =
                PublishedNode::new(record.id, &config.owner, &config.node_type, record.body);
            if config.include_overview {
                let overview =
                    build_overview(&node.listing, &record.type_tag, &config.overview_fields);
                node = node.with_overview(overview);
            }
            sink.publish(&node)
                .await
                .map_err(|err| PipelineError::sink("publish", err))?;
            outcome.published.push(node.id);
        }

        for id in plan.delete {
            warn!(target: "is24.pipeline", listing_id = %id, "listing gone upstream, deleting");
            sink.delete(&id)
                .await
                .map_err(|err| PipelineError::sink("publish", err))?;
            outcome.deleted.push(id);
        }

        let output = json!({
            "published": outcome.published.len(),
            "deleted": outcome.deleted.len(),
        });
        Ok(StageOutcome::new(outcome, output))
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Stage failure. The underlying error stays reachable through
/// [`std::error::Error::source`] and the typed accessors below.
#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
    status: Option<u16>,
    url: Option<String>,
    #[source]
    source: Option<BoxError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    Configuration,
    Network,
    Http,
    Parse,
    UnexpectedShape,
    Sink,
    Internal,
}

impl PipelineError {
    fn new(stage: &'static str, kind: PipelineErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind,
            status: None,
            url: None,
            source: None,
        }
    }

    fn caused_by(mut self, err: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(err));
        self
    }

    pub fn configuration(stage: &'static str, err: ConfigError) -> Self {
        Self::new(stage, PipelineErrorKind::Configuration, err.to_string()).caused_by(err)
    }

    pub fn fetch(stage: &'static str, err: FetchError) -> Self {
        let kind = match &err {
            FetchError::Config(_) => PipelineErrorKind::Configuration,
            FetchError::Network { .. } => PipelineErrorKind::Network,
            FetchError::Http { .. } => PipelineErrorKind::Http,
            FetchError::Parse { .. } => PipelineErrorKind::Parse,
        };
        let status = match &err {
            FetchError::Http { status, .. } => Some(*status),
            _ => None,
        };
        Self {
            url: err.url().map(str::to_string),
            status,
            ..Self::new(stage, kind, err.to_string())
        }
        .caused_by(err)
    }

    pub fn envelope(stage: &'static str, url: &str, err: EnvelopeError) -> Self {
        Self::shape(stage, url, err.to_string()).caused_by(err)
    }

    pub fn shape(stage: &'static str, url: &str, message: impl Into<String>) -> Self {
        Self {
            url: Some(url.to_string()),
            ..Self::new(stage, PipelineErrorKind::UnexpectedShape, message)
        }
    }

    pub fn sink(stage: &'static str, err: SinkError) -> Self {
        Self::new(stage, PipelineErrorKind::Sink, err.to_string()).caused_by(err)
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, PipelineErrorKind::Internal, message)
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn sink_error(&self) -> Option<&SinkError> {
        self.source.as_deref()?.downcast_ref()
    }

    pub fn fetch_error(&self) -> Option<&FetchError> {
        self.source.as_deref()?.downcast_ref()
    }
}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}
