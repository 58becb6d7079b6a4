//! Processor registry (C4): maps a job's `type` tag to the `JobHandler`
//! that knows how to execute it. The registry owns no processing logic of
//! its own — callers register real processors (subprocess shell-outs,
//! transcoders, OCR engines) at boot; the two handlers defined here are
//! dependency-free stand-ins that keep the pipeline runnable and testable
//! without any of that machinery installed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::jobs::{Job, JobContext, JobError, JobHandler, JobProcessingResult, JobResult};

/// Type-to-handler map. Cloning a `JobRegistry` is cheap: handlers are
/// stored behind `Arc` and the map itself is wrapped in one.
#[derive(Clone, Default)]
pub struct JobRegistry {
    handlers: Arc<HashMap<String, Arc<dyn JobHandler>>>,
}

/// Builder for assembling a registry at boot, one job type at a time.
#[derive(Default)]
pub struct JobRegistryBuilder {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(job_type.into(), handler);
        self
    }

    /// A registry with the two in-tree reference processors already wired
    /// under their spec-reserved type tags.
    pub fn with_reference_processors() -> Self {
        Self::new()
            .register("media_processing", Arc::new(MediaProcessingHandler))
            .register("text_extraction", Arc::new(TextExtractionHandler))
    }

    pub fn build(self) -> JobRegistry {
        JobRegistry {
            handlers: Arc::new(self.handlers),
        }
    }
}

impl JobRegistry {
    pub fn builder() -> JobRegistryBuilder {
        JobRegistryBuilder::new()
    }

    pub fn lookup(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn registered_types(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    pub fn is_registered(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Per-type availability, as surfaced by the health aggregator's full
    /// status query.
    pub async fn availability(&self) -> HashMap<String, bool> {
        let mut result = HashMap::new();
        for (job_type, handler) in self.handlers.iter() {
            result.insert(job_type.clone(), handler.available().await);
        }
        result
    }
}

/// Reference `media_processing` processor: copies `input_path` to a sibling
/// `.out` file instead of transcoding it, so the pipeline shape (dequeue,
/// invoke, complete) can be exercised with no `vips`/ffmpeg binaries
/// present. Payload: `{input_path, media_kind, search_params, format?,
/// vips_enabled?}`. Result: `{output_path, processed_at, input_path,
/// media_kind}`.
pub struct MediaProcessingHandler;

#[async_trait]
impl JobHandler for MediaProcessingHandler {
    async fn handle(&self, ctx: &JobContext, job: &Job) -> JobProcessingResult<JobResult> {
        let input_path = job
            .payload
            .get("input_path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| JobError::Unrecoverable("media_processing payload missing input_path".into()))?;
        let media_kind = job
            .payload
            .get("media_kind")
            .and_then(|v| v.as_str())
            .unwrap_or("document")
            .to_string();

        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let output_path = format!("{}.out", input_path);
        tokio::fs::copy(input_path, &output_path)
            .await
            .map_err(|e| JobError::Execution(format!("copying {}: {}", input_path, e)))?;

        debug!(job_id = %job.id, input_path, output_path, "media_processing reference handler done");

        Ok(JobResult::new(serde_json::json!({
            "output_path": output_path,
            "processed_at": chrono::Utc::now(),
            "input_path": input_path,
            "media_kind": media_kind,
        })))
    }
}

/// Reference `text_extraction` processor: counts UTF-8 lines and pages (a
/// page is defined as a run of 60 lines) instead of calling a real
/// text-extraction tool. Payload: `{input_path, job_type ∈ {full, pages,
/// range}, start_page?, end_page?}`.
pub struct TextExtractionHandler;

const LINES_PER_PAGE: usize = 60;

#[async_trait]
impl JobHandler for TextExtractionHandler {
    async fn handle(&self, ctx: &JobContext, job: &Job) -> JobProcessingResult<JobResult> {
        let input_path = job
            .payload
            .get("input_path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| JobError::Unrecoverable("text_extraction payload missing input_path".into()))?;

        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let contents = tokio::fs::read_to_string(input_path)
            .await
            .map_err(|e| JobError::Execution(format!("reading {}: {}", input_path, e)))?;

        let lines: Vec<&str> = contents.lines().collect();
        let total_pages = ((lines.len() + LINES_PER_PAGE - 1) / LINES_PER_PAGE).max(1);

        let (start_page, end_page) = match job.payload.get("job_type").and_then(|v| v.as_str()) {
            Some("range") => {
                let start = job
                    .payload
                    .get("start_page")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| JobError::Unrecoverable("range extraction missing start_page".into()))?
                    as usize;
                let end = job
                    .payload
                    .get("end_page")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(total_pages as u64) as usize;
                if start == 0 || start > end || end > total_pages {
                    return Err(JobError::Unrecoverable(format!(
                        "invalid page range {}..{} for {} pages",
                        start, end, total_pages
                    )));
                }
                (start, end)
            }
            _ => (1, total_pages),
        };

        let selected: String = lines
            .chunks(LINES_PER_PAGE)
            .enumerate()
            .filter(|(idx, _)| {
                let page = idx + 1;
                page >= start_page && page <= end_page
            })
            .flat_map(|(_, chunk)| chunk.iter().copied())
            .collect::<Vec<_>>()
            .join("\n");

        debug!(job_id = %job.id, input_path, total_pages, "text_extraction reference handler done");

        Ok(JobResult::new(serde_json::json!({
            "text": selected,
            "line_count": lines.len(),
            "page_count": total_pages,
            "processed_at": chrono::Utc::now(),
            "input_path": input_path,
        })))
    }
}
