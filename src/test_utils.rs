//! Shared test utilities used across multiple test modules.
//!
//! Consolidates the scripted research engine and the store-backed fixture
//! that `executor`, `scheduler`, and `gateway` tests all build on.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::analysis::TrendAnalyzer;
use crate::executor::{ActiveRuns, QuickExecutor, RunPipeline, TaskExecutor};
use crate::notify::NotificationDispatcher;
use crate::research::{ResearchContext, ResearchEngine, ResearchJob, ResearchReport};
use crate::store::WatchStore;
use crate::store::types::{AnalysisDepth, WatchTask};

/// Engine with scripted behavior: optional failure, configurable work
/// duration, fixed report text.
pub struct ScriptedEngine {
    pub work_secs: u64,
    pub fail_research: bool,
    pub report_text: String,
    pub sources: Vec<String>,
}

impl ScriptedEngine {
    /// An engine that completes immediately with the given report.
    pub fn instant(report_text: &str) -> Self {
        Self {
            work_secs: 0,
            fail_research: false,
            report_text: report_text.to_owned(),
            sources: vec!["https://example.com/a".to_owned()],
        }
    }
}

#[async_trait]
impl ResearchEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn conduct_research(
        &self,
        job: &ResearchJob,
        cancel: &CancellationToken,
    ) -> anyhow::Result<ResearchContext> {
        if self.fail_research {
            anyhow::bail!("engine exploded");
        }
        let mut context = ResearchContext {
            query: job.query.clone(),
            ..ResearchContext::default()
        };
        for _ in 0..self.work_secs {
            if cancel.is_cancelled() {
                return Ok(context);
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
            context.content.push("gathered findings chunk".to_owned());
            context.tokens_used += 5;
        }
        if cancel.is_cancelled() {
            return Ok(context);
        }
        context.sources = self.sources.clone();
        context.tokens_used += 100;
        context.complete = true;
        Ok(context)
    }

    async fn write_report(&self, context: &ResearchContext) -> anyhow::Result<ResearchReport> {
        Ok(ResearchReport {
            text: self.report_text.clone(),
            sources: if context.complete {
                self.sources.clone()
            } else {
                Vec::new()
            },
            tokens_used: 10,
        })
    }

    async fn health_check(&self) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// A temp-directory store plus the handles every run needs.
pub struct Fixture {
    pub _dir: tempfile::TempDir,
    pub store: Arc<WatchStore>,
    pub dispatcher: NotificationDispatcher,
    pub active: ActiveRuns,
}

pub fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(WatchStore::open(dir.path()).unwrap());
    Fixture {
        _dir: dir,
        store,
        dispatcher: NotificationDispatcher::new(8),
        active: ActiveRuns::new(),
    }
}

impl Fixture {
    pub fn pipeline(&self, engine: ScriptedEngine) -> Arc<RunPipeline> {
        Arc::new(RunPipeline::new(
            Arc::clone(&self.store),
            Arc::new(engine),
            TrendAnalyzer::new(5),
            self.dispatcher.clone(),
        ))
    }

    pub fn standard(&self, engine: ScriptedEngine) -> TaskExecutor {
        TaskExecutor::new(self.pipeline(engine), self.active.clone(), 3)
    }

    pub fn quick(&self, engine: ScriptedEngine) -> QuickExecutor {
        QuickExecutor::new(self.pipeline(engine), self.active.clone(), 2)
    }

    /// A basic-depth task persisted to the store.
    pub fn seed_task(&self) -> WatchTask {
        let task = WatchTask::new("owner_1", "ai chips", 24)
            .with_keywords(vec!["ai".to_owned()])
            .with_depth(AnalysisDepth::Basic);
        self.store.create_task(&task).unwrap();
        task
    }
}
