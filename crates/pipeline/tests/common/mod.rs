//! Scripted collaborators shared by the pipeline integration tests.

#![allow(dead_code)]

use bastion_core::config::{DialogueConfig, GuardPolicy, PromptConfig, RetrievalConfig};
use bastion_core::{AppError, AppResult, RawHit, RetryPolicy};
use bastion_guard::{AuditRecord, AuditSink, Guard};
use bastion_knowledge::{ResultProcessor, Retriever, SearchProvider, SearchRequest};
use bastion_llm::{DialogueClient, DialogueProvider, LlmRequest, LlmResponse, LlmUsage};
use bastion_pipeline::Pipeline;
use bastion_prompt::PromptBuilder;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn hit(source_id: &str, score: f32) -> RawHit {
    RawHit::new(
        source_id,
        format!("{} 说明：使用参数化查询并限制数据库账号权限。", source_id),
        score,
        "common_dataset",
    )
}

/// Seven hits, two of them repeating an earlier source.
pub fn seven_hits() -> Vec<RawHit> {
    vec![
        hit("d1", 0.72),
        hit("d2", 0.91),
        hit("d3", 0.66),
        hit("d1", 0.88),
        hit("d4", 0.79),
        hit("d2", 0.61),
        hit("d5", 0.83),
    ]
}

/// Search service that knows a fixed set of corpora.
#[derive(Debug)]
pub struct MockSearch {
    corpora: HashMap<String, Vec<RawHit>>,
    failures: Mutex<VecDeque<AppError>>,
    pub calls: AtomicU32,
    pub requests: Mutex<Vec<SearchRequest>>,
}

impl MockSearch {
    /// Serve `hits` from `common_dataset`.
    pub fn with_hits(hits: Vec<RawHit>) -> Self {
        Self {
            corpora: HashMap::from([("common_dataset".to_string(), hits)]),
            failures: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Also serve `hits` from `corpus_id`.
    pub fn with_corpus(mut self, corpus_id: &str, hits: Vec<RawHit>) -> Self {
        self.corpora.insert(corpus_id.to_string(), hits);
        self
    }

    /// Fail the next calls with `errors`, in order.
    pub fn failing_first(self, errors: Vec<AppError>) -> Self {
        *self.failures.lock().unwrap() = errors.into();
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SearchProvider for MockSearch {
    fn provider_name(&self) -> &str {
        "mock-search"
    }

    async fn search(&self, request: &SearchRequest) -> AppResult<Vec<RawHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        self.corpora
            .get(&request.corpus_id)
            .cloned()
            .ok_or_else(|| AppError::CorpusNotFound {
                corpus_id: request.corpus_id.clone(),
            })
    }
}

/// Dialogue service replaying a script of replies.
#[derive(Debug)]
pub struct MockDialogue {
    script: Mutex<VecDeque<AppResult<String>>>,
    fallback: String,
    pub calls: AtomicU32,
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockDialogue {
    pub fn replying(text: &str) -> Self {
        Self::scripted(Vec::new(), text)
    }

    /// Play `script` first, then answer `fallback` forever.
    pub fn scripted(script: Vec<AppResult<String>>, fallback: &str) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: fallback.to_string(),
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<LlmRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait::async_trait]
impl DialogueProvider for MockDialogue {
    fn provider_name(&self) -> &str {
        "mock-dialogue"
    }

    async fn generate(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()));

        reply.map(|content| LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::new(10, 20),
        })
    }
}

/// Keeps every audit record for inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub records: Mutex<Vec<AuditRecord>>,
}

impl AuditSink for RecordingSink {
    fn record(&self, record: AuditRecord) {
        self.records.lock().unwrap().push(record);
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 1,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
    }
}

/// Everything a test needs to drive and observe one pipeline.
pub struct Harness {
    pub pipeline: Pipeline,
    pub search: Arc<MockSearch>,
    pub dialogue: Arc<MockDialogue>,
    pub audit: Arc<RecordingSink>,
}

pub struct HarnessBuilder {
    search: MockSearch,
    dialogue: MockDialogue,
    policy: GuardPolicy,
    prompt: PromptConfig,
    sink: Option<Arc<dyn AuditSink>>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            search: MockSearch::with_hits(seven_hits()),
            dialogue: MockDialogue::replying("防火墙依据访问控制策略过滤进出网络的流量。"),
            policy: GuardPolicy::default(),
            prompt: PromptConfig::default(),
            sink: None,
        }
    }

    pub fn search(mut self, search: MockSearch) -> Self {
        self.search = search;
        self
    }

    pub fn dialogue(mut self, dialogue: MockDialogue) -> Self {
        self.dialogue = dialogue;
        self
    }

    pub fn policy(mut self, policy: GuardPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Audit into `sink` instead of the recording sink.
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn max_prompt_chars(mut self, max: usize) -> Self {
        self.prompt.max_prompt_chars = max;
        self
    }

    pub fn build(self) -> Harness {
        let search = Arc::new(self.search);
        let dialogue = Arc::new(self.dialogue);
        let audit = Arc::new(RecordingSink::default());

        let sink: Arc<dyn AuditSink> = match self.sink {
            Some(sink) => sink,
            None => audit.clone(),
        };
        let guard = Guard::new(&self.policy, sink).unwrap();
        let prompt =
            PromptBuilder::with_builtin(&self.prompt, guard.max_input_chars()).unwrap();
        let retrieval = RetrievalConfig::default();

        let pipeline = Pipeline::new(
            guard,
            Retriever::new(search.clone(), fast_retry()),
            ResultProcessor::new(&retrieval),
            prompt,
            DialogueClient::new(dialogue.clone(), &DialogueConfig::default(), fast_retry()),
            &retrieval,
        );

        Harness {
            pipeline,
            search,
            dialogue,
            audit,
        }
    }
}
