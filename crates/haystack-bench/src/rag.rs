//! Experiment 3: full-context prompting versus retrieval over chunks.

use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use haystack_core::{
    BenchError, BenchResult, Document, GenerateParams, LlmClient, VectorStore,
};

use crate::corpus::load_articles;
use crate::experiment::{Experiment, ExperimentContext, ExperimentOutput};
use crate::scheduler::TRIAL_TEMPERATURE;

/// Affirmative answers, Hebrew or English.
const AFFIRMATIVE: [&str; 2] = ["כן", "Yes"];

// ---------------------------------------------------------------------------
// Chunking and the in-memory store
// ---------------------------------------------------------------------------

/// Word-aligned chunks of at most `size` characters. Consecutive chunks
/// share trailing words worth at most `overlap` characters. A single word
/// longer than `size` becomes its own chunk.
pub fn split_chunks(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        let mut added = if current.is_empty() { word_len } else { word_len + 1 };
        if len + added > size && !current.is_empty() {
            chunks.push(current.join(" "));

            let mut carry: Vec<&str> = Vec::new();
            let mut carry_len = 0;
            for &prev in current.iter().rev() {
                let prev_len = prev.chars().count() + usize::from(!carry.is_empty());
                if carry_len + prev_len > overlap {
                    break;
                }
                carry.push(prev);
                carry_len += prev_len;
            }
            carry.reverse();
            current = carry;
            len = carry_len;
            added = if current.is_empty() { word_len } else { word_len + 1 };
        }
        current.push(word);
        len += added;
    }
    if !current.is_empty() {
        chunks.push(current.join(" "));
    }
    chunks
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Brute-force cosine search over embeddings from the inference server.
pub struct MemoryVectorStore {
    client: Arc<dyn LlmClient>,
    entries: Vec<(Document, Vec<f32>)>,
}

impl MemoryVectorStore {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl VectorStore for MemoryVectorStore {
    fn upsert(&mut self, documents: Vec<Document>) -> BenchResult<usize> {
        let mut stored = 0;
        for doc in documents {
            let embedding = self.client.embed(&doc.content);
            if embedding.is_empty() {
                warn!(source = %doc.source, "no embedding for chunk");
            }
            match self
                .entries
                .iter_mut()
                .find(|(d, _)| d.source == doc.source && d.content == doc.content)
            {
                Some(entry) => entry.1 = embedding,
                None => self.entries.push((doc, embedding)),
            }
            stored += 1;
        }
        Ok(stored)
    }

    fn query(&self, text: &str, k: usize) -> BenchResult<Vec<Document>> {
        let query = self.client.embed(text);
        if query.is_empty() {
            return Err(BenchError::Runtime("no embedding for query".into()));
        }
        let mut scored: Vec<(f32, &Document)> = self
            .entries
            .iter()
            .map(|(doc, emb)| (cosine(&query, emb), doc))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(scored.into_iter().take(k).map(|(_, d)| d.clone()).collect())
    }
}

// ---------------------------------------------------------------------------
// Experiment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagOutcome {
    pub latency: f64,
    pub response: String,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagReport {
    pub full_context: RagOutcome,
    pub rag: RagOutcome,
}

pub struct RagExperiment {
    ctx: ExperimentContext,
}

impl RagExperiment {
    pub fn new(ctx: ExperimentContext) -> Self {
        Self { ctx }
    }

    fn ask(&self, context: &str, question: &str) -> (String, bool) {
        let params = GenerateParams::default().with_temperature(TRIAL_TEMPERATURE);
        let prompt = format!("Context:\n{context}\n\nQuestion: {question}");
        let response = self.ctx.client.generate(&prompt, &params);
        let yes = AFFIRMATIVE.iter().any(|a| response.contains(a));
        (response, yes)
    }
}

/// Middle sentence of `doc`, or its first 100 characters when it has
/// fewer than three sentences.
fn pick_fact(doc: &str) -> String {
    let sentences: Vec<&str> = doc.split('.').collect();
    if sentences.len() < 3 {
        doc.chars().take(100).collect()
    } else {
        sentences[sentences.len() / 2].trim().to_string()
    }
}

impl Experiment for RagExperiment {
    fn run(&self) -> BenchResult<ExperimentOutput> {
        let cfg = &self.ctx.config.rag;
        info!(model = %self.ctx.model, "RAG vs full context experiment");

        let dir = self.ctx.config.paths.hebrew_articles_dir();
        let articles = load_articles(&dir, cfg.article_limit);
        if articles.is_empty() {
            return Err(BenchError::Runtime(format!(
                "no Hebrew articles found in {}",
                dir.display()
            )));
        }

        let mut store = MemoryVectorStore::new(Arc::clone(&self.ctx.client));
        let chunks: Vec<Document> = articles
            .iter()
            .enumerate()
            .flat_map(|(i, article)| {
                split_chunks(article, cfg.chunk_size, cfg.chunk_overlap)
                    .into_iter()
                    .map(move |c| Document::new(format!("doc_{i}"), c))
            })
            .collect();
        let stored = store.upsert(chunks)?;
        debug!(stored, "chunks indexed");

        let mut rng = StdRng::seed_from_u64(self.ctx.config.run.seed);
        let target = &articles[rng.random_range(0..articles.len())];
        let fact = pick_fact(target);
        let question = format!("האם הטקסט מזכיר את המשפט הבא: '{fact}'? השב בכן או לא.");

        let started = Instant::now();
        let (response, yes) = self.ask(&articles.join("\n\n"), &question);
        let full_context = RagOutcome {
            latency: started.elapsed().as_secs_f64(),
            response,
            accuracy: if yes { 1.0 } else { 0.0 },
        };
        info!(latency = full_context.latency, "full context done");

        let started = Instant::now();
        let retrieved = store.query(&question, cfg.k)?;
        let rag_context = retrieved
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let (response, yes) = self.ask(&rag_context, &question);
        let rag = RagOutcome {
            latency: started.elapsed().as_secs_f64(),
            response,
            accuracy: if yes { 1.0 } else { 0.0 },
        };
        info!(latency = rag.latency, "RAG done");

        Ok(ExperimentOutput::Rag(RagReport { full_context, rag }))
    }
}
