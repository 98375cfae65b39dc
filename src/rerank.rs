//! Optional phrase reranker: an outside service may choose one candidate from a
//! whitelisted list. Anything that is not exactly one of the candidates is
//! ignored, and "no answer" is treated like "service unavailable".

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::RerankConfig;

pub type PickFuture<'a> = Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;

pub trait PhraseReranker: Send + Sync {
    /// Pick one of `candidates` for `category`, given short `context` text.
    fn pick<'a>(
        &'a self,
        category: &'a str,
        context: &'a str,
        candidates: &'a [String],
    ) -> PickFuture<'a>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
    /// `false` when `pick` never answers; callers skip it entirely.
    fn is_enabled(&self) -> bool {
        true
    }
}

pub type DynReranker = Arc<dyn PhraseReranker>;

/// Accept an answer only if it names one of the candidates (after trimming
/// whitespace and surrounding quotes).
pub fn accept_pick(answer: &str, candidates: &[String]) -> Option<String> {
    let cleaned = sanitize_answer(answer);
    candidates.iter().find(|c| c.trim() == cleaned).cloned()
}

fn sanitize_answer(s: &str) -> String {
    let first = s.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    first
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '「' | '」' | '`') || c.is_whitespace())
        .to_string()
}

/// Returns `None` always.
pub struct DisabledReranker;

impl PhraseReranker for DisabledReranker {
    fn pick<'a>(&'a self, _category: &'a str, _context: &'a str, _candidates: &'a [String]) -> PickFuture<'a> {
        Box::pin(async { None })
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
    fn is_enabled(&self) -> bool {
        false
    }
}

/// Deterministic reranker for tests and local runs: answers with `answer`
/// when set, otherwise with the last candidate. The answer still goes through
/// [`accept_pick`].
#[derive(Debug, Clone, Default)]
pub struct FixedReranker {
    pub answer: Option<String>,
}

impl PhraseReranker for FixedReranker {
    fn pick<'a>(&'a self, _category: &'a str, _context: &'a str, candidates: &'a [String]) -> PickFuture<'a> {
        let raw = match &self.answer {
            Some(a) => Some(a.clone()),
            None => candidates.last().cloned(),
        };
        Box::pin(async move { raw.and_then(|a| accept_pick(&a, candidates)) })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Chat Completions reranker. Requires a resolved API key.
pub struct OpenAiReranker {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiReranker {
    pub fn new(cfg: &RerankConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("market-brief/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
        })
    }
}

impl PhraseReranker for OpenAiReranker {
    fn pick<'a>(&'a self, category: &'a str, context: &'a str, candidates: &'a [String]) -> PickFuture<'a> {
        Box::pin(async move {
            if self.api_key.is_empty() || candidates.is_empty() {
                return None;
            }

            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                messages: Vec<Msg<'a>>,
                temperature: f32,
                max_tokens: u32,
            }
            #[derive(Deserialize)]
            struct Resp {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                content: String,
            }

            let sys = "You choose one sentence for a Japanese market brief. \
                       Reply with exactly one of the numbered candidates, copied verbatim, and nothing else.";
            let list = candidates
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{}. {}", i + 1, c))
                .collect::<Vec<_>>()
                .join("\n");
            let user = format!("category: {category}\ncontext: {context}\ncandidates:\n{list}");
            let req = Req {
                model: &self.model,
                messages: vec![
                    Msg {
                        role: "system",
                        content: sys,
                    },
                    Msg {
                        role: "user",
                        content: &user,
                    },
                ],
                temperature: 0.0,
                max_tokens: 120,
            };

            let resp = match self
                .http
                .post("https://api.openai.com/v1/chat/completions")
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, category, "rerank request failed");
                    return None;
                }
            };
            if !resp.status().is_success() {
                tracing::warn!(status = %resp.status(), category, "rerank non-success status");
                return None;
            }
            let body: Resp = resp.json().await.ok()?;
            let content = body.choices.first().map(|c| c.message.content.as_str())?;
            let picked = accept_pick(content, candidates);
            if picked.is_none() {
                tracing::debug!(category, "rerank answer outside candidates; ignored");
            }
            picked
        })
    }
    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Factory.
///
/// * `RERANK_TEST_MODE=mock` → [`FixedReranker`].
/// * disabled, unknown provider or unusable key → [`DisabledReranker`].
pub fn build_reranker(cfg: &RerankConfig) -> DynReranker {
    if std::env::var("RERANK_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(FixedReranker::default());
    }
    if !cfg.enabled {
        return Arc::new(DisabledReranker);
    }
    let resolved = match cfg.clone().resolved() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "reranker disabled");
            return Arc::new(DisabledReranker);
        }
    };
    match resolved.provider.as_str() {
        "openai" => match OpenAiReranker::new(&resolved) {
            Ok(r) => Arc::new(r),
            Err(e) => {
                tracing::warn!(error = %e, "reranker http client");
                Arc::new(DisabledReranker)
            }
        },
        _ => Arc::new(DisabledReranker),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cands() -> Vec<String> {
        vec!["行方を注視したい。".to_string(), "当面は静観としたい。".to_string()]
    }

    #[test]
    fn accept_only_listed_answers() {
        let c = cands();
        assert_eq!(accept_pick("  「当面は静観としたい。」\n", &c).as_deref(), Some("当面は静観としたい。"));
        assert_eq!(accept_pick("\"行方を注視したい。\"", &c).as_deref(), Some("行方を注視したい。"));
        assert_eq!(accept_pick("ドル円は買い推奨。", &c), None);
        assert_eq!(accept_pick("", &c), None);
    }

    #[tokio::test]
    async fn fixed_reranker_defaults_to_last_candidate() {
        let c = cands();
        let r = FixedReranker::default();
        assert_eq!(r.pick("closer", "", &c).await.as_deref(), Some("当面は静観としたい。"));
        let off = FixedReranker {
            answer: Some("unlisted".into()),
        };
        assert_eq!(off.pick("closer", "", &c).await, None);
        assert_eq!(DisabledReranker.pick("closer", "", &c).await, None);
    }

    #[serial_test::serial]
    #[test]
    fn factory_respects_mode_and_config() {
        std::env::remove_var("RERANK_TEST_MODE");
        let off = build_reranker(&RerankConfig::default());
        assert_eq!(off.name(), "disabled");
        assert!(!off.is_enabled());
        std::env::set_var("RERANK_TEST_MODE", "mock");
        let mock = build_reranker(&RerankConfig::default());
        assert_eq!(mock.name(), "mock");
        assert!(mock.is_enabled());
        std::env::remove_var("RERANK_TEST_MODE");
    }
}
