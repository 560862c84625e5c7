//! Chat assistant: turns the session's portfolios and investor profile into
//! an instruction block and forwards the conversation to a chat-completion
//! service.

use crate::conversation::{ChatMessage, ConversationStore, Role};
use crate::error::CompletionError;
use crate::portfolio::Portfolio;
use crate::profile::{Choice, InvestorProfile};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Prefix of every reply produced from a failed completion.
pub const ERROR_MARKER: &str = "⚠️";

const INSTRUCTION_PREAMBLE: &str =
    "You are a financial advisor assistant. Use the investor profile below and portfolio data to answer.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl WireMessage {
    fn new(role: Role, content: &str) -> WireMessage {
        WireMessage {
            role,
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub temperature: f32,
    /// Number of choices; always one.
    pub n: u32,
}

#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    api_key_env: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ResponseChoice>,
}

#[derive(Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiClient {
    /// `api_key` is read once at startup; a missing key only fails when a
    /// request is made.
    pub fn new(api_base: &str, api_key: Option<String>, api_key_env: &str) -> OpenAiClient {
        OpenAiClient {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            api_key_env: api_key_env.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

fn truncate(body: &str, max: usize) -> &str {
    match body.char_indices().nth(max) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

fn classify_status(status: u16, body: &str) -> CompletionError {
    let lower = body.to_lowercase();
    let message = truncate(body, 200).to_string();

    match status {
        429 if lower.contains("quota") || lower.contains("billing") => {
            CompletionError::QuotaExceeded(message)
        }
        429 => CompletionError::RateLimited(message),
        401 | 403 => CompletionError::Unauthorized(message),
        500..=599 => CompletionError::Server { status, message },
        _ => CompletionError::Rejected { status, message },
    }
}

fn extract_reply(body: &str) -> Result<String, CompletionError> {
    let data: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::MalformedResponse(e.to_string()))?;

    data.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| CompletionError::MalformedResponse("response has no content".to_string()))
}

#[async_trait]
impl ChatCompletion for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CompletionError::MissingApiKey(self.api_key_env.clone()))?;

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &body));
        }
        extract_reply(&body)
    }
}

/// All portfolios as one text block, each introduced by its name.
pub fn portfolio_block(portfolios: &[Portfolio]) -> String {
    portfolios
        .iter()
        .map(|p| format!("\n{} Portfolio:\n{}", p.name, p.to_prompt_text()))
        .collect()
}

pub fn instruction(profile: &InvestorProfile, portfolios: &[Portfolio]) -> String {
    format!(
        "{INSTRUCTION_PREAMBLE}\n\nRisk: {}\nTax Sensitivity: {}\nHorizon: {}\n\nUser Portfolio Data:\n{}",
        profile.risk.as_str(),
        profile.tax.as_str(),
        profile.horizon.as_str(),
        portfolio_block(portfolios)
    )
}

pub struct Assistant {
    service: Arc<dyn ChatCompletion>,
    model: String,
    temperature: f32,
}

impl Assistant {
    pub fn new(service: Arc<dyn ChatCompletion>, model: &str, temperature: f32) -> Assistant {
        Assistant {
            service,
            model: model.to_string(),
            temperature,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// [instruction, ...history, new user message]
    pub fn build_request(
        &self,
        profile: &InvestorProfile,
        portfolios: &[Portfolio],
        history: &[ChatMessage],
        user_text: &str,
    ) -> CompletionRequest {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(WireMessage::new(
            Role::System,
            &instruction(profile, portfolios),
        ));
        messages.extend(
            history
                .iter()
                .map(|m| WireMessage::new(m.role, &m.content)),
        );
        messages.push(WireMessage::new(Role::User, user_text));

        CompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            n: 1,
        }
    }

    /// Send the request; any failure becomes a visible error reply.
    pub async fn reply(&self, request: &CompletionRequest) -> String {
        match self.service.complete(request).await {
            Ok(reply) => {
                tracing::info!(model = %request.model, "received assistant reply");
                reply
            }
            Err(e) => {
                tracing::warn!(kind = ?e.kind(), error = %e, "chat completion failed");
                format!("{ERROR_MARKER} Error from assistant: {e}")
            }
        }
    }

    /// Ask a question in `context`, then store the question and the reply.
    pub async fn submit(
        &self,
        profile: &InvestorProfile,
        portfolios: &[Portfolio],
        store: &mut ConversationStore,
        context: &str,
        user_text: &str,
    ) -> ChatMessage {
        let request = self.build_request(profile, portfolios, store.get(context), user_text);
        tracing::debug!(
            context,
            messages = request.messages.len(),
            "sending chat completion request"
        );
        let reply = ChatMessage::assistant(&self.reply(&request).await);

        store.append(context, ChatMessage::user(user_text));
        store.append(context, reply.clone());
        reply
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::loader::interactive_brokers_trust;
    use crate::position::Position;
    use crate::profile::RiskTolerance;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned results and records every request it receives.
    #[derive(Default)]
    pub(crate) struct ScriptedService {
        results: Mutex<VecDeque<Result<String, CompletionError>>>,
        pub(crate) requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedService {
        pub(crate) fn with(results: Vec<Result<String, CompletionError>>) -> Arc<ScriptedService> {
            Arc::new(ScriptedService {
                results: Mutex::new(results.into()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatCompletion for ScriptedService {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
            self.requests.lock().unwrap().push(request.clone());
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("ok".to_string()))
        }
    }

    fn portfolios() -> Vec<Portfolio> {
        vec![
            Portfolio::with_positions("Uploaded CSV", vec![Position::new("XYZ", 4.0, 10.0, 12.0)]),
            interactive_brokers_trust(),
        ]
    }

    #[test]
    fn test_instruction_contains_profile_and_portfolios() {
        let text = instruction(&InvestorProfile::default(), &portfolios());

        assert!(text.starts_with(INSTRUCTION_PREAMBLE));
        assert!(text.contains("Risk: moderate\nTax Sensitivity: moderate\nHorizon: medium"));
        assert!(text.contains("\nUploaded CSV Portfolio:\n"));
        assert!(text.contains("\nInteractive Brokers Trust Portfolio:\n"));
        assert!(text.contains("XYZ"));
        assert!(text.contains("USNQX"));
    }

    #[test]
    fn test_build_request_ordering() {
        let assistant = Assistant::new(ScriptedService::with(vec![]), "gpt-4", 0.3);
        let history = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")];
        let request =
            assistant.build_request(&InvestorProfile::default(), &portfolios(), &history, "why?");

        assert_eq!(request.model, "gpt-4");
        assert_eq!(request.n, 1);
        assert!((request.temperature - 0.3).abs() < f32::EPSILON);
        let roles: Vec<Role> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(request.messages[3].content, "why?");
    }

    #[test]
    fn test_request_wire_format() {
        let assistant = Assistant::new(ScriptedService::with(vec![]), "gpt-4", 0.5);
        let request = assistant.build_request(&InvestorProfile::default(), &[], &[], "hello");
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "gpt-4");
        assert_eq!(json["n"], 1);
        assert_eq!(json["temperature"], 0.5);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "hello");
    }

    #[tokio::test]
    async fn test_submit_appends_question_and_reply() {
        let service = ScriptedService::with(vec![Ok("Hold.".to_string())]);
        let assistant = Assistant::new(service.clone(), "gpt-4", 0.3);
        let mut store = ConversationStore::new();
        store.append("Interactive Brokers Trust", ChatMessage::user("earlier"));
        store.append("Interactive Brokers Trust", ChatMessage::assistant("earlier reply"));

        let reply = assistant
            .submit(
                &InvestorProfile::default(),
                &portfolios(),
                &mut store,
                "Interactive Brokers Trust",
                "Sell NVDA?",
            )
            .await;

        assert_eq!(reply.content, "Hold.");
        let history = store.get("Interactive Brokers Trust");
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "earlier");
        assert_eq!(history[2].role, Role::User);
        assert_eq!(history[2].content, "Sell NVDA?");
        assert_eq!(history[3].role, Role::Assistant);
        assert_eq!(history[3].content, "Hold.");

        let requests = service.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages.len(), 4);
    }

    #[tokio::test]
    async fn test_failure_becomes_visible_reply() {
        let service = ScriptedService::with(vec![Err(CompletionError::Network(
            "connection refused".to_string(),
        ))]);
        let assistant = Assistant::new(service, "gpt-4", 0.3);
        let mut store = ConversationStore::new();

        let reply = assistant
            .submit(&InvestorProfile::default(), &portfolios(), &mut store, "ctx", "hello?")
            .await;

        assert!(reply.content.starts_with(ERROR_MARKER));
        assert!(reply.content.contains("connection refused"));
        let history = store.get("ctx");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "hello?");
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, reply.content);
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_at_request_time() {
        let client = OpenAiClient::new("http://127.0.0.1:9", None, "OPENAI_API_KEY");
        let assistant = Assistant::new(Arc::new(client), "gpt-4", 0.3);
        let request = assistant.build_request(&InvestorProfile::default(), &[], &[], "hi");

        let reply = assistant.reply(&request).await;
        assert!(reply.starts_with(ERROR_MARKER));
        assert!(reply.contains("OPENAI_API_KEY"));
    }

    #[tokio::test]
    async fn test_profile_change_only_affects_next_instruction() {
        let service = ScriptedService::with(vec![]);
        let assistant = Assistant::new(service.clone(), "gpt-4", 0.3);
        let mut store = ConversationStore::new();
        let mut profile = InvestorProfile::default();

        assistant
            .submit(&profile, &portfolios(), &mut store, "ctx", "first")
            .await;
        let stored: Vec<ChatMessage> = store.get("ctx").to_vec();

        profile.risk = RiskTolerance::Aggressive;
        assert_eq!(store.get("ctx"), stored.as_slice());

        assistant
            .submit(&profile, &portfolios(), &mut store, "ctx", "second")
            .await;
        assert_eq!(&store.get("ctx")[..2], stored.as_slice());

        let requests = service.requests.lock().unwrap();
        assert!(requests[0].messages[0].content.contains("Risk: moderate"));
        assert!(requests[1].messages[0].content.contains("Risk: aggressive"));
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(429, r#"{"error":{"message":"You exceeded your current quota"}}"#),
            CompletionError::QuotaExceeded(_)
        ));
        assert!(matches!(
            classify_status(429, "slow down"),
            CompletionError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(401, "bad key"),
            CompletionError::Unauthorized(_)
        ));
        assert!(matches!(
            classify_status(502, "bad gateway"),
            CompletionError::Server { status: 502, .. }
        ));
        assert!(matches!(
            classify_status(400, "bad request"),
            CompletionError::Rejected { status: 400, .. }
        ));
    }

    #[test]
    fn test_extract_reply() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"Diversify."}}]}"#;
        assert_eq!(extract_reply(body).unwrap(), "Diversify.");

        assert!(matches!(
            extract_reply(r#"{"choices":[]}"#),
            Err(CompletionError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_reply("<html>"),
            Err(CompletionError::MalformedResponse(_))
        ));
    }
}
