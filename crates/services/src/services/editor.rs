//! Orchestrates one AI edit: classify, extract, prompt, parse, apply,
//! fallback-retry, quota accounting.
//!
//! The patch is always applied against the original full document, never the
//! minimized fragment, so unaffected regions survive byte-for-byte.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use db::models::ai_usage::{hour_bucket, minutes_until_next_hour};
use editor::{EditScope, ProposedPatch};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    claude_api::{ClaudeApiClient, ClaudeApiError, Message},
    prompt,
    usage::{SqliteUsageStore, UsageStore, UsageStoreError},
};

/// Edits allowed per user per calendar hour.
pub const HOURLY_EDIT_LIMIT: i64 = 25;

const MODEL_CALL_TIMEOUT: Duration = Duration::from_secs(300);
const FULL_DOC_MAX_TOKENS: u32 = 8192;
const SCOPED_MAX_TOKENS: u32 = 4096;
const FALLBACK_MAX_TOKENS: u32 = 2048;

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("missing or invalid prompt")]
    InvalidPrompt,
    #[error("hourly edit limit reached")]
    QuotaExceeded { retry_after_minutes: i64 },
    #[error("the model did not return an applicable patch")]
    UnappliedPatch,
    #[error("the edit timed out; try a smaller request")]
    Timeout,
    #[error("claude api error: {0}")]
    Upstream(#[from] ClaudeApiError),
    #[error(transparent)]
    Usage(#[from] UsageStoreError),
}

/// Chat-completion provider seam; the production implementation is
/// [`ClaudeApiClient`].
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn complete_text(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        max_tokens: u32,
        stream: bool,
    ) -> Result<String, ClaudeApiError>;
}

#[async_trait]
impl ModelProvider for ClaudeApiClient {
    async fn complete_text(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        max_tokens: u32,
        stream: bool,
    ) -> Result<String, ClaudeApiError> {
        ClaudeApiClient::complete_text(self, messages, system, max_tokens, stream).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ImageRef {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// One edit request as posted by the in-browser editor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
pub struct EditRequest {
    pub prompt: String,
    pub html: String,
    pub css: String,
    pub js: String,
    pub images: Vec<ImageRef>,
    pub stream: bool,
    pub history: Vec<ChatTurn>,
    pub section_id: Option<String>,
}

/// Successful edit: the patched document plus remaining quota.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    pub html: String,
    pub edits_remaining: i64,
}

/// Service that runs the edit pipeline.
pub struct EditorService {
    model: Arc<dyn ModelProvider>,
    usage: Arc<dyn UsageStore>,
    model_timeout: Duration,
}

impl EditorService {
    /// Production wiring: Claude from the environment, usage in SQLite.
    pub fn new(pool: SqlitePool) -> Result<Self, ClaudeApiError> {
        let claude = ClaudeApiClient::from_env()?;
        Ok(Self::with_parts(
            Arc::new(claude),
            Arc::new(SqliteUsageStore::new(pool)),
        ))
    }

    pub fn with_parts(model: Arc<dyn ModelProvider>, usage: Arc<dyn UsageStore>) -> Self {
        Self {
            model,
            usage,
            model_timeout: MODEL_CALL_TIMEOUT,
        }
    }

    #[cfg(test)]
    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    /// Remaining quota for the user's current hour bucket.
    pub async fn edits_remaining(&self, user_id: Uuid) -> Result<i64, EditorError> {
        let count = self.usage.count(user_id, hour_bucket(Utc::now())).await?;
        Ok((HOURLY_EDIT_LIMIT - count).max(0))
    }

    /// Run one edit end to end. On success the usage counter is incremented;
    /// every failure leaves it untouched and the caller's document unchanged.
    pub async fn edit(
        &self,
        user_id: Uuid,
        request: &EditRequest,
    ) -> Result<EditOutcome, EditorError> {
        let prompt_text = request.prompt.trim();
        if prompt_text.is_empty() {
            return Err(EditorError::InvalidPrompt);
        }

        let now = Utc::now();
        let bucket = hour_bucket(now);
        let current_count = self.usage.count(user_id, bucket).await?;
        if current_count >= HOURLY_EDIT_LIMIT {
            return Err(EditorError::QuotaExceeded {
                retry_after_minutes: minutes_until_next_hour(now),
            });
        }

        let current_doc = editor::assemble(&request.html, &request.css, &request.js);

        let classification = editor::classify(prompt_text);
        let mut section_ids = classification.section_ids.clone();
        if let Some(hint) = request
            .section_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            if !section_ids.iter().any(|id| id == hint) {
                section_ids.insert(0, hint.to_string());
            }
        }

        let extracted = match classification.scope {
            EditScope::Full => None,
            scope => editor::extract_sections(&current_doc, &section_ids, scope),
        };

        info!(
            user_id = %user_id,
            scope = %classification.scope,
            section_ids = ?section_ids,
            minimized = extracted.is_some(),
            "Running AI edit"
        );

        let system = prompt::build_system_prompt(classification.scope, prompt_text);
        let max_tokens = if extracted.is_some() {
            SCOPED_MAX_TOKENS
        } else {
            FULL_DOC_MAX_TOKENS
        };

        let doc_payload = extracted
            .as_ref()
            .map(|ctx| ctx.context.as_str())
            .unwrap_or(&current_doc);
        let user_content = build_user_content(
            prompt_text,
            doc_payload,
            extracted.is_some(),
            &request.images,
        );

        let mut messages: Vec<Message> = request
            .history
            .iter()
            .map(|turn| Message {
                role: turn.role.clone(),
                content: turn.content.clone(),
            })
            .collect();
        messages.push(Message::user(user_content));

        let reply = self
            .call_model(messages, Some(system), max_tokens, request.stream)
            .await?;

        if let Some(html) = apply_reply(&current_doc, &reply) {
            return self.finish(user_id, bucket, html).await;
        }

        // One constrained retry for color-like requests only.
        if editor::is_color_request(prompt_text) {
            warn!(
                user_id = %user_id,
                reply_len = reply.len(),
                "Primary reply yielded no applicable patch, retrying with constrained color prompt"
            );
            let retry_content =
                build_user_content(prompt_text, &current_doc, false, &request.images);
            let retry_reply = self
                .call_model(
                    vec![Message::user(retry_content)],
                    Some(prompt::fallback_color_system()),
                    FALLBACK_MAX_TOKENS,
                    false,
                )
                .await?;
            if let Some(html) = apply_reply(&current_doc, &retry_reply) {
                return self.finish(user_id, bucket, html).await;
            }
        }

        warn!(
            user_id = %user_id,
            reply_len = reply.len(),
            reply_preview = %reply.chars().take(200).collect::<String>(),
            "AI edit failed: no recognizable patch"
        );
        Err(EditorError::UnappliedPatch)
    }

    async fn call_model(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        max_tokens: u32,
        stream: bool,
    ) -> Result<String, EditorError> {
        match tokio::time::timeout(
            self.model_timeout,
            self.model.complete_text(messages, system, max_tokens, stream),
        )
        .await
        {
            Ok(result) => Ok(result?),
            Err(_) => Err(EditorError::Timeout),
        }
    }

    async fn finish(
        &self,
        user_id: Uuid,
        bucket: chrono::DateTime<Utc>,
        html: String,
    ) -> Result<EditOutcome, EditorError> {
        let new_count = self.usage.increment(user_id, bucket).await?;
        Ok(EditOutcome {
            html,
            edits_remaining: (HOURLY_EDIT_LIMIT - new_count).max(0),
        })
    }
}

/// Shared parse-and-apply chain, identical for buffered and streamed
/// replies: targeted patch, then full-document replacement (with a
/// truncation guard), then bare CSS block. The first candidate that
/// applies wins.
fn apply_reply(current_doc: &str, reply: &str) -> Option<String> {
    for candidate in editor::parse_reply(reply) {
        let patched = match candidate {
            ProposedPatch::Replace { before, after } => {
                editor::apply_patch(current_doc, &before, &after)
            }
            // A reply drastically smaller than the page is a truncated
            // fragment masquerading as a full replacement.
            ProposedPatch::FullDocument(full) => {
                (full.len() * 2 >= current_doc.len()).then_some(full)
            }
            ProposedPatch::CssBlock(css) => editor::apply_css_block(current_doc, &css),
        };
        if patched.is_some() {
            return patched;
        }
    }
    None
}

fn build_user_content(
    prompt_text: &str,
    doc_payload: &str,
    minimized: bool,
    images: &[ImageRef],
) -> String {
    let intro = if minimized {
        "Here are the relevant parts of the current HTML document:"
    } else {
        "Here is the current HTML document:"
    };

    let mut content = format!("{intro}\n\n{doc_payload}");

    if !images.is_empty() {
        let list = images
            .iter()
            .map(|img| format!("  - \"{}\" -> {}", img.name, img.url))
            .collect::<Vec<_>>()
            .join("\n");
        content.push_str(&format!(
            "\n\nThe user has uploaded these images. When they mention an image by name, use the matching URL as the <img src>:\n{list}"
        ));
    }

    content.push_str(&format!("\n\nUser request: {prompt_text}"));
    content
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use super::*;
    use crate::services::usage::InMemoryUsageStore;

    /// Captured arguments of one model call.
    #[derive(Debug, Clone)]
    struct SeenCall {
        messages: Vec<Message>,
        user_content: String,
        system: String,
        max_tokens: u32,
    }

    /// Model fake returning scripted replies in order.
    struct ScriptedModel {
        replies: Mutex<VecDeque<String>>,
        calls: AtomicUsize,
        seen: Mutex<Vec<SeenCall>>,
        delay: Option<Duration>,
    }

    impl ScriptedModel {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                delay: None,
            }
        }

        fn slow(reply: &str, delay: Duration) -> Self {
            let mut model = Self::new(&[reply]);
            model.delay = Some(delay);
            model
        }
    }

    #[async_trait]
    impl ModelProvider for ScriptedModel {
        async fn complete_text(
            &self,
            messages: Vec<Message>,
            system: Option<String>,
            max_tokens: u32,
            _stream: bool,
        ) -> Result<String, ClaudeApiError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(SeenCall {
                user_content: messages.last().map(|m| m.content.clone()).unwrap_or_default(),
                messages,
                system: system.unwrap_or_default(),
                max_tokens,
            });
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ClaudeApiError::Transport("no scripted reply".into()))
        }
    }

    fn service(model: Arc<ScriptedModel>, usage: Arc<InMemoryUsageStore>) -> EditorService {
        EditorService::with_parts(model, usage)
    }

    fn hero_doc() -> String {
        "<!DOCTYPE html>\n<html>\n<head><style>:root { --primary: #001B2E; }</style></head>\n<body>\n<div id=\"hero\">OLD</div>\n</body>\n</html>".to_string()
    }

    fn request(prompt: &str, html: String) -> EditRequest {
        EditRequest {
            prompt: prompt.to_string(),
            html,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn before_after_reply_patches_document() {
        let reply = "BEFORE:\n```html\n<div id=\"hero\">OLD</div>\n```\nAFTER:\n```html\n<div id=\"hero\">NEW</div>\n```";
        let model = Arc::new(ScriptedModel::new(&[reply]));
        let usage = Arc::new(InMemoryUsageStore::default());
        let svc = service(model.clone(), usage);

        let outcome = svc
            .edit(Uuid::new_v4(), &request("update the hero text", hero_doc()))
            .await
            .unwrap();

        assert!(outcome.html.contains("<div id=\"hero\">NEW</div>"));
        assert!(!outcome.html.contains("OLD"));
        assert_eq!(outcome.edits_remaining, HOURLY_EDIT_LIMIT - 1);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected_without_model_call() {
        let model = Arc::new(ScriptedModel::new(&[]));
        let svc = service(model.clone(), Arc::new(InMemoryUsageStore::default()));

        let err = svc
            .edit(Uuid::new_v4(), &request("   ", hero_doc()))
            .await
            .unwrap_err();

        assert!(matches!(err, EditorError::InvalidPrompt));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn quota_exceeded_reports_retry_after() {
        let user = Uuid::new_v4();
        let usage = Arc::new(InMemoryUsageStore::with_count(
            user,
            hour_bucket(Utc::now()),
            HOURLY_EDIT_LIMIT,
        ));
        let model = Arc::new(ScriptedModel::new(&[]));
        let svc = service(model.clone(), usage);

        let err = svc
            .edit(user, &request("change the color to navy", hero_doc()))
            .await
            .unwrap_err();

        match err {
            EditorError::QuotaExceeded { retry_after_minutes } => {
                assert!(retry_after_minutes >= 1);
                assert!(retry_after_minutes <= 60);
            }
            other => panic!("expected quota error, got {other:?}"),
        }
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unparseable_reply_fails_without_touching_usage() {
        let model = Arc::new(ScriptedModel::new(&["I cannot help with that."]));
        let usage = Arc::new(InMemoryUsageStore::default());
        let user = Uuid::new_v4();
        let svc = service(model.clone(), usage.clone());

        let err = svc
            .edit(user, &request("rewrite the hero copy", hero_doc()))
            .await
            .unwrap_err();

        assert!(matches!(err, EditorError::UnappliedPatch));
        // Not a color request: exactly one call, no fallback.
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            usage.count(user, hour_bucket(Utc::now())).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn color_request_gets_one_fallback_retry() {
        let good =
            "BEFORE:\n```css\n:root { --primary: #001B2E; }\n```\nAFTER:\n```css\n:root { --primary: #294C60; }\n```";
        let model = Arc::new(ScriptedModel::new(&["no patch here", good]));
        let usage = Arc::new(InMemoryUsageStore::default());
        let user = Uuid::new_v4();
        let svc = service(model.clone(), usage.clone());

        let outcome = svc
            .edit(user, &request("change the primary color", hero_doc()))
            .await
            .unwrap();

        assert!(outcome.html.contains("#294C60"));
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            usage.count(user, hour_bucket(Utc::now())).await.unwrap(),
            1
        );
        // The retry used the constrained prompt and smaller budget.
        let seen = model.seen.lock().unwrap();
        assert!(seen[1].system.contains("EXACTLY one BEFORE/AFTER patch"));
        assert_eq!(seen[1].max_tokens, FALLBACK_MAX_TOKENS);
    }

    #[tokio::test]
    async fn truncated_full_document_is_rejected() {
        // A "full document" one tenth the size of the page must not replace it.
        let big_body = "<p>content</p>\n".repeat(100);
        let doc = format!("<!DOCTYPE html><html><body>{big_body}</body></html>");
        let reply = "```html\n<!DOCTYPE html><html><body>tiny</body></html>\n```";
        let model = Arc::new(ScriptedModel::new(&[reply]));
        let svc = service(model, Arc::new(InMemoryUsageStore::default()));

        let err = svc
            .edit(Uuid::new_v4(), &request("restructure the page", doc))
            .await
            .unwrap_err();
        assert!(matches!(err, EditorError::UnappliedPatch));
    }

    #[tokio::test]
    async fn section_scope_sends_minimized_context() {
        let doc = "<!DOCTYPE html>\n<html><head><style>:root { --primary: #111; }</style></head>\n<body>\n<section id=\"services\"><h2>Services</h2></section>\n<div id=\"other\">untouched</div>\n</body></html>".to_string();
        let reply = "BEFORE:\n```html\n<section id=\"services\"><h2>Services</h2></section>\n```\nAFTER:\n```html\n<section id=\"services\"><h2>What we do</h2></section>\n```";
        let model = Arc::new(ScriptedModel::new(&[reply]));
        let svc = service(model.clone(), Arc::new(InMemoryUsageStore::default()));

        let outcome = svc
            .edit(
                Uuid::new_v4(),
                &request("rename the services heading", doc),
            )
            .await
            .unwrap();

        assert!(outcome.html.contains("What we do"));
        assert!(outcome.html.contains("<div id=\"other\">untouched</div>"));

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].max_tokens, SCOPED_MAX_TOKENS);
        assert!(seen[0].user_content.contains("/* Section: services */"));
        assert!(!seen[0].user_content.contains("id=\"other\""));
    }

    #[tokio::test]
    async fn section_hint_is_prepended() {
        let doc = hero_doc().replace(
            "<div id=\"hero\">OLD</div>",
            "<div id=\"hero\">OLD</div><section id=\"pricing\"><p>cheap</p></section>",
        );
        let reply = "BEFORE:\n```html\n<section id=\"pricing\"><p>cheap</p></section>\n```\nAFTER:\n```html\n<section id=\"pricing\"><p>fair</p></section>\n```";
        let model = Arc::new(ScriptedModel::new(&[reply]));
        let svc = service(model.clone(), Arc::new(InMemoryUsageStore::default()));

        let mut req = request("make the colors here warmer", doc);
        req.section_id = Some("pricing".to_string());
        let outcome = svc.edit(Uuid::new_v4(), &req).await.unwrap();
        assert!(outcome.html.contains("fair"));

        // Color scope plus the hint: the minimized context carries the
        // hinted section even though no section keyword was in the prompt.
        let seen = model.seen.lock().unwrap();
        assert!(seen[0].user_content.contains("/* Section: pricing */"));
    }

    #[tokio::test]
    async fn history_turns_precede_the_user_message() {
        let reply = "BEFORE:\n```html\n<div id=\"hero\">OLD</div>\n```\nAFTER:\n```html\n<div id=\"hero\">BOLDER</div>\n```";
        let model = Arc::new(ScriptedModel::new(&[reply]));
        let svc = service(model.clone(), Arc::new(InMemoryUsageStore::default()));

        let mut req = request("make it bolder still", hero_doc());
        req.history = vec![
            ChatTurn {
                role: "user".to_string(),
                content: "make the hero text bold".to_string(),
            },
            ChatTurn {
                role: "assistant".to_string(),
                content: "Done, the hero heading is now bold.".to_string(),
            },
        ];
        svc.edit(Uuid::new_v4(), &req).await.unwrap();

        let seen = model.seen.lock().unwrap();
        let messages = &seen[0].messages;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[0].content, "make the hero text bold");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[1].content, "Done, the hero heading is now bold.");
        assert_eq!(messages[2].role, "user");
        assert!(messages[2].content.contains("User request: make it bolder still"));
    }

    #[tokio::test]
    async fn uploaded_images_are_listed_in_user_content() {
        let reply = "BEFORE:\n```html\n<div id=\"hero\">OLD</div>\n```\nAFTER:\n```html\n<div id=\"hero\"><img src=\"/uploads/team.jpg\" alt=\"team\" /></div>\n```";
        let model = Arc::new(ScriptedModel::new(&[reply]));
        let svc = service(model.clone(), Arc::new(InMemoryUsageStore::default()));

        let mut req = request("put the team photo in the hero", hero_doc());
        req.images = vec![
            ImageRef {
                name: "team.jpg".to_string(),
                url: "/uploads/team.jpg".to_string(),
            },
            ImageRef {
                name: "logo.png".to_string(),
                url: "/uploads/logo.png".to_string(),
            },
        ];
        let outcome = svc.edit(Uuid::new_v4(), &req).await.unwrap();
        assert!(outcome.html.contains("/uploads/team.jpg"));

        let seen = model.seen.lock().unwrap();
        assert!(seen[0].user_content.contains("uploaded these images"));
        assert!(seen[0].user_content.contains("\"team.jpg\" -> /uploads/team.jpg"));
        assert!(seen[0].user_content.contains("\"logo.png\" -> /uploads/logo.png"));
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let model = Arc::new(ScriptedModel::slow("late", Duration::from_millis(200)));
        let svc = service(model, Arc::new(InMemoryUsageStore::default()))
            .with_timeout(Duration::from_millis(10));

        let err = svc
            .edit(Uuid::new_v4(), &request("anything at all", hero_doc()))
            .await
            .unwrap_err();
        assert!(matches!(err, EditorError::Timeout));
    }

    #[tokio::test]
    async fn edits_remaining_never_negative() {
        let user = Uuid::new_v4();
        let usage = Arc::new(InMemoryUsageStore::with_count(
            user,
            hour_bucket(Utc::now()),
            HOURLY_EDIT_LIMIT + 5,
        ));
        let svc = service(Arc::new(ScriptedModel::new(&[])), usage);
        assert_eq!(svc.edits_remaining(user).await.unwrap(), 0);
    }
}
