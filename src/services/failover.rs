//! Model failover routing.
//!
//! Each primary model carries a deterministic, ordered fallback list.
//! A model that errors is held out for a cooldown; when no configured
//! fallback is available the whole registry is consulted, best quality
//! match first.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{ChatMessage, ChatOptions, ChatResponse, InferenceClient};

/// How long an errored model is held out of rotation.
pub const UNAVAILABILITY_HOLD: Duration = Duration::from_secs(300);

/// Registered model characteristics used for registry-wide fallback.
#[derive(Debug, Clone)]
pub struct ModelProfile {
    pub id: String,
    /// Relative quality score; fallback prefers the closest match.
    pub quality: u8,
    pub context_length: u32,
    /// Lower is preferred among otherwise equal candidates.
    pub priority: u32,
}

/// Observable record of one failover decision.
#[derive(Debug, Clone)]
pub struct FailoverEvent {
    pub primary: String,
    pub fallback: String,
    pub reason: String,
    pub success: bool,
    pub latency_ms: u64,
}

pub struct ModelFailover {
    registry: Vec<ModelProfile>,
    fallbacks: HashMap<String, Vec<String>>,
    unavailable_until: Mutex<HashMap<String, Instant>>,
    hold: Duration,
    events: broadcast::Sender<FailoverEvent>,
}

impl Default for ModelFailover {
    fn default() -> Self {
        Self::new(UNAVAILABILITY_HOLD)
    }
}

impl ModelFailover {
    pub fn new(hold: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            registry: Vec::new(),
            fallbacks: HashMap::new(),
            unavailable_until: Mutex::new(HashMap::new()),
            hold,
            events,
        }
    }

    pub fn register(&mut self, profile: ModelProfile) {
        self.registry.push(profile);
    }

    /// Configure the ordered fallback list for a primary.
    pub fn set_fallbacks(&mut self, primary: impl Into<String>, fallbacks: Vec<String>) {
        self.fallbacks.insert(primary.into(), fallbacks);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FailoverEvent> {
        self.events.subscribe()
    }

    /// Hold a model out of rotation for the configured cooldown.
    pub fn mark_unavailable(&self, model: &str) {
        self.unavailable_until
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(model.to_string(), Instant::now() + self.hold);
    }

    pub fn is_available(&self, model: &str) -> bool {
        let guard = self
            .unavailable_until
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.get(model).map_or(true, |&until| Instant::now() >= until)
    }

    /// The try-order for a primary: itself, then its configured
    /// fallbacks. The registry — sorted by quality closeness, context
    /// fitness (≥80% of the primary's), and priority — is consulted
    /// only when no configured fallback is available. Unavailable
    /// models are skipped; duplicates collapse to their first position.
    pub fn candidates(&self, primary: &str) -> Vec<String> {
        let mut ordered: Vec<String> = Vec::new();
        let mut push = |id: &str, ordered: &mut Vec<String>| {
            if self.is_available(id) && !ordered.iter().any(|o| o == id) {
                ordered.push(id.to_string());
            }
        };

        push(primary, &mut ordered);
        let mut configured_available = false;
        if let Some(configured) = self.fallbacks.get(primary) {
            for id in configured {
                let before = ordered.len();
                push(id, &mut ordered);
                if ordered.len() > before {
                    configured_available = true;
                }
            }
        }
        if configured_available {
            return ordered;
        }

        if let Some(profile) = self.registry.iter().find(|p| p.id == primary) {
            let min_context = (f64::from(profile.context_length) * 0.8) as u32;
            let mut rest: Vec<&ModelProfile> = self
                .registry
                .iter()
                .filter(|p| p.id != primary)
                .collect();
            rest.sort_by_key(|p| {
                (
                    p.quality.abs_diff(profile.quality),
                    p.context_length < min_context,
                    p.priority,
                )
            });
            for p in rest {
                push(&p.id, &mut ordered);
            }
        }

        ordered
    }

    /// Chat through the failover chain: each failing model is marked
    /// unavailable and the next candidate tried, with an event per
    /// switch.
    pub async fn chat_with_failover(
        &self,
        client: &dyn InferenceClient,
        primary: &str,
        messages: &[ChatMessage],
        mut options: ChatOptions,
    ) -> DomainResult<ChatResponse> {
        let candidates = self.candidates(primary);
        if candidates.is_empty() {
            return Err(DomainError::Degraded(format!(
                "no available model for primary {primary}"
            )));
        }

        let mut last_error: Option<DomainError> = None;
        for candidate in &candidates {
            options.model = Some(candidate.clone());
            let started = Instant::now();
            match client.chat(messages, options.clone()).await {
                Ok(response) => {
                    if candidate != primary {
                        let reason = last_error
                            .as_ref()
                            .map_or_else(|| "primary unavailable".to_string(), ToString::to_string);
                        info!(primary, fallback = %candidate, "model failover succeeded");
                        let _ = self.events.send(FailoverEvent {
                            primary: primary.to_string(),
                            fallback: candidate.clone(),
                            reason,
                            success: true,
                            latency_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                    return Ok(response);
                }
                Err(err) => {
                    warn!(model = %candidate, error = %err, "model call failed, holding out");
                    self.mark_unavailable(candidate);
                    if candidate != primary {
                        let _ = self.events.send(FailoverEvent {
                            primary: primary.to_string(),
                            fallback: candidate.clone(),
                            reason: err.to_string(),
                            success: false,
                            latency_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            DomainError::Degraded(format!("all candidates exhausted for {primary}"))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::ChatUsage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn profile(id: &str, quality: u8, context: u32, priority: u32) -> ModelProfile {
        ModelProfile {
            id: id.to_string(),
            quality,
            context_length: context,
            priority,
        }
    }

    fn router() -> ModelFailover {
        let mut failover = ModelFailover::default();
        failover.register(profile("frontier-large", 9, 200_000, 1));
        failover.register(profile("frontier-standard", 7, 200_000, 2));
        failover.register(profile("frontier-mini", 5, 100_000, 3));
        failover.register(profile("frontier-nano", 3, 16_000, 4));
        failover.set_fallbacks(
            "frontier-large",
            vec!["frontier-standard".to_string()],
        );
        failover
    }

    #[test]
    fn available_configured_fallbacks_keep_the_registry_out() {
        let failover = router();
        let candidates = failover.candidates("frontier-large");
        // Primary plus its configured fallback, nothing registry-wide.
        assert_eq!(candidates, vec!["frontier-large", "frontier-standard"]);
    }

    #[test]
    fn exhausted_configured_fallbacks_open_the_registry() {
        let failover = router();
        failover.mark_unavailable("frontier-standard");
        let candidates = failover.candidates("frontier-large");
        assert!(!candidates.contains(&"frontier-standard".to_string()));
        // With the configured list held out, the registry fills in by
        // quality closeness to the primary.
        assert_eq!(candidates, vec!["frontier-large", "frontier-mini", "frontier-nano"]);
    }

    #[test]
    fn registry_fallback_prefers_quality_then_context() {
        // frontier-standard has no configured fallback list at all.
        let failover = router();
        let candidates = failover.candidates("frontier-standard");
        // Closest quality to 7 is large (9, diff 2) and mini (5, diff 2);
        // large keeps full context, so it sorts first.
        assert_eq!(candidates[0], "frontier-standard");
        assert_eq!(candidates[1], "frontier-large");
        assert_eq!(candidates[2], "frontier-mini");
    }

    struct FlakyClient {
        calls: AtomicU32,
    }

    #[async_trait]
    impl InferenceClient for FlakyClient {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            options: ChatOptions,
        ) -> DomainResult<ChatResponse> {
            let model = options.model.unwrap_or_default();
            self.calls.fetch_add(1, Ordering::SeqCst);
            if model == "frontier-large" {
                Err(DomainError::Transient("overloaded".into()))
            } else {
                Ok(ChatResponse {
                    message: "ok".into(),
                    usage: ChatUsage { total_tokens: 10 },
                    model,
                })
            }
        }
    }

    #[tokio::test]
    async fn failing_primary_fails_over_with_event() {
        let failover = router();
        let mut events = failover.subscribe();
        let client = FlakyClient {
            calls: AtomicU32::new(0),
        };

        let response = failover
            .chat_with_failover(
                &client,
                "frontier-large",
                &[ChatMessage::user("hello")],
                ChatOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(response.model, "frontier-standard");
        assert!(!failover.is_available("frontier-large"));

        let event = events.try_recv().unwrap();
        assert_eq!(event.primary, "frontier-large");
        assert_eq!(event.fallback, "frontier-standard");
        assert!(event.success);
    }

    #[tokio::test]
    async fn all_candidates_down_surfaces_last_error() {
        struct DeadClient;
        #[async_trait]
        impl InferenceClient for DeadClient {
            async fn chat(
                &self,
                _messages: &[ChatMessage],
                _options: ChatOptions,
            ) -> DomainResult<ChatResponse> {
                Err(DomainError::Transient("endpoint down".into()))
            }
        }

        let failover = router();
        let err = failover
            .chat_with_failover(
                &DeadClient,
                "frontier-large",
                &[ChatMessage::user("hello")],
                ChatOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("endpoint down"));
    }
}
