//! Requests and resolves human-in-the-loop decisions. Stateless beyond the
//! event log: `getPendingInteraction` is always derived by replay, never
//! kept in a separate in-memory table, so it survives a restart.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use seed_domain::error::{Error, Result};
use seed_domain::event::DomainEvent;
use seed_domain::interaction::{InteractionDisplay, InteractionKind, InteractionOption, PendingInteraction};
use seed_store::EventLog;

/// The resolution of a `UserInteractionRequested`.
#[derive(Debug, Clone)]
pub struct InteractionResponse {
    pub selected_option_id: Option<String>,
    pub input_value: Option<serde_json::Value>,
}

pub struct InteractionService {
    log: Arc<EventLog>,
}

impl InteractionService {
    pub fn new(log: Arc<EventLog>) -> Self {
        Self { log }
    }

    pub fn request(
        &self,
        task_id: &str,
        kind: InteractionKind,
        purpose: impl Into<String>,
        display: InteractionDisplay,
        options: Option<Vec<InteractionOption>>,
        deadline: Option<chrono::DateTime<Utc>>,
        author_actor_id: &str,
    ) -> Result<String> {
        let interaction_id = uuid::Uuid::new_v4().to_string();
        self.log.append(
            task_id,
            vec![DomainEvent::UserInteractionRequested {
                task_id: task_id.to_string(),
                interaction_id: interaction_id.clone(),
                kind,
                purpose: purpose.into(),
                display,
                options,
                deadline,
                author_actor_id: author_actor_id.to_string(),
            }],
        )?;
        Ok(interaction_id)
    }

    pub fn respond(
        &self,
        task_id: &str,
        interaction_id: &str,
        selected_option_id: Option<String>,
        input_value: Option<serde_json::Value>,
        author_actor_id: &str,
    ) -> Result<()> {
        self.log.append(
            task_id,
            vec![DomainEvent::UserInteractionResponded {
                task_id: task_id.to_string(),
                interaction_id: interaction_id.to_string(),
                selected_option_id,
                input_value,
                author_actor_id: author_actor_id.to_string(),
            }],
        )?;
        Ok(())
    }

    /// The latest request on `task_id`'s stream lacking a matching response.
    pub fn get_pending(&self, task_id: &str) -> Result<Option<PendingInteraction>> {
        let events = self.log.read_stream(task_id, 1)?;
        let mut pending: Option<PendingInteraction> = None;
        for stored in &events {
            match &stored.event {
                DomainEvent::UserInteractionRequested {
                    interaction_id,
                    kind,
                    purpose,
                    display,
                    options,
                    deadline,
                    ..
                } => {
                    pending = Some(PendingInteraction {
                        interaction_id: interaction_id.clone(),
                        task_id: task_id.to_string(),
                        kind: *kind,
                        purpose: purpose.clone(),
                        display: display.clone(),
                        options: options.clone(),
                        created_at: stored.created_at,
                        deadline: *deadline,
                    });
                }
                DomainEvent::UserInteractionResponded { interaction_id, .. } => {
                    if pending.as_ref().is_some_and(|p| &p.interaction_id == interaction_id) {
                        pending = None;
                    }
                }
                _ => {}
            }
        }
        Ok(pending)
    }

    /// The response for a specific interaction, if it has been answered.
    pub fn get_response(&self, task_id: &str, interaction_id: &str) -> Result<Option<InteractionResponse>> {
        let events = self.log.read_stream(task_id, 1)?;
        for stored in &events {
            if let DomainEvent::UserInteractionResponded {
                interaction_id: id,
                selected_option_id,
                input_value,
                ..
            } = &stored.event
            {
                if id == interaction_id {
                    return Ok(Some(InteractionResponse {
                        selected_option_id: selected_option_id.clone(),
                        input_value: input_value.clone(),
                    }));
                }
            }
        }
        Ok(None)
    }

    /// Blocks until `interaction_id` is answered or `deadline` elapses.
    /// Double-checks the log before and after subscribing so a response
    /// appended in the gap between the synchronous check and the
    /// subscription is never missed.
    pub async fn wait_for_response(
        &self,
        task_id: &str,
        interaction_id: &str,
        poll_interval: Duration,
        deadline: Option<Duration>,
    ) -> Result<InteractionResponse> {
        if let Some(resp) = self.get_response(task_id, interaction_id)? {
            return Ok(resp);
        }
        let mut rx = self.log.subscribe();
        if let Some(resp) = self.get_response(task_id, interaction_id)? {
            return Ok(resp);
        }

        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(stored) => {
                        if let DomainEvent::UserInteractionResponded {
                            interaction_id: id,
                            selected_option_id,
                            input_value,
                            ..
                        } = &stored.event
                        {
                            if stored.stream_id == task_id && id == interaction_id {
                                return InteractionResponse {
                                    selected_option_id: selected_option_id.clone(),
                                    input_value: input_value.clone(),
                                };
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                        if let Ok(Some(resp)) = self.get_response(task_id, interaction_id) {
                            return resp;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        tokio::time::sleep(poll_interval).await;
                    }
                }
            }
        };

        match deadline {
            Some(d) => tokio::time::timeout(d, wait)
                .await
                .map_err(|_| Error::Timeout(format!("interaction {interaction_id} on task {task_id} timed out"))),
            None => Ok(wait.await),
        }
    }
}
