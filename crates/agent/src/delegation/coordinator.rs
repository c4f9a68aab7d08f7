//! Delegation coordinator — runs a hand-off from the conversational role.
//!
//! 1. Announce the hand-off
//! 2. Run the task in a nested loop on the target route's binding, under a
//!    synthetic session so the parent history stays clean
//! 3. Run a second nested loop on the CHAT binding that turns the result
//!    into the user's answer and may not delegate again
//! 4. If it delegates anyway, the raw result is used instead

use super::directive::{DelegationDirective, is_directive, select_coder};
use super::notice::{self, Phase};
use crate::binding::Bindings;
use crate::loop_runner::{AgentLoop, ProcessOptions, TurnStatus};
use chrono::Utc;
use concierge_core::error::Error;
use concierge_core::event::DomainEvent;
use concierge_core::message::{Message, Role};
use concierge_core::route::Route;
use std::sync::Arc;
use tracing::{info, warn};

pub const LOCAL_ONLY_DELEGATION_NOTICE: &str = "That needs one of the coder roles, which are off in local-only mode. \
Send /cloud to allow them, then ask again.";

/// Budgets for each nested loop.
#[derive(Debug, Clone)]
pub struct DelegationSettings {
    pub max_loops: u32,
    pub max_millis: u64,
}

impl Default for DelegationSettings {
    fn default() -> Self {
        Self {
            max_loops: 20,
            max_millis: 600_000,
        }
    }
}

/// Where the delegating turn came from.
#[derive(Debug, Clone)]
pub struct DelegationContext<'a> {
    pub session_key: &'a str,
    pub channel: &'a str,
    pub chat_id: &'a str,
    pub local_only: bool,
}

/// What the user gets back.
#[derive(Debug, Clone)]
pub struct DelegationOutcome {
    pub content: String,
    /// Route the task actually ran on
    pub route: Route,
    /// The finalizing call tried to delegate again and was overruled
    pub redelegation_suppressed: bool,
}

pub struct DelegationCoordinator {
    agent: Arc<AgentLoop>,
    bindings: Bindings,
    settings: DelegationSettings,
}

impl DelegationCoordinator {
    pub fn new(agent: Arc<AgentLoop>, bindings: Bindings, settings: DelegationSettings) -> Self {
        Self {
            agent,
            bindings,
            settings,
        }
    }

    /// Carry out `directive` for the turn described by `ctx`.
    pub async fn run(&self, ctx: &DelegationContext<'_>, directive: &DelegationDirective) -> Result<DelegationOutcome, Error> {
        let route = select_coder(directive.route, &directive.task);

        if route.is_coder() && ctx.local_only {
            info!(session = %ctx.session_key, route = %route, "Coder delegation refused in local-only mode");
            let content = LOCAL_ONLY_DELEGATION_NOTICE.to_string();
            self.replace_directive(ctx.session_key, &content).await?;
            return Ok(DelegationOutcome {
                content,
                route,
                redelegation_suppressed: false,
            });
        }

        info!(session = %ctx.session_key, route = %route, "Delegating task");
        let start = notice::render(ctx.session_key, Phase::Start, route, &directive.task);
        self.agent.publish(ctx.channel, ctx.chat_id, &start, None).await;
        self.agent.events().publish(DomainEvent::DelegationStarted {
            session: ctx.session_key.to_string(),
            route,
            timestamp: Utc::now(),
        });

        let stamp = Utc::now().timestamp_millis();
        let worker_key = format!("{}:delegate:{}:{stamp}", ctx.session_key, route.as_str());
        let finalize_key = format!("{}:finalize:{stamp}", ctx.session_key);

        let result = self
            .run_nested(ctx, route, directive, &worker_key, &finalize_key)
            .await;

        for key in [&worker_key, &finalize_key] {
            if let Err(e) = self.agent.sessions().remove(key).await {
                warn!(session = %key, error = %e, "Failed to remove delegation session");
            }
        }

        let outcome = result?;
        self.replace_directive(ctx.session_key, &outcome.content).await?;
        self.agent.events().publish(DomainEvent::DelegationCompleted {
            session: ctx.session_key.to_string(),
            route,
            redelegation_suppressed: outcome.redelegation_suppressed,
            timestamp: Utc::now(),
        });
        Ok(outcome)
    }

    async fn run_nested(
        &self,
        ctx: &DelegationContext<'_>,
        route: Route,
        directive: &DelegationDirective,
        worker_key: &str,
        finalize_key: &str,
    ) -> Result<DelegationOutcome, Error> {
        let worker = self
            .agent
            .process(
                &self.bindings.resolve(route, ctx.local_only),
                self.nested_options(ctx, worker_key, directive.task.clone()),
            )
            .await?;

        let prompt = finalize_prompt(route, &directive.task, &worker.content);
        let finalized = self
            .agent
            .process(
                &self.bindings.resolve(Route::Chat, ctx.local_only),
                self.nested_options(ctx, finalize_key, prompt),
            )
            .await?;

        if is_directive(&finalized.content) {
            warn!(session = %ctx.session_key, "Finalizer tried to delegate again; using the raw result");
            return Ok(DelegationOutcome {
                content: worker.content,
                route,
                redelegation_suppressed: true,
            });
        }

        let answer = if finalized.status == TurnStatus::Completed && !finalized.content.trim().is_empty() {
            finalized.content
        } else {
            worker.content
        };
        let done = notice::render(ctx.session_key, Phase::Done, route, &directive.task);
        Ok(DelegationOutcome {
            content: format!("{done}\n\n{answer}"),
            route,
            redelegation_suppressed: false,
        })
    }

    fn nested_options(&self, ctx: &DelegationContext<'_>, key: &str, text: String) -> ProcessOptions {
        let mut opts = ProcessOptions::new(key, ctx.channel, ctx.chat_id, text)
            .with_budget(self.settings.max_loops, self.settings.max_millis);
        opts.load_history = false;
        opts.trigger_summary = false;
        opts.publish_response = false;
        opts
    }

    /// Swap the parent's stored directive for the delivered answer, so later
    /// turns see what the user saw.
    async fn replace_directive(&self, session_key: &str, content: &str) -> Result<(), Error> {
        let sessions = self.agent.sessions();
        let mut history = sessions.history(session_key).await?;
        let Some(index) = history
            .iter()
            .rposition(|m| m.role == Role::Assistant && is_directive(&m.content))
        else {
            return Ok(());
        };
        history[index] = Message::assistant(content);
        sessions.set_history(session_key, history).await?;
        sessions.save(session_key).await?;
        Ok(())
    }
}

fn finalize_prompt(route: Route, task: &str, result: &str) -> String {
    format!(
        "[Delegation result]\n\
         The {role} finished the task you handed off.\n\n\
         Task:\n{task}\n\n\
         Result:\n{result}\n\n\
         Write the final answer for the user from this result. \
         Do not delegate again: never reply with DELEGATE: or TASK: lines.",
        role = route.role_name(),
    )
}
