//! Acting on the reflection stage: reply, stay quiet, or revise the reply.

use {
    tracing::{info, warn},
    trinity_agents::{Agent, AgentParams, ParamValue, param},
    trinity_channels::{ChannelOutbound, ChannelReplyTarget},
    trinity_memory::{MemoryRecord, MemoryStore},
};

use crate::{
    Error, Result,
    cognition::{CognitionState, Stage},
    pipeline::{RunContext, field},
};

const RESPOND: &str = "respond";
const NOTHING: &str = "nothing";

/// What reflection asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Send the generated reply.
    Respond,
    /// Send the placeholder and remember why.
    Suppress { reason: Option<String> },
    /// Regenerate with reflection's feedback and send that instead.
    Revise { choice: String },
    /// Reflection did not parse or gave no `Choice`.
    NoAction,
}

impl Decision {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Respond => "respond",
            Self::Suppress { .. } => "suppress",
            Self::Revise { .. } => "revise",
            Self::NoAction => "no_action",
        }
    }
}

/// Read the decision off a finished run.
///
/// `Choice` must be exactly `respond` or `nothing` after trimming whitespace.
/// Any other value is feedback for a revision.
pub fn decide(state: &CognitionState) -> Decision {
    let Some(choice) = state.field(Stage::Reflection, field::CHOICE) else {
        return Decision::NoAction;
    };
    match choice.trim() {
        RESPOND => Decision::Respond,
        NOTHING => Decision::Suppress {
            reason: state
                .field(Stage::Reflection, field::REASON)
                .map(str::to_string),
        },
        other => Decision::Revise {
            choice: other.to_string(),
        },
    }
}

/// What a decision did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Action {
    /// Text sent to the channel.
    pub sent: Option<String>,
    /// A memory record was written for the run.
    pub persisted: bool,
}

/// Carries out a [`Decision`] against the transport and memory.
pub struct ReflectionDecisionEngine<'a> {
    pub generate: &'a dyn Agent,
    pub outbound: &'a dyn ChannelOutbound,
    pub memory: &'a dyn MemoryStore,
    pub placeholder: &'a str,
}

impl ReflectionDecisionEngine<'_> {
    pub async fn execute(
        &self,
        decision: &Decision,
        run: &RunContext,
        state: &mut CognitionState,
    ) -> Result<Action> {
        let target = ChannelReplyTarget::from(&run.selection.message);

        let action = match decision {
            Decision::NoAction => {
                warn!(
                    reflection = state.raw(Stage::Reflection).unwrap_or_default(),
                    "reflection gave no usable choice, nothing sent"
                );
                return Ok(Action::default());
            },
            Decision::Respond => {
                let text = state.raw(Stage::Generate).unwrap_or_default().to_string();
                self.reply(&target, text, run, state).await?
            },
            Decision::Suppress { reason } => {
                let reason = reason.clone().unwrap_or_default();
                info!(reason = %reason, "choosing not to respond");
                let sent = if self.placeholder.is_empty() {
                    None
                } else {
                    self.outbound.send_text(&target, self.placeholder).await?;
                    Some(self.placeholder.to_string())
                };
                self.persist(run, state, reason, false).await?;
                Action {
                    sent,
                    persisted: true,
                }
            },
            Decision::Revise { choice } => {
                info!(choice = %choice, "revising response");
                let params = revise_params(run, state);
                let text = self
                    .generate
                    .run(&params)
                    .await
                    .map_err(|e| Error::agent("generate", e))?;
                info!(response = %text, "sending revised response");
                self.reply(&target, text, run, state).await?
            },
        };

        state.clear_memories();
        self.memory.flush().await?;
        Ok(action)
    }

    async fn reply(
        &self,
        target: &ChannelReplyTarget,
        text: String,
        run: &RunContext,
        state: &CognitionState,
    ) -> Result<Action> {
        if text.trim().is_empty() {
            warn!("no response text to send");
            self.persist(run, state, String::new(), false).await?;
            return Ok(Action {
                sent: None,
                persisted: true,
            });
        }
        self.outbound.send_text(target, &text).await?;
        self.persist(run, state, text.clone(), true).await?;
        Ok(Action {
            sent: Some(text),
            persisted: true,
        })
    }

    async fn persist(
        &self,
        run: &RunContext,
        state: &CognitionState,
        response: String,
        replied: bool,
    ) -> Result<()> {
        self.memory
            .persist(MemoryRecord {
                batch: run.batch.clone(),
                selection_index: run.selection.index,
                cognition: state.snapshot(),
                response,
                replied,
            })
            .await?;
        Ok(())
    }
}

/// Parameters for a revised generate call: the original message and batch,
/// the first draft, and reflection's own reading with its reason as feedback.
pub fn revise_params(run: &RunContext, state: &CognitionState) -> AgentParams {
    let reflection = |label| ParamValue::opt_text(state.field(Stage::Reflection, label));
    AgentParams::new()
        .with(
            param::USER_MESSAGE,
            ParamValue::text(&run.selection.message.content),
        )
        .with(param::NEW_MESSAGES, ParamValue::text(&run.formatted))
        .with(
            param::RESPONSE,
            ParamValue::opt_text(state.raw(Stage::Generate)),
        )
        .with(param::MEMORIES, ParamValue::list(state.memories().to_vec()))
        .with(param::EMOTION, reflection(field::EMOTION))
        .with(param::REASON, reflection(field::REASON))
        .with(param::THOUGHT, reflection(field::INNER_THOUGHT))
        .with(param::WHAT, reflection(field::WHAT))
        .with(param::WHY, reflection(field::WHY))
        .with(param::FEEDBACK, reflection(field::REASON))
}
