//! Picks the one message of a batch the pipeline answers.

use {
    tracing::{debug, info, warn},
    trinity_agents::{Agent, AgentParams, ParamValue, param},
    trinity_common::Message,
};

#[cfg(feature = "metrics")]
use trinity_metrics::{counter, pipeline as pipeline_metrics};

use crate::parser::{ParseError, StructuredTextParser};

/// Field of the choose agent's reply holding the 0-based batch index.
pub const MESSAGE_ID_FIELD: &str = "message_id";

/// The message a run answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub index: usize,
    pub message: Message,
    /// The choose agent's answer was unusable and index 0 was taken.
    pub fallback: bool,
}

/// Why a choose reply could not be used.
#[derive(Debug, thiserror::Error)]
enum Rejection {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("no message_id field")]
    MissingField,
    #[error("message_id {0:?} is not a number")]
    NotANumber(String),
    #[error("message_id {0} is outside the batch")]
    OutOfRange(usize),
}

/// Select one message from a non-empty `batch`.
///
/// A single message is taken as is. Otherwise the choose agent sees the
/// formatted batch and answers with a `message_id`; any problem with that
/// answer falls back to the first message.
///
/// Returns `None` only for an empty batch.
pub async fn select_message(
    agent: &dyn Agent,
    parser: &dyn StructuredTextParser,
    batch: &[Message],
    formatted: &str,
) -> Option<Selection> {
    let first = batch.first()?;
    if batch.len() == 1 {
        return Some(Selection {
            index: 0,
            message: first.clone(),
            fallback: false,
        });
    }

    let params = AgentParams::new()
        .with(param::MESSAGES, ParamValue::text(formatted))
        .with(param::NEW_MESSAGES, ParamValue::text(formatted));

    let chosen = match agent.run(&params).await {
        Ok(reply) => match choose_index(parser, &reply, batch.len()) {
            Ok(index) => Some(index),
            Err(rejection) => {
                warn!(reason = %rejection, response = %reply, "choose reply unusable, using first message");
                None
            },
        },
        Err(e) => {
            warn!(error = %e, "choose agent failed, using first message");
            None
        },
    };

    let selection = match chosen {
        Some(index) => Selection {
            index,
            message: batch[index].clone(),
            fallback: false,
        },
        None => {
            #[cfg(feature = "metrics")]
            counter!(pipeline_metrics::SELECTION_FALLBACKS_TOTAL).increment(1);
            Selection {
                index: 0,
                message: first.clone(),
                fallback: true,
            }
        },
    };

    info!(
        index = selection.index,
        batch = batch.len(),
        author = %selection.message.author,
        "message selected"
    );
    debug!(content = %selection.message.content, "selected message content");
    Some(selection)
}

fn choose_index(
    parser: &dyn StructuredTextParser,
    reply: &str,
    len: usize,
) -> Result<usize, Rejection> {
    let fields = parser.parse(reply)?;
    let raw = fields
        .get(MESSAGE_ID_FIELD)
        .ok_or(Rejection::MissingField)?;
    let value = raw.trim().trim_start_matches('#');
    let index: usize = value
        .parse()
        .map_err(|_| Rejection::NotANumber(raw.to_string()))?;
    if index >= len {
        return Err(Rejection::OutOfRange(index));
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::parser::LabeledLineParser,
        async_trait::async_trait,
        rstest::rstest,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    struct FixedChoose {
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl FixedChoose {
        fn new(reply: Option<&'static str>) -> Self {
            Self {
                reply,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Agent for FixedChoose {
        fn name(&self) -> &str {
            "choose"
        }

        async fn run(&self, params: &AgentParams) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(params.get(param::MESSAGES).is_provided());
            self.reply
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("upstream timeout"))
        }
    }

    fn batch(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| Message::now(5, "general", format!("user{i}"), format!("message {i}")))
            .collect()
    }

    #[tokio::test]
    async fn single_message_skips_agent() {
        let agent = FixedChoose::new(Some("message_id: 3"));
        let sel = select_message(&agent, &LabeledLineParser, &batch(1), "ignored")
            .await
            .unwrap();
        assert_eq!(sel.index, 0);
        assert!(!sel.fallback);
        assert_eq!(agent.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_batch_selects_nothing() {
        let agent = FixedChoose::new(None);
        assert!(select_message(&agent, &LabeledLineParser, &[], "").await.is_none());
    }

    #[rstest]
    #[case(Some("message_id: 2"), 2, false)]
    #[case(Some("**message_id**: 1\nReason: direct question"), 1, false)]
    #[case(Some("message_id: #1"), 1, false)]
    #[case(Some("message_id: 9"), 0, true)]
    #[case(Some("message_id: the second one"), 0, true)]
    #[case(Some("I pick the second one"), 0, true)]
    #[case(Some("Reason: nothing to pick"), 0, true)]
    #[case(Some(""), 0, true)]
    #[case(None, 0, true)]
    #[tokio::test]
    async fn choose_reply_handling(
        #[case] reply: Option<&'static str>,
        #[case] index: usize,
        #[case] fallback: bool,
    ) {
        let agent = FixedChoose::new(reply);
        let messages = batch(3);
        let sel = select_message(&agent, &LabeledLineParser, &messages, "formatted")
            .await
            .unwrap();
        assert_eq!(agent.calls.load(Ordering::SeqCst), 1);
        assert_eq!(sel.index, index);
        assert_eq!(sel.fallback, fallback);
        assert_eq!(sel.message, messages[index]);
    }
}
