use trinity_common::FromMessage;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("memory store failed: {0}")]
    Memory(#[from] trinity_memory::Error),

    #[error("transport failed: {0}")]
    Channel(#[from] trinity_channels::Error),

    #[error("{agent} agent failed: {source}")]
    Agent {
        agent: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn agent(agent: &'static str, source: anyhow::Error) -> Self {
        Self::Agent {
            agent,
            source: source.into(),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

trinity_common::impl_context!();
