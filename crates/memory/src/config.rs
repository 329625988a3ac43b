/// Options shared by every memory store.
#[derive(Debug, Clone)]
pub struct MemoryOptions {
    /// Author name stored on the bot's own replies.
    pub bot_name: String,
    /// Maximum number of entries rendered by a history fetch.
    pub history_limit: usize,
    /// Maximum number of snippets returned by a recall.
    pub recall_limit: usize,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            bot_name: "Trinity".into(),
            history_limit: 20,
            recall_limit: 5,
        }
    }
}
