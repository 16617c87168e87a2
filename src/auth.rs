use std::collections::HashSet;

use serde::Deserialize;
use teloxide::types::Message;

/// Set of telegram user ids allowed to use the bot.
///
/// An empty list leaves the bot open to everyone.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AllowList(HashSet<u64>);

impl AllowList {
    pub fn new<I: IntoIterator<Item = u64>>(ids: I) -> Self {
        Self(ids.into_iter().collect())
    }

    /// Parse ids separated by commas and/or whitespace.
    /// Tokens that are not numbers are skipped.
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split(|c: char| c == ',' || c.is_whitespace())
                .filter(|token| !token.is_empty())
                .filter_map(|token| token.parse::<u64>().ok())
                .collect(),
        )
    }

    pub fn is_open(&self) -> bool {
        self.0.is_empty()
    }

    pub fn permits(&self, user_id: u64) -> bool {
        self.is_open() || self.0.contains(&user_id)
    }

    /// Anonymous senders (channel posts) only pass an open list.
    pub fn permits_sender(&self, sender: Option<u64>) -> bool {
        match sender {
            Some(id) => self.permits(id),
            None => self.is_open(),
        }
    }

    pub fn permits_message(&self, msg: &Message) -> bool {
        self.permits_sender(msg.from.as_ref().map(|user| user.id.0))
    }

    pub fn sorted(&self) -> Vec<u64> {
        let mut ids: Vec<_> = self.0.iter().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl<'de> Deserialize<'de> for AllowList {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // accept both `[1, 2]` and `"1, 2"`
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            List(Vec<u64>),
            Text(String),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::List(ids) => Self::new(ids),
            Repr::Text(raw) => Self::parse(&raw),
        })
    }
}
