use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    Intro,
    Prompt,
    Correction,
    Cancelled,
    Submitted,
    Summary,
    Evidence,
    Closing,
    Error,
    Feedback,
    Hint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub kind: ReplyKind,
    pub text: String,
}

/// Messages produced for the user during one operation, in emission order.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Outbox {
    replies: Vec<Reply>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: ReplyKind, text: impl Into<String>) {
        self.replies.push(Reply {
            kind,
            text: text.into(),
        });
    }

    pub fn replies(&self) -> &[Reply] {
        &self.replies
    }

    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }

    pub fn contains(&self, kind: ReplyKind) -> bool {
        self.replies.iter().any(|r| r.kind == kind)
    }
}
