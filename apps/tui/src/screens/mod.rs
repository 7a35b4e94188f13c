//! TUI screen definitions.
//!
//! Each screen corresponds to a tab in the TUI and encapsulates its
//! own state and rendering logic.

mod browse;
mod chat;

use std::fmt;

pub(crate) use browse::BrowseScreen;
pub(crate) use chat::{ChatAction, ChatScreen};

/// Screen identifiers, in tab order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScreenId {
    Chat,
    Browse,
}

impl ScreenId {
    pub(crate) const ALL: [ScreenId; 2] = [ScreenId::Chat, ScreenId::Browse];
}

impl fmt::Display for ScreenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat => write!(f, "Chat"),
            Self::Browse => write!(f, "Browse Dataset"),
        }
    }
}
