//! Query resolution pipeline and conversation session for medinfo.
//!
//! This crate ties the dataset and the remote model tiers together into the
//! tiered [`resolver`], wraps it in a per-user [`session`], and builds the
//! production wiring from config in [`bootstrap`].

pub mod bootstrap;
pub mod resolver;
pub mod session;

pub use bootstrap::{DefaultResolver, build_resolver};
pub use resolver::{
    AnswerSource, FAREWELL_MESSAGE, Resolution, ResolveProgress, Resolver, ResolverOptions,
    SilentProgress, Tier, UserInput, classify_input,
};
pub use session::{ConversationSession, TurnOutcome};
