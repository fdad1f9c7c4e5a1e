pub mod scripted;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use scripted::{ScriptedBackend, ScriptedReply};

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;
