//! moodgate: an intent-routed companion chat service.
//!
//! Each message is classified into one [`router::FlowLabel`], answered by the
//! matching handler in [`flows`], and returned either as one JSON body or as a
//! stream of frames. Mood observations are logged per user and summarised by
//! [`analytics`].

pub mod analytics;
pub mod flows;
pub mod generator;
pub mod handlers;
pub mod retrieval;
pub mod router;
pub mod server;
pub mod state;
pub mod utils;
