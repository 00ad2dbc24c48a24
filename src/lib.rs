mod client;
pub mod config;
pub mod error;
pub mod history;
pub mod instruction;
pub mod model;
pub mod realtime_api;
pub mod reviewer;
pub mod session;
pub mod settings;

pub use tutor_live_types as types;
pub use tutor_live_utils as utils;

pub use client::{Client, ClientConfig, GeminiLive, Stats};
pub use config::Config;
pub use error::TutorError;
pub use history::{HistoryStore, InMemoryHistory};
pub use reviewer::{Reviewer, ReviewerClient};
pub use session::{Collaborators, SessionHandle, SessionPhase, TutorState};
pub use settings::Settings;
