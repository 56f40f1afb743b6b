pub mod agent;
pub mod learner;

pub use agent::{A3CAgent, LearnerFailure, TrainingSummary};
pub use learner::{EpisodeSummary, Learner, LearnerHandle, LearnerParams, LearnerReport};
