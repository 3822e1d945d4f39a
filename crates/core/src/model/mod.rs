mod completion;
mod ids;
mod level;
mod player;

pub use ids::{CompletionId, LevelId, ParseIdError, PlayerId};

pub use completion::{CompletionError, CompletionSubmission, LevelCompletion, ValidCompletion};
pub use level::{Level, LevelError};
pub use player::{Player, PlayerAggregate, PlayerError};
