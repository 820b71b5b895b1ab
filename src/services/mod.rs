mod loading;
mod notices;

pub use loading::{LoadingGuard, LoadingTracker};
pub use notices::Notices;
