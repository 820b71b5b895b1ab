mod bus;
mod metadata;
mod store;

pub use bus::{FilteredUpdates, UpdateBus};
pub use metadata::{CategoryMetadata, FeedMetadata};
pub use store::{ApplyOutcome, DataStore, FetchPlan, READ_PAGE_SIZE};
