pub use ack::Acknowledgment;
pub use cache::{FeedHandle, FeedView, MessageCache};
pub use message::{Message, MessageStatus};
pub use paginator::{
    default_backfill_step, BackfillRequest, FillState, ScrollPaginator, Viewport,
    DEFAULT_BACKFILL_ROUNDS, DEFAULT_SCROLL_THRESHOLD,
};
pub use sync::MessageSyncEngine;

mod ack;
mod cache;
mod message;
mod paginator;
mod sync;
