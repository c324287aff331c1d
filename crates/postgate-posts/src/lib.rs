//! Post folders and everything done with them: discovery, approval tokens,
//! preview rendering and publishing.

pub mod action;
pub mod folder;
pub mod messenger;
pub mod preview;
pub mod publisher;
pub mod scan;
pub mod tokens;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use action::Action;
pub use folder::{ImageFilter, PostFolder};
pub use messenger::{MediaItem, Messenger};
pub use publisher::{ChannelPublisher, PublishError, PublishOutcome, RemoveDir};
pub use scan::{ScanEngine, ScanReport};
pub use tokens::TokenRegistry;
