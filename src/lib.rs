//! Watches Telegram-channel RSS bridges for event announcements (webinars,
//! workshops, seminars, ...) and republishes matches to a target channel.
//!
//! Library surface for the `event-scout` binary and its integration tests.

pub mod api;
pub mod config;
pub mod dedup;
pub mod detect;
pub mod feed;
pub mod message;
pub mod poller;
pub mod publish;
pub mod render;
pub mod store;

pub use crate::config::{Config, FeedSource};
pub use crate::dedup::DuplicateGuard;
pub use crate::detect::EventDetector;
pub use crate::message::MessageBuilder;
pub use crate::poller::{Poller, PollerConfig};
pub use crate::publish::{Publisher, TelegramPublisher};
pub use crate::render::OutputMode;
pub use crate::store::StateStore;
