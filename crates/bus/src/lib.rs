//! `sb-bus`: in-process publish/subscribe for Switchboard.
//!
//! Producers publish opaque [`Message`]s on named channels; every handler
//! subscribed to a channel gets its own work item per message. A fixed pool
//! of worker tasks drains one shared bounded queue, so the total amount of
//! concurrent handler work is capped and a full queue sheds load instead of
//! buffering without limit.
//!
//! # Usage
//!
//! ```rust,ignore
//! use sb_bus::EventBus;
//!
//! let bus = EventBus::new(&config.bus);
//! bus.subscribe("commands", |msg: Message| async move {
//!     println!("{msg:?}");
//!     Ok::<_, sb_domain::error::Error>(())
//! });
//! bus.start()?;
//! bus.publish("commands", msg);
//! bus.stop().await;
//! ```

pub mod bus;
pub mod handler;

pub use bus::{BusError, EventBus};
pub use handler::Handler;
pub use sb_domain::message::Message;
