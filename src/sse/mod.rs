pub mod broker;

pub use broker::{BrokerTask, Event, SseBroker, Subscription};
