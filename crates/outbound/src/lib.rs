//! Fire-and-forget HTTP side effects: the non-purchase webhook dispatcher
//! and the abandonment beacon. Neither carries an acknowledgement the engine
//! waits on; failures are reported back only so the caller can log and drop
//! them.

pub mod beacon;
pub mod webhook;

pub use beacon::HttpAbandonmentBeacon;
pub use webhook::HttpWebhookDispatcher;
