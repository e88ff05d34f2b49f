//! Outbound message delivery.

pub mod adapter;
pub mod transport;

pub use adapter::{DeliveryAdapter, DeliveryPath, DeliveryReceipt};
pub use transport::{Transport, WhatsAppTransport};
