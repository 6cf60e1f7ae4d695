//! Adapters for the domain ports: storage backends, the payment gateway
//! client and the notifier.

pub mod chapa;
pub mod in_memory;
pub mod notifier;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
