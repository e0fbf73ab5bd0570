pub mod audit;
pub mod clock;
pub mod config;
pub mod ids;
pub mod record;
pub mod store;

pub use clock::Clock;
pub use record::RecordExt;
pub use store::{Record, Store, StoreError, Table};
