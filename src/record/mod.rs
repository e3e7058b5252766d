//! Records that carry expando attributes next to their declared fields.

pub mod dynamic;
pub mod fields;
pub mod model;
pub mod naming;
pub mod save;
pub mod store;

pub use dynamic::DynamicRecord;
pub use fields::{ExpandoFields, LoadState, OwnerContext};
pub use model::{ExpandoModel, Hydrate, Overlay};
pub use naming::NamingRule;
pub use save::{SaveOptions, SaveReport, reconcile};
pub use store::{InMemoryRecordStore, RecordStore};
