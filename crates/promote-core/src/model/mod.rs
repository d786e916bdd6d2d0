pub mod item;
pub mod record;
pub mod update;

pub use item::{Edge, WorkItemId, WorkItemNode, WorkItemType, join_tags, parse_tags};
pub use record::{RecordFields, WorkItemRecord};
pub use update::{FieldChange, Reviser, UpdateFields, WorkItemUpdate};
