pub mod json;

pub use json::{export_snapshot_to_path, import_snapshot};
