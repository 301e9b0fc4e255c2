//! Core data model for the harvest pipeline
//!
//! # Components
//!
//! - `Record`: one normalized cultural-heritage object
//! - `ImageRef`: one image belonging to a record, with a monotonic
//!   resolution/download status
//! - `FetchTask`: one unit of scheduled network work

mod fetch_task;
mod image_ref;
mod record;

pub use fetch_task::{host_key, FetchTask, TaskKind, TaskRole};
pub use image_ref::{ImageRef, ImageStatus};
pub use record::Record;
