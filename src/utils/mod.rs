pub mod atomic;

pub use atomic::{write_atomic, write_json_atomic};
