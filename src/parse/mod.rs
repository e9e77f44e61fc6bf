pub mod date_fallback;
pub mod file_parser;
pub mod structure;
pub mod task_parser;

pub use date_fallback::{DateFallback, extract_date_from_path};
pub use file_parser::{LineFailure, parse_file_content};
pub use structure::scan;
pub use task_parser::{TaskComponents, TaskLineError, extract_task_components};
