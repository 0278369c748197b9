pub mod document_loader;
pub mod json_store;

pub use document_loader::{derived_path, file_stem, files_with_suffix, list_subdirs, load_raw_document};
pub use json_store::{read_json, read_json_opt, write_bytes_atomic, write_json_atomic};
