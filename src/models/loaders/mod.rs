pub mod toml_loader;

pub use toml_loader::{load_batch_manifest, load_field_rules, parse_batch_manifest};
