pub mod document;
pub(crate) mod migration;
pub mod persistence;
pub mod project_types;
pub mod store_runtime;
pub(crate) mod tree;
