pub mod cache_runtime;
mod cache_scope;
