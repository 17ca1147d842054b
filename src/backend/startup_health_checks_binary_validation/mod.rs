pub mod binary_runtime;
