/// Per-key deduplication of in-flight async work.
pub mod single_flight;
/// Storage of built objects and their source modification times.
pub mod store;
