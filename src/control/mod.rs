//! Control plane: the HTTP surface (spec.md §4.7) plus the console key
//! handler supplementing it, both operating on an `Arc<Switcher>` rather
//! than reaching into process-global state.

pub mod console;
pub mod http;
