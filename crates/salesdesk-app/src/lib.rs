// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod controller;
pub mod debounce;
pub mod failure;
pub mod fetch;
pub mod filter;
pub mod hydrate;
pub mod ids;
pub mod options;
pub mod query;
pub mod response;
pub mod table;

pub use controller::*;
pub use debounce::*;
pub use failure::*;
pub use fetch::*;
pub use filter::*;
pub use hydrate::*;
pub use ids::*;
pub use options::*;
pub use query::*;
pub use response::*;
pub use table::*;
