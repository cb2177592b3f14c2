// Copyright 2023 Remi Bernotavicius

//! Storage and business rules for a recipe-sharing service.
//!
//! Users publish recipes built from a shared ingredient catalog, follow
//! each other, bookmark recipes and collect them into a shopping cart whose
//! ingredients can be summed into a shopping list. Every operation takes
//! the SQLite connection and the acting [`policy::Actor`] explicitly; the
//! HTTP layer in front of it lives elsewhere.

pub mod cart;
pub mod catalog;
pub mod database;
pub mod error;
pub mod import;
pub mod page;
pub mod policy;
pub mod relations;
pub mod users;

pub use error::{Error, Result};
