#![warn(clippy::all)]
#![doc = include_str!("../README.md")]

// Modules that make up the Trade View library.
mod args;
mod charts;
mod container;
mod engine;
mod error;
mod executor;
mod extension;
mod file_dialog;
mod layout;
mod local;
mod panels;
mod reshape;
mod sqls;
mod table;
mod traits;

// Publicly expose the contents of these modules.
pub use self::{
    args::{Arguments, Scheme},
    charts::*,
    container::*,
    engine::*,
    error::*,
    executor::*,
    extension::*,
    file_dialog::*,
    layout::*,
    local::*,
    panels::*,
    reshape::*,
    sqls::*,
    table::*,
    traits::*,
};
