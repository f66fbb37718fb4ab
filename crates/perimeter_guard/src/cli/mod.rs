//! CLI module for Perimeter Guard
//!
//! Every command reads provider data through an inventory snapshot and
//! shares configuration loading and output helpers.

pub mod error;
pub mod output;

pub mod catalog;
pub mod config;
pub mod context;
pub mod identity;
pub mod scan;
pub mod sweep;
