//! tutorcall library
//!
//! Scheduling, cascade, reminder and status-sweep logic behind the CLI.

pub mod calendar;
pub mod call;
pub mod cascade;
pub mod catalog;
pub mod cli;
pub mod commands;
pub mod config;
pub mod daemon;
pub mod error;
pub mod exit_codes;
pub mod generator;
pub mod lessons;
pub mod lock;
pub mod meeting;
pub mod notify;
pub mod output;
pub mod reminders;
pub mod service;
pub mod status_sweep;
pub mod store;
pub mod ua;
