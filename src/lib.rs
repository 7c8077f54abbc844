/// Rental Pool - time-bounded rentals of shared credentialed accounts
///
/// Accounts are checked out to requesters for a fixed number of hours and
/// reclaimed (password rotated, sessions revoked) on return, on
/// administrator request, or when the expiry sweeper finds them overdue.

pub mod account;
pub mod api;
pub mod auth;
pub mod binding;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod jobs;
pub mod manager;
pub mod matching;
pub mod metrics;
pub mod notify;
pub mod orders;
pub mod provider;
pub mod rate_limit;
pub mod rental;
pub mod server;
pub mod settings;
pub mod wizard;

pub use context::AppContext;
pub use error::{RentalError, RentalResult};
