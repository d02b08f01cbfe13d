//! Meal ordering workflow and the account, children, and menu operations
//! around it.
//!
//! Every workflow function takes an explicit [`context::RequestContext`] and
//! returns an [`outcome::Outcome`]: a view to render, a view to redisplay
//! with validation errors, or a redirect, each with user-facing messages.

pub mod account;
pub mod availability;
pub mod children;
pub mod choices;
pub mod context;
pub mod date;
pub mod error;
pub mod form;
pub mod menu;
pub mod order;
pub mod outcome;
pub mod persist;
pub mod report;
pub mod token;

pub use context::RequestContext;
pub use error::WorkflowError;
pub use outcome::{FieldError, Level, Message, Outcome, Route};
