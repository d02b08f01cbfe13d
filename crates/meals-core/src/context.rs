use chrono::{Local, NaiveDate};

use crate::token::Principal;

/// Per-request state handed to every workflow function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub principal: Principal,
    /// The current local date. Only dates strictly after it can be ordered,
    /// edited, or cleared.
    pub today: NaiveDate,
}

impl RequestContext {
    pub fn new(principal: Principal) -> Self {
        Self::at(principal, Local::now().date_naive())
    }

    /// Build a context with a fixed "today".
    pub fn at(principal: Principal, today: NaiveDate) -> Self {
        Self { principal, today }
    }

    /// Whether choices for `date` may still be changed.
    pub fn is_mutable(&self, date: NaiveDate) -> bool {
        date > self.today
    }
}
