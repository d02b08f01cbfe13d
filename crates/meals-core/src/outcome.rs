use chrono::NaiveDate;
use serde::Serialize;

/// Severity of a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Success,
    Info,
    Warning,
    Error,
}

/// A message shown to the user alongside whatever is rendered next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub level: Level,
    pub text: String,
}

impl Message {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: Level::Success,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: Level::Info,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: Level::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            text: text.into(),
        }
    }
}

/// A validation error attached to one form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Where the web layer should send the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    Account,
    AddChild,
    Children,
    Order(Option<NaiveDate>),
    History,
    StaffOrders,
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Self::Login => "/login".to_owned(),
            Self::Account => "/account".to_owned(),
            Self::AddChild => "/children/new".to_owned(),
            Self::Children => "/children".to_owned(),
            Self::Order(None) => "/order".to_owned(),
            Self::Order(Some(date)) => format!("/order?date={}", date.format("%Y-%m-%d")),
            Self::History => "/history".to_owned(),
            Self::StaffOrders => "/admin/orders".to_owned(),
        }
    }
}

/// Result of a workflow step, always renderable.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<V> {
    /// Show `view`.
    Render { view: V, messages: Vec<Message> },
    /// Redisplay `view` with field errors; nothing was written.
    Invalid { view: V, messages: Vec<Message> },
    Redirect { to: Route, messages: Vec<Message> },
    NotFound { messages: Vec<Message> },
    Forbidden { messages: Vec<Message> },
    /// Something went wrong server-side; details are only in the log.
    Failed { messages: Vec<Message> },
}

impl<V> Outcome<V> {
    pub fn render(view: V) -> Self {
        Self::Render {
            view,
            messages: Vec::new(),
        }
    }

    pub fn redirect(to: Route, message: Message) -> Self {
        Self::Redirect {
            to,
            messages: vec![message],
        }
    }

    pub fn messages(&self) -> &[Message] {
        match self {
            Self::Render { messages, .. }
            | Self::Invalid { messages, .. }
            | Self::Redirect { messages, .. }
            | Self::NotFound { messages }
            | Self::Forbidden { messages }
            | Self::Failed { messages } => messages,
        }
    }

    /// The rendered or redisplayed view, if any.
    pub fn view(&self) -> Option<&V> {
        match self {
            Self::Render { view, .. } | Self::Invalid { view, .. } => Some(view),
            _ => None,
        }
    }

    pub fn redirect_target(&self) -> Option<&Route> {
        match self {
            Self::Redirect { to, .. } => Some(to),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_route_formats_iso_date() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(Route::Order(Some(date)).path(), "/order?date=2026-03-07");
        assert_eq!(Route::Order(None).path(), "/order");
    }

    #[test]
    fn messages_are_reachable_for_every_variant() {
        let outcome: Outcome<()> = Outcome::redirect(Route::History, Message::success("saved"));
        assert_eq!(outcome.messages()[0].text, "saved");
        assert_eq!(outcome.redirect_target(), Some(&Route::History));
        assert!(outcome.view().is_none());

        let failed: Outcome<()> = Outcome::Failed {
            messages: vec![Message::error("boom")],
        };
        assert_eq!(failed.messages()[0].level, Level::Error);
    }

    #[test]
    fn levels_serialize_lowercase() {
        let message = Message::warning("careful");
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            serde_json::json!({ "level": "warning", "text": "careful" })
        );
    }
}
