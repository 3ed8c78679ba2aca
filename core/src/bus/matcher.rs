use super::Event;

/// Event predicate used to route events to subscriber callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Matcher {
    Is(String),
    IsOneOf(Vec<String>),
}

impl Matcher {
    pub fn is(event_type: impl Into<String>) -> Self {
        Matcher::Is(event_type.into())
    }

    pub fn is_one_of<I, S>(event_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Matcher::IsOneOf(event_types.into_iter().map(Into::into).collect())
    }

    pub fn matches_type(&self, event_type: &str) -> bool {
        match self {
            Matcher::Is(t) => t == event_type,
            Matcher::IsOneOf(types) => types.iter().any(|t| t == event_type),
        }
    }

    pub fn matches(&self, event: &Event) -> bool {
        self.matches_type(&event.type_name())
    }
}
