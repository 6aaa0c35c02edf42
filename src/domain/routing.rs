use std::collections::{BTreeSet, HashMap};

/// Routes a task to a calendar by the first tag with a configured mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarRouter {
    routes: HashMap<String, String>,
    default_calendar: String,
}

impl CalendarRouter {
    /// Route keys are stored lowercased; lookups compare lowercased tags.
    pub fn new(routes: HashMap<String, String>, default_calendar: impl Into<String>) -> Self {
        let routes = routes
            .into_iter()
            .filter_map(|(tag, calendar_id)| {
                let tag = tag.trim().to_lowercase();
                let calendar_id = calendar_id.trim().to_string();
                (!tag.is_empty() && !calendar_id.is_empty()).then_some((tag, calendar_id))
            })
            .collect();
        Self {
            routes,
            default_calendar: default_calendar.into(),
        }
    }

    pub fn route<S: AsRef<str>>(&self, tags: &[S]) -> &str {
        tags.iter()
            .find_map(|tag| self.routes.get(&tag.as_ref().to_lowercase()))
            .map(String::as_str)
            .unwrap_or(&self.default_calendar)
    }

    pub fn default_calendar(&self) -> &str {
        &self.default_calendar
    }

    /// Every distinct calendar a task can be routed to, default included.
    pub fn calendars(&self) -> BTreeSet<String> {
        self.routes
            .values()
            .cloned()
            .chain(std::iter::once(self.default_calendar.clone()))
            .collect()
    }

    pub fn routes(&self) -> &HashMap<String, String> {
        &self.routes
    }
}
