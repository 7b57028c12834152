//! Push topic names.

use std::fmt;

/// A push channel a client can be reached on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// All instances of an application.
    App(u64),
    /// Instances of an application running in one environment.
    AppEnv(u64, u64),
    /// A single instance.
    Instance(String),
    /// Lightweight change notifications for an application.
    Notifications(u64),
}

impl Topic {
    /// Returns the topic path.
    pub fn path(&self) -> String {
        match self {
            Topic::App(app) => format!("/topic/app/{app}/config"),
            Topic::AppEnv(app, env) => format!("/topic/app/{app}/env/{env}/config"),
            Topic::Instance(id) => format!("/topic/instance/{id}/config"),
            Topic::Notifications(app) => format!("/topic/app/{app}/notifications"),
        }
    }

    /// Returns the application this topic is scoped to, if any.
    pub fn app_id(&self) -> Option<u64> {
        match self {
            Topic::App(app) | Topic::AppEnv(app, _) | Topic::Notifications(app) => Some(*app),
            Topic::Instance(_) => None,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}
