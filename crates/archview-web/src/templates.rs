//! Template Engine
//!
//! Handles HTML template rendering using minijinja. Templates are embedded
//! at compile time; names end in `.html` so output is auto-escaped.

use archview_common::{Error, Result};
use chrono::{DateTime, Utc};
use minijinja::Environment;
use serde::Serialize;

/// Template manager
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    /// Create a new template manager
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();

        let sources = [
            ("base.html", include_str!("../templates/base.html")),
            ("pager.html", include_str!("../templates/pager.html")),
            ("index.html", include_str!("../templates/index.html")),
            ("list.html", include_str!("../templates/list.html")),
        ];
        for (name, source) in sources {
            env.add_template(name, source)
                .map_err(|e| Error::Template(format!("Failed to add {} template: {}", name, e)))?;
        }

        env.add_filter("datetime", datetime);

        Ok(Self { env })
    }

    /// Render a template with context
    pub fn render<S: Serialize>(&self, name: &str, context: S) -> Result<String> {
        let template = self
            .env
            .get_template(name)
            .map_err(|e| Error::Template(e.to_string()))?;
        template
            .render(context)
            .map_err(|e| Error::Template(format!("{}: {}", name, e)))
    }
}

/// Millisecond epoch timestamp as UTC date and time
fn datetime(timestamp: Option<i64>) -> String {
    timestamp
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_default()
}
