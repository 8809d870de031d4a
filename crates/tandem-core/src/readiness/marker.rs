use std::time::Duration;

use tandem_types::Dependency;

pub const DATABASE_MARKER: &str = "waiting for connections";
pub const APPLICATION_MARKER: &str = "Web server listening at:";

/// What a dependency prints once it accepts connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessMarker {
    pub needle: String,
    pub timeout: Duration,
    /// Prefix of a URL token expected after the needle.
    pub url_prefix: Option<String>,
}

impl ReadinessMarker {
    #[must_use]
    pub fn database(timeout: Duration) -> Self {
        Self {
            needle: DATABASE_MARKER.to_owned(),
            timeout,
            url_prefix: None,
        }
    }

    #[must_use]
    pub fn application(timeout: Duration) -> Self {
        Self {
            needle: APPLICATION_MARKER.to_owned(),
            timeout,
            url_prefix: Some("http".to_owned()),
        }
    }

    #[must_use]
    pub fn for_dependency(dependency: Dependency, timeout: Duration) -> Self {
        match dependency {
            Dependency::Database => Self::database(timeout),
            Dependency::Application => Self::application(timeout),
        }
    }

    #[must_use]
    pub fn matches(&self, line: &str) -> bool {
        line.contains(&self.needle)
    }

    /// First whitespace-delimited token after the needle that starts with
    /// the URL prefix.
    #[must_use]
    pub fn extract_url(&self, line: &str) -> Option<String> {
        let prefix = self.url_prefix.as_deref()?;
        let start = line.find(&self.needle)? + self.needle.len();
        line[start..]
            .split_whitespace()
            .find(|token| token.starts_with(prefix))
            .map(|token| token.trim_end_matches(['.', ',', ';']).to_owned())
    }
}
