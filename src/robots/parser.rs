//! Robots.txt parser implementation
//!
//! Allow/Disallow matching is delegated to the robotstxt crate. Crawl-delay
//! and Sitemap lines are not exposed by that crate and are parsed here.

use robotstxt::DefaultMatcher;

/// Parsed robots.txt data
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content (empty string means allow all)
    content: String,
    /// Whether to allow all (true = allow all, false = parse content)
    allow_all: bool,
}

/// One `User-agent` group and its crawl-delay, if any
#[derive(Debug, Default)]
struct Group {
    agents: Vec<String>,
    crawl_delay: Option<f64>,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    ///
    /// This is used when robots.txt is missing or cannot be fetched.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
        }
    }

    /// Returns the raw robots.txt content
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// The most specific matching user-agent group wins; `*` applies only
    /// when no group names the agent.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL or path to check (e.g., "/page.html")
    /// * `user_agent` - The user agent product token
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.allow_all || self.content.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Gets the crawl delay for a specific user agent, in seconds
    ///
    /// The delay comes from the group whose user-agent token is the longest
    /// case-insensitive match within `user_agent`, falling back to `*`. A
    /// group without a Crawl-delay line yields `None` even when `*` has one.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        if self.allow_all || self.content.is_empty() {
            return None;
        }

        let agent = user_agent.to_lowercase();
        let groups = self.groups();

        let specific = groups
            .iter()
            .flat_map(|group| {
                group
                    .agents
                    .iter()
                    .filter(|token| token.as_str() != "*" && agent.contains(token.as_str()))
                    .map(move |token| (token.len(), group))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, group)| group);

        match specific {
            Some(group) => group.crawl_delay,
            None => groups
                .iter()
                .find(|group| group.agents.iter().any(|token| token == "*"))
                .and_then(|group| group.crawl_delay),
        }
    }

    /// Returns the `Sitemap:` URLs declared in the file, in order
    ///
    /// Sitemap lines are global and do not belong to any group.
    pub fn sitemaps(&self) -> Vec<String> {
        directives(&self.content)
            .filter(|(key, _)| key == "sitemap")
            .map(|(_, value)| value.to_string())
            .filter(|value| !value.is_empty())
            .collect()
    }

    /// Splits the file into user-agent groups
    ///
    /// Consecutive `User-agent` lines share one group; a `User-agent` line
    /// after any rule line starts a new group.
    fn groups(&self) -> Vec<Group> {
        let mut groups: Vec<Group> = Vec::new();
        let mut in_agent_run = false;

        for (key, value) in directives(&self.content) {
            match key.as_str() {
                "user-agent" => {
                    if !in_agent_run || groups.is_empty() {
                        groups.push(Group::default());
                    }
                    if let Some(group) = groups.last_mut() {
                        group.agents.push(value.to_lowercase());
                    }
                    in_agent_run = true;
                }
                "crawl-delay" => {
                    in_agent_run = false;
                    if let (Some(group), Ok(delay)) = (groups.last_mut(), value.parse::<f64>()) {
                        if delay.is_finite() && delay >= 0.0 {
                            group.crawl_delay = Some(delay);
                        }
                    }
                }
                "sitemap" => {}
                _ => in_agent_run = false,
            }
        }

        groups
    }
}

/// Iterates `(lowercase key, value)` pairs, skipping comments and blank lines
fn directives(content: &str) -> impl Iterator<Item = (String, &str)> {
    content.lines().filter_map(|line| {
        let line = match line.find('#') {
            Some(idx) => &line[..idx],
            None => line,
        };
        let (key, value) = line.trim().split_once(':')?;
        Some((key.trim().to_lowercase(), value.trim()))
    })
}
