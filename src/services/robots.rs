// src/services/robots.rs

//! robots.txt rules for one product token.
//!
//! Parsing and matching are done by `texting_robots`. Groups are selected by
//! our product token (e.g. `docwatch`), never by the full User-Agent header.

use texting_robots::Robot;

/// Rules that apply to one product token.
#[derive(Default)]
pub struct RobotsRules {
    robot: Option<Robot>,
}

impl RobotsRules {
    /// Rules that allow everything (missing or unreachable robots.txt).
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Parse robots.txt and keep the rules for `agent`, falling back to `*`.
    pub fn parse(content: &str, agent: &str) -> Self {
        let content = name_empty_agents(content);
        match Robot::new(agent, content.as_bytes()) {
            Ok(robot) => Self { robot: Some(robot) },
            Err(e) => {
                log::warn!("Unparsable robots.txt ({}), assuming allowed", e);
                Self::allow_all()
            }
        }
    }

    /// Whether `target` (path plus optional query) may be fetched.
    pub fn is_allowed(&self, target: &str) -> bool {
        self.robot.as_ref().is_none_or(|robot| robot.allowed(target))
    }

    /// Crawl-delay requested for our group, if any.
    pub fn crawl_delay(&self) -> Option<f32> {
        self.robot.as_ref().and_then(|robot| robot.delay)
    }
}

/// An empty `User-agent:` value names no robot. Give it a value no product
/// token can contain so it cannot capture every agent.
fn name_empty_agents(content: &str) -> String {
    content
        .lines()
        .map(|line| match line.split_once(':') {
            Some((key, value))
                if key.trim().eq_ignore_ascii_case("user-agent")
                    && value.split('#').next().unwrap_or("").trim().is_empty() =>
            {
                "User-agent: /"
            }
            _ => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
}
