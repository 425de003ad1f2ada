use crate::types::Attribute;

pub const COMMAND_SEGMENT: &str = "ac/cmnd";
pub const STATUS_SEGMENT: &str = "ac/stat";

/// Command and status topics of one IR controller, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    prefix: String,
    base: String,
    commands: [String; 6],
    statuses: [String; 6],
}

impl TopicSet {
    pub fn new(prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/').to_string();
        let commands =
            Attribute::ALL.map(|attr| format!("{prefix}/{COMMAND_SEGMENT}/{}", attr.as_str()));
        let statuses =
            Attribute::ALL.map(|attr| format!("{prefix}/{STATUS_SEGMENT}/{}", attr.as_str()));

        Self {
            base: format!("{prefix}/"),
            prefix,
            commands,
            statuses,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn command(&self, attribute: Attribute) -> &str {
        &self.commands[index(attribute)]
    }

    pub fn status(&self, attribute: Attribute) -> &str {
        &self.statuses[index(attribute)]
    }

    /// Wildcard filter covering the controller's whole subtree.
    pub fn subscription(&self) -> String {
        format!("{}#", self.base)
    }

    pub fn in_namespace(&self, topic: &str) -> bool {
        topic.starts_with(&self.base)
    }

    /// Exact match against the status topics only; command echoes yield `None`.
    pub fn status_attribute(&self, topic: &str) -> Option<Attribute> {
        Attribute::ALL
            .into_iter()
            .find(|attr| self.status(*attr) == topic)
    }
}

fn index(attribute: Attribute) -> usize {
    match attribute {
        Attribute::Power => 0,
        Attribute::Mode => 1,
        Attribute::Temp => 2,
        Attribute::FanSpeed => 3,
        Attribute::SwingV => 4,
        Attribute::Light => 5,
    }
}
