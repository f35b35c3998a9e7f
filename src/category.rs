// src/category.rs
use serde::{Deserialize, Serialize};

/// Notification kind. Each one has its own trigger rule, destination and
/// ledger partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Daily,
    Reminder,
    Results,
    Weekly,
}

impl Category {
    /// Evaluation order within a pass.
    pub const ALL: [Category; 4] = [
        Category::Daily,
        Category::Reminder,
        Category::Results,
        Category::Weekly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Daily => "daily",
            Category::Reminder => "reminder",
            Category::Results => "results",
            Category::Weekly => "weekly",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Category::Daily),
            "reminder" => Ok(Category::Reminder),
            "results" => Ok(Category::Results),
            "weekly" => Ok(Category::Weekly),
            other => anyhow::bail!("unknown category: {other}"),
        }
    }
}
