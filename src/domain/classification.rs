//! Classification result attached to canonical messages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of message categories the classifier may assign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Customer review or review-platform notification.
    Review,
    /// Order, booking or delivery traffic.
    Order,
    /// Legal or administrative correspondence.
    Legal,
    /// Invoice or payment request.
    Invoice,
    /// Advertising, newsletters and other spam-adjacent traffic.
    Advertising,
    /// Anything that fits none of the above.
    Other,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Review => "review",
            Category::Order => "order",
            Category::Legal => "legal",
            Category::Invoice => "invoice",
            Category::Advertising => "advertising",
            Category::Other => "other",
        };
        f.write_str(s)
    }
}

/// Urgency level the classifier assigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent,
    Medium,
    Low,
}

/// Result of classifying one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Assigned category.
    pub category: Category,
    /// Assigned urgency.
    pub priority: Priority,
    /// Recommended next step, free text.
    pub action: String,
    /// Optional drafted reply.
    pub suggestion: Option<String>,
}

impl Classification {
    /// Fixed result used whenever the classifier fails or times out.
    ///
    /// Classification is advisory; callers must always receive a usable
    /// value instead of an error.
    pub fn fallback() -> Self {
        Self {
            category: Category::Other,
            priority: Priority::Medium,
            action: "Examiner manuellement".to_string(),
            suggestion: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_is_stable() {
        let f = Classification::fallback();
        assert_eq!(f.category, Category::Other);
        assert_eq!(f.priority, Priority::Medium);
        assert_eq!(f.action, "Examiner manuellement");
        assert!(f.suggestion.is_none());
    }

    #[test]
    fn category_serde_tags() {
        assert_eq!(serde_json::to_string(&Category::Invoice).unwrap(), "\"invoice\"");
        let c: Category = serde_json::from_str("\"review\"").unwrap();
        assert_eq!(c, Category::Review);
    }

    #[test]
    fn classification_round_trip() {
        let c = Classification {
            category: Category::Order,
            priority: Priority::Urgent,
            action: "Confirmer la commande".to_string(),
            suggestion: Some("Bonjour, votre commande est confirmée.".to_string()),
        };
        let json = serde_json::to_string(&c).unwrap();
        let back: Classification = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
