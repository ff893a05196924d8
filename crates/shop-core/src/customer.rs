//! # Customer Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A buyer identity, unique by email and shared across orders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub created_at: DateTime<Utc>,
}

/// Canonical form of an email used as the uniqueness key
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Amina@Example.COM "), "amina@example.com");
    }
}
