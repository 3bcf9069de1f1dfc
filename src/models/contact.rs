use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub account_id: Option<String>,
    pub account_name: Option<String>,
}

impl Contact {
    /// "First Last", or whichever part is present.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub display_name: String,
}

impl User {
    /// Attribution used when the creating user is unknown.
    pub fn administrator() -> Self {
        User {
            id: "ADMIN".to_string(),
            display_name: "Administrator".to_string(),
        }
    }
}
