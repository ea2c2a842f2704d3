/// Credentials presented to the source database
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// Username and password merged into the connection string
    Password(String, String),
    /// Use whatever the connection string carries (or nothing, e.g. SQLite)
    None,
}

impl Auth {
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        match (username, password) {
            (Some(username), Some(password)) => Self::Password(username, password),
            _ => Self::None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Password(username, _) => Some(username),
            Self::None => None,
        }
    }
}

impl std::fmt::Display for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password(username, _) => write!(f, "Password({})", username),
            Self::None => write!(f, "None"),
        }
    }
}

// Debug goes through Display so the password never lands in logs
impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_redacted() {
        let auth = Auth::new(Some("etl".into()), Some("hunter2".into()));
        assert_eq!(auth.to_string(), "Password(etl)");
        assert!(!format!("{:?}", auth).contains("hunter2"));
        assert_eq!(auth.username(), Some("etl"));
    }

    #[test]
    fn test_partial_credentials_are_none() {
        assert_eq!(Auth::new(Some("etl".into()), None), Auth::None);
        assert_eq!(Auth::new(None, Some("pw".into())), Auth::None);
    }
}
