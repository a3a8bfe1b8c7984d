use crate::error::{Result, TodoError};

/// A task title must be non-empty. It is stored exactly as given.
pub fn validate_title(title: &str) -> Result<()> {
    if title.is_empty() {
        return Err(TodoError::Validation("Title cannot be empty"));
    }
    Ok(())
}

/// Trim and check sign-in / registration input.
/// Returns the trimmed `(email, password)` pair.
pub fn validate_credentials<'a>(email: &'a str, password: &'a str) -> Result<(&'a str, &'a str)> {
    let email = email.trim();
    let password = password.trim();
    if email.is_empty() {
        return Err(TodoError::Validation("Email is required"));
    }
    if password.is_empty() {
        return Err(TodoError::Validation("Password is required"));
    }
    Ok((email, password))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles() {
        assert!(validate_title("Buy milk").is_ok());
        assert!(validate_title(" ").is_ok());
        assert!(matches!(
            validate_title(""),
            Err(TodoError::Validation("Title cannot be empty"))
        ));
    }

    #[test]
    fn credentials_are_trimmed() {
        let (email, password) = validate_credentials("  a@b.c ", " secret\n").unwrap();
        assert_eq!(email, "a@b.c");
        assert_eq!(password, "secret");
    }

    #[test]
    fn blank_credentials_rejected() {
        assert!(matches!(
            validate_credentials("   ", "pw"),
            Err(TodoError::Validation("Email is required"))
        ));
        assert!(matches!(
            validate_credentials("a@b.c", "  "),
            Err(TodoError::Validation("Password is required"))
        ));
    }
}
