//! Login/signup form input.

use session_reconciler::{AuthError, AuthResult, Credentials};

/// Minimum password length accepted at signup.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Which form is being submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    Login,
    Signup,
}

/// Raw form fields as typed.
#[derive(Clone)]
pub struct AuthForm {
    pub email: String,
    pub password: String,
}

impl AuthForm {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Build the form, prompting on the terminal (without echo) for a password
    /// not given on the command line.
    pub async fn prompt_missing(email: String, password: Option<String>) -> anyhow::Result<Self> {
        let password = match password {
            Some(password) => password,
            None => tokio::task::spawn_blocking(|| rpassword::prompt_password("Password: ")).await??,
        };
        Ok(Self::new(email, password))
    }

    /// Check the fields before anything is sent to the provider.
    pub fn validate(&self, mode: FormMode) -> AuthResult<Credentials> {
        let email = self.email.trim();
        if email.is_empty() {
            return Err(AuthError::InvalidInput("Email is required.".to_string()));
        }
        let well_formed = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !well_formed {
            return Err(AuthError::InvalidInput(
                "Enter a valid email address.".to_string(),
            ));
        }

        if self.password.is_empty() {
            return Err(AuthError::InvalidInput("Password is required.".to_string()));
        }
        if mode == FormMode::Signup && self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::InvalidInput(format!(
                "Password must be at least {} characters.",
                MIN_PASSWORD_LEN
            )));
        }

        Ok(Credentials::new(email, self.password.clone()))
    }
}
