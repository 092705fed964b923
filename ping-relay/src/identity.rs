//! Identity operations: `Login`, `Register`, `GetFriends`, `AddFriend`.
//!
//! Nothing is stored. Requests are checked for well-formedness and answered
//! with a status; there is no authentication behind `Login`, and the relay
//! does not consult it before routing. The friend list is always empty.

use ping_proto::status::StatusCode;
use ping_proto::types::{
    AddFriendRequest, ExitCode, FriendListRequest, LoginRequest, RegisterRequest, ServerMessage,
};

/// Minimum username length accepted by `Register`.
pub const MIN_USERNAME_LENGTH: usize = 4;

/// Minimum password length accepted by `Register`.
pub const MIN_PASSWORD_LENGTH: usize = 10;

/// Why a `Register` request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    /// Username shorter than [`MIN_USERNAME_LENGTH`].
    #[error("username must be at least {MIN_USERNAME_LENGTH} characters")]
    UsernameTooShort,
    /// Username contains something other than ASCII letters and digits.
    #[error("username may only contain letters and digits")]
    UsernameInvalidCharacters,
    /// The two passwords differ.
    #[error("passwords do not match")]
    PasswordsDoNotMatch,
    /// Password shorter than [`MIN_PASSWORD_LENGTH`].
    #[error("password must be at least {MIN_PASSWORD_LENGTH} characters")]
    PasswordTooShort,
    /// Password lacks an uppercase letter, a digit, or a special character.
    #[error("password needs an uppercase letter, a digit and a special character")]
    PasswordInvalidFormat,
    /// Email is not of the form `local@domain.tld`.
    #[error("email address is not valid")]
    EmailInvalidFormat,
}

/// Checks a registration request, in the order the rules are listed on
/// [`RegistrationError`].
///
/// # Errors
///
/// Returns the first rule the request breaks.
pub fn validate_registration(request: &RegisterRequest) -> Result<(), RegistrationError> {
    let username = &request.username;
    if username.chars().count() < MIN_USERNAME_LENGTH {
        return Err(RegistrationError::UsernameTooShort);
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(RegistrationError::UsernameInvalidCharacters);
    }
    if request.password != request.confirm_password {
        return Err(RegistrationError::PasswordsDoNotMatch);
    }
    let password = &request.password;
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(RegistrationError::PasswordTooShort);
    }
    let has_upper = password.chars().any(char::is_uppercase);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| !c.is_alphanumeric());
    if !(has_upper && has_digit && has_special) {
        return Err(RegistrationError::PasswordInvalidFormat);
    }
    if !is_valid_email(&request.email) {
        return Err(RegistrationError::EmailInvalidFormat);
    }
    Ok(())
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        && !domain.ends_with('.')
}

/// `Login`: succeeds for any non-blank username and password.
#[must_use]
pub fn login(request: &LoginRequest) -> ExitCode {
    if request.username.trim().is_empty() || request.password.trim().is_empty() {
        tracing::info!("login rejected: blank credentials");
        return ExitCode::new(StatusCode::InvalidRequest, "invalid credentials");
    }
    tracing::info!(username = %request.username, "user logged in");
    ExitCode::ok("Welcome to server")
}

/// `Register`: succeeds for any request passing [`validate_registration`].
#[must_use]
pub fn register(request: &RegisterRequest) -> ExitCode {
    match validate_registration(request) {
        Ok(()) => {
            tracing::info!(username = %request.username, "registration accepted");
            ExitCode::ok("Welcome to server")
        }
        Err(e) => {
            tracing::info!(username = %request.username, reason = %e, "registration rejected");
            ExitCode::new(StatusCode::InvalidRequest, e.to_string())
        }
    }
}

/// `GetFriends`: an empty, delimited friend list.
#[must_use]
pub fn get_friends(request: &FriendListRequest) -> ServerMessage {
    if request.client.trim().is_empty() {
        return ServerMessage {
            message_response: None,
            exit_code: Some(ExitCode::new(
                StatusCode::InvalidRequest,
                "client must not be empty",
            )),
        };
    }
    tracing::debug!(client_id = %request.client, "returning friend list");
    ServerMessage::friend_list(&[], ExitCode::ok("Friend list"))
}

/// `AddFriend`: accepts any pair of distinct, non-blank identities.
#[must_use]
pub fn add_friend(request: &AddFriendRequest) -> ExitCode {
    if request.client.trim().is_empty() || request.friend.trim().is_empty() {
        return ExitCode::new(StatusCode::InvalidRequest, "client and friend must not be empty");
    }
    if request.client == request.friend {
        return ExitCode::new(StatusCode::InvalidRequest, "cannot add yourself as a friend");
    }
    tracing::info!(client_id = %request.client, friend = %request.friend, "friend added");
    ExitCode::ok("Friend added successfully")
}
