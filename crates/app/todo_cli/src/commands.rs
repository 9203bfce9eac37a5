//! Shell command parsing.

use thiserror::Error;
use todo_core::models::SocialProvider;

pub const HELP: &str = "\
Commands:
  signup <email> <password>      create an account
  login <email> <password>       sign in with email and password
  google | facebook              sign in with a social provider
  link <password>                link the pending social sign-in to your account
  reset-password <email>         email a password reset link (once)
  logout                         sign out
  cancel                         abandon the current sign-in
  add <text>                     add a task
  toggle <n|id>                  flip a task's completed flag
  delete <n|id>                  delete a task
  list                           show your tasks
  whoami                         show the signed-in user
  profile <google|facebook> [email]
                                 script a social sign-in (memory backend)
  help                           show this help
  quit                           exit";

/// A task addressed by its 1-based list position or its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskRef {
    Position(usize),
    Id(String),
}

impl TaskRef {
    fn parse(raw: &str) -> Self {
        match raw.parse::<usize>() {
            Ok(n) if n > 0 => Self::Position(n),
            _ => Self::Id(raw.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SignUp { email: String, password: String },
    Login { email: String, password: String },
    Social(SocialProvider),
    Link { password: String },
    ResetPassword { email: String },
    Logout,
    Cancel,
    Add(String),
    Toggle(TaskRef),
    Delete(TaskRef),
    List,
    WhoAmI,
    Profile {
        provider: SocialProvider,
        email: Option<String>,
    },
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown command `{0}`, try `help`")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let args: Vec<&str> = rest.split_whitespace().collect();

    let command = match verb.to_ascii_lowercase().as_str() {
        "signup" | "sign-up" => {
            let [email, password] = args[..] else {
                return Err(ParseError::Usage("signup <email> <password>"));
            };
            Command::SignUp {
                email: email.into(),
                password: password.into(),
            }
        }
        "login" => {
            let [email, password] = args[..] else {
                return Err(ParseError::Usage("login <email> <password>"));
            };
            Command::Login {
                email: email.into(),
                password: password.into(),
            }
        }
        "google" => Command::Social(SocialProvider::Google),
        "facebook" => Command::Social(SocialProvider::Facebook),
        "link" => {
            let [password] = args[..] else {
                return Err(ParseError::Usage("link <password>"));
            };
            Command::Link {
                password: password.into(),
            }
        }
        "reset-password" => {
            let [email] = args[..] else {
                return Err(ParseError::Usage("reset-password <email>"));
            };
            Command::ResetPassword {
                email: email.into(),
            }
        }
        "logout" => Command::Logout,
        "cancel" => Command::Cancel,
        // Text is passed through as typed; blank text is the task list's call.
        "add" => Command::Add(rest.to_string()),
        "toggle" => {
            let [task] = args[..] else {
                return Err(ParseError::Usage("toggle <n|id>"));
            };
            Command::Toggle(TaskRef::parse(task))
        }
        "delete" | "rm" => {
            let [task] = args[..] else {
                return Err(ParseError::Usage("delete <n|id>"));
            };
            Command::Delete(TaskRef::parse(task))
        }
        "list" | "ls" => Command::List,
        "whoami" => Command::WhoAmI,
        "profile" => {
            let usage = ParseError::Usage("profile <google|facebook> [email]");
            let (provider, email) = match args[..] {
                [provider] => (provider, None),
                [provider, email] => (provider, Some(email.to_string())),
                _ => return Err(usage),
            };
            let provider = match provider {
                "google" => SocialProvider::Google,
                "facebook" => SocialProvider::Facebook,
                _ => return Err(usage),
            };
            Command::Profile { provider, email }
        }
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}
