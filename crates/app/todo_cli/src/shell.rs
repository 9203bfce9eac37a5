//! Interactive shell wiring the auth flow, session, and task list together.

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use todo_core::auth_flow::{AuthFlow, AuthFlowError};
use todo_core::backend::memory::MemoryBackend;
use todo_core::backend::{DocumentStore, IdentityProvider};
use todo_core::notify::{self, Notifications, Notifier};
use todo_core::session::{IdentityObserver, SessionController};
use todo_core::tasks::{TaskError, TaskList};
use todo_firebase::FirebaseBackend;
use tracing::{debug, info, warn};

use crate::Result;
use crate::commands::{self, Command, HELP, TaskRef};

/// The backend the shell talks to.
pub enum Backend {
    Memory(Arc<MemoryBackend>),
    Firebase(FirebaseBackend),
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Firebase(_) => "firebase",
        }
    }

    fn provider(&self) -> Arc<dyn IdentityProvider> {
        match self {
            Self::Memory(backend) => backend.clone(),
            Self::Firebase(backend) => backend.auth.clone(),
        }
    }

    fn store(&self) -> Arc<dyn DocumentStore> {
        match self {
            Self::Memory(backend) => backend.clone(),
            Self::Firebase(backend) => backend.store.clone(),
        }
    }
}

enum Next {
    Continue,
    Quit,
}

pub struct Shell<W> {
    backend: Backend,
    flow: AuthFlow,
    tasks: TaskList,
    session: SessionController,
    notifications: Notifications,
    out: W,
}

impl<W: Write> Shell<W> {
    pub fn new(backend: Backend, out: W) -> Self {
        let (notifier, notifications) = Notifier::channel();
        let provider = backend.provider();
        let session = SessionController::attach(provider.as_ref());
        let tasks = TaskList::new(backend.store(), notifier.clone());
        let flow = AuthFlow::new(provider, notifier);
        Self {
            backend,
            flow,
            tasks,
            session,
            notifications,
            out,
        }
    }

    /// Read commands from `input` until EOF or `quit`, reacting to identity
    /// changes and pushed snapshots in between.
    pub async fn run<R>(&mut self, input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        info!(backend = self.backend.name(), "shell started");
        let mut lines = input.lines();
        let mut feed_open = true;
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        debug!("input closed");
                        break;
                    };
                    if let Next::Quit = self.handle_line(&line).await? {
                        break;
                    }
                }
                change = self.session.next_change(), if feed_open => {
                    match change {
                        Some(identity) => self.tasks.identity_changed(identity.as_ref()),
                        None => {
                            warn!("identity feed closed");
                            feed_open = false;
                        }
                    }
                }
                updated = self.tasks.next_snapshot() => {
                    if !updated {
                        writeln!(self.out, "Task sync stopped; sign in again to resume.")?;
                    }
                }
                Some(notification) = self.notifications.recv() => {
                    writeln!(self.out, "{notification}")?;
                }
            }
        }
        self.out.flush()?;
        Ok(())
    }

    async fn handle_line(&mut self, line: &str) -> Result<Next> {
        let next = match commands::parse(line) {
            Ok(Some(command)) => self.execute(command).await?,
            Ok(None) => Next::Continue,
            Err(e) => {
                writeln!(self.out, "error: {e}")?;
                Next::Continue
            }
        };
        self.settle()?;
        Ok(next)
    }

    /// Apply whatever the last command caused before reading the next one.
    fn settle(&mut self) -> Result<()> {
        while let Some(identity) = self.session.poll_change() {
            self.tasks.identity_changed(identity.as_ref());
        }
        self.tasks.drain_snapshots();
        for notification in notify::drain(&mut self.notifications) {
            writeln!(self.out, "{notification}")?;
        }
        Ok(())
    }

    async fn execute(&mut self, command: Command) -> Result<Next> {
        match command {
            Command::SignUp { email, password } => {
                let result = self.flow.sign_up(&email, &password).await;
                self.report_auth(result.map(drop))?;
            }
            Command::Login { email, password } => {
                let result = self.flow.login(&email, &password).await;
                self.report_auth(result.map(drop))?;
            }
            Command::Social(provider) => {
                let result = self.flow.social_sign_in(provider).await;
                self.report_auth(result.map(drop))?;
            }
            Command::Link { password } => {
                let result = self.flow.link_with_password(&password).await;
                self.report_auth(result.map(drop))?;
            }
            Command::ResetPassword { email } => {
                let result = self.flow.request_password_reset(&email).await;
                self.report_auth(result)?;
            }
            Command::Logout => {
                let result = self.flow.sign_out().await;
                self.report_auth(result)?;
            }
            Command::Cancel => {
                self.flow.reset();
                writeln!(self.out, "Sign-in reset.")?;
            }
            Command::Add(text) => {
                let result = self.tasks.add_task(&text).await;
                self.report_task(result.map(drop))?;
            }
            Command::Toggle(task) => {
                if let Some(id) = self.resolve(&task)? {
                    match self.tasks.toggle_task(&id).await {
                        Ok(Some(_)) => {}
                        Ok(None) => writeln!(self.out, "error: no task `{id}`")?,
                        Err(e) => self.report_task(Err(e))?,
                    }
                }
            }
            Command::Delete(task) => {
                if let Some(id) = self.resolve(&task)? {
                    let result = self.tasks.delete_task(&id).await;
                    self.report_task(result)?;
                }
            }
            Command::List => self.print_list()?,
            Command::WhoAmI => match self.session.current() {
                Some(identity) => writeln!(self.out, "{} ({})", identity.email, identity.id)?,
                None => writeln!(self.out, "Not signed in")?,
            },
            Command::Profile { provider, email } => match &self.backend {
                Backend::Memory(memory) => {
                    memory.set_social_profile(provider, email.as_deref());
                    match email {
                        Some(email) => writeln!(self.out, "{provider} will sign in as {email}")?,
                        None => writeln!(self.out, "{provider} sign-in will be cancelled")?,
                    }
                }
                Backend::Firebase(_) => {
                    writeln!(self.out, "error: profile is only available with the memory backend")?
                }
            },
            Command::Help => writeln!(self.out, "{HELP}")?,
            Command::Quit => return Ok(Next::Quit),
        }
        Ok(Next::Continue)
    }

    /// Map a task reference to an id, reporting out-of-range positions.
    fn resolve(&mut self, task: &TaskRef) -> Result<Option<String>> {
        match task {
            TaskRef::Id(id) => Ok(Some(id.clone())),
            TaskRef::Position(n) => match self.tasks.tasks().get(n - 1) {
                Some(task) => Ok(Some(task.id.clone())),
                None => {
                    writeln!(self.out, "error: no task #{n}")?;
                    Ok(None)
                }
            },
        }
    }

    fn print_list(&mut self) -> Result<()> {
        let tasks = self.tasks.tasks();
        if tasks.is_empty() {
            writeln!(self.out, "No tasks.")?;
            return Ok(());
        }
        for (i, task) in tasks.iter().enumerate() {
            let mark = if task.completed { 'x' } else { ' ' };
            writeln!(self.out, "{}. [{mark}] {} ({})", i + 1, task.text, task.id)?;
        }
        Ok(())
    }

    /// Print auth errors that did not already raise a notification.
    fn report_auth(&mut self, result: std::result::Result<(), AuthFlowError>) -> Result<()> {
        match result {
            Err(
                e @ (AuthFlowError::InvalidTransition { .. } | AuthFlowError::ResetAlreadySent),
            ) => {
                writeln!(self.out, "error: {e}")?;
            }
            Err(e) => debug!(error = %e, "auth command failed"),
            Ok(()) => {}
        }
        Ok(())
    }

    /// Print task errors that did not already raise a notification.
    fn report_task(&mut self, result: std::result::Result<(), TaskError>) -> Result<()> {
        match result {
            Err(e @ TaskError::NotAuthenticated) => writeln!(self.out, "error: {e}")?,
            Err(e) => debug!(error = %e, "task command failed"),
            Ok(()) => {}
        }
        Ok(())
    }
}
