//! In-process backend implementing both [`IdentityProvider`] and
//! [`DocumentStore`].
//!
//! Accounts, documents, and subscriptions live in memory. Every write
//! re-queries the affected owner and pushes a fresh snapshot to each open
//! subscription scoped to that owner, the way a hosted document store would.
//!
//! Social sign-in has no popup here; the outcome of each provider's flow is
//! scripted with [`MemoryBackend::set_social_profile`].

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use super::subscription::{self, SnapshotSink, Subscription};
use super::{DocumentStore, IdentityFeed, IdentityProvider, ProviderError, StoreError};
use crate::models::{
    Identity, NewTask, OwnerFilter, PendingCredential, SignInMethod, Snapshot, SocialProvider,
    Task, TaskPatch,
};

/// Minimum password length accepted by [`IdentityProvider::create_account`].
pub const MIN_PASSWORD_LEN: usize = 6;

/// A write issued against the memory store, recorded in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Create(NewTask),
    Update { id: String, patch: TaskPatch },
    Delete { id: String },
}

#[derive(Debug, Clone)]
struct Account {
    id: String,
    email: String,
    password: Option<String>,
    methods: Vec<SignInMethod>,
}

impl Account {
    fn identity(&self) -> Identity {
        Identity::new(&self.id, &self.email)
    }
}

/// In-memory identity provider and document store.
pub struct MemoryBackend {
    /// Accounts keyed by lowercased email.
    accounts: DashMap<String, Account>,
    /// Scripted social sign-in outcome per provider; absent means cancelled.
    social_profiles: DashMap<SocialProvider, String>,
    /// Pending credential tokens handed out, mapped to the email they prove.
    issued_credentials: DashMap<String, String>,
    identity_tx: watch::Sender<Option<Identity>>,
    documents: DashMap<String, Task>,
    subscribers: DashMap<Uuid, (OwnerFilter, SnapshotSink)>,
    writes: Mutex<Vec<WriteOp>>,
    reject_next_write: Mutex<Option<String>>,
    reset_requests: Mutex<Vec<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (identity_tx, _) = watch::channel(None);
        Self {
            accounts: DashMap::new(),
            social_profiles: DashMap::new(),
            issued_credentials: DashMap::new(),
            identity_tx,
            documents: DashMap::new(),
            subscribers: DashMap::new(),
            writes: Mutex::new(Vec::new()),
            reject_next_write: Mutex::new(None),
            reset_requests: Mutex::new(Vec::new()),
        }
    }

    /// Register an email + password account without signing it in.
    pub fn register_password_account(&self, email: &str, password: &str) -> Identity {
        self.insert_account(email, Some(password.to_string()), SignInMethod::Password)
    }

    /// Register an account that only knows a social sign-in method.
    pub fn register_social_account(&self, email: &str, provider: SocialProvider) -> Identity {
        self.insert_account(email, None, SignInMethod::Social(provider))
    }

    /// Script the email returned by `provider`'s sign-in flow.
    /// `None` makes the flow report [`ProviderError::UserCancelled`].
    pub fn set_social_profile(&self, provider: SocialProvider, email: Option<&str>) {
        match email {
            Some(email) => {
                self.social_profiles.insert(provider, email.to_string());
            }
            None => {
                self.social_profiles.remove(&provider);
            }
        }
    }

    /// Sign-in methods currently registered for `email`.
    pub fn methods_for(&self, email: &str) -> Vec<SignInMethod> {
        self.accounts
            .get(&normalize(email))
            .map(|a| a.methods.clone())
            .unwrap_or_default()
    }

    /// Currently signed-in identity.
    pub fn current_identity(&self) -> Option<Identity> {
        self.identity_tx.borrow().clone()
    }

    /// Make the next write fail with [`StoreError::Rejected`].
    pub fn reject_next_write(&self, reason: &str) {
        *lock(&self.reject_next_write) = Some(reason.to_string());
    }

    /// All writes issued so far, in call order.
    pub fn writes(&self) -> Vec<WriteOp> {
        lock(&self.writes).clone()
    }

    /// Emails for which a password reset was requested.
    pub fn reset_requests(&self) -> Vec<String> {
        lock(&self.reset_requests).clone()
    }

    /// Number of subscriptions whose handle is still open.
    pub fn open_subscriptions(&self) -> usize {
        self.subscribers.retain(|_, (_, sink)| !sink.is_closed());
        self.subscribers.len()
    }

    /// Owner filters of the open subscriptions.
    pub fn open_filters(&self) -> Vec<OwnerFilter> {
        self.subscribers.retain(|_, (_, sink)| !sink.is_closed());
        self.subscribers
            .iter()
            .map(|entry| entry.value().0.clone())
            .collect()
    }

    /// Insert a document directly, bypassing the write log. Pushes snapshots.
    pub fn seed_task(&self, task: Task) {
        let owner = task.owner_id.clone();
        self.documents.insert(task.id.clone(), task);
        self.publish(&owner);
    }

    fn insert_account(
        &self,
        email: &str,
        password: Option<String>,
        method: SignInMethod,
    ) -> Identity {
        let account = Account {
            id: crate::uuid::document_id(),
            email: email.to_string(),
            password,
            methods: vec![method],
        };
        let identity = account.identity();
        self.accounts.insert(normalize(email), account);
        identity
    }

    fn set_current(&self, identity: Option<Identity>) {
        info!(
            user_id = identity.as_ref().map(|i| i.id.as_str()),
            "identity changed"
        );
        self.identity_tx.send_replace(identity);
    }

    fn record(&self, op: WriteOp) -> Result<(), StoreError> {
        lock(&self.writes).push(op);
        match lock(&self.reject_next_write).take() {
            Some(reason) => Err(StoreError::Rejected(reason)),
            None => Ok(()),
        }
    }

    fn query(&self, filter: &OwnerFilter) -> Snapshot {
        let mut tasks: Vec<Task> = self
            .documents
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        Snapshot::new(tasks)
    }

    /// Push a fresh snapshot to every open subscription for `owner_id`.
    fn publish(&self, owner_id: &str) {
        self.subscribers.retain(|_, (_, sink)| !sink.is_closed());
        for entry in self.subscribers.iter() {
            let (filter, sink) = entry.value();
            if filter.owner_id == owner_id {
                sink.push(self.query(filter));
            }
        }
    }

    fn issue_credential(&self, provider: SocialProvider, email: &str) -> PendingCredential {
        let token = format!("memory:{}:{}", provider.provider_id(), crate::uuid::document_id());
        self.issued_credentials.insert(token.clone(), normalize(email));
        PendingCredential::new(provider, Some(token), None)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for MemoryBackend {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, ProviderError> {
        debug!(email, "sign in with password");
        if email.trim().is_empty() {
            return Err(ProviderError::MissingIdentifier);
        }
        let identity = {
            let account = self
                .accounts
                .get(&normalize(email))
                .ok_or(ProviderError::InvalidCredential)?;
            if account.password.as_deref() != Some(password) {
                return Err(ProviderError::InvalidCredential);
            }
            account.identity()
        };
        self.set_current(Some(identity.clone()));
        Ok(identity)
    }

    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, ProviderError> {
        debug!(email, "create account");
        if !looks_like_email(email) {
            return Err(ProviderError::InvalidEmail);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ProviderError::WeakPassword);
        }
        if self.accounts.contains_key(&normalize(email)) {
            return Err(ProviderError::EmailAlreadyInUse);
        }
        let identity = self.register_password_account(email, password);
        self.set_current(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in_with_social(
        &self,
        provider: SocialProvider,
    ) -> Result<Identity, ProviderError> {
        debug!(%provider, "social sign in");
        let email = self
            .social_profiles
            .get(&provider)
            .map(|e| e.value().clone())
            .ok_or(ProviderError::UserCancelled)?;
        let method = SignInMethod::Social(provider);

        let existing = self
            .accounts
            .get(&normalize(&email))
            .map(|a| a.value().clone());
        let identity = match existing {
            Some(account) if account.methods.contains(&method) => account.identity(),
            Some(_) => {
                let credential = self.issue_credential(provider, &email);
                return Err(ProviderError::AccountExistsWithDifferentCredential {
                    email,
                    credential,
                });
            }
            None => self.register_social_account(&email, provider),
        };
        self.set_current(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in_methods(&self, email: &str) -> Result<Vec<SignInMethod>, ProviderError> {
        if email.trim().is_empty() {
            return Err(ProviderError::MissingIdentifier);
        }
        Ok(self.methods_for(email))
    }

    async fn link_credential(
        &self,
        identity: &Identity,
        credential: PendingCredential,
    ) -> Result<Identity, ProviderError> {
        debug!(user_id = %identity.id, provider = %credential.provider, "link credential");
        let token = credential
            .id_token
            .as_deref()
            .ok_or(ProviderError::InvalidCredential)?;
        let (_, proven_email) = self
            .issued_credentials
            .remove(token)
            .ok_or(ProviderError::InvalidCredential)?;
        if proven_email != normalize(&identity.email) {
            return Err(ProviderError::InvalidCredential);
        }

        let mut account = self
            .accounts
            .get_mut(&proven_email)
            .ok_or(ProviderError::InvalidCredential)?;
        if account.id != identity.id {
            return Err(ProviderError::InvalidCredential);
        }
        let method = SignInMethod::Social(credential.provider);
        if !account.methods.contains(&method) {
            account.methods.push(method);
        }
        Ok(account.identity())
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.set_current(None);
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError> {
        if email.trim().is_empty() {
            return Err(ProviderError::MissingIdentifier);
        }
        if !looks_like_email(email) {
            return Err(ProviderError::InvalidEmail);
        }
        lock(&self.reset_requests).push(email.to_string());
        Ok(())
    }

    fn identity_changes(&self) -> IdentityFeed {
        self.identity_tx.subscribe()
    }
}

#[async_trait]
impl DocumentStore for MemoryBackend {
    async fn create_task(&self, task: &NewTask) -> Result<String, StoreError> {
        self.record(WriteOp::Create(task.clone()))?;
        let id = crate::uuid::document_id();
        self.documents.insert(id.clone(), task.clone().into_task(&id));
        self.publish(&task.owner_id);
        Ok(id)
    }

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<(), StoreError> {
        self.record(WriteOp::Update {
            id: id.to_string(),
            patch: patch.clone(),
        })?;
        let owner = {
            let mut task = self
                .documents
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            patch.apply(&mut task);
            task.owner_id.clone()
        };
        self.publish(&owner);
        Ok(())
    }

    async fn delete_task(&self, id: &str) -> Result<(), StoreError> {
        self.record(WriteOp::Delete { id: id.to_string() })?;
        // Deleting a missing document is not an error.
        if let Some((_, task)) = self.documents.remove(id) {
            self.publish(&task.owner_id);
        }
        Ok(())
    }

    fn subscribe(&self, filter: &OwnerFilter) -> Result<Subscription, StoreError> {
        let (sink, subscription) = subscription::channel();
        debug!(subscription = %sink.id(), owner_id = %filter.owner_id, "subscribe");
        sink.push(self.query(filter));
        self.subscribers.insert(sink.id(), (filter.clone(), sink));
        Ok(subscription)
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

fn looks_like_email(email: &str) -> bool {
    match email.trim().split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_account_validates_input() {
        let backend = MemoryBackend::new();
        assert!(matches!(
            backend.create_account("not-an-email", "secret").await,
            Err(ProviderError::InvalidEmail)
        ));
        assert!(matches!(
            backend.create_account("a@x.com", "12345").await,
            Err(ProviderError::WeakPassword)
        ));
        backend.create_account("a@x.com", "secret").await.unwrap();
        assert!(matches!(
            backend.create_account("A@x.com", "secret").await,
            Err(ProviderError::EmailAlreadyInUse)
        ));
    }

    #[tokio::test]
    async fn password_sign_in_publishes_identity() {
        let backend = MemoryBackend::new();
        let registered = backend.register_password_account("a@x.com", "secret");
        let mut feed = backend.identity_changes();
        assert!(feed.borrow().is_none());

        assert!(matches!(
            backend.sign_in_with_password("a@x.com", "wrong").await,
            Err(ProviderError::InvalidCredential)
        ));
        let identity = backend
            .sign_in_with_password("a@x.com", "secret")
            .await
            .unwrap();
        assert_eq!(identity, registered);

        feed.changed().await.unwrap();
        assert_eq!(feed.borrow_and_update().as_ref(), Some(&registered));

        backend.sign_out().await.unwrap();
        feed.changed().await.unwrap();
        assert!(feed.borrow_and_update().is_none());
    }

    #[tokio::test]
    async fn social_sign_in_conflicts_with_password_account() {
        let backend = MemoryBackend::new();
        let existing = backend.register_password_account("a@x.com", "secret");
        backend.set_social_profile(SocialProvider::Google, Some("a@x.com"));

        let err = backend
            .sign_in_with_social(SocialProvider::Google)
            .await
            .unwrap_err();
        let ProviderError::AccountExistsWithDifferentCredential { email, credential } = err else {
            panic!("expected conflict");
        };
        assert_eq!(email, "a@x.com");
        assert!(backend.current_identity().is_none());

        let linked = backend.link_credential(&existing, credential).await.unwrap();
        assert_eq!(linked, existing);
        assert_eq!(
            backend.methods_for("a@x.com"),
            vec![
                SignInMethod::Password,
                SignInMethod::Social(SocialProvider::Google)
            ]
        );

        // Now the social flow signs straight in.
        let identity = backend
            .sign_in_with_social(SocialProvider::Google)
            .await
            .unwrap();
        assert_eq!(identity, existing);
    }

    #[tokio::test]
    async fn pending_credential_is_single_use() {
        let backend = MemoryBackend::new();
        let existing = backend.register_password_account("a@x.com", "secret");
        backend.set_social_profile(SocialProvider::Facebook, Some("a@x.com"));
        let Err(ProviderError::AccountExistsWithDifferentCredential { credential, .. }) =
            backend.sign_in_with_social(SocialProvider::Facebook).await
        else {
            panic!("expected conflict");
        };

        backend
            .link_credential(&existing, credential.clone())
            .await
            .unwrap();
        assert!(matches!(
            backend.link_credential(&existing, credential).await,
            Err(ProviderError::InvalidCredential)
        ));
    }

    #[tokio::test]
    async fn unscripted_social_flow_is_cancelled() {
        let backend = MemoryBackend::new();
        assert!(matches!(
            backend.sign_in_with_social(SocialProvider::Google).await,
            Err(ProviderError::UserCancelled)
        ));
    }

    #[tokio::test]
    async fn writes_push_owner_scoped_snapshots() {
        let backend = MemoryBackend::new();
        let mut mine = backend.subscribe(&OwnerFilter::new("u1")).unwrap();
        let mut theirs = backend.subscribe(&OwnerFilter::new("u2")).unwrap();

        assert_eq!(mine.next_snapshot().await, Some(Snapshot::default()));
        assert_eq!(theirs.next_snapshot().await, Some(Snapshot::default()));

        let id = backend
            .create_task(&NewTask::open("Buy milk", "u1"))
            .await
            .unwrap();
        let snapshot = mine.next_snapshot().await.unwrap();
        assert_eq!(snapshot.tasks.len(), 1);
        assert_eq!(snapshot.tasks[0].id, id);
        assert!(theirs.try_next_snapshot().is_none());

        backend
            .update_task(&id, &TaskPatch::completed(true))
            .await
            .unwrap();
        assert!(mine.next_snapshot().await.unwrap().tasks[0].completed);

        backend.delete_task(&id).await.unwrap();
        assert!(mine.next_snapshot().await.unwrap().tasks.is_empty());

        assert_eq!(
            backend.writes(),
            vec![
                WriteOp::Create(NewTask::open("Buy milk", "u1")),
                WriteOp::Update {
                    id: id.clone(),
                    patch: TaskPatch::completed(true)
                },
                WriteOp::Delete { id },
            ]
        );
    }

    #[tokio::test]
    async fn rejected_write_leaves_documents_unchanged() {
        let backend = MemoryBackend::new();
        let mut sub = backend.subscribe(&OwnerFilter::new("u1")).unwrap();
        sub.next_snapshot().await;

        backend.reject_next_write("permission denied");
        let err = backend
            .create_task(&NewTask::open("nope", "u1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(ref r) if r == "permission denied"));
        assert!(sub.try_next_snapshot().is_none());

        // Only the next write is rejected.
        backend
            .create_task(&NewTask::open("yes", "u1"))
            .await
            .unwrap();
        assert_eq!(sub.next_snapshot().await.unwrap().tasks.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_subscriptions_are_pruned() {
        let backend = MemoryBackend::new();
        let sub = backend.subscribe(&OwnerFilter::new("u1")).unwrap();
        assert_eq!(backend.open_subscriptions(), 1);
        sub.cancel();
        assert_eq!(backend.open_subscriptions(), 0);
    }

    #[tokio::test]
    async fn password_reset_is_recorded() {
        let backend = MemoryBackend::new();
        assert!(matches!(
            backend.send_password_reset("").await,
            Err(ProviderError::MissingIdentifier)
        ));
        backend.send_password_reset("a@x.com").await.unwrap();
        assert_eq!(backend.reset_requests(), vec!["a@x.com".to_string()]);
    }
}
