use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tokio::task::JoinHandle;

use crate::api;
use crate::auth::{AuthSnapshot, SessionHandle};
use crate::error::ApiError;
use crate::http::ApiClient;
use crate::models::company::{self, Company, CompanyPayload};
use crate::storage::{self, StorageKey};

const NOT_BOOTSTRAPPED: u64 = u64::MAX;

#[derive(Debug, Clone, Default)]
struct CompanyState {
    /// Session generation this state belongs to.
    epoch: u64,
    companies: Vec<Company>,
    current: Option<Company>,
    error: Option<String>,
    loading: bool,
}

impl CompanyState {
    fn empty(epoch: u64) -> Self {
        Self {
            epoch,
            ..Default::default()
        }
    }
}

/// The companies the signed-in user can open, and which one is open.
///
/// State is tagged with the session generation it was built under. Readers
/// never see state from an older generation, and every mutation commits
/// while holding the session's commit lock for the generation it started in.
pub struct CompanyContext {
    client: Arc<ApiClient>,
    session: Arc<SessionHandle>,
    state: RwLock<CompanyState>,
    load_seq: AtomicU64,
    bootstrapped: AtomicU64,
}

impl CompanyContext {
    pub fn new(client: Arc<ApiClient>, session: Arc<SessionHandle>) -> Self {
        let epoch = session.epoch();
        Self {
            client,
            session,
            state: RwLock::new(CompanyState::empty(epoch)),
            load_seq: AtomicU64::new(0),
            bootstrapped: AtomicU64::new(NOT_BOOTSTRAPPED),
        }
    }

    fn view<R>(&self, f: impl FnOnce(&CompanyState) -> R) -> R {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if state.epoch == self.session.epoch() {
            f(&state)
        } else {
            f(&CompanyState::empty(self.session.epoch()))
        }
    }

    /// Copy of the live state for `epoch`, empty if the held state is older.
    fn state_for(&self, epoch: u64) -> CompanyState {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if state.epoch == epoch {
            state.clone()
        } else {
            CompanyState::empty(epoch)
        }
    }

    fn replace(&self, next: CompanyState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Apply an in-memory-only change, if `epoch` is still live.
    async fn apply(&self, epoch: u64, f: impl FnOnce(&mut CompanyState)) -> bool {
        let Some(_guard) = self.session.lock_current(epoch).await else {
            return false;
        };
        let mut next = self.state_for(epoch);
        f(&mut next);
        self.replace(next);
        true
    }

    pub fn companies(&self) -> Vec<Company> {
        self.view(|s| s.companies.clone())
    }

    pub fn current_company(&self) -> Option<Company> {
        self.view(|s| s.current.clone())
    }

    pub fn current_company_id(&self) -> Option<String> {
        self.view(|s| s.current.as_ref().map(|c| c.id.clone()))
    }

    pub fn error(&self) -> Option<String> {
        self.view(|s| s.error.clone())
    }

    pub fn is_loading(&self) -> bool {
        self.view(|s| s.loading)
    }

    pub fn clear_error(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.error = None;
    }

    async fn record_error(&self, epoch: u64, err: &ApiError) {
        let message = err.user_message();
        self.apply(epoch, |s| s.error = Some(message)).await;
    }

    async fn persist_companies(&self, companies: &[Company]) -> Result<(), ApiError> {
        storage::write_json(self.session.storage(), StorageKey::Companies, companies).await?;
        Ok(())
    }

    async fn persist_current(&self, current: Option<&Company>) -> Result<(), ApiError> {
        let store = self.session.storage();
        match current {
            Some(company) => storage::write_json(store, StorageKey::CurrentCompany, company).await?,
            None => store.remove(StorageKey::CurrentCompany).await?,
        }
        Ok(())
    }

    async fn cached_companies(&self) -> Option<Vec<Company>> {
        let stored: Option<Value> =
            match storage::read_json(self.session.storage(), StorageKey::Companies).await {
                Ok(stored) => stored,
                Err(e) => {
                    tracing::warn!("Could not read cached companies: {e}");
                    return None;
                }
            };
        stored.and_then(|value| company::normalize_list(value).ok())
    }

    /// Fetch the accessible companies. Does nothing without a signed-in user.
    ///
    /// On failure the error is recorded and the last durable snapshot, if
    /// any, replaces the in-memory list so views keep something to show.
    /// Only the most recently issued load may commit its result.
    pub async fn load_companies(&self) -> Result<(), ApiError> {
        if self.session.snapshot().user.is_none() {
            tracing::debug!("No signed-in user, skipping company load");
            return Ok(());
        }

        let epoch = self.session.epoch();
        if self.session.access_token().await?.is_none() {
            let err = ApiError::AuthenticationRequired;
            self.record_error(epoch, &err).await;
            return Err(err);
        }

        let seq = self.load_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.apply(epoch, |s| s.loading = true).await;

        let result = api::companies::list(&self.client).await;

        let Some(_guard) = self.session.lock_current(epoch).await else {
            tracing::debug!("Session changed during company load, discarding result");
            return result.map(|_| ());
        };
        if self.load_seq.load(Ordering::SeqCst) != seq {
            tracing::debug!("Superseded by a newer company load, discarding result");
            return result.map(|_| ());
        }

        let mut next = self.state_for(epoch);
        next.loading = false;

        match result {
            Ok(companies) => {
                if let Err(e) = self.persist_companies(&companies).await {
                    tracing::error!("Failed to cache companies: {e}");
                }
                tracing::info!("Loaded {} companies", companies.len());
                next.companies = companies;
                next.error = None;
                self.replace(next);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Failed to load companies: {e}");
                if let Some(cached) = self.cached_companies().await {
                    tracing::info!("Showing {} cached companies", cached.len());
                    next.companies = cached;
                }
                next.error = Some(e.user_message());
                self.replace(next);
                Err(e)
            }
        }
    }

    pub async fn refresh_companies(&self) -> Result<(), ApiError> {
        self.load_companies().await
    }

    /// Make `company` current and persist the choice.
    pub async fn select_company(&self, company: Company) -> Result<(), ApiError> {
        let epoch = self.session.epoch();
        let Some(_guard) = self.session.lock_current(epoch).await else {
            return Ok(());
        };

        self.persist_current(Some(&company)).await?;
        tracing::info!(company_id = %company.id, "Selected company {}", company.name);

        let mut next = self.state_for(epoch);
        next.current = Some(company);
        self.replace(next);
        Ok(())
    }

    /// Create a company, add it to the list and make it current.
    pub async fn create_company(&self, payload: &CompanyPayload) -> Result<Company, ApiError> {
        let epoch = self.session.epoch();

        let company = match api::companies::create(&self.client, payload).await {
            Ok(company) => company,
            Err(e) => {
                tracing::warn!("Failed to create company: {e}");
                self.record_error(epoch, &e).await;
                return Err(e);
            }
        };

        let Some(_guard) = self.session.lock_current(epoch).await else {
            return Ok(company);
        };

        let mut next = self.state_for(epoch);
        match next.companies.iter_mut().find(|c| c.id == company.id) {
            Some(slot) => *slot = company.clone(),
            None => next.companies.push(company.clone()),
        }
        next.current = Some(company.clone());
        next.error = None;

        self.persist_companies(&next.companies).await?;
        self.persist_current(next.current.as_ref()).await?;
        self.replace(next);

        tracing::info!(company_id = %company.id, "Created company {}", company.name);
        Ok(company)
    }

    /// Update a company; the current pointer follows if it is the one updated.
    pub async fn update_company(
        &self,
        id: &str,
        payload: &CompanyPayload,
    ) -> Result<Company, ApiError> {
        let epoch = self.session.epoch();

        let company = match api::companies::update(&self.client, id, payload).await {
            Ok(company) => company,
            Err(e) => {
                tracing::warn!(company_id = %id, "Failed to update company: {e}");
                self.record_error(epoch, &e).await;
                return Err(e);
            }
        };

        let Some(_guard) = self.session.lock_current(epoch).await else {
            return Ok(company);
        };

        let mut next = self.state_for(epoch);
        if let Some(slot) = next.companies.iter_mut().find(|c| c.id == id) {
            *slot = company.clone();
        }
        let is_current = next.current.as_ref().is_some_and(|c| c.id == id);
        if is_current {
            next.current = Some(company.clone());
            self.persist_current(next.current.as_ref()).await?;
        }
        next.error = None;
        self.persist_companies(&next.companies).await?;
        self.replace(next);

        Ok(company)
    }

    /// Delete a company; deleting the current one leaves nothing selected.
    pub async fn delete_company(&self, id: &str) -> Result<(), ApiError> {
        let epoch = self.session.epoch();

        if let Err(e) = api::companies::delete(&self.client, id).await {
            tracing::warn!(company_id = %id, "Failed to delete company: {e}");
            self.record_error(epoch, &e).await;
            return Err(e);
        }

        let Some(_guard) = self.session.lock_current(epoch).await else {
            return Ok(());
        };

        let mut next = self.state_for(epoch);
        next.companies.retain(|c| c.id != id);
        if next.current.as_ref().is_some_and(|c| c.id == id) {
            next.current = None;
            self.persist_current(None).await?;
            tracing::info!(company_id = %id, "Deleted the current company, selection cleared");
        }
        next.error = None;
        self.persist_companies(&next.companies).await?;
        self.replace(next);

        Ok(())
    }

    /// Bring back the persisted selection, unless one was already made.
    async fn rehydrate_current(&self, epoch: u64) {
        let stored: Option<Value> =
            match storage::read_json(self.session.storage(), StorageKey::CurrentCompany).await {
                Ok(stored) => stored,
                Err(e) => {
                    tracing::warn!("Could not read stored company selection: {e}");
                    return;
                }
            };
        let Some(company) = stored.and_then(|v| Company::from_value(v).ok()) else {
            return;
        };

        let restored = self
            .apply(epoch, |s| {
                if s.current.is_none() {
                    s.current = Some(company);
                }
            })
            .await;
        if restored {
            tracing::debug!("Restored company selection from storage");
        }
    }

    /// Drop every in-memory company and the selection.
    pub fn reset(&self) {
        self.bootstrapped.store(NOT_BOOTSTRAPPED, Ordering::SeqCst);
        self.replace(CompanyState::empty(self.session.epoch()));
    }

    /// React to an authentication change.
    ///
    /// Nothing runs while start-up validation is still in progress. Once it
    /// has finished, a present user triggers one rehydrate-and-load per
    /// session generation; an absent user resets immediately.
    pub async fn sync_with_auth(&self, snapshot: &AuthSnapshot) {
        if snapshot.loading {
            return;
        }
        if snapshot.user.is_none() {
            self.reset();
            return;
        }

        let epoch = self.session.epoch();
        if self.bootstrapped.swap(epoch, Ordering::SeqCst) == epoch {
            return;
        }

        self.rehydrate_current(epoch).await;
        if let Err(e) = self.load_companies().await {
            tracing::debug!("Initial company load failed: {e}");
        }
    }

    /// Follow the session for the life of the returned task.
    pub fn spawn_auth_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let ctx = Arc::clone(self);
        let mut rx = ctx.session.subscribe();
        tokio::spawn(async move {
            loop {
                let snapshot = rx.borrow_and_update().clone();
                ctx.sync_with_auth(&snapshot).await;
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}
