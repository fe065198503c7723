//! The reconcile loop.
//!
//! Every tick lists the secrets and the declarations of one
//! [`DesiredStateSource`], classifies them with [`drift::detect`] and then
//!
//! 1. deletes orphaned secrets,
//! 2. refreshes secrets that expire soon or were written for an older
//!    generation, and reports status for current ones,
//! 3. creates secrets that are declared but missing.
//!
//! Failures of a single item are logged (and recorded as an event on the
//! declaring object) and never stop the tick. Failing to list aborts the tick;
//! the next one starts from scratch.

mod error;

use std::{collections::BTreeMap, time::Duration};

use chrono::{DateTime, Utc};
use futures::{FutureExt, StreamExt};
use k8s_openapi::{
    ByteString, api::core::v1::Secret, apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use snafu::ResultExt;
use tokio::time::MissedTickBehavior;

pub use self::error::Error;
use crate::{
    consts::k8s::secret,
    credentials::{self, Credentials, CredentialsFetcher, CredentialsIssuer, format_expiration},
    drift::{self, DriftPlan, ManagedSecret},
    ext::SecretExt,
    recorder::{EventRecorder, EventType, reasons},
    source::{Declaration, DesiredStateSource, RoleStatus},
    store::SecretStore,
};

/// Counts of what one tick did.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TickSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub reported: usize,
    pub failed: usize,
}

impl TickSummary {
    /// Number of writes issued against the cluster.
    #[must_use]
    pub const fn writes(&self) -> usize { self.created + self.updated + self.deleted + self.reported }
}

/// Credentials fetched during one tick, keyed by role and session duration.
type IssuedCredentials = BTreeMap<(String, Duration), Credentials>;

/// Keeps the secrets of one [`DesiredStateSource`] in line with its
/// declarations.
pub struct Reconciler<S, D, I, R> {
    store: S,
    source: D,
    fetcher: CredentialsFetcher<I>,
    recorder: R,
    refresh_limit: Duration,
}

impl<S, D, I, R> Reconciler<S, D, I, R>
where
    S: SecretStore,
    D: DesiredStateSource,
    I: CredentialsIssuer,
    R: EventRecorder,
{
    /// Credentials expiring within `refresh_limit` are rotated.
    pub const fn new(
        store: S,
        source: D,
        fetcher: CredentialsFetcher<I>,
        recorder: R,
        refresh_limit: Duration,
    ) -> Self {
        Self { store, source, fetcher, recorder, refresh_limit }
    }

    /// Reconciles every `interval` until `shutdown_signal` resolves.
    ///
    /// A running tick is always completed; shutdown is only observed between
    /// ticks.
    pub async fn run(self, interval: Duration, shutdown_signal: impl Future<Output = ()> + Unpin) {
        let mut shutdown_signal = shutdown_signal.into_stream();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(source = self.source.name(), ?interval, "Starting reconciler");
        loop {
            tokio::select! {
                biased;
                _ = shutdown_signal.next() => break,
                _ = ticker.tick() => {}
            }

            match self.reconcile(Utc::now()).await {
                Ok(summary) => {
                    tracing::debug!(source = self.source.name(), ?summary, "Reconciled");
                }
                Err(err) => tracing::error!(source = self.source.name(), "{err}"),
            }
        }
        tracing::info!(source = self.source.name(), "Terminating reconciler");
    }

    /// Runs a single tick as of `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the secrets or the declarations cannot be listed.
    /// Nothing is written in that case.
    pub async fn reconcile(&self, now: DateTime<Utc>) -> Result<TickSummary, Error> {
        let secrets = self
            .store
            .list(&self.source.secret_selector())
            .await
            .context(error::ListSecretsSnafu)?
            .into_iter()
            .filter(|secret| self.source.manages(secret))
            .collect();
        let declarations = self.source.declarations().await.context(error::ListDeclarationsSnafu)?;

        let DriftPlan { orphans, managed, missing } =
            drift::detect(declarations, secrets, self.refresh_limit, now);

        let mut summary = TickSummary::default();
        let mut issued = IssuedCredentials::new();

        for orphan in orphans {
            self.delete_orphan(&orphan, &mut summary).await;
        }
        for managed in managed {
            self.sync_managed(managed, &mut issued, &mut summary).await;
        }
        for declaration in missing {
            self.create_missing(&declaration, &mut issued, &mut summary).await;
        }

        Ok(summary)
    }

    async fn delete_orphan(&self, orphan: &Secret, summary: &mut TickSummary) {
        let (Some(namespace), Some(name)) =
            (orphan.metadata.namespace.as_deref(), orphan.metadata.name.as_deref())
        else {
            tracing::warn!("Skipping secret without namespace or name");
            return;
        };

        match self.store.delete(namespace, name).await {
            Ok(()) => {
                summary.deleted += 1;
                tracing::info!(
                    action = "delete",
                    role_arn = orphan.data_str(secret::ROLE_ARN_KEY),
                    secret = name,
                    namespace,
                    "Removing unused credentials"
                );
            }
            Err(err) => {
                summary.failed += 1;
                tracing::error!("{err}");
            }
        }
    }

    async fn sync_managed(
        &self,
        managed: ManagedSecret,
        issued: &mut IssuedCredentials,
        summary: &mut TickSummary,
    ) {
        let ManagedSecret { declaration, mut secret, drift } = managed;

        if !drift.needs_credentials() {
            self.report_from_secret(&declaration, &secret, summary).await;
            return;
        }

        let Some((credentials, data)) = self.issue(&declaration, issued, summary).await else {
            return;
        };
        secret.metadata.labels = Some(declaration.labels.clone());
        secret.data = Some(data);

        if let Err(err) = self.store.update(&secret).await {
            summary.failed += 1;
            tracing::error!("{err}");
            self.event(
                &declaration,
                EventType::Warning,
                reasons::UPDATE_SECRET_FAILED,
                format!(
                    "Failed to update secret {}/{} with credentials: {err}",
                    declaration.namespace, declaration.secret_name
                ),
            )
            .await;
            return;
        }

        summary.updated += 1;
        let expire = format_expiration(&credentials.expiration);
        tracing::info!(
            action = "update",
            role_arn = %credentials.role_arn,
            secret = %declaration.secret_name,
            namespace = %declaration.namespace,
            %expire,
            ?drift,
            "Refreshed credentials"
        );
        self.event(
            &declaration,
            EventType::Normal,
            reasons::UPDATE_CREDENTIALS,
            format!(
                "Updated credentials for role '{}', expiry time: {expire}",
                credentials.role_arn
            ),
        )
        .await;

        self.report(&declaration, &credentials.role_arn, credentials.expiration, summary).await;
    }

    async fn create_missing(
        &self,
        declaration: &Declaration,
        issued: &mut IssuedCredentials,
        summary: &mut TickSummary,
    ) {
        let Some((credentials, data)) = self.issue(declaration, issued, summary).await else {
            return;
        };
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(declaration.secret_name.clone()),
                namespace: Some(declaration.namespace.clone()),
                labels: Some(declaration.labels.clone()),
                owner_references: declaration.owner.clone().map(|owner| vec![owner]),
                ..ObjectMeta::default()
            },
            data: Some(data),
            ..Secret::default()
        };

        if let Err(err) = self.store.create(&secret).await {
            summary.failed += 1;
            tracing::error!("{err}");
            self.event(
                declaration,
                EventType::Warning,
                reasons::CREATE_SECRET_FAILED,
                format!(
                    "Failed to create secret {}/{} with credentials: {err}",
                    declaration.namespace, declaration.secret_name
                ),
            )
            .await;
            return;
        }

        summary.created += 1;
        let expire = format_expiration(&credentials.expiration);
        tracing::info!(
            action = "create",
            role_arn = %credentials.role_arn,
            secret = %declaration.secret_name,
            namespace = %declaration.namespace,
            %expire,
            "Created credentials"
        );
        self.event(
            declaration,
            EventType::Normal,
            reasons::CREATE_CREDENTIALS,
            format!(
                "Created credentials for role '{}', expiry time: {expire}",
                credentials.role_arn
            ),
        )
        .await;

        self.report(declaration, &credentials.role_arn, credentials.expiration, summary).await;
    }

    /// Fetches credentials for `declaration`, reusing those already issued
    /// this tick, and renders the secret data. Failures are logged and
    /// counted.
    async fn issue(
        &self,
        declaration: &Declaration,
        issued: &mut IssuedCredentials,
        summary: &mut TickSummary,
    ) -> Option<(Credentials, BTreeMap<String, ByteString>)> {
        let result = match self.fetch(declaration, issued).await {
            Ok(credentials) => secret_data(&credentials, declaration).map(|data| (credentials, data)),
            Err(err) => Err(err),
        };

        match result {
            Ok(rendered) => Some(rendered),
            Err(err) => {
                summary.failed += 1;
                tracing::error!(
                    role = %declaration.role,
                    secret = %declaration.secret_name,
                    namespace = %declaration.namespace,
                    "Failed to get credentials, error: {err}"
                );
                self.event(
                    declaration,
                    EventType::Warning,
                    reasons::GET_CREDENTIALS_FAILED,
                    format!("Failed to get credentials for role '{}': {err}", declaration.role),
                )
                .await;
                None
            }
        }
    }

    async fn fetch(
        &self,
        declaration: &Declaration,
        issued: &mut IssuedCredentials,
    ) -> Result<Credentials, credentials::Error> {
        let key = (declaration.role.clone(), declaration.session_duration);
        if let Some(credentials) = issued.get(&key) {
            return Ok(credentials.clone());
        }

        let credentials = self.fetcher.fetch(&declaration.role, declaration.session_duration).await?;
        let _unused = issued.insert(key, credentials.clone());
        Ok(credentials)
    }

    /// Reports the status of a secret that is already current.
    async fn report_from_secret(
        &self,
        declaration: &Declaration,
        secret: &Secret,
        summary: &mut TickSummary,
    ) {
        let Some(expiration) = secret.expiration() else {
            return;
        };
        let role_arn = secret
            .data_str(secret::ROLE_ARN_KEY)
            .map_or_else(|| self.fetcher.role_arn(&declaration.role), ToString::to_string);

        self.report(declaration, &role_arn, expiration, summary).await;
    }

    /// Writes the status back to the declaring object unless it already says
    /// the same.
    async fn report(
        &self,
        declaration: &Declaration,
        role_arn: &str,
        expiration: DateTime<Utc>,
        summary: &mut TickSummary,
    ) {
        let Some(generation) = declaration.generation else {
            return;
        };
        let status = RoleStatus::new(generation, role_arn, expiration);
        if declaration.status.as_ref() == Some(&status) {
            return;
        }

        match self.source.report(declaration, &status).await {
            Ok(()) => summary.reported += 1,
            Err(err) => {
                summary.failed += 1;
                tracing::error!("{err}");
            }
        }
    }

    async fn event(&self, declaration: &Declaration, type_: EventType, reason: &str, note: String) {
        if let Some(subject) = declaration.object_reference() {
            self.recorder.record(&subject, type_, reason, note).await;
        }
    }
}

/// The full data of the secret backing `declaration`.
fn secret_data(
    credentials: &Credentials,
    declaration: &Declaration,
) -> Result<BTreeMap<String, ByteString>, credentials::Error> {
    let mut data = credentials.to_secret_data()?;
    if let Some(generation) = declaration.generation {
        let _unused = data
            .insert(secret::GENERATION_KEY.to_string(), ByteString(generation.to_string().into_bytes()));
    }
    Ok(data)
}

#[cfg(test)]
mod tests;
