//! Classifying observed secrets against declarations.
//!
//! [`detect`] is pure: it decides what the reconciler has to do without
//! touching the cluster, so every rule can be checked in isolation.

use std::{collections::BTreeMap, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use k8s_openapi::api::core::v1::Secret;

use crate::{ext::SecretExt, source::Declaration};

/// State of a secret that belongs to a live declaration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Drift {
    /// Credentials are current.
    Healthy,
    /// Credentials expire within the refresh limit, or their expiry is
    /// unknown.
    NeedsRefresh,
    /// The declaration changed since the secret was written.
    Stale,
}

impl Drift {
    #[must_use]
    pub const fn needs_credentials(self) -> bool { !matches!(self, Self::Healthy) }
}

/// A declared secret together with its state.
#[derive(Clone, Debug)]
pub struct ManagedSecret {
    pub declaration: Declaration,
    pub secret: Secret,
    pub drift: Drift,
}

/// The work one reconcile tick has to do.
#[derive(Clone, Debug, Default)]
pub struct DriftPlan {
    /// Secrets no live declaration accounts for.
    pub orphans: Vec<Secret>,
    /// Secrets with a matching declaration.
    pub managed: Vec<ManagedSecret>,
    /// Declarations without a secret.
    pub missing: Vec<Declaration>,
}

/// Compares `declarations` with the observed `secrets` at time `now`.
///
/// A secret is declared when a declaration names it and, for declarations
/// with an owner, the secret carries that exact owner reference. A secret with
/// a foreign or no owner reference is an orphan, never adopted; its
/// declaration is then reported as missing.
#[must_use]
pub fn detect(
    declarations: Vec<Declaration>,
    secrets: Vec<Secret>,
    refresh_limit: Duration,
    now: DateTime<Utc>,
) -> DriftPlan {
    let mut pending = declarations
        .into_iter()
        .map(|declaration| {
            ((declaration.namespace.clone(), declaration.secret_name.clone()), declaration)
        })
        .collect::<BTreeMap<_, _>>();

    let refresh_deadline = TimeDelta::from_std(refresh_limit)
        .ok()
        .and_then(|limit| now.checked_add_signed(limit));

    let mut plan = DriftPlan::default();
    for secret in secrets {
        let key = (
            secret.metadata.namespace.clone().unwrap_or_default(),
            secret.metadata.name.clone().unwrap_or_default(),
        );
        let declared = pending.get(&key).is_some_and(|declaration| {
            declaration.owner.as_ref().is_none_or(|owner| secret.is_owned_by(owner))
        });

        match pending.remove(&key) {
            Some(declaration) if declared => {
                let drift = classify(&declaration, &secret, refresh_deadline);
                plan.managed.push(ManagedSecret { declaration, secret, drift });
            }
            Some(declaration) => {
                plan.orphans.push(secret);
                plan.missing.push(declaration);
            }
            None => plan.orphans.push(secret),
        }
    }
    plan.missing.extend(pending.into_values());
    plan
}

fn classify(
    declaration: &Declaration,
    secret: &Secret,
    refresh_deadline: Option<DateTime<Utc>>,
) -> Drift {
    if let Some(generation) = declaration.generation
        && secret.generation_marker() != Some(generation)
    {
        return Drift::Stale;
    }

    match (secret.expiration(), refresh_deadline) {
        (Some(expiration), Some(deadline)) if deadline <= expiration => Drift::Healthy,
        _ => Drift::NeedsRefresh,
    }
}
