use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use k8s_openapi::{
    ByteString,
    api::core::v1::{ObjectReference, Secret},
    apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference},
};
use parking_lot::Mutex;

use super::*;
use crate::{
    credentials::IssuedCredentials as Issued,
    registry::{Consumer, RoleStore},
    source::{self, PodRoleSource},
    store,
};

const BASE_ROLE_ARN: &str = "arn:aws:iam::012345678910:role/";
const ROLE_ARN_PREFIX: &str = "arn:aws:iam::";
const REFRESH_LIMIT: Duration = Duration::from_secs(15 * 60);

fn now() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("valid") }

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect()
}

fn text(secret: &Secret, key: &str) -> Option<String> { secret.data_str(key).map(ToString::to_string) }

#[derive(Default)]
struct FakeStore {
    secrets: Mutex<BTreeMap<(String, String), Secret>>,
    writes: Mutex<Vec<String>>,
    fail_list: bool,
}

impl FakeStore {
    fn with(secrets: Vec<Secret>) -> Self {
        let store = Self::default();
        for secret in secrets {
            let key = (
                secret.metadata.namespace.clone().unwrap_or_default(),
                secret.metadata.name.clone().unwrap_or_default(),
            );
            let _unused = store.secrets.lock().insert(key, secret);
        }
        store
    }

    fn get(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets.lock().get(&(namespace.to_string(), name.to_string())).cloned()
    }

    fn writes(&self) -> Vec<String> { self.writes.lock().clone() }
}

fn key_of(secret: &Secret) -> (String, String) {
    (
        secret.metadata.namespace.clone().unwrap_or_default(),
        secret.metadata.name.clone().unwrap_or_default(),
    )
}

impl SecretStore for FakeStore {
    async fn list(&self, selector: &str) -> Result<Vec<Secret>, store::Error> {
        if self.fail_list {
            return Err(store::Error::IncompleteSecret { field: "namespace" });
        }
        let wanted = selector
            .split(',')
            .filter_map(|pair| pair.split_once('='))
            .collect::<Vec<_>>();
        Ok(self
            .secrets
            .lock()
            .values()
            .filter(|secret| {
                let labels = secret.metadata.labels.clone().unwrap_or_default();
                wanted.iter().all(|(key, value)| labels.get(*key).map(String::as_str) == Some(value))
            })
            .cloned()
            .collect())
    }

    async fn create(&self, secret: &Secret) -> Result<(), store::Error> {
        let (namespace, name) = key_of(secret);
        self.writes.lock().push(format!("create {namespace}/{name}"));
        let _unused = self.secrets.lock().insert((namespace, name), secret.clone());
        Ok(())
    }

    async fn update(&self, secret: &Secret) -> Result<(), store::Error> {
        let (namespace, name) = key_of(secret);
        self.writes.lock().push(format!("update {namespace}/{name}"));
        let _unused = self.secrets.lock().insert((namespace, name), secret.clone());
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), store::Error> {
        self.writes.lock().push(format!("delete {namespace}/{name}"));
        let _unused = self.secrets.lock().remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }
}

/// Declarations standing in for `AWSIAMRole` resources.
#[derive(Default)]
struct FakeSource {
    declarations: Mutex<Vec<Declaration>>,
    reports: Mutex<Vec<RoleStatus>>,
}

impl FakeSource {
    fn with(declarations: Vec<Declaration>) -> Self {
        Self { declarations: Mutex::new(declarations), reports: Mutex::default() }
    }
}

impl DesiredStateSource for FakeSource {
    fn name(&self) -> &'static str { "fake" }

    fn secret_selector(&self) -> String { "heritage=kube-aws-iam-controller,type=awsiamrole".to_string() }

    fn manages(&self, _secret: &Secret) -> bool { true }

    async fn declarations(&self) -> Result<Vec<Declaration>, source::Error> {
        Ok(self.declarations.lock().clone())
    }

    async fn report(&self, declaration: &Declaration, status: &RoleStatus) -> Result<(), source::Error> {
        self.reports.lock().push(status.clone());
        for stored in self.declarations.lock().iter_mut() {
            if stored.namespace == declaration.namespace
                && stored.secret_name == declaration.secret_name
            {
                stored.status = Some(status.clone());
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeIssuer {
    calls: Mutex<Vec<String>>,
    broken: BTreeSet<String>,
    issued_at: Option<DateTime<Utc>>,
}

impl CredentialsIssuer for Arc<FakeIssuer> {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        _duration: Duration,
    ) -> Result<Issued, credentials::Error> {
        self.calls.lock().push(role_arn.to_string());
        if self.broken.contains(role_arn) {
            return Err(credentials::Error::MissingCredentials { role_arn: role_arn.to_string() });
        }
        Ok(Issued {
            access_key_id: format!("AKIA-{session_name}"),
            secret_access_key: "secret".to_string(),
            session_token: "token".to_string(),
            expiration: self.issued_at.unwrap_or_else(now) + TimeDelta::hours(1),
        })
    }
}

#[derive(Default)]
struct FakeRecorder {
    events: Mutex<Vec<(String, String)>>,
}

impl EventRecorder for Arc<FakeRecorder> {
    async fn record(&self, subject: &ObjectReference, _type_: EventType, reason: &str, _note: String) {
        self.events
            .lock()
            .push((subject.name.clone().unwrap_or_default(), reason.to_string()));
    }
}

type TestReconciler<D> = Reconciler<Arc<FakeStore>, D, Arc<FakeIssuer>, Arc<FakeRecorder>>;

impl SecretStore for Arc<FakeStore> {
    async fn list(&self, selector: &str) -> Result<Vec<Secret>, store::Error> {
        self.as_ref().list(selector).await
    }

    async fn create(&self, secret: &Secret) -> Result<(), store::Error> {
        self.as_ref().create(secret).await
    }

    async fn update(&self, secret: &Secret) -> Result<(), store::Error> {
        self.as_ref().update(secret).await
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), store::Error> {
        self.as_ref().delete(namespace, name).await
    }
}

impl DesiredStateSource for Arc<FakeSource> {
    fn name(&self) -> &'static str { self.as_ref().name() }

    fn secret_selector(&self) -> String { self.as_ref().secret_selector() }

    fn manages(&self, secret: &Secret) -> bool { self.as_ref().manages(secret) }

    async fn declarations(&self) -> Result<Vec<Declaration>, source::Error> {
        self.as_ref().declarations().await
    }

    async fn report(&self, declaration: &Declaration, status: &RoleStatus) -> Result<(), source::Error> {
        self.as_ref().report(declaration, status).await
    }
}

struct Harness<D> {
    store: Arc<FakeStore>,
    issuer: Arc<FakeIssuer>,
    recorder: Arc<FakeRecorder>,
    reconciler: TestReconciler<D>,
}

fn harness<D>(store: FakeStore, source: D, issuer: FakeIssuer) -> Harness<D>
where
    D: DesiredStateSource,
{
    let store = Arc::new(store);
    let issuer = Arc::new(issuer);
    let recorder = Arc::new(FakeRecorder::default());
    let reconciler = Reconciler::new(
        Arc::clone(&store),
        source,
        CredentialsFetcher::new(Arc::clone(&issuer), BASE_ROLE_ARN, ROLE_ARN_PREFIX),
        Arc::clone(&recorder),
        REFRESH_LIMIT,
    );
    Harness { store, issuer, recorder, reconciler }
}

fn owner(name: &str) -> OwnerReference {
    OwnerReference {
        api_version: "zalando.org/v1".to_string(),
        kind: "AWSIAMRole".to_string(),
        name: name.to_string(),
        uid: format!("uid-{name}"),
        ..OwnerReference::default()
    }
}

fn declaration(name: &str, generation: i64) -> Declaration {
    Declaration {
        namespace: "default".to_string(),
        secret_name: name.to_string(),
        role: name.to_string(),
        session_duration: Duration::from_secs(3600),
        labels: labels(&[("heritage", "kube-aws-iam-controller"), ("type", "awsiamrole")]),
        generation: Some(generation),
        owner: Some(owner(name)),
        status: None,
    }
}

fn owned_secret(name: &str, generation: &str, expire: DateTime<Utc>) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            labels: Some(labels(&[("heritage", "kube-aws-iam-controller"), ("type", "awsiamrole")])),
            owner_references: Some(vec![owner(name)]),
            ..ObjectMeta::default()
        },
        data: Some(
            [
                ("role-arn", format!("{BASE_ROLE_ARN}{name}")),
                ("expire", format_expiration(&expire)),
                ("awsiamrole-generation", generation.to_string()),
            ]
            .into_iter()
            .map(|(key, value)| (key.to_string(), ByteString(value.into_bytes())))
            .collect(),
        ),
        ..Secret::default()
    }
}

#[tokio::test]
async fn test_creates_missing_secret_and_reports_status() {
    let source = Arc::new(FakeSource::with(vec![declaration("svc-a", 2)]));
    let Harness { store, issuer, recorder, reconciler } =
        harness(FakeStore::default(), Arc::clone(&source), FakeIssuer::default());

    let summary = reconciler.reconcile(now()).await.expect("tick");
    assert_eq!(summary, TickSummary { created: 1, reported: 1, ..TickSummary::default() });

    let secret = store.get("default", "svc-a").expect("secret created");
    assert_eq!(text(&secret, "role-arn").as_deref(), Some("arn:aws:iam::012345678910:role/svc-a"));
    assert_eq!(text(&secret, "awsiamrole-generation").as_deref(), Some("2"));
    assert_eq!(text(&secret, "expire").as_deref(), Some("2024-05-01T13:00:00Z"));
    assert_eq!(secret.metadata.owner_references, Some(vec![owner("svc-a")]));
    assert_eq!(
        secret.metadata.labels,
        Some(labels(&[("heritage", "kube-aws-iam-controller"), ("type", "awsiamrole")]))
    );

    let reports = source.reports.lock().clone();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].observed_generation, 2);
    assert_eq!(reports[0].role_arn, "arn:aws:iam::012345678910:role/svc-a");
    assert_eq!(issuer.calls.lock().len(), 1);
    assert_eq!(
        recorder.events.lock().as_slice(),
        &[("svc-a".to_string(), "CreateCredentials".to_string())]
    );
}

#[tokio::test]
async fn test_second_tick_writes_nothing() {
    let source = Arc::new(FakeSource::with(vec![declaration("svc-a", 2), declaration("svc-b", 1)]));
    let Harness { store, issuer, reconciler, .. } =
        harness(FakeStore::default(), Arc::clone(&source), FakeIssuer::default());

    let first = reconciler.reconcile(now()).await.expect("first tick");
    assert_eq!(first.created, 2);
    let writes = store.writes();

    let second = reconciler.reconcile(now() + TimeDelta::minutes(1)).await.expect("second tick");
    assert_eq!(second.writes(), 0);
    assert_eq!(second.failed, 0);
    assert_eq!(store.writes(), writes);
    assert_eq!(issuer.calls.lock().len(), 2);
}

#[tokio::test]
async fn test_refreshes_stale_secret_before_expiry() {
    let source = Arc::new(FakeSource::with(vec![declaration("svc-a", 2)]));
    let store = FakeStore::with(vec![owned_secret("svc-a", "1", now() + TimeDelta::hours(1))]);
    let Harness { store, issuer, recorder, reconciler } =
        harness(store, Arc::clone(&source), FakeIssuer::default());

    let summary = reconciler.reconcile(now()).await.expect("tick");
    assert_eq!(summary, TickSummary { updated: 1, reported: 1, ..TickSummary::default() });

    let secret = store.get("default", "svc-a").expect("secret kept");
    assert_eq!(text(&secret, "awsiamrole-generation").as_deref(), Some("2"));
    assert_eq!(
        text(&secret, "credentials").map(|file| file.contains("AKIA-012345678910.svc-a")),
        Some(true)
    );
    assert_eq!(store.writes(), vec!["update default/svc-a".to_string()]);
    assert_eq!(issuer.calls.lock().len(), 1);
    assert_eq!(
        recorder.events.lock().as_slice(),
        &[("svc-a".to_string(), "UpdateCredentials".to_string())]
    );
}

#[tokio::test]
async fn test_refreshes_expiring_secret() {
    let source = Arc::new(FakeSource::with(vec![declaration("svc-a", 1)]));
    let store = FakeStore::with(vec![owned_secret("svc-a", "1", now() + TimeDelta::minutes(5))]);
    let Harness { store, reconciler, .. } = harness(store, Arc::clone(&source), FakeIssuer::default());

    let summary = reconciler.reconcile(now()).await.expect("tick");
    assert_eq!(summary.updated, 1);

    let secret = store.get("default", "svc-a").expect("secret kept");
    assert_eq!(text(&secret, "expire").as_deref(), Some("2024-05-01T13:00:00Z"));
}

#[tokio::test]
async fn test_syncs_status_of_current_secret_without_fetching() {
    let source = Arc::new(FakeSource::with(vec![declaration("svc-a", 3)]));
    let store = FakeStore::with(vec![owned_secret("svc-a", "3", now() + TimeDelta::minutes(50))]);
    let Harness { store, issuer, reconciler, .. } =
        harness(store, Arc::clone(&source), FakeIssuer::default());

    let summary = reconciler.reconcile(now()).await.expect("tick");
    assert_eq!(summary, TickSummary { reported: 1, ..TickSummary::default() });
    assert!(store.writes().is_empty());
    assert!(issuer.calls.lock().is_empty());

    let reports = source.reports.lock().clone();
    assert_eq!(
        reports,
        vec![RoleStatus::new(
            3,
            "arn:aws:iam::012345678910:role/svc-a",
            now() + TimeDelta::minutes(50)
        )]
    );
}

#[tokio::test]
async fn test_deletes_orphans() {
    let mut foreign = owned_secret("svc-a", "1", now() + TimeDelta::hours(1));
    foreign.metadata.owner_references = Some(vec![OwnerReference {
        uid: "uid-previous".to_string(),
        ..owner("svc-a")
    }]);
    let source = Arc::new(FakeSource::with(vec![declaration("svc-a", 1)]));
    let mut stray = owned_secret("stray", "1", now() + TimeDelta::hours(1));
    stray.metadata.owner_references = None;
    let store = FakeStore::with(vec![
        foreign,
        owned_secret("gone", "1", now() + TimeDelta::hours(1)),
        stray,
    ]);
    let Harness { store, reconciler, .. } = harness(store, Arc::clone(&source), FakeIssuer::default());

    let summary = reconciler.reconcile(now()).await.expect("tick");
    assert_eq!(summary.deleted, 3);
    assert_eq!(summary.created, 1);

    assert!(store.get("default", "gone").is_none());
    assert!(store.get("default", "stray").is_none());
    let recreated = store.get("default", "svc-a").expect("secret recreated");
    assert_eq!(recreated.metadata.owner_references, Some(vec![owner("svc-a")]));
    assert_eq!(
        store.writes(),
        vec![
            "delete default/gone".to_string(),
            "delete default/stray".to_string(),
            "delete default/svc-a".to_string(),
            "create default/svc-a".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_fetch_failure_does_not_block_others() {
    let source = Arc::new(FakeSource::with(vec![declaration("broken", 1), declaration("svc-a", 1)]));
    let issuer = FakeIssuer {
        broken: BTreeSet::from(["arn:aws:iam::012345678910:role/broken".to_string()]),
        ..FakeIssuer::default()
    };
    let Harness { store, recorder, reconciler, .. } =
        harness(FakeStore::default(), Arc::clone(&source), issuer);

    let summary = reconciler.reconcile(now()).await.expect("tick");
    assert_eq!(summary.created, 1);
    assert_eq!(summary.failed, 1);
    assert!(store.get("default", "broken").is_none());
    assert!(store.get("default", "svc-a").is_some());
    assert!(
        recorder
            .events
            .lock()
            .contains(&("broken".to_string(), "GetCredentialsFailed".to_string()))
    );
}

#[tokio::test]
async fn test_list_failure_aborts_tick() {
    let source = Arc::new(FakeSource::with(vec![declaration("svc-a", 1)]));
    let store = FakeStore { fail_list: true, ..FakeStore::default() };
    let Harness { store, issuer, reconciler, .. } = harness(store, Arc::clone(&source), FakeIssuer::default());

    assert!(matches!(reconciler.reconcile(now()).await, Err(Error::ListSecrets { .. })));
    assert!(store.writes().is_empty());
    assert!(issuer.calls.lock().is_empty());
}

fn pod_secret(namespace: &str, name: &str, owner_references: Option<Vec<OwnerReference>>) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels(&[("heritage", "kube-aws-iam-controller")])),
            owner_references,
            ..ObjectMeta::default()
        },
        ..Secret::default()
    }
}

#[tokio::test]
async fn test_pod_roles_share_one_issuance() {
    let roles = Arc::new(RoleStore::new());
    roles.replace(
        &["team-a", "team-b", "team-c"].map(|namespace| Consumer::new("svc-a", namespace, "web-0")),
    );
    let Harness { store, issuer, recorder, reconciler } =
        harness(FakeStore::default(), PodRoleSource::new(roles), FakeIssuer::default());

    let summary = reconciler.reconcile(now()).await.expect("tick");
    assert_eq!(summary, TickSummary { created: 3, ..TickSummary::default() });
    assert_eq!(issuer.calls.lock().len(), 1);
    for namespace in ["team-a", "team-b", "team-c"] {
        let secret = store.get(namespace, "aws-iam-svc-a").expect("secret created");
        assert_eq!(secret.metadata.owner_references, None);
        assert_eq!(text(&secret, "awsiamrole-generation"), None);
    }
    assert!(recorder.events.lock().is_empty());

    let second = reconciler.reconcile(now()).await.expect("second tick");
    assert_eq!(second.writes(), 0);
}

#[tokio::test]
async fn test_pod_roles_delete_unwanted_and_skip_owned_secrets() {
    let roles = Arc::new(RoleStore::new());
    roles.replace(&[]);
    let store = FakeStore::with(vec![
        pod_secret("default", "aws-iam-gone", None),
        pod_secret("default", "aws-iam-owned", Some(vec![owner("owned")])),
    ]);
    let Harness { store, reconciler, .. } =
        harness(store, PodRoleSource::new(roles), FakeIssuer::default());

    let summary = reconciler.reconcile(now()).await.expect("tick");
    assert_eq!(summary, TickSummary { deleted: 1, ..TickSummary::default() });
    assert!(store.get("default", "aws-iam-gone").is_none());
    assert!(store.get("default", "aws-iam-owned").is_some());
}

#[tokio::test]
async fn test_unsynced_pod_roles_touch_nothing() {
    let roles = Arc::new(RoleStore::new());
    let store = FakeStore::with(vec![pod_secret("default", "aws-iam-svc-a", None)]);
    let Harness { store, issuer, reconciler, .. } =
        harness(store, PodRoleSource::new(Arc::clone(&roles)), FakeIssuer::default());

    assert!(matches!(reconciler.reconcile(now()).await, Err(Error::ListDeclarations { .. })));
    assert!(store.writes().is_empty());
    assert!(store.get("default", "aws-iam-svc-a").is_some());
    assert!(issuer.calls.lock().is_empty());

    roles.replace(&[Consumer::new("svc-a", "default", "web-0")]);
    let summary = reconciler.reconcile(now()).await.expect("tick");
    assert_eq!(summary, TickSummary { updated: 1, ..TickSummary::default() });
    assert_eq!(store.writes(), vec!["update default/aws-iam-svc-a".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_run_waits_for_first_pod_listing() {
    let roles = Arc::new(RoleStore::new());
    let store = FakeStore::with(vec![pod_secret("default", "aws-iam-svc-a", None)]);
    let issuer = FakeIssuer { issued_at: Some(Utc::now()), ..FakeIssuer::default() };
    let Harness { store, reconciler, .. } =
        harness(store, PodRoleSource::new(Arc::clone(&roles)), issuer);

    let listing = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(15)).await;
        roles.replace(&[Consumer::new("svc-a", "default", "web-0")]);
    });
    let shutdown = Box::pin(tokio::time::sleep(Duration::from_secs(25)));
    reconciler.run(Duration::from_secs(10), shutdown).await;
    listing.await.expect("listing applied");

    assert_eq!(store.writes(), vec!["update default/aws-iam-svc-a".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_run_ticks_until_shutdown() {
    let roles = Arc::new(RoleStore::new());
    roles.replace(&[Consumer::new("svc-a", "default", "web-0")]);
    let issuer = FakeIssuer { issued_at: Some(Utc::now()), ..FakeIssuer::default() };
    let Harness { store, issuer, reconciler, .. } =
        harness(FakeStore::default(), PodRoleSource::new(roles), issuer);

    let shutdown = Box::pin(tokio::time::sleep(Duration::from_secs(25)));
    reconciler.run(Duration::from_secs(10), shutdown).await;

    assert!(store.get("default", "aws-iam-svc-a").is_some());
    assert_eq!(store.writes(), vec!["create default/aws-iam-svc-a".to_string()]);
    assert_eq!(issuer.calls.lock().len(), 1);
}
