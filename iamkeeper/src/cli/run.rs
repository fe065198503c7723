use std::{sync::Arc, time::Duration};

use aws_config::BehaviorVersion;
use clap::Args;
use iamkeeper_base::CONTROLLER_NAME;
use iamkeeper_controller::{
    arn,
    credentials::{self, CredentialsFetcher, StsIssuer},
    reconciler::Reconciler,
    recorder::KubeRecorder,
    registry::RoleStore,
    source::{AwsIamRoleSource, PodRoleSource},
    store::KubeSecretStore,
    watcher::{self, PodWatcher, RoleEventConsumer},
};
use sigfinn::{ExitStatus, LifecycleManager};
use snafu::ResultExt;

use crate::{
    cli::{Error, error},
    config::Config,
};

/// Options of the `run` subcommand. Each one overrides the matching config
/// key.
#[derive(Args, Clone, Default)]
pub struct RunCommand {
    #[arg(
        long = "interval",
        env = "IAMKEEPER_INTERVAL",
        help = "Seconds between two reconcile ticks."
    )]
    pub interval_secs: Option<u64>,

    #[arg(
        long = "refresh-limit",
        env = "IAMKEEPER_REFRESH_LIMIT",
        help = "Rotate credentials expiring within this many seconds."
    )]
    pub refresh_limit_secs: Option<u64>,

    #[arg(
        long = "event-queue-size",
        env = "IAMKEEPER_EVENT_QUEUE_SIZE",
        help = "Capacity of the queue between the pod watcher and the role registry."
    )]
    pub event_queue_size: Option<usize>,

    #[arg(
        long = "base-role-arn",
        env = "IAMKEEPER_BASE_ROLE_ARN",
        help = "Base role ARN relative role names are resolved against. Discovered from the \
                EC2 instance metadata when not set."
    )]
    pub base_role_arn: Option<String>,

    #[arg(
        long = "assume-role",
        env = "IAMKEEPER_ASSUME_ROLE",
        help = "Role to assume before requesting credentials for other roles."
    )]
    pub assume_role: Option<String>,

    #[arg(
        short,
        long,
        env = "IAMKEEPER_NAMESPACE",
        help = "Limit the controller to a single namespace. Defaults to all namespaces."
    )]
    pub namespace: Option<String>,

    #[arg(
        long = "use-regional-sts-endpoint",
        env = "IAMKEEPER_USE_REGIONAL_STS_ENDPOINT",
        help = "Send STS requests to the endpoint of the configured region."
    )]
    pub use_regional_sts_endpoint: bool,
}

impl RunCommand {
    /// `config` with the options given on the command line applied.
    fn merge(self, config: Config) -> Config {
        let Self {
            interval_secs,
            refresh_limit_secs,
            event_queue_size,
            base_role_arn,
            assume_role,
            namespace,
            use_regional_sts_endpoint,
        } = self;

        Config {
            interval: interval_secs.map_or(config.interval, Duration::from_secs),
            refresh_limit: refresh_limit_secs.map_or(config.refresh_limit, Duration::from_secs),
            event_queue_size: event_queue_size.unwrap_or(config.event_queue_size),
            base_role_arn: base_role_arn.or(config.base_role_arn),
            assume_role: assume_role.or(config.assume_role),
            namespace: namespace.or(config.namespace),
            use_regional_sts_endpoint: use_regional_sts_endpoint
                || config.use_regional_sts_endpoint,
            log: config.log,
        }
    }

    /// Runs the controller until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if no base role ARN can be determined or a worker
    /// fails.
    pub async fn run(self, kube_client: kube::Client, config: Config) -> Result<(), Error> {
        let Config {
            interval,
            refresh_limit,
            event_queue_size,
            base_role_arn,
            assume_role,
            namespace,
            use_regional_sts_endpoint,
            ..
        } = self.merge(config);

        let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;

        let base_role_arn = match base_role_arn {
            Some(base_role_arn) => base_role_arn,
            None => {
                let base_role_arn = credentials::discover_base_role_arn().await?;
                tracing::info!(%base_role_arn, "Autodiscovered base role ARN");
                base_role_arn
            }
        };
        let role_arn_prefix = arn::prefix_from_arn(&base_role_arn)
            .with_context(|_| error::RoleArnSnafu { role_arn: base_role_arn.clone() })?;
        let assume_role =
            assume_role.map(|role| arn::resolve_role_arn(&role, &base_role_arn, &role_arn_prefix));

        let issuer =
            StsIssuer::new(&sdk_config, assume_role.as_deref(), use_regional_sts_endpoint).await;
        let fetcher = CredentialsFetcher::new(issuer, base_role_arn, role_arn_prefix);
        let store = KubeSecretStore::new(kube_client.clone(), namespace.clone());
        let recorder = KubeRecorder::new(kube_client.clone(), CONTROLLER_NAME);

        let roles = Arc::new(RoleStore::new());
        let (sender, receiver) = watcher::role_event_queue(event_queue_size);

        let lifecycle_manager = LifecycleManager::<Error>::new();

        let pod_watcher = PodWatcher::new(kube_client.clone(), namespace.as_deref(), sender);
        let _handle = lifecycle_manager.spawn("pod-watcher", move |shutdown_signal| async move {
            match pod_watcher.run(shutdown_signal).await {
                Ok(()) => ExitStatus::Success,
                Err(err) => ExitStatus::Error(Error::from(err)),
            }
        });

        let consumer = RoleEventConsumer::new(Arc::clone(&roles), receiver);
        let _handle =
            lifecycle_manager.spawn("role-event-consumer", move |shutdown_signal| async move {
                consumer.run(shutdown_signal).await;
                ExitStatus::Success
            });

        let secrets_reconciler = Reconciler::new(
            store.clone(),
            PodRoleSource::new(roles),
            fetcher.clone(),
            recorder.clone(),
            refresh_limit,
        );
        let _handle =
            lifecycle_manager.spawn("secrets-reconciler", move |shutdown_signal| async move {
                secrets_reconciler.run(interval, shutdown_signal).await;
                ExitStatus::Success
            });

        let awsiamrole_reconciler = Reconciler::new(
            store,
            AwsIamRoleSource::new(kube_client, namespace),
            fetcher,
            recorder,
            refresh_limit,
        );
        let _handle =
            lifecycle_manager.spawn("awsiamrole-reconciler", move |shutdown_signal| async move {
                awsiamrole_reconciler.run(interval, shutdown_signal).await;
                ExitStatus::Success
            });

        tracing::info!(?interval, ?refresh_limit, "Controller started. Use Ctrl+C to stop.");

        if let Ok(Err(err)) = lifecycle_manager.serve().await {
            tracing::error!("{err}");
            Err(err)
        } else {
            Ok(())
        }
    }
}
