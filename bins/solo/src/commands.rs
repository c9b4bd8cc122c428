//! Subcommand implementations

use anyhow::{Context, Result};
use clap::Args;
use solo_deployment::{
    teardown, ConfigTree, ContainerEngine, DockerEngine, HostResolver, LifecycleWaiter,
    SoloDeployment,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Daemon selection shared by every subcommand
#[derive(Args, Debug)]
pub struct DaemonArgs {
    /// Docker daemon URI, defaults to DOCKER_HOST then the local socket
    #[arg(long)]
    pub docker_host: Option<String>,

    /// Directory holding key.pem, cert.pem and ca.pem, defaults to DOCKER_CERT_PATH
    #[arg(long)]
    pub cert_path: Option<PathBuf>,
}

impl DaemonArgs {
    fn resolver(&self) -> HostResolver {
        HostResolver::new(self.docker_host.clone(), self.cert_path.clone())
    }

    fn connect(&self) -> Result<DockerEngine> {
        let address = self.resolver().resolve_address()?;
        DockerEngine::connect(&address)
            .with_context(|| format!("Failed to connect to Docker at {}", address.uri()))
    }
}

#[derive(Args, Debug)]
pub struct UpArgs {
    /// JSON config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Set a config value, `key=value`; may be repeated
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub assignments: Vec<String>,

    /// Profile to use instead of `solo.profile`
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Image override
    #[arg(long)]
    pub image: Option<String>,

    /// Namespace override
    #[arg(long)]
    pub namespace: Option<String>,

    /// Extra environment for the solo container; may be repeated
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Check that the primary port accepts connections before returning
    #[arg(long)]
    pub probe: bool,

    #[command(flatten)]
    pub daemon: DaemonArgs,
}

pub async fn up(args: UpArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ConfigTree::from_file(path)?,
        None => ConfigTree::empty(),
    };
    for assignment in &args.assignments {
        config.apply_assignment(assignment)?;
    }

    let mut builder = SoloDeployment::builder().config(config);
    if let Some(uri) = args.daemon.docker_host {
        builder = builder.docker_host(uri);
    }
    if let Some(path) = args.daemon.cert_path {
        builder = builder.cert_path(path);
    }
    if let Some(profile) = args.profile {
        builder = builder.profile(profile);
    }
    if let Some(image) = args.image {
        builder = builder.image(image);
    }
    if let Some(namespace) = args.namespace {
        builder = builder.namespace(namespace);
    }
    for entry in &args.env {
        let (key, value) = entry
            .split_once('=')
            .with_context(|| format!("Invalid --env '{entry}', expected KEY=VALUE"))?;
        builder = builder.env(key, value);
    }
    if args.probe {
        builder = builder.probe(true);
    }

    let solo = builder.build().await?;
    info!(container_id = %solo.container_id(), "Solo deployment is up");

    println!("{}", serde_json::to_string_pretty(&solo.summary())?);
    Ok(())
}

#[derive(Args, Debug)]
pub struct WaitArgs {
    /// Container id or name
    pub container: String,

    /// Give up after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    #[command(flatten)]
    pub daemon: DaemonArgs,
}

pub async fn wait(args: WaitArgs) -> Result<()> {
    let engine = args.daemon.connect()?;
    let status = LifecycleWaiter::new(&engine)
        .wait(&args.container, args.timeout.map(Duration::from_secs))
        .await?;

    println!(
        "{}",
        serde_json::json!({ "container": args.container, "exit_status": status })
    );
    status.check(&args.container)?;
    Ok(())
}

#[derive(Args, Debug)]
pub struct DownArgs {
    /// Container id or name
    pub container: String,

    /// Seconds to wait for a graceful stop before killing
    #[arg(long, default_value = "30")]
    pub stop_timeout: u64,

    #[command(flatten)]
    pub daemon: DaemonArgs,
}

pub async fn down(args: DownArgs) -> Result<()> {
    let engine = args.daemon.connect()?;
    teardown(
        &engine,
        &args.container,
        Duration::from_secs(args.stop_timeout),
    )
    .await?;
    info!(container = %args.container, "Solo deployment is down");
    Ok(())
}

#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Container id or name
    pub container: String,

    /// Number of lines from the end
    #[arg(long, default_value = "100")]
    pub tail: usize,

    #[command(flatten)]
    pub daemon: DaemonArgs,
}

pub async fn logs(args: LogsArgs) -> Result<()> {
    let engine = args.daemon.connect()?;
    let logs = engine
        .logs(&args.container, args.tail)
        .await
        .with_context(|| format!("Failed to read logs of {}", args.container))?;
    print!("{logs}");
    Ok(())
}
