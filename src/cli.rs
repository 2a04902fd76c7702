use clap::{Parser, Subcommand};

/// beacon - Email tracking backend provisioning.
///
/// This tool deploys the email tracking worker together with its database and keeps the credentials needed to talk to it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help(true))] // Require at least one subcommand
#[command(propagate_version = true)] // Display version in subcommand help
pub(crate) struct CliArgs {
    #[clap(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Provision the database and deploy the tracking worker.
    ///
    /// This command creates or reuses the database, installs freshly generated keys and stores the resulting configuration.
    Deploy(DeployArgs),

    /// Show the tracking configuration of an account.
    Status(BaseArgs),

    /// Generate new tracking and admin keys.
    ///
    /// The worker picks up the new keys with the next deploy.
    RotateKeys(BaseArgs),
}

/// Base arguments for subcommands that share common parameters.
#[derive(Parser, Debug)]
pub(crate) struct BaseArgs {
    /// Account the tracking configuration belongs to, usually an email address.
    #[clap(short, long)]
    pub(crate) account: String,

    /// Directory holding the tracking configuration (default: user config directory).
    #[clap(long)]
    pub(crate) config_dir: Option<std::path::PathBuf>,
}

/// Arguments specific to the `deploy` subcommand.
#[derive(Parser, Debug)]
pub(crate) struct DeployArgs {
    #[clap(flatten)] // Inherit arguments from BaseArgs
    pub(crate) base: BaseArgs,

    /// Public URL the worker is reachable at once deployed.
    #[clap(short = 'u', long)]
    pub(crate) worker_url: String,

    /// Directory containing the deployment descriptor.
    #[clap(short, long, default_value = ".")]
    pub(crate) dir: std::path::PathBuf,

    /// Worker name (default: derived from the account).
    #[clap(long, default_value = "")]
    pub(crate) worker_name: String,

    /// Database name (default: derived from the worker name).
    #[clap(long, default_value = "")]
    pub(crate) database_name: String,

    /// Deployment tool to invoke.
    #[clap(long, default_value = "wrangler")]
    pub(crate) tool: String,

    /// Keep the keys in Vault instead of the configuration file.
    #[clap(long)]
    pub(crate) use_vault: bool,
}
