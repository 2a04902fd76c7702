mod cli;

use std::error::Error;
use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;
use log::debug;

use beacon::keys::{generate_key, KEY_LENGTH};
use beacon::{
    deploy_worker, CancellationToken, Config, ConfigStore, DeployOptions, HashicorpVault,
    SystemRunner,
};

use crate::cli::{BaseArgs, CliArgs, Command, DeployArgs};

const LOG_LEVEL: &str = "BEACON_LOG_LEVEL";

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().filter_or(LOG_LEVEL, "info")).init();

    let args = CliArgs::parse();
    debug!("CLI arguments: {:?}", args);

    let result = match args.command {
        Command::Deploy(deploy_args) => deploy(deploy_args),
        Command::Status(base_args) => status(base_args),
        Command::RotateKeys(base_args) => rotate_keys(base_args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("🛑 {err}");
            ExitCode::FAILURE
        }
    }
}

fn open_store(base: &BaseArgs) -> Result<ConfigStore<HashicorpVault>, Box<dyn Error>> {
    let vault = HashicorpVault::from_env()?;

    let store = match &base.config_dir {
        Some(dir) => ConfigStore::with_base_dir(dir, vault),
        None => ConfigStore::new(vault)?,
    };
    Ok(store)
}

fn deploy(args: DeployArgs) -> Result<(), Box<dyn Error>> {
    let store = open_store(&args.base)?;

    let config = Config {
        enabled: true,
        worker_url: args.worker_url,
        secrets_in_keyring: args.use_vault,
        tracking_key: generate_key(KEY_LENGTH),
        admin_key: generate_key(KEY_LENGTH),
    };
    config.validate()?;

    let options = DeployOptions {
        dir: args.dir,
        account: args.base.account.clone(),
        worker_name: args.worker_name,
        database_name: args.database_name,
        tracking_key: config.tracking_key.clone(),
        admin_key: config.admin_key.clone(),
        tool: args.tool,
    };

    // keys installed on the worker must be persisted afterwards
    if args.use_vault {
        store.vault().check()?;
    }

    let runner = SystemRunner::new()?;
    let database_id = deploy_worker(&runner, &options, &CancellationToken::new())?;

    store.save(&args.base.account, &config)?;

    println!("✅ Tracking worker deployed (database id: {database_id})");
    Ok(())
}

fn status(args: BaseArgs) -> Result<(), Box<dyn Error>> {
    let store = open_store(&args)?;
    let config = store.load(&args.account)?;

    if !config.enabled {
        println!("Tracking is not configured for '{}'", args.account);
        return Ok(());
    }

    let is_set = |value: &str| if value.is_empty() { "missing" } else { "set" };

    println!("Account:      {}", args.account);
    println!("Worker URL:   {}", config.worker_url);
    println!(
        "Keys stored:  {}",
        if config.secrets_in_keyring {
            "vault"
        } else {
            "config file"
        }
    );
    println!("Tracking key: {}", is_set(&config.tracking_key));
    println!("Admin key:    {}", is_set(&config.admin_key));
    Ok(())
}

fn rotate_keys(args: BaseArgs) -> Result<(), Box<dyn Error>> {
    let store = open_store(&args)?;
    let mut config = store.load(&args.account)?;

    if !config.enabled {
        return Err(format!(
            "tracking is not configured for '{}', run deploy first",
            args.account
        )
        .into());
    }

    let tracking_key = generate_key(KEY_LENGTH);
    let admin_key = generate_key(KEY_LENGTH);

    if config.secrets_in_keyring {
        store.save_secrets(&args.account, &tracking_key, &admin_key)?;
    } else {
        config.tracking_key = tracking_key;
        config.admin_key = admin_key;
        store.save(&args.account, &config)?;
    }

    println!(
        "✅ Keys rotated for '{}' - run deploy to install them on the worker",
        args.account
    );
    Ok(())
}
