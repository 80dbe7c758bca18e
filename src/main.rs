// src/main.rs

use clap::{Parser, Subcommand};

use licforge::config::init_config;
use licforge::errors::LicenseResult;
use licforge::issuer::parse_expiry_days;
use licforge::logging::init_logging;
use licforge::service::LicenseService;

/// Issue and validate offline software licenses.
#[derive(Parser)]
#[command(name = "licforge", version, about)]
struct Cli {
    /// Override the data directory holding the signing key and registry
    #[arg(long, global = true)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Issue a new license key
    Generate {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// Days of validity; 0 or less never expires
        #[arg(long, default_value = "365", allow_hyphen_values = true)]
        days: String,
        /// Feature to grant (repeatable, or comma separated)
        #[arg(long = "feature", value_delimiter = ',')]
        features: Vec<String>,
        /// Bind the license to this machine fingerprint
        #[arg(long)]
        machine_code: Option<String>,
    },
    /// Validate a license key
    Validate {
        license_key: String,
        /// Check the binding against this machine fingerprint
        #[arg(long, conflicts_with = "this_machine")]
        machine_code: Option<String>,
        /// Check the binding against the current machine
        #[arg(long)]
        this_machine: bool,
    },
    /// Print the current machine fingerprint
    MachineId,
    /// Print the public key (PEM) for validating deployments
    ExportKey,
    /// List issued licenses
    List,
    /// Remove a license from the registry
    Delete { license_id: String },
}

fn print_json<T: serde::Serialize>(value: &T) -> LicenseResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> LicenseResult<()> {
    let cli = Cli::parse();

    let mut config = init_config()?.clone();
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }
    init_logging(&config.logging)?;

    let service = LicenseService::from_config(&config)?;

    match cli.command {
        Command::Generate {
            name,
            email,
            days,
            features,
            machine_code,
        } => {
            let expiry_days = parse_expiry_days(&days)?;
            let key = match machine_code {
                Some(code) => {
                    service
                        .generate_license_key_with_machine_code(
                            name,
                            email,
                            expiry_days,
                            features,
                            code,
                        )
                        .await?
                }
                None => {
                    service
                        .generate_license_key(name, email, expiry_days, features)
                        .await?
                }
            };
            println!("{key}");
        }
        Command::Validate {
            license_key,
            machine_code,
            this_machine,
        } => {
            let machine_code = if this_machine {
                Some(service.get_current_machine_id().await?.fingerprint)
            } else {
                machine_code
            };
            let result = match machine_code {
                Some(code) => {
                    service
                        .validate_license_key_with_machine_code(license_key, code)
                        .await?
                }
                None => service.validate_license_key(license_key).await?,
            };
            print_json(&result)?;
            if !result.is_valid {
                std::process::exit(2);
            }
        }
        Command::MachineId => {
            let id = service.get_current_machine_id().await?;
            if id.degraded {
                eprintln!("warning: no stable hardware identifier found, fingerprint is a fallback");
            }
            println!("{id}");
        }
        Command::ExportKey => {
            print!("{}", service.export_license_public_key().await?);
        }
        Command::List => {
            print_json(&service.get_licenses().await?)?;
        }
        Command::Delete { license_id } => {
            if service.delete_license_by_id(license_id.clone()).await? {
                println!("deleted {license_id}");
            } else {
                println!("no license with id {license_id}");
            }
        }
    }

    Ok(())
}
