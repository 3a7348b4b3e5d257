use clap::Parser;
use portal_sync::config::cli::{CliArgs, Command, OutputFormat};
use portal_sync::core::cipher::{self, CipherKey, CredentialCipher};
use portal_sync::core::routes::PortalRoutes;
use portal_sync::domain::model::{CredentialBundle, PortalData, PortalResponse};
use portal_sync::domain::ports::{BrowserLauncher, CredentialStore};
use portal_sync::utils::error::{ErrorKind, PortalError, Result};
use portal_sync::utils::{logger, validation::Validate};
use portal_sync::{HttpBrowser, JsonFileStore, PortalConfig, PortalDriver, PortalService};
use std::io::{BufRead, Write};
use std::sync::Arc;
use zeroize::Zeroizing;

const PASSWORD_ENV: &str = "PORTAL_SYNC_PASSWORD";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // 初始化日誌
    if args.log_json {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    let config = match PortalConfig::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file is valid TOML");
            std::process::exit(1);
        }
    };

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(args.command, &config).await {
        tracing::error!("❌ Command failed: {} (kind: {:?})", e, e.kind());
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());

        let exit_code = match e.kind() {
            ErrorKind::TransientFailure => 2,
            ErrorKind::Configuration => 3,
            _ => 1,
        };
        std::process::exit(exit_code);
    }

    Ok(())
}

async fn run(command: Command, config: &PortalConfig) -> Result<()> {
    match command {
        Command::Keygen => {
            println!("{}", CipherKey::generate().to_base64().as_str());
            Ok(())
        }
        Command::Routes { portal_url } => {
            let routes = PortalRoutes::resolve(&portal_url)?;
            println!("convention: {:?}", routes.convention);
            println!("login:      {}", routes.login);
            println!("averages:   {}", routes.averages);
            println!("transcript: {}", routes.transcript);
            Ok(())
        }
        Command::Connect {
            user,
            portal_url,
            username,
        } => {
            PortalRoutes::resolve(&portal_url)?;
            let cipher = install_cipher(config)?;
            let password = read_password()?;

            let bundle = CredentialBundle {
                portal_url: Some(cipher.encrypt(&portal_url)?),
                username: Some(cipher.encrypt(&username)?),
                password: Some(cipher.encrypt(&password)?),
                connected: true,
            };
            let store = JsonFileStore::new(&config.store.path);
            store.save_bundle(&user, bundle).await?;

            tracing::info!(user_id = %user, "Portal account connected");
            println!("✅ Portal account connected for {}", user);
            Ok(())
        }
        Command::Fetch {
            user,
            data_type,
            format,
        } => {
            let cipher = install_cipher(config)?;
            let store = JsonFileStore::new(&config.store.path);
            let settings = config.driver_settings();

            match config.browser.backend {
                portal_sync::config::BrowserBackend::Http => {
                    let launcher = HttpBrowser::new(config.http_browser_settings());
                    let service =
                        PortalService::new(store, cipher, PortalDriver::new(launcher, settings));
                    fetch(&service, &user, &data_type, format).await
                }
                #[cfg(feature = "chromium")]
                portal_sync::config::BrowserBackend::Chromium => {
                    let launcher = portal_sync::adapters::chromium::ChromiumLauncher::new(
                        config.chromium_settings(),
                    );
                    let service =
                        PortalService::new(store, cipher, PortalDriver::new(launcher, settings));
                    fetch(&service, &user, &data_type, format).await
                }
                #[cfg(not(feature = "chromium"))]
                portal_sync::config::BrowserBackend::Chromium => Err(PortalError::ConfigError {
                    message: "built without the chromium feature".to_string(),
                }),
            }
        }
    }
}

fn install_cipher(config: &PortalConfig) -> Result<Arc<CredentialCipher>> {
    let key = config.cipher_key()?;
    cipher::install(&key)
}

async fn fetch<S: CredentialStore, L: BrowserLauncher>(
    service: &PortalService<S, L>,
    user: &str,
    data_type: &str,
    format: OutputFormat,
) -> Result<()> {
    let response = service.fetch_portal_data(user, data_type).await?;
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        OutputFormat::Csv => write_csv(&response),
    }
}

fn write_csv(response: &PortalResponse) -> Result<()> {
    let stdout = std::io::stdout();
    let mut writer = csv::Writer::from_writer(stdout.lock());
    let to_io = |e: csv::Error| PortalError::Io(e.into());

    match &response.data {
        PortalData::Averages(averages) => {
            writer.write_record(["course", "average"]).map_err(to_io)?;
            for (course, average) in averages {
                writer.write_record([course, average]).map_err(to_io)?;
            }
        }
        PortalData::Transcript(transcript) => {
            writer.write_record(["field", "value"]).map_err(to_io)?;
            for (field, value) in transcript {
                writer
                    .write_record([field.label(), value.as_str()])
                    .map_err(to_io)?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

fn read_password() -> Result<Zeroizing<String>> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(Zeroizing::new(password));
    }

    eprint!("Portal password: ");
    std::io::stderr().flush()?;
    let mut line = Zeroizing::new(String::new());
    std::io::stdin().lock().read_line(&mut line)?;
    let password = Zeroizing::new(line.trim_end_matches(['\r', '\n']).to_string());
    if password.is_empty() {
        return Err(PortalError::InvalidRequest {
            message: "password must not be empty".to_string(),
        });
    }
    Ok(password)
}
