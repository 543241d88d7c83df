// Copyright (C) 2025-2026 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of blogroll.
//
// blogroll is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// blogroll is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with blogroll.  If not,
// see <http://www.gnu.org/licenses/>.

//! # blogrolld
//!
//! The blogroll daemon: a social blogging service.
//!
//! blogrolld runs in the foreground (under a supervisor or in a container, presumably), logging
//! to stdout; structured JSON by default, human-readable with `--plain`. Most configuration is
//! read from a versioned TOML file; the handful of command-line options govern where to find
//! that file & process startup concerns that precede parsing it. `SIGHUP` re-reads the
//! configuration; `SIGTERM` shuts down gracefully.

use std::{env, future::IntoFuture, io, net::SocketAddr, path::PathBuf, str::FromStr, sync::Arc};

use chrono::Duration;
use clap::{crate_authors, crate_version, value_parser, Arg, ArgAction, Command};
use opentelemetry::{global, KeyValue};
use serde::Deserialize;
use snafu::prelude::*;
use tokio::{
    net::TcpListener,
    signal::unix::{signal, SignalKind},
    sync::Notify,
};
use tracing::{error, info, Level};
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, Layer, Registry};
use url::Url;
use uuid::Uuid;

use blogroll::{
    blogroll::{make_app, Blogroll},
    dynamodb::{self, Location as DynamoLocation},
    memory::Memory,
    metrics::{check_metric_names, Instruments},
    oauth::{Disabled, Google, GoogleConfig, IdentityProvider},
    signing_keys::SigningKeys,
    storage::Backend as StorageBackend,
    util::Credentials,
};

/// The blogroll application error type
///
/// At the application level I'm going to provide a fairly rich set of errors in the hopes of
/// helping operators; [Snafu] reduces the boilerplate that entails.
///
/// [Snafu]: https://docs.rs/snafu/latest/snafu/index.html
///
/// Note that I do not derive [Debug]: `main()` returns `Result<(), Error>`, and should the `Err`
/// variant be returned, the Rust runtime uses the `Debug` implementation to produce an error
/// message on stderr. The derived implementation is not very readable, so [Debug] defers to
/// [Display] here.
#[derive(Snafu)]
pub enum Error {
    #[snafu(display("Failed to bind to {addr}: {source}"))]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[snafu(display("Unable to read configuration file: {source}"))]
    ConfigNotFound {
        pth: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Error parsing configuration file: {source}"))]
    ConfigParse {
        pth: PathBuf,
        source: toml::de::Error,
    },
    #[snafu(display("Couldn't resolve the present working directory: {source}"))]
    CurrentDir { source: std::io::Error },
    #[snafu(display("Failed to connect to DynamoDB: {source}"))]
    Dynamo { source: dynamodb::Error },
    #[snafu(display("Failed to parse RUST_LOG: {source}"))]
    EnvFilter {
        source: tracing_subscriber::filter::FromEnvError,
    },
    #[snafu(display("While building the Prometheus exporter, {source}"))]
    Exporter {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
    #[snafu(display("Failed to set the tracing subscriber: {source}"))]
    Subscriber {
        source: tracing::subscriber::SetGlobalDefaultError,
    },
    #[snafu(display("Failed to instantiate a Tokio runtime: {source}"))]
    TokioRuntime { source: std::io::Error },
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self, f)
    }
}

type Result<T> = std::result::Result<T, Error>;

type StdResult<T, E> = std::result::Result<T, E>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                     command-line options                                       //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Logging-related options read from the command line or the environment
struct LogOpts {
    pub plain: bool,
    pub level: Level,
}

impl LogOpts {
    fn new(matches: &clap::ArgMatches) -> LogOpts {
        LogOpts {
            plain: matches.get_flag("plain"),
            level: match (
                matches.get_flag("debug"),
                matches.get_flag("verbose"),
                matches.get_flag("quiet"),
            ) {
                (true, _, _) => Level::TRACE,
                (false, true, _) => Level::DEBUG,
                (false, false, true) => Level::ERROR,
                (_, _, _) => Level::INFO,
            },
        }
    }
}

/// Configuration options read from the CLI (or the environment)
struct CliOpts {
    pub instance_id: Uuid,
    pub log_opts: LogOpts,
    pub cfg: Option<PathBuf>,
}

impl CliOpts {
    fn new(matches: clap::ArgMatches) -> Result<CliOpts> {
        let here = env::current_dir().context(CurrentDirSnafu)?;
        Ok(CliOpts {
            instance_id: matches
                .get_one::<Uuid>("instance-id")
                .cloned()
                .unwrap_or(Uuid::new_v4()),
            log_opts: LogOpts::new(&matches),
            cfg: matches
                .get_one::<PathBuf>("config")
                .cloned()
                .map(|p| here.join(p)),
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         configuration                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// blogroll datastore configuration
///
/// Most of the service writes to a generic storage API; at startup a particular *implementation*
/// of that API is chosen, according to this.
// Nb. we can only deserialize (i.e. not serialize) due to the presence of secrets in the struct
#[derive(Clone, Debug, Deserialize)]
pub enum StorageConfig {
    /// Keep everything in memory; state dies with the process. For local development.
    Memory,
    /// Use DynamoDB (or anything speaking its dialect)
    Dynamo {
        /// AWS credentials: key ID & secret key; you'll pretty-much always need to specify these
        /// when running against DDB proper
        credentials: Option<Credentials>,
        /// A region, or one or more endpoint URLs
        location: DynamoLocation,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SigningKeysConfig {
    /// Session token lifetime, in seconds; one hour by default
    #[serde(rename = "token-lifetime-seconds")]
    token_lifetime_seconds: i64,
    /// Session *cookie* lifetime, in seconds; twenty-four hours by default. Nb. this exceeds the
    /// token lifetime; see [token](blogroll::token).
    #[serde(rename = "cookie-lifetime-seconds")]
    cookie_lifetime_seconds: i64,
    #[serde(rename = "signing-keys")]
    signing_keys: SigningKeys,
}

impl Default for SigningKeysConfig {
    fn default() -> Self {
        SigningKeysConfig {
            token_lifetime_seconds: 3600,
            cookie_lifetime_seconds: 24 * 3600,
            signing_keys: SigningKeys::default(),
        }
    }
}

/// blogroll configuration, version one
#[derive(Clone, Debug, Deserialize)]
struct ConfigV1 {
    /// Local address at which to listen; specify as "address:port"
    #[serde(rename = "public-address")]
    public_address: SocketAddr,
    /// The client application's origin: where OAuth flows land when they're done
    #[serde(rename = "client-origin")]
    client_origin: Url,
    #[serde(rename = "storage-config")]
    storage_config: StorageConfig,
    #[serde(rename = "signing-keys")]
    signing_keys: SigningKeysConfig,
    /// Directory to which uploaded files are written
    uploads: PathBuf,
    /// Set the Secure attribute on session cookies; turn this on anywhere that isn't localhost
    #[serde(rename = "secure-cookies")]
    secure_cookies: bool,
    /// Google OAuth client configuration; omit to disable OAuth login
    oauth: Option<GoogleConfig>,
}

impl ConfigV1 {
    pub fn public_address(&self) -> &SocketAddr {
        &self.public_address
    }
}

impl Default for ConfigV1 {
    fn default() -> Self {
        ConfigV1 {
            public_address: "0.0.0.0:3003".parse::<SocketAddr>().unwrap(/* known good */),
            client_origin: "http://localhost:5173".parse::<Url>().unwrap(/* known good */),
            storage_config: StorageConfig::default(),
            signing_keys: SigningKeysConfig::default(),
            uploads: PathBuf::from_str("uploads").unwrap(/* known good */),
            secure_cookies: false,
            oauth: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "version")] // tag "internally"
enum Configuration {
    #[serde(rename = "1")]
    V1(ConfigV1),
}

/// Parse the blogroll configuration file
fn parse_config(cfg: &Option<PathBuf>) -> Result<ConfigV1> {
    use snafu::IntoError;
    let (pth, defaulted): (PathBuf, bool) = cfg.as_ref().map_or_else(
        || (PathBuf::from_str("/etc/blogroll.toml").unwrap(), true),
        |p| (p.clone(), false),
    );
    match std::fs::read_to_string(&pth) {
        Ok(text) => match toml::from_str::<Configuration>(&text) {
            Ok(cfg) => match cfg {
                Configuration::V1(cfg) => Ok(cfg),
            },
            Err(err) => Err(ConfigParseSnafu { pth }.into_error(err)),
        },
        Err(err) => {
            if defaulted {
                Ok(ConfigV1::default())
            } else {
                Err(ConfigNotFoundSnafu { pth }.into_error(err))
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      logging & telemetry                                       //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Configure blogroll logging: stdout, structured JSON unless asked for `--plain`
///
/// This method can only be invoked once (as it, in turn, calls tracing's
/// [set_global_default](tracing::subscriber::set_global_default)).
fn configure_logging(logopts: &LogOpts) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(logopts.level.into())
        .from_env()
        .context(EnvFilterSnafu)?;

    // `json()` & `compact()` produce `Layer` instances *of different types*; it is for this
    // reason that `Box<dyn Layer<S> + Send + Sync>` implements `Layer`:
    let formatter: Box<dyn Layer<Registry> + Send + Sync> = if logopts.plain {
        Box::new(fmt::Layer::default().compact().with_writer(io::stdout))
    } else {
        Box::new(
            fmt::Layer::default()
                .json()
                .with_current_span(true)
                .with_writer(io::stdout),
        )
    };

    tracing::subscriber::set_global_default(Registry::default().with(formatter).with(filter))
        .context(SubscriberSnafu)
}

/// Initialize telemetry
///
/// <div class="warning">
///
/// This method must be invoked before any instruments are accessed.
///
/// </div>
///
/// Returns the Prometheus registry backing the `/metrics` endpoint.
fn init_telemetry() -> Result<prometheus::Registry> {
    check_metric_names();

    let registry = prometheus::Registry::new();
    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .build()
        .map_err(|err| Error::Exporter {
            source: Box::new(err),
        })?;

    let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
        .with_resource(
            opentelemetry_sdk::Resource::builder_empty()
                .with_attribute(KeyValue::new("service.name", "blogroll"))
                .build(),
        )
        .with_reader(exporter)
        .build();
    global::set_meter_provider(provider);

    Ok(registry)
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           the server                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

pub async fn select_storage(
    config: &StorageConfig,
) -> Result<Arc<dyn StorageBackend + Send + Sync>> {
    match config {
        StorageConfig::Memory => Ok(Arc::new(Memory::new())),
        StorageConfig::Dynamo {
            credentials,
            location,
        } => Ok(Arc::new(
            dynamodb::Client::new(location, credentials)
                .await
                .context(DynamoSnafu)?,
        )),
    }
}

/// Serve blogroll API requests
#[tracing::instrument(skip(opts, cfg), fields(instance_id = %opts.instance_id))]
async fn serve(opts: CliOpts, mut cfg: ConfigV1) -> Result<()> {
    // Produce a future which can be used to signal graceful shutdown, below.
    async fn shutdown_signal(nfy: Arc<Notify>) {
        nfy.notified().await
    }

    fn log_on_err<T, E>(x: StdResult<T, E>)
    where
        E: std::fmt::Debug,
    {
        if let Err(err) = x {
            error!("{:?}", err);
        }
    }

    let mut sighup = signal(SignalKind::hangup()).unwrap();
    let mut sigterm = signal(SignalKind::terminate()).unwrap();

    let registry = init_telemetry()?;

    // Loop forever, handling SIGHUPs, until asked to terminate:
    loop {
        // Re-build our database connections each pass, in case configuration values have changed:
        let storage = select_storage(&cfg.storage_config).await?;

        let identity: Arc<dyn IdentityProvider + Send + Sync> = match &cfg.oauth {
            Some(google) => Arc::new(Google::new(google.clone())),
            None => Arc::new(Disabled {
                fallback: cfg.client_origin.clone(),
            }),
        };

        let state = Arc::new(Blogroll {
            instance_id: opts.instance_id,
            storage,
            registry: registry.clone(),
            instruments: Instruments::new("blogroll"),
            signing_keys: cfg.signing_keys.signing_keys.clone(),
            token_lifetime: Duration::seconds(cfg.signing_keys.token_lifetime_seconds),
            cookie_lifetime: Duration::seconds(cfg.signing_keys.cookie_lifetime_seconds),
            secure_cookies: cfg.secure_cookies,
            client_origin: cfg.client_origin.clone(),
            uploads: cfg.uploads.clone(),
            identity,
        });

        let nfy = Arc::new(Notify::new());

        let server = axum::serve(
            TcpListener::bind(cfg.public_address())
                .await
                .context(BindSnafu {
                    addr: *cfg.public_address(),
                })?,
            make_app(state),
        )
        .with_graceful_shutdown(shutdown_signal(nfy.clone()));

        info!("blogroll listening on {}", cfg.public_address());

        let mut server = server.into_future();

        tokio::select! {
            // Intentionally not handled-- the server *should* never shutdown on its own. That
            // said, if I don't move it into a Future, it never gets polled.
            _ = &mut server => unimplemented!(),
            _ = sighup.recv() => { // Future<Output = Option<()>>
                info!("Received SIGHUP; closing connections to re-read configuration.");
                nfy.notify_one();
                log_on_err(server.await);
                // Fall back to the last known-good configuration on a parse failure & keep going.
                cfg = match parse_config(&opts.cfg) {
                    Ok(cfg) => cfg,
                    Err(_) => cfg
                };
            }
            _ = sigterm.recv() => { // Future<Output = Option<()>>
                info!("Received SIGTERM; terminating.");
                nfy.notify_one();
                log_on_err(server.await);
                break;
            }
        }; // End tokio::select!.
    } // End loop.

    Ok(())
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                    main() & process startup                                    //
////////////////////////////////////////////////////////////////////////////////////////////////////

async fn go_async(opts: CliOpts) -> Result<()> {
    let cfg = parse_config(&opts.cfg)?;
    configure_logging(&opts.log_opts)?;

    // At this point we have logging-- huzzah!
    info!(
        "blogroll version {}, instance {} starting.",
        crate_version!(),
        opts.instance_id
    );

    serve(opts, cfg).await
}

fn main() -> Result<()> {
    // Most of blogrolld's configuration options are read from file; the few command-line options
    // that it accepts govern 1) where to find the configuration file, 2) process startup that
    // takes place before the configuration file is parsed. They all have corresponding
    // environment variables for the sake of convenience when running blogroll in a container.
    let opts = CliOpts::new(
        Command::new("blogrolld")
            .version(crate_version!())
            .author(crate_authors!())
            .about("A social blogging service")
            .long_about("`blogroll` is a social blogging service; this is its daemon.")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .num_args(1)
                    .value_parser(value_parser!(PathBuf))
                    .env("BLOGROLL_CONFIG")
                    .help(
                        "path (absolute or relative to the process' current directory) to a \
                       configuration file",
                    ),
            )
            .arg(
                Arg::new("debug")
                    .short('D')
                    .long("debug")
                    .num_args(0)
                    .action(ArgAction::SetTrue)
                    .env("BLOGROLL_DEBUG")
                    .help("produce debug output"),
            )
            .arg(
                Arg::new("instance-id")
                    .short('I')
                    .long("instance-id")
                    .num_args(1)
                    .value_parser(value_parser!(Uuid))
                    .env("BLOGROLL_INSTANCE_ID")
                    .help("Instance ID (only salient when running multiple instances)")
                    .long_help(
                        "Instance ID
A UUID identifying this blogroll instance. If not given, a random UUID will be used.",
                    ),
            )
            .arg(
                Arg::new("plain")
                    .short('p')
                    .long("plain")
                    .num_args(0)
                    .action(ArgAction::SetTrue)
                    .env("BLOGROLL_PLAIN")
                    .help("log in human-readable format, not JSON/structured logging"),
            )
            .arg(
                Arg::new("quiet")
                    .short('q')
                    .long("quiet")
                    .num_args(0)
                    .action(ArgAction::SetTrue)
                    .env("BLOGROLL_QUIET")
                    .help("produce only error output"),
            )
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .num_args(0)
                    .action(ArgAction::SetTrue)
                    .env("BLOGROLL_VERBOSE")
                    .help("produce prolix output"),
            )
            .get_matches(),
    )?;

    tokio::runtime::Runtime::new()
        .context(TokioRuntimeSnafu)?
        .block_on(go_async(opts)) // and start our server!
}
