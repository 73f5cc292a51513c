// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pesa_gate::{
    api::router,
    auth::{
        password::hash_password, PolicyEngine, RuleEngine, SessionManager, SessionSettings,
        TokenOptions, TokenService,
    },
    config::{Config, SeedAdmin, DEFAULT_LOG_FILTER, LOG_FORMAT_ENV},
    notify::{LogNotifier, Notifier, SmsGateway},
    state::AppState,
    storage::{
        AccountRepository, AccountStatus, CredentialStore, Database, MemoryCache, NewAccount,
        PolicyRule, PolicyRuleRepository, RedisCache, SessionCache,
    },
};

/// Time allowed for in-flight requests after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var(LOG_FORMAT_ENV).is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Create the bootstrap administrator and grant it every object/action.
async fn seed_admin(
    accounts: &AccountRepository,
    policy: &RuleEngine,
    seed: SeedAdmin,
) -> Result<(), Box<dyn std::error::Error>> {
    let account = match accounts.find_by_phone(&seed.phone).await? {
        Some(existing) => existing,
        None => {
            let password_hash = hash_password(seed.password).await?;
            let account = accounts
                .create(NewAccount {
                    phone: Some(seed.phone),
                    names: seed.names,
                    password_hash,
                    status: AccountStatus::Active,
                    primary_group: "ADMIN".to_string(),
                    ..Default::default()
                })
                .await?;
            info!(account_id = account.id, "seeded admin account");
            account
        }
    };

    let granted = policy
        .add_policies(vec![PolicyRule::permission(account.id.to_string(), "*", "*")])
        .await?;
    if granted {
        info!(account_id = account.id, "granted admin wildcard policy");
    }
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = Config::from_env().expect("Invalid configuration");
    info!(?config, "starting pesa-gate");

    // -------------------------------------------------------------------------
    // Storage
    // -------------------------------------------------------------------------
    std::fs::create_dir_all(&config.data_dir).expect("Failed to create data directory");
    let db = Database::open(&config.database_path()).expect("Failed to open database");
    let accounts = Arc::new(AccountRepository::new(db.clone()));

    let cache: Arc<dyn SessionCache> = match &config.redis_url {
        Some(url) => {
            let redis = RedisCache::connect(url)
                .await
                .expect("Failed to connect to Redis");
            info!("session cache: redis");
            Arc::new(redis)
        }
        None => {
            info!(capacity = config.cache_capacity, "session cache: in-process");
            Arc::new(MemoryCache::new(config.cache_capacity))
        }
    };

    let notifier: Arc<dyn Notifier> = match config.sms.clone() {
        Some(auth) => Arc::new(
            SmsGateway::new(auth, config.sms_prefix()).expect("Invalid SMS gateway settings"),
        ),
        None => {
            warn!("no SMS gateway configured; OTP messages are only logged");
            Arc::new(LogNotifier)
        }
    };

    let policy = Arc::new(
        RuleEngine::load(PolicyRuleRepository::new(db))
            .await
            .expect("Failed to load policy rules"),
    );

    if let Some(seed) = config.seed_admin.clone() {
        seed_admin(&accounts, &policy, seed)
            .await
            .expect("Failed to seed admin account");
    }

    // -------------------------------------------------------------------------
    // Sessions
    // -------------------------------------------------------------------------
    let tokens = TokenService::new(TokenOptions {
        access_secret: config.access_secret.clone(),
        refresh_secret: config.refresh_secret.clone(),
        access_ttl: config.access_ttl,
        refresh_ttl: config.refresh_ttl,
    });
    let sessions = Arc::new(SessionManager::new(
        accounts.clone(),
        cache.clone(),
        tokens,
        notifier,
        SessionSettings {
            otp_ttl: config.otp_ttl,
            credentialed_phones: config.credentialed_phones.clone(),
        },
    ));

    let state = AppState::new(accounts, cache, policy, sessions);
    let app = router(state);

    let addr: SocketAddr = config
        .bind_addr()
        .parse()
        .expect("Failed to parse bind address");

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    match &config.tls {
        Some(tls) => {
            // Install the ring crypto provider for rustls (must be done before any TLS operations)
            rustls::crypto::ring::default_provider()
                .install_default()
                .expect("Failed to install rustls crypto provider");

            let tls_config = RustlsConfig::from_pem_file(&tls.cert, &tls.key)
                .await
                .expect("Failed to load TLS certificate");

            let handle: Handle<SocketAddr> = Handle::new();
            let on_shutdown = handle.clone();
            let token = shutdown.clone();
            tokio::spawn(async move {
                token.cancelled().await;
                on_shutdown.graceful_shutdown(Some(SHUTDOWN_GRACE));
            });

            info!("pesa-gate listening on https://{addr} (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .expect("HTTPS server failed");
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .expect("Failed to bind address");

            info!("pesa-gate listening on http://{addr} (docs at /docs)");
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .expect("HTTP server failed");
        }
    }

    info!("pesa-gate stopped");
}
