use campus_core::model::AuthState;
use services::{
    AppServices, Clock, GeneratorConfig, IdentityError, IdentityProvider, SessionSubscription,
    StorageBackend,
};
use storage::remote::SupabaseConfig;
use storage::repository::OwnerScope;
use tracing_subscriber::EnvFilter;

mod args;
mod commands;

use args::{Args, ArgsError, Command, Defaults, print_usage};
use commands::Context;

const LOCAL_EMAIL: &str = "learner@localhost";
const LOCAL_PASSWORD: &str = "local";

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CAMPUS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn normalize_sqlite_url(raw: String) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") {
        return trimmed.to_string();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = std::path::Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" || db_url.contains("mode=memory") {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::File::create(path)?;
    }
    Ok(())
}

/// Signs in with the configured account and waits until the course service
/// has loaded that user's data. The returned subscription keeps mirroring
/// session changes (token refreshes) until dropped.
async fn sign_in(
    services: &AppServices,
    backend: &StorageBackend,
    email: Option<String>,
) -> Result<(OwnerScope, SessionSubscription), Box<dyn std::error::Error>> {
    let subscription = services.listen_for_sessions();
    let state = subscription.resolved().await;
    let wanted = email.as_deref().map(str::trim);

    let session = match state.session() {
        Some(session) if wanted.is_none_or(|e| e.eq_ignore_ascii_case(&session.email)) => {
            session.clone()
        }
        _ => {
            let password = std::env::var("CAMPUS_PASSWORD").ok();
            let (email, password) = match backend {
                StorageBackend::Remote(_) => (wanted.map(ToString::to_string), password),
                _ => (
                    Some(wanted.unwrap_or(LOCAL_EMAIL).to_string()),
                    Some(password.unwrap_or_else(|| LOCAL_PASSWORD.into())),
                ),
            };
            let (Some(email), Some(password)) = (email, password) else {
                return Err(IdentityError::MissingCredentials.into());
            };
            services.identity().sign_in(&email, &password).await?
        }
    };

    let mut rx = subscription.watch();
    rx.wait_for(|state| matches!(state, AuthState::Authenticated(s) if s.user_id == session.user_id))
        .await?;
    tracing::debug!(user = %session.user_id, "session ready");

    let owner = services
        .courses()
        .owner()
        .await
        .ok_or(IdentityError::NotConfigured)?;
    Ok((owner, subscription))
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let parsed = Args::parse(std::env::args().skip(1), Defaults::from_env()).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    if parsed.command == Command::Help {
        print_usage();
        return Ok(());
    }

    let db_url = parsed.db_url.map(normalize_sqlite_url);
    let backend = StorageBackend::parse(&parsed.store, db_url, SupabaseConfig::from_env())?;
    if let StorageBackend::Sqlite(url) = &backend {
        prepare_sqlite_file(url)?;
    }

    let generator = GeneratorConfig::from_env();
    if !generator.has_api_key() {
        tracing::warn!("CAMPUS_OPENAI_API_KEY is not set; generation commands will fail");
    }
    let services = AppServices::new(backend.clone(), Clock::system(), &generator).await?;

    let (owner, _subscription) = sign_in(&services, &backend, parsed.email).await?;
    let preferences = services.preferences().load(&owner).await?;

    let context = Context {
        services,
        owner,
        preferences,
    };
    commands::execute(&context, parsed.command).await
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_urls_become_absolute() {
        assert_eq!(
            normalize_sqlite_url("sqlite://already.db".into()),
            "sqlite://already.db"
        );
        assert_eq!(
            normalize_sqlite_url("sqlite::memory:".into()),
            "sqlite::memory:"
        );
        let url = normalize_sqlite_url("sqlite:campus.sqlite3".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("campus.sqlite3"));
    }

    #[test]
    fn prepare_rejects_non_file_urls() {
        assert!(prepare_sqlite_file("sqlite::memory:").is_ok());
        assert!(prepare_sqlite_file("postgres://db").is_err());
        assert!(prepare_sqlite_file("sqlite://").is_err());
    }
}
