//! Request cycle demo
//!
//! Walks one browser session through four simulated requests: first visit,
//! return visit, logout, and a replay of the stale cookie.
//!
//! Backend selection comes from the environment:
//!
//! - `SIDSTORE_BACKEND`: `memory` (default) or `redis`
//! - `SIDSTORE_BACKEND_OPTIONS`: backend option JSON
//! - `SIDSTORE_SECRET`: cookie signing secret

use anyhow::Context;
use chrono::Duration;
use sidstore_core::{SessionConfig, SessionCookie, SessionManager};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// One simulated request: the `Cookie` header the browser sends and the
/// `Set-Cookie` the server answers with.
async fn request(
    manager: &SessionManager,
    label: &str,
    cookie_header: Option<&str>,
    logout: bool,
) -> anyhow::Result<Option<SessionCookie>> {
    println!("\n>>> {label}");
    println!("    Cookie: {}", cookie_header.unwrap_or("<none>"));

    let mut session = manager.handle_from_header(cookie_header);
    let resumed = session.init().await.context("loading session")?;
    println!("    resumed existing session: {resumed}");

    if logout {
        session.clear().await.context("clearing session")?;
    } else {
        for flash in session.flashes()? {
            println!("    flash: {}", flash.as_str().unwrap_or("<non-text flash>"));
        }

        let visits = session
            .get("visits")?
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
            + 1;
        session.set_key("visits", visits)?;
        println!("    visits: {visits}");

        if visits == 1 {
            session.add_flash("Welcome!")?;
        } else {
            session.refresh(Duration::hours(1))?;
        }
        if let Some(at) = session.expires_at()? {
            println!("    expires at: {at}");
        }
    }

    let cookie = session.finish().await;
    match &cookie {
        Some(cookie) => println!("    Set-Cookie: {cookie}"),
        None => println!("    (no Set-Cookie)"),
    }
    Ok(cookie)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "request_cycle=info,sidstore_core=debug,sidstore_redis=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== sidstore: request cycle ===");

    sidstore_redis::register();

    let secret = std::env::var("SIDSTORE_SECRET").unwrap_or_else(|_| "demo-secret".to_string());
    let backend = std::env::var("SIDSTORE_BACKEND").unwrap_or_else(|_| "memory".to_string());
    let options = std::env::var("SIDSTORE_BACKEND_OPTIONS").unwrap_or_default();

    let config = SessionConfig::new(secret).with_backend(backend, options);
    let manager = SessionManager::open(config).context("starting session manager")?;
    tracing::info!(backend = manager.backend().name(), "Using session backend");

    let name = manager.config().cookie_name.clone();
    let header = |cookie: &SessionCookie| format!("theme=dark; {name}={}", cookie.value);

    let first = request(&manager, "GET / (first visit)", None, false)
        .await?
        .context("first visit should set a cookie")?;

    let second_header = header(&first);
    let second = request(&manager, "GET / (return visit)", Some(&second_header), false).await?;
    let current = second.unwrap_or(first);

    let logout_header = header(&current);
    request(&manager, "POST /logout", Some(&logout_header), true).await?;

    request(&manager, "GET / (stale cookie)", Some(&logout_header), false).await?;

    println!("\n=== done ===");
    Ok(())
}
