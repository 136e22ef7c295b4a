use std::error::Error;

use clap::Parser;
use palaver::prelude::*;
use tracing_subscriber::EnvFilter;

mod config;

use config::ServerArgs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = ServerArgs::parse();

    // RUST_LOG wins when set; otherwise Palaver's own crates log at info.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("palaver=info"));
    if args.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let auth = match &args.users {
        Some(path) => MemoryAuthProvider::load(path).await?,
        None => MemoryAuthProvider::new(),
    };
    if let Some(password) = &args.admin_password {
        let admin = Identity::new(
            &args.admin_login,
            password,
            ADMIN_NICKNAME,
            Role::Administrator,
        );
        if auth.ensure_identity(admin).await? {
            tracing::info!(login = %args.admin_login, "seeded administrator identity");
        }
    }

    let server = PalaverServerBuilder::new()
        .bind(&args.bind)
        .session_config(args.session_config())
        .build(auth)
        .await?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            shutdown.cancel();
        }
    });

    server.run().await?;
    Ok(())
}
