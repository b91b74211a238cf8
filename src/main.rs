use std::sync::Arc;

use course_portal::{
    build_api_route_filter, config::Config, handle_rejection, Auth, Courses,
};
use tokio::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warp::Filter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "course_portal=debug,warp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let address = config.bind_address()?;

    let auth = Auth::new(config.auth_config());
    let courses = Courses::new(Arc::new(Mutex::new(config.course_store())));

    let routes = build_api_route_filter(&auth, &courses)
        .recover(handle_rejection)
        .with(warp::trace::request());

    let (address, server) = warp::serve(routes).bind_with_graceful_shutdown(address, async {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received, exiting...");
    });

    tracing::info!(
        data_dir = %config.data_dir.display(),
        "course portal v{} listening on http://{}",
        env!("CARGO_PKG_VERSION"),
        address
    );

    server.await;

    Ok(())
}
