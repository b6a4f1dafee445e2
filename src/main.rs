use live_poll::{
    config::ServerConfig,
    startup::{self, AppState},
};
use tokio::net::TcpListener;

#[macro_use]
extern crate tracing;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "INFO");
        }
    }
    // initialize tracing
    tracing_subscriber::fmt::init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("unable to bind {}: {e}", config.bind_addr);
            std::process::exit(1);
        }
    };

    if let Err(e) = startup::serve(listener, AppState::new(config)).await {
        error!("server stopped: {e}");
        std::process::exit(1);
    }
}
