use actix_web::{web, HttpServer};
use blogapp_backend::{config::Config, server};
use clap::Parser;
use std::io;
use std::path::PathBuf;
use tera::Tera;

#[derive(Parser, Debug)]
#[command(name = "blogapp_server", author, version, about = "Starts the blog web server.")]
struct Cli {
    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();

    // Load configuration first
    let config = Config::from_env(&cli.env_file)
        .expect("FATAL: Failed to load or parse configuration.");

    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    let tera = Tera::new(&config.template_glob()).expect("FATAL: Tera initialization failed");

    let database_file = config.database_file();
    if !database_file.exists() {
        log::error!(
            "Database not found at '{}'. Run 'cargo run --bin setup_cli -- --env-file <path> db setup'",
            database_file.display()
        );
        return Err(io::Error::new(io::ErrorKind::NotFound, "database file missing"));
    }

    let pool = server::build_pool(&database_file)
        .expect("FATAL: Failed to create Rusqlite connection pool.");

    let session_key = server::session_key(&config.session_secret_key)
        .expect("FATAL: SESSION_SECRET_KEY could not be turned into a session key.");

    let server_address = format!("{}:{}", config.web.host, config.web.port);
    log::info!("Server starting at http://{}", server_address);

    let config_data = web::Data::new(config);
    let pool_data = web::Data::new(pool);
    let tera_data = web::Data::new(tera);

    HttpServer::new(move || {
        server::build_app(
            config_data.clone(),
            pool_data.clone(),
            tera_data.clone(),
            session_key.clone(),
        )
    })
    .bind(server_address)?
    .run()
    .await
}
