use blogapp_backend::config::Config;
use blogapp_backend::helper::form_helpers::is_valid_email;
use blogapp_backend::models::User;
use blogapp_backend::models::db_operations::{
    permissions_db_operations, posts_db_operations, users_db_operations,
};
use blogapp_backend::setup::db_setup;
use chrono::Utc;
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(name = "setup_cli", author, version, about = "A CLI for initial application setup.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    BlogPost {
        #[command(subcommand)]
        action: BlogPostAction,
    },
}

#[derive(Subcommand, Debug)]
enum DbAction {
    /// Creates the schema and seeds permissions. Safe to run again.
    Setup,
}

#[derive(Subcommand, Debug)]
enum UserAction {
    CreateSuperuser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Grants a `content_type.codename` permission directly to a user.
    Grant {
        #[arg(long)]
        username: String,
        #[arg(long)]
        permission: String,
    },
    /// Enables or disables login for an account.
    SetActive {
        #[arg(long)]
        username: String,
        #[arg(long, action = clap::ArgAction::Set)]
        active: bool,
    },
    List,
}

#[derive(Subcommand, Debug)]
enum BlogPostAction {
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file)
        .expect("FATAL: Failed to load or parse configuration.");
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    let outcome = match &cli.command {
        Commands::Db { action } => match action {
            DbAction::Setup => setup_database(&config),
        },
        Commands::User { action } => match action {
            UserAction::CreateSuperuser { username, email, password } => {
                create_superuser(&config, username, email, password)
            }
            UserAction::Grant { username, permission } => grant_permission(&config, username, permission),
            UserAction::SetActive { username, active } => set_user_active(&config, username, *active),
            UserAction::List => list_users(&config),
        },
        Commands::BlogPost { action } => match action {
            BlogPostAction::Create { title, content } => create_blog_post(&config, title, content),
        },
    };

    if let Err(message) = outcome {
        eprintln!("❌ Error: {}", message);
        process::exit(1);
    }
}

/// Failure text shown to the operator; any `Err` exits the process with status 1.
type CliResult = Result<(), String>;

fn open_existing_database(config: &Config) -> Result<Connection, String> {
    let db_path = config.database_file();
    if !db_path.exists() {
        return Err(format!(
            "Database not found at '{}'. Please run `setup_cli db setup` first.",
            db_path.display()
        ));
    }
    Connection::open(&db_path).map_err(|e| format!("Could not open database: {}", e))
}

fn find_user(conn: &Connection, username: &str) -> Result<User, String> {
    users_db_operations::read_user_by_username(conn, username)
        .map_err(|e| format!("Could not read user: {}", e))?
        .ok_or_else(|| format!("No user named '{}' found.", username))
}

fn setup_database(config: &Config) -> CliResult {
    let db_path = config.database_file();
    println!("\nSetting up database at '{}'...", db_path.display());

    if let Some(parent_dir) = db_path.parent() {
        fs::create_dir_all(parent_dir)
            .map_err(|e| format!("Could not create database directory: {}", e))?;
    }

    let mut conn =
        Connection::open(&db_path).map_err(|e| format!("Could not create database file: {}", e))?;
    db_setup::setup_database(&mut conn).map_err(|e| format!("Database setup failed: {}", e))?;
    println!("✅ Database setup completed successfully.");
    Ok(())
}

fn create_superuser(config: &Config, username: &str, email: &str, password: &str) -> CliResult {
    if !is_valid_email(email) {
        return Err(format!("'{}' is not a valid email address.", email));
    }
    let conn = open_existing_database(config)?;

    let id = users_db_operations::create_user(&conn, username, email, password, config.password_hash_cost, true)
        .map_err(|e| match users_db_operations::unique_violation_column(&e) {
            Some(field) => format!("That {} is already taken.", field),
            None => format!("Could not create superuser: {}", e),
        })?;
    println!("✅ Superuser '{}' created with id {}.", username, id);
    Ok(())
}

fn grant_permission(config: &Config, username: &str, permission: &str) -> CliResult {
    let (content_type, codename) = permissions_db_operations::parse_qualified_permission(permission)
        .ok_or_else(|| "Permission must look like 'content_type.codename'.".to_string())?;
    let conn = open_existing_database(config)?;

    let user = find_user(&conn, username)?;
    let perm = permissions_db_operations::read_permission(&conn, content_type, codename)
        .map_err(|e| format!("Could not read permission: {}", e))?
        .ok_or_else(|| format!("Unknown permission '{}'.", permission))?;

    permissions_db_operations::add_permission_to_user(&conn, user.id, perm.id)
        .map_err(|e| format!("Could not grant permission: {}", e))?;
    println!("✅ Granted '{}' to '{}'.", perm.qualified_name(), user.username);
    Ok(())
}

fn set_user_active(config: &Config, username: &str, active: bool) -> CliResult {
    let conn = open_existing_database(config)?;
    let user = find_user(&conn, username)?;

    users_db_operations::set_active(&conn, user.id, active)
        .map_err(|e| format!("Could not update user: {}", e))?;
    let state = if active { "activated" } else { "deactivated" };
    println!("✅ User '{}' {}.", user.username, state);
    Ok(())
}

fn list_users(config: &Config) -> CliResult {
    let conn = open_existing_database(config)?;
    let users = users_db_operations::read_all_users(&conn)
        .map_err(|e| format!("Could not fetch users: {}", e))?;

    println!("Listing Users:");
    for user in users {
        let flags = match (user.is_superuser, user.is_active) {
            (true, true) => " [superuser]",
            (_, false) => " [inactive]",
            _ => "",
        };
        println!("- {} <{}>{}", user.username, user.email, flags);
    }
    Ok(())
}

fn create_blog_post(config: &Config, title: &str, content: &str) -> CliResult {
    let conn = open_existing_database(config)?;

    let id = posts_db_operations::insert_blog_post(&conn, title, content, &Utc::now())
        .map_err(|e| format!("Could not create blog post: {}", e))?;
    println!("✅ Blog post '{}' created with id {}.", title, id);
    Ok(())
}
