use std::collections::HashMap;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokenward::{state::AppState, token::TokenKind};

/// Command line access to the credential store and token engine.
///
/// Reads the same environment as the server. Without `DATABASE_URL` users
/// only live for the duration of one command.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a user from schema column values
    CreateUser {
        /// Column value as name=value; repeat per column
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
    /// Authenticate and print an access and a refresh token
    GenerateToken {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        /// Address recorded in the refresh token
        #[arg(long, default_value = "cli")]
        ip: String,
    },
    /// Verify an access token and print its identity
    VerifyToken {
        #[arg(long)]
        token: String,
    },
    /// Exchange an access token and a refresh token for a new access token
    RefreshToken {
        #[arg(long)]
        access: String,
        #[arg(long)]
        refresh: String,
    },
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty column name in '{raw}'"));
    }
    Ok((name.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "tokenward=warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let state = AppState::init().await?;
    let auth = &state.auth;

    match args.command {
        Command::CreateUser { fields } => {
            let fields: HashMap<String, String> = fields.into_iter().collect();
            auth.store
                .create_user(fields)
                .await
                .context("create user")?;
            println!("user created");
        }
        Command::GenerateToken {
            username,
            password,
            ip,
        } => {
            let access = auth
                .tokens
                .generate_token(&username, &password)
                .await
                .context("generate access token")?;
            let refresh = auth
                .tokens
                .generate_refresh_token(&username, &ip)
                .context("generate refresh token")?;
            println!("access token: {access}");
            println!("refresh token: {refresh}");
        }
        Command::VerifyToken { token } => {
            let identity = auth
                .tokens
                .verify_token(&token, TokenKind::Access)
                .context("verify token")?;
            println!(
                "username: {}\nrole: {}",
                identity.username,
                identity.role.unwrap_or_default()
            );
        }
        Command::RefreshToken { access, refresh } => {
            let renewed = auth
                .tokens
                .refresh_token(&access, &refresh)
                .context("refresh token")?;
            println!("username: {}", renewed.username);
            println!("access token: {}", renewed.access_token);
        }
    }

    Ok(())
}
