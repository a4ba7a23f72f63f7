//! Account login against the Macrochat API
//!
//! Exchanges email and password for a session token and keeps it in the
//! config file.

pub mod tokens;

pub use tokens::{StoredToken, TokenStore};

use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};

use crate::api::MacrochatClient;
use crate::config::Config;

fn read_password() -> Result<String> {
    eprint!("Password: ");
    io::stderr().flush().ok();
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Log in and store the session token.
pub async fn login(email: &str, password: Option<String>, force: bool) -> Result<()> {
    let mut config = Config::load()?;

    if !force && config.logged_in_as(email) {
        println!("Already logged in as {}. Use --force to re-authenticate.", email);
        return Ok(());
    }

    let password = match password {
        Some(p) => p,
        None => read_password()?,
    };

    tracing::info!("Logging in as {}", email);
    let client = MacrochatClient::new(&config.api_base_url);
    let token = client
        .login(email, &password)
        .await
        .context("Login failed")?;

    config.set_session_token(StoredToken::new(token).with_email(email));
    config.save()?;
    println!("Login successful.");
    Ok(())
}

/// Clear stored credentials
pub async fn logout() -> Result<()> {
    let mut config = Config::load()?;
    config.clear_tokens();
    config.save()?;
    println!("Logged out.");
    Ok(())
}

/// Display current auth status
pub async fn status() -> Result<()> {
    let config = Config::load()?;

    println!("API:         {}", config.api_base_url);
    match config.push_url() {
        Ok(url) => println!("Push:        {}", url),
        Err(e) => println!("Push:        invalid ({:#})", e),
    }
    match config.session_token() {
        Some(token) => {
            println!("Session:     stored");
            if let Some(email) = token.email {
                println!("  account:   {}", email);
            }
        }
        None => {
            println!("Session:     none");
            println!("\nRun 'macrochat-sync login --email <email>' to authenticate.");
        }
    }

    Ok(())
}

/// API client carrying the stored session token.
pub fn client(config: &Config) -> Result<MacrochatClient> {
    let token = config
        .valid_session_token()
        .context("Not logged in. Run `macrochat-sync login` first.")?;
    Ok(MacrochatClient::new(&config.api_base_url).with_token(token))
}
