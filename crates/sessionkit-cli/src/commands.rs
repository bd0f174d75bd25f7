use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use tracing::warn;

use sessionkit_core::{ApiRequest, ApiResponse, AuthClient, Config, Credentials, SessionStore, UserProfile};

/// Env var consulted before prompting for a password
const PASSWORD_ENV: &str = "SESSIONKIT_PASSWORD";

pub async fn login(config: &mut Config, session: &SessionStore, username: Option<String>) -> Result<()> {
    let username = match username.or_else(|| config.last_username.clone()) {
        Some(name) => name,
        None => prompt("Username: ")?,
    };
    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password("Password: ").context("Failed to read password")?,
    };
    if username.is_empty() || password.is_empty() {
        anyhow::bail!("Username and password required");
    }

    let user = session
        .login(&Credentials::new(username.clone(), password))
        .await
        .context("Login failed")?;

    config.last_username = Some(username);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    println!("Logged in{}", describe(&user));
    Ok(())
}

pub fn logout(session: &SessionStore) {
    session.logout();
    println!("Logged out");
}

pub async fn whoami(session: &SessionStore) -> Result<()> {
    match session.fetch_current_user().await {
        Some(user) => {
            println!("{}", serde_json::to_string_pretty(&user)?);
            Ok(())
        }
        None => anyhow::bail!("Not logged in"),
    }
}

pub fn status(session: &SessionStore) -> Result<()> {
    let snapshot = session.snapshot();
    if !snapshot.is_authenticated {
        println!("Not logged in");
        return Ok(());
    }
    match snapshot.user {
        Some(ref user) => println!("Logged in{}", describe(user)),
        None => println!("Logged in (profile not loaded, run `sessionkit whoami`)"),
    }
    if session.is_admin() {
        println!("Administrator access");
    }
    Ok(())
}

pub async fn get(client: &AuthClient, path: &str) -> Result<()> {
    let response = client.send(ApiRequest::get(path)).await?;
    print_response(&response);
    Ok(())
}

pub async fn post(client: &AuthClient, path: &str, body: &str) -> Result<()> {
    let body: serde_json::Value = serde_json::from_str(body).context("Request body is not valid JSON")?;
    let response = client
        .send(ApiRequest::post(path).json(&body)?)
        .await?;
    print_response(&response);
    Ok(())
}

pub async fn delete(client: &AuthClient, path: &str) -> Result<()> {
    let response = client.delete(path).await?;
    print_response(&response);
    Ok(())
}

fn describe(user: &UserProfile) -> String {
    let name = ["username", "email", "id"]
        .iter()
        .find_map(|key| user.field(key))
        .map(|value| match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        });
    match (name, user.role.as_deref()) {
        (Some(name), Some(role)) => format!(" as {} ({})", name, role),
        (Some(name), None) => format!(" as {}", name),
        (None, Some(role)) => format!(" ({})", role),
        (None, None) => String::new(),
    }
}

fn print_response(response: &ApiResponse) {
    match serde_json::from_str::<serde_json::Value>(&response.body) {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(pretty) => println!("{}", pretty),
            Err(_) => println!("{}", response.body),
        },
        Err(_) if response.body.is_empty() => println!("{}", response.status),
        Err(_) => println!("{}", response.body),
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
