use anyhow::Result;

use super::App;
use crate::auth::{self, AuthService, Credentials, Role, SignUpRequest};
use crate::store::DocumentPath;

pub async fn signup(app: &App, name: String, email: String, password: String, role: Role) -> Result<()> {
  let request = SignUpRequest { name, credentials: Credentials::new(email, password), role };
  let principal = auth::register(app.auth.as_ref(), app.store.as_ref(), &request).await?;
  bentley::success!(&format!("Welcome, {}! Account created for {}", principal.greeting_name(), principal.email));
  Ok(())
}

pub async fn login(app: &App, email: String, password: String) -> Result<()> {
  let principal = auth::login(app.auth.as_ref(), &Credentials::new(email, password)).await?;
  bentley::success!(&format!("Logged in as {}", principal.email));
  Ok(())
}

pub async fn logout(app: &App) -> Result<()> {
  if app.auth.current_principal().is_none() {
    bentley::info!("Not logged in");
    return Ok(());
  }
  app.auth.sign_out().await?;
  bentley::success!("Logged Out");
  Ok(())
}

pub async fn whoami(app: &App) -> Result<()> {
  let principal = app.require_principal()?;
  println!("{}", principal.greeting_name());
  println!("Email: {}", principal.email);
  println!("User ID: {}", principal.id);

  match app.store.get(&DocumentPath::user_profile(&principal.id)).await {
    Ok(Some(profile)) => {
      if let Some(role) = profile.fields.get("role").and_then(|r| r.as_str()) {
        println!("Role: {role}");
      }
    }
    Ok(None) => {}
    Err(error) => {
      bentley::warn!(&format!("Could not load profile: {error:#}"));
    }
  }
  Ok(())
}
